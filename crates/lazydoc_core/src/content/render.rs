//! Plain-text and HTML rendering of document trees.
//!
//! # Responsibility
//! - Concatenate text payloads into plain text.
//! - Render a deterministic, escaped HTML projection.
//! - Derive a short preview string for list views.
//!
//! # Invariants
//! - All user-controlled text and attribute values are HTML-escaped.
//! - Link targets are emitted only for safe schemes.
//! - Rendering is a pure function of the tree.

use crate::content::walker::{extract, is_text};
use crate::model::document::Document;
use crate::model::node::Node;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Maximum preview length in characters.
pub const PREVIEW_MAX_CHARS: usize = 100;

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid ws regex"));
// Same-site paths only: `//host` and `/\host` leave the site.
static SAFE_HREF_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:https?://|mailto:|#|/(?:[^/\\]|$))").expect("valid href regex")
});

/// Concatenates every text payload in depth-first order, without separators.
pub fn extract_text(document: &Document) -> String {
    extract(&document.children, &is_text)
        .into_iter()
        .filter_map(|node| match node {
            Node::Text { value } => Some(value.as_str()),
            _ => None,
        })
        .collect()
}

/// Whitespace-normalized text, truncated to [`PREVIEW_MAX_CHARS`].
///
/// Returns `None` when the document holds no visible text.
pub fn derive_preview(document: &Document) -> Option<String> {
    let text = extract_text(document);
    let normalized = WHITESPACE_RE.replace_all(&text, " ");
    let trimmed = normalized.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.chars().take(PREVIEW_MAX_CHARS).collect())
    }
}

/// Renders the document to escaped HTML.
pub fn render_html(document: &Document) -> String {
    let mut out = String::new();
    render_nodes(&document.children, &mut out);
    out
}

fn render_nodes(nodes: &[Node], out: &mut String) {
    for node in nodes {
        render_node(node, out);
    }
}

fn render_node(node: &Node, out: &mut String) {
    match node {
        Node::Text { value } => escape_into(value, out),
        Node::Mention { id, children } => {
            out.push_str("<span class=\"mention\" data-mention-id=\"");
            escape_into(id, out);
            out.push_str("\">");
            render_nodes(children, out);
            out.push_str("</span>");
        }
        Node::Annotation { id, children } => {
            out.push_str("<span class=\"annotation\" data-annotation-id=\"");
            escape_into(id, out);
            out.push_str("\">");
            render_nodes(children, out);
            out.push_str("</span>");
        }
        Node::Generic {
            kind,
            children,
            attrs,
        } => match kind.as_str() {
            "hard_break" | "hardBreak" => out.push_str("<br>"),
            "heading" => {
                let level = attrs
                    .get("level")
                    .and_then(Value::as_u64)
                    .filter(|level| (1..=6).contains(level))
                    .unwrap_or(1);
                let tag = format!("h{level}");
                wrap(&tag, children, out);
            }
            "link" => {
                out.push_str("<a");
                if let Some(href) = attrs
                    .get("href")
                    .and_then(Value::as_str)
                    .filter(|href| SAFE_HREF_RE.is_match(href.trim()))
                {
                    out.push_str(" href=\"");
                    escape_into(href.trim(), out);
                    out.push('"');
                }
                out.push('>');
                render_nodes(children, out);
                out.push_str("</a>");
            }
            other => match fixed_tag(other) {
                Some(tag) => wrap(tag, children, out),
                None => {
                    out.push_str("<div data-node-type=\"");
                    escape_into(other, out);
                    out.push_str("\">");
                    render_nodes(children, out);
                    out.push_str("</div>");
                }
            },
        },
    }
}

fn fixed_tag(kind: &str) -> Option<&'static str> {
    match kind {
        "paragraph" => Some("p"),
        "bold" | "strong" => Some("strong"),
        "italic" | "em" => Some("em"),
        "underline" => Some("u"),
        "strike" => Some("s"),
        "code" => Some("code"),
        "code_block" | "codeBlock" => Some("pre"),
        "blockquote" => Some("blockquote"),
        "bullet_list" | "bulletList" => Some("ul"),
        "ordered_list" | "orderedList" => Some("ol"),
        "list_item" | "listItem" => Some("li"),
        _ => None,
    }
}

fn wrap(tag: &str, children: &[Node], out: &mut String) {
    out.push('<');
    out.push_str(tag);
    out.push('>');
    render_nodes(children, out);
    out.push_str("</");
    out.push_str(tag);
    out.push('>');
}

fn escape_into(value: &str, out: &mut String) {
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
}

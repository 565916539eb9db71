//! Predicate-driven tree traversal.
//!
//! # Responsibility
//! - Extract nodes matching a predicate in depth-first pre-order.
//! - Rebuild a tree with matching nodes replaced or removed.
//!
//! # Invariants
//! - `extract` never prunes: descendants of a match are still visited.
//! - `replace` stops at a match; the replacement is inserted as-is.
//! - Neither operation mutates its input.

use crate::model::node::Node;

/// Structural test applied to one node value.
pub trait NodePredicate {
    fn matches(&self, node: &Node) -> bool;
}

impl<F> NodePredicate for F
where
    F: Fn(&Node) -> bool,
{
    fn matches(&self, node: &Node) -> bool {
        self(node)
    }
}

/// Result of [`replace`].
#[derive(Debug, Clone, PartialEq)]
pub struct Replaced {
    pub nodes: Vec<Node>,
    /// Number of matched nodes.
    pub count: usize,
}

/// Returns every node matching `predicate`, in depth-first pre-order.
pub fn extract<'a, P: NodePredicate + ?Sized>(nodes: &'a [Node], predicate: &P) -> Vec<&'a Node> {
    let mut found = Vec::new();
    collect(nodes, predicate, &mut found);
    found
}

fn collect<'a, P: NodePredicate + ?Sized>(
    nodes: &'a [Node],
    predicate: &P,
    found: &mut Vec<&'a Node>,
) {
    for node in nodes {
        if predicate.matches(node) {
            found.push(node);
        }
        collect(node.children(), predicate, found);
    }
}

/// Rebuilds `nodes` bottom-up, substituting every match.
///
/// `None` deletes the matched node together with its subtree. Zero matches
/// yield a structurally equal copy.
pub fn replace<P: NodePredicate + ?Sized>(
    nodes: &[Node],
    predicate: &P,
    replacement: Option<&Node>,
) -> Replaced {
    let mut count = 0;
    let nodes = rebuild(nodes, predicate, replacement, &mut count);
    Replaced { nodes, count }
}

fn rebuild<P: NodePredicate + ?Sized>(
    nodes: &[Node],
    predicate: &P,
    replacement: Option<&Node>,
    count: &mut usize,
) -> Vec<Node> {
    let mut rebuilt = Vec::with_capacity(nodes.len());
    for node in nodes {
        if predicate.matches(node) {
            *count += 1;
            if let Some(replacement) = replacement {
                rebuilt.push(replacement.clone());
            }
            continue;
        }

        let node = match node {
            Node::Text { value } => Node::Text {
                value: value.clone(),
            },
            Node::Mention { id, children } => Node::Mention {
                id: id.clone(),
                children: rebuild(children, predicate, replacement, count),
            },
            Node::Annotation { id, children } => Node::Annotation {
                id: id.clone(),
                children: rebuild(children, predicate, replacement, count),
            },
            Node::Generic {
                kind,
                children,
                attrs,
            } => Node::Generic {
                kind: kind.clone(),
                children: rebuild(children, predicate, replacement, count),
                attrs: attrs.clone(),
            },
        };
        rebuilt.push(node);
    }
    rebuilt
}

pub fn is_text(node: &Node) -> bool {
    node.is_text()
}

pub fn is_mention(node: &Node) -> bool {
    node.is_mention()
}

pub fn is_annotation(node: &Node) -> bool {
    node.is_annotation()
}

/// Matches annotation nodes carrying `id`.
pub fn annotation_id(id: impl Into<String>) -> impl Fn(&Node) -> bool {
    let id = id.into();
    move |node: &Node| node.is_annotation() && node.id() == Some(id.as_str())
}

/// Matches mention nodes carrying `id`.
pub fn mention_id(id: impl Into<String>) -> impl Fn(&Node) -> bool {
    let id = id.into();
    move |node: &Node| node.is_mention() && node.id() == Some(id.as_str())
}

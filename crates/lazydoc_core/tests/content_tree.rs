use lazydoc_core::{
    active_annotation_ids, annotation_id, extract, extract_text, ingest_str, ingest_value,
    is_annotation, is_mention, mention_id, render_html, stale_annotation_ids, Document, Node,
    MAX_NODE_DEPTH,
};
use serde_json::json;
use std::collections::BTreeSet;

fn ids(values: &[&str]) -> BTreeSet<String> {
    values.iter().map(|value| value.to_string()).collect()
}

fn scenario() -> Document {
    ingest_value(&json!({
        "children": [
            {"type": "annotation", "id": "a1", "children": [{"type": "text", "value": "hi"}]}
        ]
    }))
}

#[test]
fn annotation_scenario_text_ids_and_staleness() {
    let doc = scenario();

    assert_eq!(extract_text(&doc), "hi");
    assert_eq!(active_annotation_ids(&doc), vec!["a1".to_string()]);
    assert_eq!(stale_annotation_ids(&doc, &ids(&["a1", "a2"])), ids(&["a2"]));
}

#[test]
fn removing_the_annotation_empties_the_tree_and_makes_it_stale() {
    let edited = scenario().replace(&annotation_id("a1"), None);

    assert_eq!(edited.to_value(), json!({"children": []}));
    assert_eq!(stale_annotation_ids(&edited, &ids(&["a1"])), ids(&["a1"]));
}

#[test]
fn nested_mention_inside_annotation_is_found_by_both_predicates() {
    let doc = ingest_str(
        r#"{"children": [
            {"type": "paragraph", "children": [
                {"type": "annotation", "id": "a1", "children": [
                    {"type": "text", "value": "ask "},
                    {"type": "mention", "id": "u7", "children": [{"type": "text", "value": "@kim"}]}
                ]}
            ]}
        ]}"#,
    );

    let annotations = extract(&doc.children, &is_annotation);
    let mentions = extract(&doc.children, &is_mention);
    assert_eq!(annotations.len(), 1);
    assert_eq!(mentions.len(), 1);
    assert_eq!(mentions[0].id(), Some("u7"));
    assert_eq!(extract_text(&doc), "ask @kim");
}

#[test]
fn fallback_input_renders_escaped() {
    let doc = ingest_str("<b>not json {");
    assert_eq!(doc.children, vec![Node::text("<b>not json {")]);
    assert_eq!(render_html(&doc), "&lt;b&gt;not json {");
}

#[test]
fn ingestion_is_idempotent_on_canonical_input() {
    let doc = ingest_str(
        r#"{"children": [
            {"type": "heading", "level": 2, "children": [{"type": "text", "value": "Plan"}]},
            {"type": "paragraph", "children": {
                "1": {"type": "text", "value": "b"},
                "0": {"type": "text", "value": "a"}
            }}
        ]}"#,
    );
    let canonical = doc.to_canonical_json();

    let again = ingest_str(&canonical);
    assert_eq!(again, doc);
    assert_eq!(again.to_canonical_json(), canonical);
    assert_eq!(extract_text(&again), "Planab");
}

/// Tree whose text leaf sits exactly `depth` levels down.
fn nested_quotes(depth: usize) -> Document {
    let mut node = Node::mention("u1", vec![Node::text("@ana")]);
    for _ in 2..depth {
        node = Node::generic("quote", vec![node]);
    }
    Document::new(vec![node])
}

#[test]
fn deepest_tree_ingests_back_without_fallback() {
    let deep = nested_quotes(MAX_NODE_DEPTH);
    let canonical = deep.to_canonical_json();

    let again = ingest_str(&canonical);
    assert_eq!(again, deep);
    assert_eq!(ingest_str(&again.to_canonical_json()), deep);
    assert_eq!(extract(&again.children, &mention_id("u1")).len(), 1);
    assert!(extract(&again.children, &mention_id("u2")).is_empty());

    let over = nested_quotes(MAX_NODE_DEPTH + 1).to_canonical_json();
    assert_eq!(ingest_str(&over).children, vec![Node::text(over.clone())]);
}

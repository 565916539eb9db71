//! Document root container.
//!
//! # Responsibility
//! - Own the ordered top-level node sequence of one rich-content document.
//! - Provide the canonical stored form `{ "children": [...] }`.
//! - Enforce structural invariants before a tree is persisted.
//!
//! # Invariants
//! - Nodes are owned exclusively by one document.
//! - Nesting depth never exceeds [`MAX_NODE_DEPTH`], and the canonical JSON
//!   form never nests deeper than [`MAX_JSON_NESTING`], so every stored tree
//!   parses back.
//! - An annotation id is referenced by at most one live node.

use crate::content::walker::{self, NodePredicate};
use crate::model::node::{
    decode_children, encode_children, json_level, value_nesting, Node, NodeDecodeError,
    CHILDREN_KEY, MAX_JSON_NESTING, MAX_NODE_DEPTH,
};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier of a persisted document.
pub type DocumentId = Uuid;

/// Structural validation failure; a programming error, never a runtime state
/// to recover from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructureError {
    /// Tree nesting exceeds the supported depth.
    TooDeep { max: usize },
    /// An attribute value would push the canonical form past
    /// [`MAX_JSON_NESTING`].
    AttributeTooDeep { node_type: String, key: String },
    /// A mention/annotation node carries a blank id.
    EmptyIdentifier { node_type: &'static str },
    /// Two live annotation nodes share one id.
    DuplicateAnnotationId(String),
}

impl Display for StructureError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooDeep { max } => write!(f, "document nesting exceeds max depth {max}"),
            Self::AttributeTooDeep { node_type, key } => write!(
                f,
                "attribute `{key}` of `{node_type}` node nests deeper than {MAX_JSON_NESTING} JSON levels"
            ),
            Self::EmptyIdentifier { node_type } => {
                write!(f, "`{node_type}` node must carry a non-empty id")
            }
            Self::DuplicateAnnotationId(id) => {
                write!(f, "annotation id `{id}` is referenced more than once")
            }
        }
    }
}

impl Error for StructureError {}

/// Root of a rich-content tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub children: Vec<Node>,
}

impl Document {
    pub fn new(children: Vec<Node>) -> Self {
        Self { children }
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Decodes `{ "children": [...] }`.
    ///
    /// # Errors
    /// - `NotAnObject` when the root is not an object.
    /// - `MissingField` when `children` is absent.
    /// - Any node-level decoding error.
    pub fn from_value(value: &Value) -> Result<Self, NodeDecodeError> {
        let Value::Object(object) = value else {
            return Err(NodeDecodeError::NotAnObject);
        };
        let Some(children) = object.get(CHILDREN_KEY) else {
            return Err(NodeDecodeError::MissingField {
                node_type: "document".to_string(),
                field: CHILDREN_KEY,
            });
        };
        Ok(Self {
            children: decode_children(Some(children), 0)?,
        })
    }

    /// Canonical stored form.
    pub fn to_value(&self) -> Value {
        let mut object = Map::new();
        object.insert(CHILDREN_KEY.to_string(), encode_children(&self.children));
        Value::Object(object)
    }

    /// Canonical stored form as compact JSON text.
    pub fn to_canonical_json(&self) -> String {
        self.to_value().to_string()
    }

    /// Checks depth, identifier and annotation-uniqueness invariants.
    pub fn validate(&self) -> Result<(), StructureError> {
        let mut seen_annotations = HashSet::new();
        validate_nodes(&self.children, 1, &mut seen_annotations)
    }

    /// Pre-order list of nodes matching `predicate`.
    pub fn extract<P: NodePredicate + ?Sized>(&self, predicate: &P) -> Vec<&Node> {
        walker::extract(&self.children, predicate)
    }

    /// New document with every node matching `predicate` replaced by
    /// `replacement`, or removed when `replacement` is `None`.
    pub fn replace<P: NodePredicate + ?Sized>(
        &self,
        predicate: &P,
        replacement: Option<&Node>,
    ) -> Document {
        self.replace_counted(predicate, replacement).0
    }

    /// Same as [`Document::replace`], also returning how many nodes matched.
    pub fn replace_counted<P: NodePredicate + ?Sized>(
        &self,
        predicate: &P,
        replacement: Option<&Node>,
    ) -> (Document, usize) {
        let replaced = walker::replace(&self.children, predicate, replacement);
        (Document::new(replaced.nodes), replaced.count)
    }
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Document {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Document::from_value(&value).map_err(D::Error::custom)
    }
}

fn validate_nodes<'a>(
    nodes: &'a [Node],
    depth: usize,
    seen_annotations: &mut HashSet<&'a str>,
) -> Result<(), StructureError> {
    if nodes.is_empty() {
        return Ok(());
    }
    if depth > MAX_NODE_DEPTH {
        return Err(StructureError::TooDeep {
            max: MAX_NODE_DEPTH,
        });
    }

    for node in nodes {
        match node {
            Node::Mention { id, .. } if id.trim().is_empty() => {
                return Err(StructureError::EmptyIdentifier {
                    node_type: "mention",
                });
            }
            Node::Annotation { id, .. } => {
                if id.trim().is_empty() {
                    return Err(StructureError::EmptyIdentifier {
                        node_type: "annotation",
                    });
                }
                if !seen_annotations.insert(id.as_str()) {
                    return Err(StructureError::DuplicateAnnotationId(id.clone()));
                }
            }
            Node::Generic { kind, attrs, .. } => {
                let too_deep = attrs.iter().find(|(_, value)| {
                    json_level(depth) + value_nesting(value) > MAX_JSON_NESTING
                });
                if let Some((key, _)) = too_deep {
                    return Err(StructureError::AttributeTooDeep {
                        node_type: kind.clone(),
                        key: key.clone(),
                    });
                }
            }
            _ => {}
        }
        validate_nodes(node.children(), depth + 1, seen_annotations)?;
    }

    Ok(())
}

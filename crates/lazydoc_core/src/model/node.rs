//! Rich-content node model.
//!
//! # Responsibility
//! - Define the closed set of node variants stored in a document tree.
//! - Decode the JSON wire shape into typed nodes and encode it back.
//!
//! # Invariants
//! - Every node has exactly one variant; only `Text` has no children.
//! - `Mention`/`Annotation` identity is the external `id`, never tree position.
//! - Decoded children are always a plain ordered sequence; `null` entries are
//!   dropped and index-keyed map wrappers are flattened in index order.
//!
//! # See also
//! - docs/architecture/content-tree.md

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Maximum nesting depth accepted by decoding and structural validation.
///
/// Every node level costs two JSON levels (the node object and its
/// `children` array), so the canonical form of the deepest accepted tree
/// stays below [`MAX_JSON_NESTING`] and parses back with `serde_json`.
pub const MAX_NODE_DEPTH: usize = 60;

/// Deepest JSON nesting `serde_json::from_str` accepts with its default
/// recursion limit.
pub const MAX_JSON_NESTING: usize = 127;

pub(crate) const TYPE_KEY: &str = "type";
pub(crate) const CHILDREN_KEY: &str = "children";
const ID_KEY: &str = "id";
const VALUE_KEY: &str = "value";

pub(crate) const TEXT_TYPE: &str = "text";
pub(crate) const MENTION_TYPE: &str = "mention";
pub(crate) const ANNOTATION_TYPE: &str = "annotation";

/// Opaque attributes carried by generic formatting nodes.
pub type NodeAttrs = Map<String, Value>;

/// Variant tag of a [`Node`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Text,
    Mention,
    Annotation,
    Generic,
}

/// Identity of a node that references an external record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeIdentity<'a> {
    pub kind: NodeKind,
    pub id: &'a str,
}

/// One element of a rich-content tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Leaf carrying a text payload.
    Text { value: String },
    /// Reference to an external person/entity with optional display children.
    Mention { id: String, children: Vec<Node> },
    /// Marker wrapping content that an external annotation record refers to.
    Annotation { id: String, children: Vec<Node> },
    /// Any other structural or formatting node, keyed by its type name.
    Generic {
        kind: String,
        children: Vec<Node>,
        attrs: NodeAttrs,
    },
}

/// Errors raised while decoding the JSON wire shape into nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeDecodeError {
    /// Expected a JSON object.
    NotAnObject,
    /// Required field is absent.
    MissingField {
        node_type: String,
        field: &'static str,
    },
    /// Field is present but has the wrong shape.
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },
    /// Nesting exceeds [`MAX_NODE_DEPTH`].
    TooDeep { max: usize },
}

impl Display for NodeDecodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAnObject => write!(f, "node must be a JSON object"),
            Self::MissingField { node_type, field } => {
                write!(f, "`{node_type}` node is missing field `{field}`")
            }
            Self::InvalidField { field, expected } => {
                write!(f, "field `{field}` must be {expected}")
            }
            Self::TooDeep { max } => write!(f, "node nesting exceeds max depth {max}"),
        }
    }
}

impl Error for NodeDecodeError {}

impl Node {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text {
            value: value.into(),
        }
    }

    pub fn mention(id: impl Into<String>, children: Vec<Node>) -> Self {
        Self::Mention {
            id: id.into(),
            children,
        }
    }

    pub fn annotation(id: impl Into<String>, children: Vec<Node>) -> Self {
        Self::Annotation {
            id: id.into(),
            children,
        }
    }

    pub fn generic(kind: impl Into<String>, children: Vec<Node>) -> Self {
        Self::Generic {
            kind: kind.into(),
            children,
            attrs: NodeAttrs::new(),
        }
    }

    /// Adds one opaque attribute to a generic node; other variants are
    /// returned unchanged.
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        if let Self::Generic { attrs, .. } = &mut self {
            attrs.insert(key.into(), value.into());
        }
        self
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Text { .. } => NodeKind::Text,
            Self::Mention { .. } => NodeKind::Mention,
            Self::Annotation { .. } => NodeKind::Annotation,
            Self::Generic { .. } => NodeKind::Generic,
        }
    }

    /// Wire-level type name (`text`, `mention`, `annotation` or the generic kind).
    pub fn type_name(&self) -> &str {
        match self {
            Self::Text { .. } => TEXT_TYPE,
            Self::Mention { .. } => MENTION_TYPE,
            Self::Annotation { .. } => ANNOTATION_TYPE,
            Self::Generic { kind, .. } => kind.as_str(),
        }
    }

    /// External id for mention/annotation nodes.
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Mention { id, .. } | Self::Annotation { id, .. } => Some(id.as_str()),
            Self::Text { .. } | Self::Generic { .. } => None,
        }
    }

    /// Ordered children; always empty for `Text`.
    pub fn children(&self) -> &[Node] {
        match self {
            Self::Text { .. } => &[],
            Self::Mention { children, .. }
            | Self::Annotation { children, .. }
            | Self::Generic { children, .. } => children.as_slice(),
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text { .. })
    }

    pub fn is_mention(&self) -> bool {
        matches!(self, Self::Mention { .. })
    }

    pub fn is_annotation(&self) -> bool {
        matches!(self, Self::Annotation { .. })
    }

    /// `(variant, id)` identity for mention/annotation nodes.
    pub fn identity(&self) -> Option<NodeIdentity<'_>> {
        self.id().map(|id| NodeIdentity {
            kind: self.kind(),
            id,
        })
    }

    /// Compares by `(variant, id)` when both nodes carry an identity and
    /// structurally otherwise.
    pub fn same_node(&self, other: &Node) -> bool {
        match (self.identity(), other.identity()) {
            (Some(left), Some(right)) => left == right,
            (None, None) => self == other,
            _ => false,
        }
    }

    /// Decodes one node from its JSON wire shape.
    ///
    /// # Errors
    /// - `NotAnObject` for `null` or any non-object value.
    /// - Field errors for missing/mistyped `type`, `id`, `value` or `children`.
    pub fn from_value(value: &Value) -> Result<Self, NodeDecodeError> {
        decode_node(value, 1)?.ok_or(NodeDecodeError::NotAnObject)
    }

    /// Encodes this node into its canonical JSON wire shape.
    pub fn to_value(&self) -> Value {
        let mut object = Map::new();
        match self {
            Self::Text { value } => {
                object.insert(TYPE_KEY.to_string(), Value::from(TEXT_TYPE));
                object.insert(VALUE_KEY.to_string(), Value::from(value.as_str()));
            }
            Self::Mention { id, children } | Self::Annotation { id, children } => {
                object.insert(TYPE_KEY.to_string(), Value::from(self.type_name()));
                object.insert(ID_KEY.to_string(), Value::from(id.as_str()));
                object.insert(CHILDREN_KEY.to_string(), encode_children(children));
            }
            Self::Generic {
                kind,
                children,
                attrs,
            } => {
                for (key, value) in attrs {
                    object.insert(key.clone(), value.clone());
                }
                object.insert(TYPE_KEY.to_string(), Value::from(kind.as_str()));
                object.insert(CHILDREN_KEY.to_string(), encode_children(children));
            }
        }
        Value::Object(object)
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Node {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Node::from_value(&value).map_err(D::Error::custom)
    }
}

/// JSON nesting level of the object of a node sitting at `depth` inside
/// the canonical `{ "children": [...] }` document form.
pub(crate) fn json_level(depth: usize) -> usize {
    2 * depth + 1
}

/// Number of container levels inside `value`; scalars are 0.
pub(crate) fn value_nesting(value: &Value) -> usize {
    match value {
        Value::Array(items) => 1 + items.iter().map(value_nesting).max().unwrap_or(0),
        Value::Object(object) => 1 + object.values().map(value_nesting).max().unwrap_or(0),
        _ => 0,
    }
}

pub(crate) fn encode_children(children: &[Node]) -> Value {
    Value::Array(children.iter().map(Node::to_value).collect())
}

/// Decodes one node at the given depth; `null` decodes to `None` (deleted).
fn decode_node(value: &Value, depth: usize) -> Result<Option<Node>, NodeDecodeError> {
    if depth > MAX_NODE_DEPTH {
        return Err(NodeDecodeError::TooDeep {
            max: MAX_NODE_DEPTH,
        });
    }

    let object = match value {
        Value::Null => return Ok(None),
        Value::Object(object) => object,
        _ => return Err(NodeDecodeError::NotAnObject),
    };

    let node_type = match object.get(TYPE_KEY) {
        Some(Value::String(node_type)) if !node_type.trim().is_empty() => node_type.as_str(),
        Some(_) => {
            return Err(NodeDecodeError::InvalidField {
                field: TYPE_KEY,
                expected: "a non-empty string",
            })
        }
        None => {
            return Err(NodeDecodeError::MissingField {
                node_type: "unknown".to_string(),
                field: TYPE_KEY,
            })
        }
    };

    let node = match node_type {
        TEXT_TYPE => match object.get(VALUE_KEY) {
            Some(Value::String(text)) => Node::text(text.as_str()),
            Some(_) => {
                return Err(NodeDecodeError::InvalidField {
                    field: VALUE_KEY,
                    expected: "a string",
                })
            }
            None => {
                return Err(NodeDecodeError::MissingField {
                    node_type: TEXT_TYPE.to_string(),
                    field: VALUE_KEY,
                })
            }
        },
        MENTION_TYPE => Node::Mention {
            id: decode_id(object, node_type)?,
            children: decode_children(object.get(CHILDREN_KEY), depth)?,
        },
        ANNOTATION_TYPE => Node::Annotation {
            id: decode_id(object, node_type)?,
            children: decode_children(object.get(CHILDREN_KEY), depth)?,
        },
        kind => {
            let attrs = object
                .iter()
                .filter(|(key, _)| key.as_str() != TYPE_KEY && key.as_str() != CHILDREN_KEY)
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect();
            Node::Generic {
                kind: kind.to_string(),
                children: decode_children(object.get(CHILDREN_KEY), depth)?,
                attrs,
            }
        }
    };

    Ok(Some(node))
}

fn decode_id(object: &Map<String, Value>, node_type: &str) -> Result<String, NodeDecodeError> {
    match object.get(ID_KEY) {
        Some(Value::String(id)) if !id.trim().is_empty() => Ok(id.clone()),
        Some(Value::Number(number)) if number.is_u64() || number.is_i64() => Ok(number.to_string()),
        Some(_) => Err(NodeDecodeError::InvalidField {
            field: ID_KEY,
            expected: "a non-empty string or integer",
        }),
        None => Err(NodeDecodeError::MissingField {
            node_type: node_type.to_string(),
            field: ID_KEY,
        }),
    }
}

/// Decodes a children value of a node sitting at `parent_depth`.
///
/// Accepts an array, `null`/absent (empty), or an index-keyed map wrapper
/// (`{"0": .., "1": ..}`) which is rebuilt as an ordered sequence.
pub(crate) fn decode_children(
    value: Option<&Value>,
    parent_depth: usize,
) -> Result<Vec<Node>, NodeDecodeError> {
    let child_depth = parent_depth + 1;
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => decode_sequence(items.iter(), child_depth),
        Some(Value::Object(wrapper)) => {
            let mut indexed = Vec::with_capacity(wrapper.len());
            for (key, item) in wrapper {
                let index = key.parse::<usize>().map_err(|_| NodeDecodeError::InvalidField {
                    field: CHILDREN_KEY,
                    expected: "an array or an index-keyed object",
                })?;
                indexed.push((index, item));
            }
            indexed.sort_by_key(|(index, _)| *index);
            decode_sequence(indexed.into_iter().map(|(_, item)| item), child_depth)
        }
        Some(_) => Err(NodeDecodeError::InvalidField {
            field: CHILDREN_KEY,
            expected: "an array or an index-keyed object",
        }),
    }
}

fn decode_sequence<'v>(
    items: impl Iterator<Item = &'v Value>,
    depth: usize,
) -> Result<Vec<Node>, NodeDecodeError> {
    let mut nodes = Vec::new();
    for item in items {
        if let Some(node) = decode_node(item, depth)? {
            nodes.push(node);
        }
    }
    Ok(nodes)
}

//! Raw content ingestion.
//!
//! # Responsibility
//! - Turn external input (JSON text, JSON values, plain strings) into a
//!   valid [`Document`].
//!
//! # Invariants
//! - Ingestion never fails; undecodable input degrades to a single text node
//!   carrying the raw input verbatim.
//! - Every returned document passes [`Document::validate`].
//! - Ingesting a canonical document yields an equal document.

use crate::model::document::{Document, StructureError};
use crate::model::node::{Node, NodeDecodeError};
use log::warn;
use serde_json::Value;
use std::fmt::{Display, Formatter};

/// Why raw input could not be taken as a tree.
#[derive(Debug)]
enum Rejection {
    Parse(serde_json::Error),
    Decode(NodeDecodeError),
    Structure(StructureError),
}

impl Display for Rejection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(_) => write!(f, "not_json"),
            Self::Decode(_) => write!(f, "decode_failed"),
            Self::Structure(_) => write!(f, "invalid_structure"),
        }
    }
}

/// Ingests raw text: a JSON document when it decodes, plain text otherwise.
pub fn ingest_str(raw: &str) -> Document {
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => decode_or_fallback(&value, raw),
        Err(err) => fallback(raw, &Rejection::Parse(err)),
    }
}

/// Ingests an already-parsed JSON value.
///
/// A JSON string is treated as raw text input (it may itself hold stored
/// JSON). Any other undecodable value falls back to its compact JSON text.
pub fn ingest_value(value: &Value) -> Document {
    match value {
        Value::String(raw) => ingest_str(raw),
        other => {
            let raw = other.to_string();
            decode_or_fallback(other, &raw)
        }
    }
}

fn decode_or_fallback(value: &Value, raw: &str) -> Document {
    match decode(value) {
        Ok(document) => document,
        Err(rejection) => fallback(raw, &rejection),
    }
}

fn decode(value: &Value) -> Result<Document, Rejection> {
    let document = Document::from_value(value).map_err(Rejection::Decode)?;
    document.validate().map_err(Rejection::Structure)?;
    Ok(document)
}

fn fallback(raw: &str, rejection: &Rejection) -> Document {
    let detail = match rejection {
        Rejection::Parse(err) => err.to_string(),
        Rejection::Decode(err) => err.to_string(),
        Rejection::Structure(err) => err.to_string(),
    };
    warn!(
        "event=content_ingest module=content status=fallback reason={} input_chars={} detail={}",
        rejection,
        raw.chars().count(),
        detail
    );
    Document::new(vec![Node::text(raw)])
}

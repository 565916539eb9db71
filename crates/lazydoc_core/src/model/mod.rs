//! Rich-content domain model.
//!
//! # Responsibility
//! - Define the document tree (`Document`, `Node`) and its invariants.
//! - Define the external annotation record and its review lifecycle.
//!
//! # Invariants
//! - Documents own their nodes; nothing is shared across documents.
//! - Annotation records live outside the tree and are linked by id only.
//!
//! # See also
//! - docs/architecture/content-tree.md

pub mod annotation;
pub mod document;
pub mod node;

//! Document content engine.
//!
//! # Responsibility
//! - Traverse, query and rewrite document trees (`walker`).
//! - Ingest raw input into valid trees (`ingest`).
//! - Render trees to text and HTML (`render`).
//! - Reconcile annotation nodes with their external records (`reconcile`).
//!
//! # See also
//! - docs/architecture/content-tree.md

pub mod ingest;
pub mod reconcile;
pub mod render;
pub mod walker;

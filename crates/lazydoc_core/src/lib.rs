//! Core rich-content document engine for LazyDoc.
//! This crate is the single source of truth for document tree invariants and
//! annotation reconciliation.

pub mod content;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use content::ingest::{ingest_str, ingest_value};
pub use content::reconcile::{
    active_annotation_ids, active_mention_ids, plan_reconcile, reconcile, remove_annotation,
    replace_annotation, stale_annotation_ids, AnnotationEdit, AnnotationStore, ReconcileError,
    ReconcileReport,
};
pub use content::render::{derive_preview, extract_text, render_html, PREVIEW_MAX_CHARS};
pub use content::walker::{
    annotation_id, extract, is_annotation, is_mention, is_text, mention_id, replace,
    NodePredicate, Replaced,
};
pub use logging::{
    default_log_level, init_logging, init_logging_with, logging_status, LoggingConfig,
};
pub use model::annotation::{
    AnnotationCategory, AnnotationCounts, AnnotationId, AnnotationRecord, AnnotationState,
    CategoryCounts,
};
pub use model::document::{Document, DocumentId, StructureError};
pub use model::node::{
    Node, NodeAttrs, NodeDecodeError, NodeIdentity, NodeKind, MAX_JSON_NESTING, MAX_NODE_DEPTH,
};
pub use repo::annotation_repo::{AnnotationRepository, SqliteAnnotationRepository};
pub use repo::document_repo::{
    DocumentRecord, DocumentRepository, RepoError, RepoResult, SqliteDocumentRepository,
};
pub use service::annotation_service::AnnotationService;
pub use service::document_service::{DocumentService, DocumentServiceError, SaveOutcome};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}

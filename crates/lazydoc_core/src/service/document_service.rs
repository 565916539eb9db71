//! Document use-case service.
//!
//! # Responsibility
//! - Turn raw input into persisted canonical documents.
//! - Run the save pipeline: validate, reconcile annotations, persist.
//! - Offer annotation remove/replace edits and text/HTML projections.
//!
//! # Invariants
//! - Reconciliation runs exactly once per save, against the tree being saved.
//! - Record dismissals and the tree write commit or roll back together.
//! - Structurally invalid trees never reach the repository or the store.
//! - Persistence failures are surfaced unchanged; nothing is retried here.
//!
//! # See also
//! - docs/architecture/content-tree.md

use crate::content::ingest::{ingest_str, ingest_value};
use crate::content::reconcile::{
    self, AnnotationEdit, AnnotationStore, ReconcileError, ReconcileReport,
};
use crate::content::render::{extract_text, render_html};
use crate::model::annotation::AnnotationCounts;
use crate::model::document::{Document, DocumentId, StructureError};
use crate::model::node::Node;
use crate::repo::document_repo::{DocumentRecord, DocumentRepository, RepoError};
use log::{info, warn};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Service error for document use-cases.
#[derive(Debug)]
pub enum DocumentServiceError {
    /// Target document does not exist.
    DocumentNotFound(DocumentId),
    /// Tree breaks structural invariants.
    Structure(StructureError),
    /// Another writer saved first.
    RevisionConflict {
        document_id: DocumentId,
        expected: i64,
        actual: i64,
    },
    /// Persistence-layer failure.
    Repo(RepoError),
    /// Internal consistency mismatch between write and read-back.
    InconsistentState(&'static str),
}

impl Display for DocumentServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DocumentNotFound(id) => write!(f, "document not found: {id}"),
            Self::Structure(err) => write!(f, "invalid document structure: {err}"),
            Self::RevisionConflict {
                document_id,
                expected,
                actual,
            } => write!(
                f,
                "document {document_id} was saved concurrently: expected revision {expected}, found {actual}"
            ),
            Self::Repo(err) => write!(f, "{err}"),
            Self::InconsistentState(details) => {
                write!(f, "inconsistent document state: {details}")
            }
        }
    }
}

impl Error for DocumentServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Structure(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for DocumentServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(document_id) => Self::DocumentNotFound(document_id),
            RepoError::Structure(err) => Self::Structure(err),
            RepoError::RevisionConflict {
                document_id,
                expected,
                actual,
            } => Self::RevisionConflict {
                document_id,
                expected,
                actual,
            },
            other => Self::Repo(other),
        }
    }
}

impl From<ReconcileError<RepoError>> for DocumentServiceError {
    fn from(value: ReconcileError<RepoError>) -> Self {
        match value {
            ReconcileError::Structure(err) => Self::Structure(err),
            ReconcileError::Store(err) => err.into(),
        }
    }
}

impl From<StructureError> for DocumentServiceError {
    fn from(value: StructureError) -> Self {
        Self::Structure(value)
    }
}

/// Result of one save pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveOutcome {
    /// Read-back of the persisted document.
    pub record: DocumentRecord,
    /// Annotation records dismissed by this save.
    pub reconciled: ReconcileReport,
}

/// Document service facade over a document repository and annotation store.
pub struct DocumentService<D: DocumentRepository, S: AnnotationStore<Error = RepoError>> {
    documents: D,
    annotations: S,
}

impl<D, S> DocumentService<D, S>
where
    D: DocumentRepository,
    S: AnnotationStore<Error = RepoError>,
{
    pub fn new(documents: D, annotations: S) -> Self {
        Self {
            documents,
            annotations,
        }
    }

    /// Creates a document from raw text (JSON tree or plain text).
    pub fn create_document(&self, raw: &str) -> Result<DocumentRecord, DocumentServiceError> {
        self.create_from(ingest_str(raw))
    }

    /// Creates a document from an already-parsed JSON value.
    pub fn create_document_from_value(
        &self,
        raw: &Value,
    ) -> Result<DocumentRecord, DocumentServiceError> {
        self.create_from(ingest_value(raw))
    }

    fn create_from(&self, document: Document) -> Result<DocumentRecord, DocumentServiceError> {
        self.documents.atomically(|| {
            let document_id = self.documents.create_document(&document)?;
            info!(
                "event=document_create module=service status=ok document_id={} top_level_nodes={}",
                document_id,
                document.children.len()
            );
            self.documents
                .get_document(document_id)?
                .ok_or(DocumentServiceError::InconsistentState(
                    "created document not found in read-back",
                ))
        })
    }

    /// Gets one document by id.
    pub fn get_document(
        &self,
        document_id: DocumentId,
    ) -> Result<Option<DocumentRecord>, DocumentServiceError> {
        self.documents.get_document(document_id).map_err(Into::into)
    }

    /// Lists document ids, most recently updated first.
    pub fn list_documents(&self) -> Result<Vec<DocumentId>, DocumentServiceError> {
        self.documents.list_document_ids().map_err(Into::into)
    }

    /// Validates, reconciles and persists `document` as one write unit.
    ///
    /// `expected_revision = None` keeps last-writer-wins semantics.
    ///
    /// # Errors
    /// - `Structure` before anything is touched when the tree is invalid.
    /// - `DocumentNotFound` / `RevisionConflict` from the repository; record
    ///   dismissals made by this save are rolled back with it.
    pub fn save_document(
        &self,
        document_id: DocumentId,
        document: &Document,
        expected_revision: Option<i64>,
    ) -> Result<SaveOutcome, DocumentServiceError> {
        document.validate()?;
        self.documents.atomically(|| {
            let current = self.require(document_id)?;
            if let Some(expected) = expected_revision {
                if expected != current.revision {
                    return Err(DocumentServiceError::RevisionConflict {
                        document_id,
                        expected,
                        actual: current.revision,
                    });
                }
            }

            let reconciled = reconcile::reconcile(document, document_id, &self.annotations)?;
            self.persist(document_id, document, expected_revision, reconciled)
        })
    }

    /// Replaces the full content from raw input and saves it.
    pub fn update_content(
        &self,
        document_id: DocumentId,
        raw: &str,
        expected_revision: Option<i64>,
    ) -> Result<SaveOutcome, DocumentServiceError> {
        self.save_document(document_id, &ingest_str(raw), expected_revision)
    }

    /// Removes every annotation node carrying `target_id` and saves.
    pub fn remove_annotation(
        &self,
        document_id: DocumentId,
        target_id: &str,
    ) -> Result<SaveOutcome, DocumentServiceError> {
        self.apply_edit(document_id, |document| {
            reconcile::remove_annotation(document, document_id, target_id, &self.annotations)
        })
    }

    /// Substitutes every annotation node carrying `target_id` with
    /// `replacement` (`None` deletes) and saves.
    ///
    /// The edit is persisted against the revision it was computed from.
    pub fn replace_annotation(
        &self,
        document_id: DocumentId,
        target_id: &str,
        replacement: Option<Node>,
    ) -> Result<SaveOutcome, DocumentServiceError> {
        self.apply_edit(document_id, |document| {
            reconcile::replace_annotation(
                document,
                document_id,
                target_id,
                replacement,
                &self.annotations,
            )
        })
    }

    /// Plain-text projection of the stored document.
    pub fn render_text(&self, document_id: DocumentId) -> Result<String, DocumentServiceError> {
        Ok(extract_text(&self.require(document_id)?.document))
    }

    /// Escaped HTML projection of the stored document.
    pub fn render_html(&self, document_id: DocumentId) -> Result<String, DocumentServiceError> {
        Ok(render_html(&self.require(document_id)?.document))
    }

    /// Published annotation lifecycle counts, computed fresh.
    pub fn annotation_counts(
        &self,
        document_id: DocumentId,
    ) -> Result<AnnotationCounts, DocumentServiceError> {
        self.require(document_id)?;
        self.annotations.counts(document_id).map_err(Into::into)
    }

    /// Deletes the document together with its annotation records.
    pub fn delete_document(&self, document_id: DocumentId) -> Result<(), DocumentServiceError> {
        self.documents.delete_document(document_id)?;
        info!("event=document_delete module=service status=ok document_id={document_id}");
        Ok(())
    }

    fn apply_edit(
        &self,
        document_id: DocumentId,
        edit: impl FnOnce(&Document) -> Result<AnnotationEdit, ReconcileError<RepoError>>,
    ) -> Result<SaveOutcome, DocumentServiceError> {
        self.documents.atomically(|| {
            let current = self.require(document_id)?;
            let edited = edit(&current.document)?;
            info!(
                "event=annotation_edit module=service status=ok document_id={} replaced={}",
                document_id, edited.replaced
            );
            self.persist(
                document_id,
                &edited.document,
                Some(current.revision),
                edited.report,
            )
        })
    }

    /// Writes an already reconciled tree and reads it back.
    fn persist(
        &self,
        document_id: DocumentId,
        document: &Document,
        expected_revision: Option<i64>,
        reconciled: ReconcileReport,
    ) -> Result<SaveOutcome, DocumentServiceError> {
        let revision = match self
            .documents
            .save_document(document_id, document, expected_revision)
        {
            Ok(revision) => revision,
            Err(err) => {
                warn!(
                    "event=document_save module=service status=error document_id={} rolled_back_dismissals={} error={}",
                    document_id, reconciled.dismissed, err
                );
                return Err(err.into());
            }
        };

        info!(
            "event=document_save module=service status=ok document_id={} revision={} stale={} dismissed={}",
            document_id,
            revision,
            reconciled.stale.len(),
            reconciled.dismissed
        );

        let record = self
            .documents
            .get_document(document_id)?
            .ok_or(DocumentServiceError::InconsistentState(
                "saved document not found in read-back",
            ))?;
        Ok(SaveOutcome { record, reconciled })
    }

    fn require(&self, document_id: DocumentId) -> Result<DocumentRecord, DocumentServiceError> {
        self.documents
            .get_document(document_id)?
            .ok_or(DocumentServiceError::DocumentNotFound(document_id))
    }
}

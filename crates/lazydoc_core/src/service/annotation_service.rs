//! Annotation record use-case service.
//!
//! # Responsibility
//! - Provide create/publish/accept/dismiss entry points for review records.
//! - Delegate persistence and lifecycle validation to the repository.
//!
//! # Invariants
//! - Service APIs never bypass repository transition checks.

use crate::content::reconcile::AnnotationStore;
use crate::model::annotation::{
    AnnotationCategory, AnnotationCounts, AnnotationRecord, AnnotationState,
};
use crate::model::document::DocumentId;
use crate::repo::annotation_repo::AnnotationRepository;
use crate::repo::document_repo::{RepoError, RepoResult};
use log::info;

/// Use-case service wrapper for annotation records.
pub struct AnnotationService<R: AnnotationRepository + AnnotationStore<Error = RepoError>> {
    repo: R,
}

impl<R> AnnotationService<R>
where
    R: AnnotationRepository + AnnotationStore<Error = RepoError>,
{
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Opens a `pending` record; the caller embeds its id in an annotation node.
    pub fn create(
        &self,
        document_id: DocumentId,
        category: AnnotationCategory,
    ) -> RepoResult<AnnotationRecord> {
        let record = self.repo.create_annotation(document_id, category)?;
        info!(
            "event=annotation_create module=service status=ok document_id={} category={}",
            document_id,
            category.as_str()
        );
        Ok(record)
    }

    pub fn publish(&self, annotation_id: &str) -> RepoResult<AnnotationRecord> {
        self.move_to(annotation_id, AnnotationState::Published)
    }

    pub fn accept(&self, annotation_id: &str) -> RepoResult<AnnotationRecord> {
        self.move_to(annotation_id, AnnotationState::Accepted)
    }

    /// Reviewer-initiated dismissal; stale dismissal goes through reconciliation.
    pub fn dismiss(&self, annotation_id: &str) -> RepoResult<AnnotationRecord> {
        self.move_to(annotation_id, AnnotationState::Dismissed)
    }

    pub fn get(&self, annotation_id: &str) -> RepoResult<Option<AnnotationRecord>> {
        self.repo.get_annotation(annotation_id)
    }

    pub fn list(&self, document_id: DocumentId) -> RepoResult<Vec<AnnotationRecord>> {
        self.repo.list_annotations(document_id)
    }

    pub fn counts(&self, document_id: DocumentId) -> RepoResult<AnnotationCounts> {
        self.repo.counts(document_id)
    }

    fn move_to(&self, annotation_id: &str, next: AnnotationState) -> RepoResult<AnnotationRecord> {
        let record = self.repo.transition(annotation_id, next)?;
        info!(
            "event=annotation_transition module=service status=ok state={}",
            next.as_str()
        );
        Ok(record)
    }
}

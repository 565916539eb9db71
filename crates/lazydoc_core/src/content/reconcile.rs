//! Annotation reconciliation between a document tree and its record store.
//!
//! # Responsibility
//! - Derive live annotation/mention ids from a tree.
//! - Compute stale annotation ids against the store's open records.
//! - Dismiss stale records before a tree is persisted.
//!
//! # Invariants
//! - Staleness is always derived from the tree about to be saved, never from
//!   a cached prior computation.
//! - Reconciliation never mutates the tree, only the store.
//! - Reconciling twice without a tree change dismisses nothing the second
//!   time: terminal records are not part of the open set.

use crate::content::walker::{annotation_id, extract, is_annotation, is_mention};
use crate::model::annotation::{AnnotationCounts, AnnotationId};
use crate::model::document::{Document, DocumentId, StructureError};
use crate::model::node::Node;
use log::info;
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Collaborator that persists annotation records independently of the tree.
pub trait AnnotationStore {
    /// Storage failure reported by this store.
    type Error;

    /// Ids of records still awaiting resolution (`pending` or `published`).
    fn pending_ids(&self, document_id: DocumentId)
        -> Result<BTreeSet<AnnotationId>, Self::Error>;
    /// Moves the given open records to `dismissed`; returns how many changed.
    fn dismiss(
        &self,
        document_id: DocumentId,
        ids: &BTreeSet<AnnotationId>,
    ) -> Result<usize, Self::Error>;
    /// Published-record lifecycle counts, computed fresh per call.
    fn counts(&self, document_id: DocumentId) -> Result<AnnotationCounts, Self::Error>;
}

/// Annotation edit failure.
#[derive(Debug)]
pub enum ReconcileError<E> {
    /// Edited tree breaks structural invariants; the store was not touched.
    Structure(StructureError),
    /// The annotation store failed.
    Store(E),
}

impl<E: Display> Display for ReconcileError<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Structure(err) => write!(f, "edited tree is invalid: {err}"),
            Self::Store(err) => write!(f, "annotation store failed: {err}"),
        }
    }
}

impl<E: Error + 'static> Error for ReconcileError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Structure(err) => Some(err),
            Self::Store(err) => Some(err),
        }
    }
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Open record ids no longer referenced by the tree.
    pub stale: BTreeSet<AnnotationId>,
    /// Records the store actually transitioned.
    pub dismissed: usize,
}

/// A tree edit together with the reconciliation it triggered.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationEdit {
    pub document: Document,
    /// Number of annotation nodes that matched the id.
    pub replaced: usize,
    pub report: ReconcileReport,
}

/// Annotation ids referenced by live nodes, in traversal order.
pub fn active_annotation_ids(document: &Document) -> Vec<AnnotationId> {
    ids_of(extract(&document.children, &is_annotation))
}

/// Mention ids referenced by live nodes, in traversal order.
pub fn active_mention_ids(document: &Document) -> Vec<String> {
    ids_of(extract(&document.children, &is_mention))
}

fn ids_of(nodes: Vec<&Node>) -> Vec<String> {
    nodes
        .into_iter()
        .filter_map(Node::id)
        .map(str::to_string)
        .collect()
}

/// `pending_ids` minus the ids still referenced by `document`.
pub fn stale_annotation_ids(
    document: &Document,
    pending_ids: &BTreeSet<AnnotationId>,
) -> BTreeSet<AnnotationId> {
    let active: BTreeSet<AnnotationId> = active_annotation_ids(document).into_iter().collect();
    pending_ids.difference(&active).cloned().collect()
}

/// Computes the ids a reconciliation would dismiss, without applying it.
pub fn plan_reconcile<S: AnnotationStore + ?Sized>(
    document: &Document,
    document_id: DocumentId,
    store: &S,
) -> Result<BTreeSet<AnnotationId>, S::Error> {
    let pending = store.pending_ids(document_id)?;
    Ok(stale_annotation_ids(document, &pending))
}

/// Dismisses every open record no longer referenced by `document`.
///
/// Call exactly once per save, with the tree that is about to be persisted.
pub fn reconcile<S: AnnotationStore + ?Sized>(
    document: &Document,
    document_id: DocumentId,
    store: &S,
) -> Result<ReconcileReport, S::Error> {
    let stale = plan_reconcile(document, document_id, store)?;
    if stale.is_empty() {
        return Ok(ReconcileReport::default());
    }

    let dismissed = store.dismiss(document_id, &stale)?;
    info!(
        "event=annotation_reconcile module=content status=ok document_id={} stale={} dismissed={}",
        document_id,
        stale.len(),
        dismissed
    );
    Ok(ReconcileReport { stale, dismissed })
}

/// Removes every annotation node carrying `annotation_id` (with its subtree)
/// and reconciles the result.
pub fn remove_annotation<S: AnnotationStore + ?Sized>(
    document: &Document,
    document_id: DocumentId,
    annotation_id: &str,
    store: &S,
) -> Result<AnnotationEdit, ReconcileError<S::Error>> {
    replace_annotation(document, document_id, annotation_id, None, store)
}

/// Substitutes every annotation node carrying `annotation_id` with
/// `replacement` (`None` deletes) and reconciles the result.
///
/// # Errors
/// - `Structure` when the edited tree breaks structural invariants; the store
///   is left untouched in that case.
/// - `Store` when reconciliation fails.
pub fn replace_annotation<S: AnnotationStore + ?Sized>(
    document: &Document,
    document_id: DocumentId,
    target_id: &str,
    replacement: Option<Node>,
    store: &S,
) -> Result<AnnotationEdit, ReconcileError<S::Error>> {
    let (edited, replaced) =
        document.replace_counted(&annotation_id(target_id), replacement.as_ref());
    edited.validate().map_err(ReconcileError::Structure)?;
    let report = reconcile(&edited, document_id, store).map_err(ReconcileError::Store)?;
    Ok(AnnotationEdit {
        document: edited,
        replaced,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::{
        active_annotation_ids, active_mention_ids, reconcile, remove_annotation,
        replace_annotation, stale_annotation_ids, AnnotationStore, ReconcileError,
    };
    use crate::content::walker::is_annotation;
    use crate::model::annotation::{AnnotationCounts, AnnotationId};
    use crate::model::document::{Document, DocumentId};
    use crate::model::node::Node;
    use std::cell::RefCell;
    use std::convert::Infallible;
    use std::collections::BTreeSet;
    use uuid::Uuid;

    #[derive(Default)]
    struct MemoryStore {
        open: RefCell<BTreeSet<AnnotationId>>,
        dismiss_calls: RefCell<usize>,
    }

    impl MemoryStore {
        fn with_open(ids: &[&str]) -> Self {
            let store = Self::default();
            store
                .open
                .borrow_mut()
                .extend(ids.iter().map(|id| id.to_string()));
            store
        }
    }

    impl AnnotationStore for MemoryStore {
        type Error = Infallible;

        fn pending_ids(
            &self,
            _document_id: DocumentId,
        ) -> Result<BTreeSet<AnnotationId>, Infallible> {
            Ok(self.open.borrow().clone())
        }

        fn dismiss(
            &self,
            _document_id: DocumentId,
            ids: &BTreeSet<AnnotationId>,
        ) -> Result<usize, Infallible> {
            *self.dismiss_calls.borrow_mut() += 1;
            let mut open = self.open.borrow_mut();
            Ok(ids.iter().filter(|id| open.remove(*id)).count())
        }

        fn counts(&self, _document_id: DocumentId) -> Result<AnnotationCounts, Infallible> {
            Ok(AnnotationCounts::default())
        }
    }

    fn scenario() -> Document {
        Document::new(vec![Node::annotation("a1", vec![Node::text("hi")])])
    }

    fn set(ids: &[&str]) -> BTreeSet<AnnotationId> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    #[test]
    fn stale_ids_are_pending_minus_active() {
        let doc = scenario();
        assert_eq!(active_annotation_ids(&doc), vec!["a1".to_string()]);
        assert_eq!(stale_annotation_ids(&doc, &set(&["a1", "a2"])), set(&["a2"]));
        assert!(stale_annotation_ids(&doc, &BTreeSet::new()).is_empty());
    }

    #[test]
    fn mentions_are_extracted_without_reconciliation() {
        let doc = Document::new(vec![Node::annotation(
            "a1",
            vec![Node::mention("u1", Vec::new())],
        )]);
        assert_eq!(active_mention_ids(&doc), vec!["u1".to_string()]);
    }

    #[test]
    fn reconcile_is_idempotent_and_leaves_tree_untouched() {
        let doc = scenario();
        let before = doc.clone();
        let store = MemoryStore::with_open(&["a1", "a2"]);
        let id = Uuid::new_v4();

        let first = reconcile(&doc, id, &store).unwrap();
        assert_eq!(first.stale, set(&["a2"]));
        assert_eq!(first.dismissed, 1);

        let second = reconcile(&doc, id, &store).unwrap();
        assert!(second.stale.is_empty());
        assert_eq!(second.dismissed, 0);
        assert_eq!(*store.dismiss_calls.borrow(), 1);
        assert_eq!(doc, before);
    }

    #[test]
    fn removing_annotation_empties_tree_and_dismisses_record() {
        let store = MemoryStore::with_open(&["a1"]);
        let edit = remove_annotation(&scenario(), Uuid::new_v4(), "a1", &store).unwrap();

        assert_eq!(edit.document, Document::default());
        assert_eq!(edit.replaced, 1);
        assert_eq!(edit.report.stale, set(&["a1"]));
        assert!(store.open.borrow().is_empty());
    }

    #[test]
    fn removing_unknown_annotation_is_a_noop() {
        let store = MemoryStore::with_open(&["a1"]);
        let edit = remove_annotation(&scenario(), Uuid::new_v4(), "zz", &store).unwrap();

        assert_eq!(edit.document, scenario());
        assert_eq!(edit.replaced, 0);
        assert!(edit.report.stale.is_empty());
    }

    #[test]
    fn replacement_creating_duplicate_ids_is_rejected_before_store_changes() {
        let doc = Document::new(vec![
            Node::annotation("a1", Vec::new()),
            Node::annotation("a2", Vec::new()),
        ]);
        let store = MemoryStore::with_open(&["a1", "a2"]);

        let err = replace_annotation(
            &doc,
            Uuid::new_v4(),
            "a1",
            Some(Node::annotation("a2", Vec::new())),
            &store,
        )
        .unwrap_err();
        assert!(matches!(err, ReconcileError::Structure(_)));
        assert_eq!(*store.dismiss_calls.borrow(), 0);
    }

    #[test]
    fn reconcile_with_no_open_records_keeps_annotation_ids() {
        let doc = Document::new(vec![
            Node::annotation("a1", vec![Node::text("one")]),
            Node::generic("paragraph", vec![Node::annotation("a2", Vec::new())]),
        ]);
        let ids_before: Vec<_> = doc.extract(&is_annotation).into_iter().map(Node::id).collect();
        let store = MemoryStore::default();

        let report = reconcile(&doc, Uuid::new_v4(), &store).unwrap();
        assert_eq!(report, super::ReconcileReport::default());
        assert_eq!(*store.dismiss_calls.borrow(), 0);

        let ids_after: Vec<_> = doc.extract(&is_annotation).into_iter().map(Node::id).collect();
        assert_eq!(ids_after, ids_before);
        assert_eq!(ids_after, vec![Some("a1"), Some("a2")]);
    }
}

use lazydoc_core::db::open_db_in_memory;
use lazydoc_core::{
    AnnotationCategory, AnnotationRepository, AnnotationService, AnnotationState,
    AnnotationStore, Document, DocumentId, DocumentRecord, DocumentRepository, DocumentService,
    DocumentServiceError, Node, RepoError, RepoResult, SqliteAnnotationRepository,
    SqliteDocumentRepository, StructureError, MAX_NODE_DEPTH,
};
use rusqlite::Connection;
use serde_json::json;

type SqliteDocumentService<'conn> =
    DocumentService<SqliteDocumentRepository<'conn>, SqliteAnnotationRepository<'conn>>;

fn service(conn: &Connection) -> SqliteDocumentService<'_> {
    DocumentService::new(
        SqliteDocumentRepository::try_new(conn).unwrap(),
        SqliteAnnotationRepository::try_new(conn).unwrap(),
    )
}

fn annotations(conn: &Connection) -> AnnotationService<SqliteAnnotationRepository<'_>> {
    AnnotationService::new(SqliteAnnotationRepository::try_new(conn).unwrap())
}

fn annotated_document(annotation_ids: &[&str]) -> Document {
    Document::new(
        annotation_ids
            .iter()
            .map(|id| Node::annotation(*id, vec![Node::text(format!("span {id}"))]))
            .collect(),
    )
}

fn state_of(conn: &Connection, annotation_id: &str) -> AnnotationState {
    annotations(conn)
        .get(annotation_id)
        .unwrap()
        .expect("annotation should exist")
        .state
}

#[test]
fn create_document_from_plain_text_falls_back_to_single_text_node() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);

    let record = service.create_document("just some words").unwrap();
    assert_eq!(record.revision, 1);
    assert_eq!(record.document, Document::new(vec![Node::text("just some words")]));
    assert_eq!(record.preview_text.as_deref(), Some("just some words"));
}

#[test]
fn create_document_from_value_stores_canonical_tree() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);

    let record = service
        .create_document_from_value(&json!({
            "children": [{"type": "paragraph", "children": [{"type": "text", "value": "hello"}]}]
        }))
        .unwrap();
    let stored: String = conn
        .query_row(
            "SELECT content FROM documents WHERE uuid = ?1;",
            [record.document_id.to_string()],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(stored, record.document.to_canonical_json());
    assert_eq!(service.render_html(record.document_id).unwrap(), "<p>hello</p>");
    assert_eq!(service.render_text(record.document_id).unwrap(), "hello");
}

#[test]
fn save_dismisses_open_records_no_longer_referenced() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let annotation_service = annotations(&conn);

    let created = service.create_document("draft").unwrap();
    let doc_id = created.document_id;
    let first = annotation_service
        .create(doc_id, AnnotationCategory::Question)
        .unwrap();
    let second = annotation_service
        .create(doc_id, AnnotationCategory::Suggestion)
        .unwrap();
    annotation_service.publish(&second.id).unwrap();

    let both = annotated_document(&[first.id.as_str(), second.id.as_str()]);
    let saved = service.save_document(doc_id, &both, None).unwrap();
    assert!(saved.reconciled.stale.is_empty());
    assert_eq!(saved.record.revision, 2);

    let only_first = annotated_document(&[first.id.as_str()]);
    let saved = service.save_document(doc_id, &only_first, None).unwrap();
    assert_eq!(saved.reconciled.dismissed, 1);
    assert!(saved.reconciled.stale.contains(&second.id));
    assert_eq!(state_of(&conn, &second.id), AnnotationState::Dismissed);
    assert_eq!(state_of(&conn, &first.id), AnnotationState::Pending);

    let again = service.save_document(doc_id, &only_first, None).unwrap();
    assert!(again.reconciled.stale.is_empty());
    assert_eq!(again.reconciled.dismissed, 0);
}

#[test]
fn remove_annotation_deletes_subtree_and_dismisses_record() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let annotation_service = annotations(&conn);

    let doc_id = service.create_document("seed").unwrap().document_id;
    let record = annotation_service
        .create(doc_id, AnnotationCategory::Question)
        .unwrap();
    service
        .save_document(doc_id, &annotated_document(&[record.id.as_str()]), None)
        .unwrap();

    let outcome = service.remove_annotation(doc_id, &record.id).unwrap();
    assert_eq!(outcome.record.document, Document::default());
    assert_eq!(outcome.record.preview_text, None);
    assert_eq!(outcome.reconciled.dismissed, 1);
    assert_eq!(state_of(&conn, &record.id), AnnotationState::Dismissed);
}

#[test]
fn replace_annotation_keeps_replacement_content() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let annotation_service = annotations(&conn);

    let doc_id = service.create_document("seed").unwrap().document_id;
    let record = annotation_service
        .create(doc_id, AnnotationCategory::Suggestion)
        .unwrap();
    service
        .save_document(doc_id, &annotated_document(&[record.id.as_str()]), None)
        .unwrap();

    let outcome = service
        .replace_annotation(doc_id, &record.id, Some(Node::text("accepted wording")))
        .unwrap();
    assert_eq!(outcome.record.document.children, vec![Node::text("accepted wording")]);
    assert_eq!(outcome.reconciled.dismissed, 1);
}

#[test]
fn replacing_unknown_annotation_is_a_noop_save() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);

    let created = service.create_document("unchanged").unwrap();
    let outcome = service
        .replace_annotation(created.document_id, "missing", None)
        .unwrap();
    assert_eq!(outcome.record.document, created.document);
    assert!(outcome.reconciled.stale.is_empty());
}

#[test]
fn save_rejects_duplicate_annotation_ids_before_touching_store() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let annotation_service = annotations(&conn);

    let doc_id = service.create_document("seed").unwrap().document_id;
    let stale_candidate = annotation_service
        .create(doc_id, AnnotationCategory::Other)
        .unwrap();

    let duplicated = annotated_document(&["x", "x"]);
    let err = service.save_document(doc_id, &duplicated, None).unwrap_err();
    assert!(matches!(err, DocumentServiceError::Structure(_)));
    assert_eq!(state_of(&conn, &stale_candidate.id), AnnotationState::Pending);
}

#[test]
fn stale_expected_revision_is_a_conflict() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);

    let created = service.create_document("v1").unwrap();
    service
        .update_content(created.document_id, "v2", Some(created.revision))
        .unwrap();

    let err = service
        .update_content(created.document_id, "v3", Some(created.revision))
        .unwrap_err();
    match err {
        DocumentServiceError::RevisionConflict {
            expected, actual, ..
        } => {
            assert_eq!(expected, 1);
            assert_eq!(actual, 2);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(service.render_text(created.document_id).unwrap(), "v2");
}

#[test]
fn repository_surfaces_revision_conflicts() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteDocumentRepository::try_new(&conn).unwrap();

    let doc_id = repo.create_document(&Document::default()).unwrap();
    assert_eq!(repo.save_document(doc_id, &Document::default(), Some(1)).unwrap(), 2);
    let err = repo
        .save_document(doc_id, &Document::default(), Some(1))
        .unwrap_err();
    assert!(matches!(
        err,
        lazydoc_core::RepoError::RevisionConflict {
            expected: 1,
            actual: 2,
            ..
        }
    ));
}

#[test]
fn missing_document_is_reported() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let missing = DocumentId::new_v4();

    assert!(service.get_document(missing).unwrap().is_none());
    assert!(matches!(
        service.save_document(missing, &Document::default(), None),
        Err(DocumentServiceError::DocumentNotFound(id)) if id == missing
    ));
    assert!(matches!(
        service.delete_document(missing),
        Err(DocumentServiceError::DocumentNotFound(_))
    ));
}

#[test]
fn deleting_document_cascades_to_annotation_records() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let annotation_service = annotations(&conn);

    let doc_id = service.create_document("seed").unwrap().document_id;
    let record = annotation_service
        .create(doc_id, AnnotationCategory::Question)
        .unwrap();

    service.delete_document(doc_id).unwrap();
    assert!(annotation_service.get(&record.id).unwrap().is_none());
    assert!(service.list_documents().unwrap().is_empty());
}

#[test]
fn annotation_counts_are_fresh_after_each_save() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let annotation_service = annotations(&conn);

    let doc_id = service.create_document("seed").unwrap().document_id;
    let question = annotation_service
        .create(doc_id, AnnotationCategory::Question)
        .unwrap();
    let suggestion = annotation_service
        .create(doc_id, AnnotationCategory::Suggestion)
        .unwrap();
    annotation_service.publish(&question.id).unwrap();
    annotation_service.publish(&suggestion.id).unwrap();
    let both = annotated_document(&[question.id.as_str(), suggestion.id.as_str()]);
    service.save_document(doc_id, &both, None).unwrap();

    let counts = service.annotation_counts(doc_id).unwrap();
    assert_eq!(counts.pending.question, 1);
    assert_eq!(counts.pending.suggestion, 1);

    service.remove_annotation(doc_id, &question.id).unwrap();
    let counts = service.annotation_counts(doc_id).unwrap();
    assert_eq!(counts.pending.question, 0);
    assert_eq!(counts.dismissed.question, 1);
    assert_eq!(counts.pending.suggestion, 1);

    let store = SqliteAnnotationRepository::try_new(&conn).unwrap();
    assert_eq!(store.pending_ids(doc_id).unwrap().len(), 1);
    assert_eq!(store.list_annotations(doc_id).unwrap().len(), 2);
}

/// Delegates to SQLite but refuses every tree overwrite.
struct RejectingSaves<'conn>(SqliteDocumentRepository<'conn>);

impl DocumentRepository for RejectingSaves<'_> {
    fn create_document(&self, document: &Document) -> RepoResult<DocumentId> {
        self.0.create_document(document)
    }

    fn get_document(&self, document_id: DocumentId) -> RepoResult<Option<DocumentRecord>> {
        self.0.get_document(document_id)
    }

    fn save_document(
        &self,
        _document_id: DocumentId,
        _document: &Document,
        _expected_revision: Option<i64>,
    ) -> RepoResult<i64> {
        Err(RepoError::InvalidData("disk full".to_string()))
    }

    fn delete_document(&self, document_id: DocumentId) -> RepoResult<()> {
        self.0.delete_document(document_id)
    }

    fn list_document_ids(&self) -> RepoResult<Vec<DocumentId>> {
        self.0.list_document_ids()
    }

    fn atomically<T, E, F>(&self, work: F) -> Result<T, E>
    where
        E: From<RepoError>,
        F: FnOnce() -> Result<T, E>,
    {
        self.0.atomically(work)
    }
}

#[test]
fn failed_tree_write_rolls_back_dismissals() {
    let conn = open_db_in_memory().unwrap();
    let annotation_service = annotations(&conn);
    let doc_id = service(&conn).create_document("seed").unwrap().document_id;
    let record = annotation_service
        .create(doc_id, AnnotationCategory::Question)
        .unwrap();

    let failing = DocumentService::new(
        RejectingSaves(SqliteDocumentRepository::try_new(&conn).unwrap()),
        SqliteAnnotationRepository::try_new(&conn).unwrap(),
    );
    let err = failing
        .save_document(doc_id, &Document::default(), None)
        .unwrap_err();
    assert!(matches!(err, DocumentServiceError::Repo(RepoError::InvalidData(_))));
    assert_eq!(state_of(&conn, &record.id), AnnotationState::Pending);
    assert!(conn.is_autocommit());

    let err = failing.remove_annotation(doc_id, &record.id).unwrap_err();
    assert!(matches!(err, DocumentServiceError::Repo(_)));
    assert_eq!(state_of(&conn, &record.id), AnnotationState::Pending);
}

#[test]
fn replacement_duplicating_an_annotation_id_is_a_structure_error() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let annotation_service = annotations(&conn);

    let doc_id = service.create_document("seed").unwrap().document_id;
    let first = annotation_service
        .create(doc_id, AnnotationCategory::Question)
        .unwrap();
    let second = annotation_service
        .create(doc_id, AnnotationCategory::Question)
        .unwrap();
    let both = annotated_document(&[first.id.as_str(), second.id.as_str()]);
    let saved = service.save_document(doc_id, &both, None).unwrap();

    let clash = Node::annotation(second.id.clone(), vec![Node::text("copy")]);
    let err = service
        .replace_annotation(doc_id, &first.id, Some(clash))
        .unwrap_err();
    assert!(matches!(
        err,
        DocumentServiceError::Structure(StructureError::DuplicateAnnotationId(_))
    ));
    assert_eq!(service.get_document(doc_id).unwrap().unwrap(), saved.record);
    assert_eq!(state_of(&conn, &first.id), AnnotationState::Pending);
}

#[test]
fn deepest_allowed_tree_survives_storage_round_trip() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);

    let mut node = Node::text("bottom");
    for _ in 1..MAX_NODE_DEPTH {
        node = Node::generic("quote", vec![node]);
    }
    let deep = Document::new(vec![node]);

    let created = service.create_document(&deep.to_canonical_json()).unwrap();
    assert_eq!(created.document, deep);
    assert_eq!(service.render_text(created.document_id).unwrap(), "bottom");

    let too_deep = Document::new(vec![Node::generic("quote", deep.children.clone())]);
    let err = service
        .save_document(created.document_id, &too_deep, None)
        .unwrap_err();
    assert!(matches!(err, DocumentServiceError::Structure(StructureError::TooDeep { .. })));
}

//! Annotation record repository and SQLite-backed annotation store.
//!
//! # Responsibility
//! - Persist annotation records outside the document tree.
//! - Apply lifecycle transitions validated by `AnnotationState`.
//! - Serve the reconciler's `AnnotationStore` contract.
//!
//! # Invariants
//! - Records are created `pending` and never deleted by transitions.
//! - Dismissal only touches open (`pending`/`published`) records, which makes
//!   repeated reconciliation a no-op.
//! - Counts are computed per call from storage; nothing is cached.

use crate::content::reconcile::AnnotationStore;
use crate::model::annotation::{
    AnnotationCategory, AnnotationCounts, AnnotationId, AnnotationRecord, AnnotationState,
};
use crate::model::document::DocumentId;
use crate::repo::document_repo::{
    ensure_tables, parse_uuid, write_transaction, RepoError, RepoResult,
};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeSet;
use uuid::Uuid;

const ANNOTATION_SELECT_SQL: &str = "SELECT
    uuid,
    document_uuid,
    category,
    state,
    created_at,
    published_at,
    resolved_at
FROM annotations";

/// Repository interface for annotation record CRUD and lifecycle.
pub trait AnnotationRepository {
    /// Creates a `pending` record attached to an existing document.
    fn create_annotation(
        &self,
        document_id: DocumentId,
        category: AnnotationCategory,
    ) -> RepoResult<AnnotationRecord>;
    fn get_annotation(&self, annotation_id: &str) -> RepoResult<Option<AnnotationRecord>>;
    /// Lists records of one document ordered by `created_at ASC, uuid ASC`.
    fn list_annotations(&self, document_id: DocumentId) -> RepoResult<Vec<AnnotationRecord>>;
    /// Moves one record to `next` when the lifecycle allows it.
    fn transition(
        &self,
        annotation_id: &str,
        next: AnnotationState,
    ) -> RepoResult<AnnotationRecord>;
}

/// SQLite-backed annotation repository.
pub struct SqliteAnnotationRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteAnnotationRepository<'conn> {
    /// Constructs a repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_tables(conn, &["documents", "annotations"])?;
        Ok(Self { conn })
    }
}

impl AnnotationRepository for SqliteAnnotationRepository<'_> {
    fn create_annotation(
        &self,
        document_id: DocumentId,
        category: AnnotationCategory,
    ) -> RepoResult<AnnotationRecord> {
        if !document_exists(self.conn, document_id)? {
            return Err(RepoError::NotFound(document_id));
        }

        let annotation_id = Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO annotations (uuid, document_uuid, category, state)
             VALUES (?1, ?2, ?3, 'pending');",
            params![annotation_id, document_id.to_string(), category.as_str()],
        )?;

        self.get_annotation(&annotation_id)?.ok_or_else(|| {
            RepoError::InvalidData(format!("annotation {annotation_id} missing after insert"))
        })
    }

    fn get_annotation(&self, annotation_id: &str) -> RepoResult<Option<AnnotationRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{ANNOTATION_SELECT_SQL} WHERE uuid = ?1;"))?;
        let mut rows = stmt.query([annotation_id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_annotation_row(row)?));
        }
        Ok(None)
    }

    fn list_annotations(&self, document_id: DocumentId) -> RepoResult<Vec<AnnotationRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "{ANNOTATION_SELECT_SQL}
             WHERE document_uuid = ?1
             ORDER BY created_at ASC, uuid ASC;"
        ))?;
        let mut rows = stmt.query([document_id.to_string()])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(parse_annotation_row(row)?);
        }
        Ok(records)
    }

    fn transition(
        &self,
        annotation_id: &str,
        next: AnnotationState,
    ) -> RepoResult<AnnotationRecord> {
        write_transaction(self.conn, || self.apply_transition(annotation_id, next))?;
        self.get_annotation(annotation_id)?
            .ok_or_else(|| RepoError::AnnotationNotFound(annotation_id.to_string()))
    }
}

impl SqliteAnnotationRepository<'_> {
    fn apply_transition(&self, annotation_id: &str, next: AnnotationState) -> RepoResult<()> {
        let current: Option<String> = self
            .conn
            .query_row(
                "SELECT state FROM annotations WHERE uuid = ?1;",
                [annotation_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(current) = current else {
            return Err(RepoError::AnnotationNotFound(annotation_id.to_string()));
        };
        let current = parse_state(&current)?;

        if !current.can_transition_to(next) {
            return Err(RepoError::InvalidTransition {
                annotation_id: annotation_id.to_string(),
                from: current,
                to: next,
            });
        }

        self.conn.execute(
            "UPDATE annotations
             SET
                state = ?2,
                published_at = CASE
                    WHEN ?2 = 'published' THEN (strftime('%s', 'now') * 1000)
                    ELSE published_at
                END,
                resolved_at = CASE
                    WHEN ?3 THEN (strftime('%s', 'now') * 1000)
                    ELSE resolved_at
                END
             WHERE uuid = ?1;",
            params![annotation_id, next.as_str(), next.is_terminal()],
        )?;
        Ok(())
    }
}

impl AnnotationStore for SqliteAnnotationRepository<'_> {
    type Error = RepoError;

    fn pending_ids(&self, document_id: DocumentId) -> RepoResult<BTreeSet<AnnotationId>> {
        let mut stmt = self.conn.prepare(
            "SELECT uuid
             FROM annotations
             WHERE document_uuid = ?1
               AND state IN ('pending', 'published');",
        )?;
        let mut rows = stmt.query([document_id.to_string()])?;
        let mut ids = BTreeSet::new();
        while let Some(row) = rows.next()? {
            ids.insert(row.get::<_, String>(0)?);
        }
        Ok(ids)
    }

    fn dismiss(&self, document_id: DocumentId, ids: &BTreeSet<AnnotationId>) -> RepoResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let document_uuid = document_id.to_string();
        write_transaction(self.conn, || {
            let mut dismissed = 0;
            for annotation_id in ids {
                dismissed += self.conn.execute(
                    "UPDATE annotations
                     SET
                        state = 'dismissed',
                        resolved_at = (strftime('%s', 'now') * 1000)
                     WHERE uuid = ?1
                       AND document_uuid = ?2
                       AND state IN ('pending', 'published');",
                    params![annotation_id, document_uuid],
                )?;
            }
            Ok(dismissed)
        })
    }

    fn counts(&self, document_id: DocumentId) -> RepoResult<AnnotationCounts> {
        let mut stmt = self.conn.prepare(
            "SELECT state, category, COUNT(*)
             FROM annotations
             WHERE document_uuid = ?1
               AND published_at IS NOT NULL
             GROUP BY state, category;",
        )?;
        let mut rows = stmt.query([document_id.to_string()])?;
        let mut counts = AnnotationCounts::default();
        while let Some(row) = rows.next()? {
            let state = parse_state(&row.get::<_, String>(0)?)?;
            let category = parse_category(&row.get::<_, String>(1)?)?;
            let count: u32 = row.get(2)?;
            counts.add(state, category, count);
        }
        Ok(counts)
    }
}

fn parse_annotation_row(row: &Row<'_>) -> RepoResult<AnnotationRecord> {
    let document_text: String = row.get("document_uuid")?;
    Ok(AnnotationRecord {
        id: row.get("uuid")?,
        document_id: parse_uuid(&document_text, "annotations.document_uuid")?,
        category: parse_category(&row.get::<_, String>("category")?)?,
        state: parse_state(&row.get::<_, String>("state")?)?,
        created_at: row.get("created_at")?,
        published_at: row.get("published_at")?,
        resolved_at: row.get("resolved_at")?,
    })
}

fn parse_state(value: &str) -> RepoResult<AnnotationState> {
    AnnotationState::parse(value).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid state `{value}` in annotations.state"))
    })
}

fn parse_category(value: &str) -> RepoResult<AnnotationCategory> {
    AnnotationCategory::parse(value).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid category `{value}` in annotations.category"))
    })
}

fn document_exists(conn: &Connection, document_id: DocumentId) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM documents WHERE uuid = ?1);",
        [document_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

#[cfg(test)]
mod tests {
    use super::{AnnotationRepository, SqliteAnnotationRepository};
    use crate::content::reconcile::AnnotationStore;
    use crate::model::annotation::AnnotationCategory;
    use crate::model::document::Document;
    use crate::repo::document_repo::{DocumentRepository, RepoError, SqliteDocumentRepository};
    use std::collections::BTreeSet;

    #[test]
    fn try_new_requires_annotations_table() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE documents (uuid TEXT PRIMARY KEY);")
            .unwrap();
        let err = SqliteAnnotationRepository::try_new(&conn)
            .err()
            .expect("missing annotations table must be rejected");
        assert!(matches!(err, RepoError::MissingRequiredTable("annotations")));
    }

    #[test]
    fn dismiss_with_no_ids_touches_nothing() {
        let conn = crate::db::open_db_in_memory().unwrap();
        let document_id = SqliteDocumentRepository::try_new(&conn)
            .unwrap()
            .create_document(&Document::default())
            .unwrap();
        let repo = SqliteAnnotationRepository::try_new(&conn).unwrap();
        repo.create_annotation(document_id, AnnotationCategory::Question)
            .unwrap();

        assert_eq!(repo.dismiss(document_id, &BTreeSet::new()).unwrap(), 0);
        assert_eq!(repo.pending_ids(document_id).unwrap().len(), 1);
    }
}

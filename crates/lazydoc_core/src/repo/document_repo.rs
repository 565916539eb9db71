//! Document repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist documents in their canonical `{ "children": [...] }` form.
//! - Track a per-document revision for optional optimistic save checks.
//!
//! # Invariants
//! - Write paths must call `Document::validate()` before SQL mutations.
//! - Read paths reject invalid persisted content instead of masking it.
//! - Deleting a document cascades to its annotation records.
//!
//! # See also
//! - docs/architecture/storage.md

use crate::content::render::derive_preview;
use crate::db::DbError;
use crate::model::annotation::{AnnotationId, AnnotationState};
use crate::model::document::{Document, DocumentId, StructureError};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const DOCUMENT_SELECT_SQL: &str = "SELECT
    uuid,
    content,
    preview_text,
    revision,
    created_at,
    updated_at
FROM documents";

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error shared by document and annotation persistence.
#[derive(Debug)]
pub enum RepoError {
    /// Tree breaks structural invariants; rejected before persistence.
    Structure(StructureError),
    Db(DbError),
    /// Target document does not exist.
    NotFound(DocumentId),
    /// Target annotation record does not exist.
    AnnotationNotFound(AnnotationId),
    /// Lifecycle transition not allowed by the state machine.
    InvalidTransition {
        annotation_id: AnnotationId,
        from: AnnotationState,
        to: AnnotationState,
    },
    /// Stored revision differs from the caller's expectation.
    RevisionConflict {
        document_id: DocumentId,
        expected: i64,
        actual: i64,
    },
    /// Required table is missing from the connection schema.
    MissingRequiredTable(&'static str),
    /// Persisted data cannot be converted to a valid read model.
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Structure(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "document not found: {id}"),
            Self::AnnotationNotFound(id) => write!(f, "annotation not found: {id}"),
            Self::InvalidTransition {
                annotation_id,
                from,
                to,
            } => write!(
                f,
                "annotation {annotation_id} cannot move from `{}` to `{}`",
                from.as_str(),
                to.as_str()
            ),
            Self::RevisionConflict {
                document_id,
                expected,
                actual,
            } => write!(
                f,
                "document {document_id} is at revision {actual}, expected {expected}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "document repository requires table `{table}`")
            }
            Self::InvalidData(message) => write!(f, "invalid persisted document data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Structure(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StructureError> for RepoError {
    fn from(value: StructureError) -> Self {
        Self::Structure(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Read model for one persisted document.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentRecord {
    pub document_id: DocumentId,
    pub document: Document,
    /// Derived plain-text preview (nullable).
    pub preview_text: Option<String>,
    /// Starts at 1, bumped on every save.
    pub revision: i64,
    /// Epoch milliseconds.
    pub created_at: i64,
    /// Epoch milliseconds.
    pub updated_at: i64,
}

/// Repository interface for canonical document storage.
pub trait DocumentRepository {
    /// Inserts a new document at revision 1.
    fn create_document(&self, document: &Document) -> RepoResult<DocumentId>;
    fn get_document(&self, document_id: DocumentId) -> RepoResult<Option<DocumentRecord>>;
    /// Overwrites the stored tree and returns the new revision.
    ///
    /// `expected_revision = None` means last writer wins.
    fn save_document(
        &self,
        document_id: DocumentId,
        document: &Document,
        expected_revision: Option<i64>,
    ) -> RepoResult<i64>;
    /// Deletes the document and, by cascade, its annotation records.
    fn delete_document(&self, document_id: DocumentId) -> RepoResult<()>;
    /// Lists ids ordered by `updated_at DESC, uuid ASC`.
    fn list_document_ids(&self) -> RepoResult<Vec<DocumentId>>;
    /// Runs `work` as one write unit: nothing it wrote survives an `Err`.
    ///
    /// Writes made through other repositories sharing the same storage join
    /// the unit.
    fn atomically<T, E, F>(&self, work: F) -> Result<T, E>
    where
        E: From<RepoError>,
        F: FnOnce() -> Result<T, E>;
}

/// SQLite-backed document repository.
pub struct SqliteDocumentRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteDocumentRepository<'conn> {
    /// Constructs a repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_tables(conn, &["documents"])?;
        Ok(Self { conn })
    }
}

impl DocumentRepository for SqliteDocumentRepository<'_> {
    fn create_document(&self, document: &Document) -> RepoResult<DocumentId> {
        document.validate()?;

        let document_id = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO documents (uuid, content, preview_text, revision)
             VALUES (?1, ?2, ?3, 1);",
            params![
                document_id.to_string(),
                document.to_canonical_json(),
                derive_preview(document),
            ],
        )?;

        Ok(document_id)
    }

    fn get_document(&self, document_id: DocumentId) -> RepoResult<Option<DocumentRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{DOCUMENT_SELECT_SQL} WHERE uuid = ?1;"))?;
        let mut rows = stmt.query([document_id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_document_row(row)?));
        }
        Ok(None)
    }

    fn save_document(
        &self,
        document_id: DocumentId,
        document: &Document,
        expected_revision: Option<i64>,
    ) -> RepoResult<i64> {
        document.validate()?;

        let changed = self.conn.execute(
            "UPDATE documents
             SET
                content = ?2,
                preview_text = ?3,
                revision = revision + 1,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?1
               AND (?4 IS NULL OR revision = ?4);",
            params![
                document_id.to_string(),
                document.to_canonical_json(),
                derive_preview(document),
                expected_revision,
            ],
        )?;

        let actual = current_revision(self.conn, document_id)?
            .ok_or(RepoError::NotFound(document_id))?;
        if changed == 0 {
            return Err(RepoError::RevisionConflict {
                document_id,
                expected: expected_revision.unwrap_or(actual),
                actual,
            });
        }

        Ok(actual)
    }

    fn delete_document(&self, document_id: DocumentId) -> RepoResult<()> {
        let changed = self.conn.execute(
            "DELETE FROM documents WHERE uuid = ?1;",
            [document_id.to_string()],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(document_id));
        }
        Ok(())
    }

    fn list_document_ids(&self) -> RepoResult<Vec<DocumentId>> {
        let mut stmt = self
            .conn
            .prepare("SELECT uuid FROM documents ORDER BY updated_at DESC, uuid ASC;")?;
        let mut rows = stmt.query([])?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next()? {
            let uuid_text: String = row.get(0)?;
            ids.push(parse_uuid(&uuid_text, "documents.uuid")?);
        }
        Ok(ids)
    }

    fn atomically<T, E, F>(&self, work: F) -> Result<T, E>
    where
        E: From<RepoError>,
        F: FnOnce() -> Result<T, E>,
    {
        write_transaction(self.conn, work)
    }
}

fn parse_document_row(row: &Row<'_>) -> RepoResult<DocumentRecord> {
    let uuid_text: String = row.get("uuid")?;
    let document_id = parse_uuid(&uuid_text, "documents.uuid")?;

    let content: String = row.get("content")?;
    let document: Document = serde_json::from_str(&content).map_err(|err| {
        RepoError::InvalidData(format!("undecodable content for document {uuid_text}: {err}"))
    })?;
    document.validate().map_err(|err| {
        RepoError::InvalidData(format!("invalid tree for document {uuid_text}: {err}"))
    })?;

    Ok(DocumentRecord {
        document_id,
        document,
        preview_text: row.get("preview_text")?,
        revision: row.get("revision")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn current_revision(conn: &Connection, document_id: DocumentId) -> RepoResult<Option<i64>> {
    let revision = conn
        .query_row(
            "SELECT revision FROM documents WHERE uuid = ?1;",
            [document_id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(revision)
}

pub(crate) fn parse_uuid(value: &str, column: &str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid value `{value}` in {column}")))
}

/// Runs `work` inside an immediate transaction on `conn`, or inside the one
/// already open on it.
///
/// Repositories borrow a shared `&Connection`, so the transaction is opened
/// unchecked; dropping it without commit rolls back.
pub(crate) fn write_transaction<T, E, F>(conn: &Connection, work: F) -> Result<T, E>
where
    E: From<RepoError>,
    F: FnOnce() -> Result<T, E>,
{
    if !conn.is_autocommit() {
        return work();
    }

    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)
        .map_err(RepoError::from)?;
    let value = work()?;
    tx.commit().map_err(RepoError::from)?;
    Ok(value)
}

pub(crate) fn ensure_tables(conn: &Connection, tables: &[&'static str]) -> RepoResult<()> {
    for table in tables {
        let exists: i64 = conn.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [*table],
            |row| row.get(0),
        )?;
        if exists != 1 {
            return Err(RepoError::MissingRequiredTable(*table));
        }
    }
    Ok(())
}

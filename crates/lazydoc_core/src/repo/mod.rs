//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts for documents and
//!   annotation records.
//! - Isolate SQLite query details from service/business orchestration.
//!
//! # Invariants
//! - Document writes must pass `Document::validate()` before persistence.
//! - Repository APIs return semantic errors (`NotFound`, `RevisionConflict`,
//!   `InvalidTransition`) in addition to DB transport errors.
//!
//! # See also
//! - docs/architecture/storage.md

pub mod annotation_repo;
pub mod document_repo;

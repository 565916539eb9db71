//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate content engine and repository calls into use-case APIs.
//! - Keep CLI/UI layers decoupled from storage details.

pub mod annotation_service;
pub mod document_service;

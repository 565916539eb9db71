//! Annotation record model.
//!
//! # Responsibility
//! - Define the externally persisted review record an `Annotation` node
//!   refers to.
//! - Own the review lifecycle state machine.
//!
//! # Invariants
//! - Lifecycle moves `pending -> published -> {dismissed, accepted}`.
//! - Stale drafts may move `pending -> dismissed` directly.
//! - `dismissed` and `accepted` are terminal; records are never deleted by
//!   lifecycle transitions.

use crate::model::document::DocumentId;
use serde::{Deserialize, Serialize};

/// External identifier shared by an annotation record and its tree node.
pub type AnnotationId = String;

/// Review lifecycle state of an annotation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationState {
    /// Draft, not yet visible to reviewers.
    Pending,
    /// Visible and awaiting a review decision.
    Published,
    /// Closed without being applied.
    Dismissed,
    /// Closed and applied.
    Accepted,
}

impl AnnotationState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Published => "published",
            Self::Dismissed => "dismissed",
            Self::Accepted => "accepted",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "published" => Some(Self::Published),
            "dismissed" => Some(Self::Dismissed),
            "accepted" => Some(Self::Accepted),
            _ => None,
        }
    }

    /// Terminal states are never reprocessed by reconciliation.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Dismissed | Self::Accepted)
    }

    pub fn can_transition_to(self, next: AnnotationState) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Published)
                | (Self::Pending, Self::Dismissed)
                | (Self::Published, Self::Dismissed)
                | (Self::Published, Self::Accepted)
        )
    }
}

/// Sub-kind of an annotation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationCategory {
    Question,
    Suggestion,
    Other,
}

impl AnnotationCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Question => "question",
            Self::Suggestion => "suggestion",
            Self::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "question" => Some(Self::Question),
            "suggestion" => Some(Self::Suggestion),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

/// Persisted review record referenced by an `Annotation` node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationRecord {
    pub id: AnnotationId,
    pub document_id: DocumentId,
    pub category: AnnotationCategory,
    pub state: AnnotationState,
    /// Epoch milliseconds.
    pub created_at: i64,
    /// Set once when the record is published.
    pub published_at: Option<i64>,
    /// Set when the record reaches a terminal state.
    pub resolved_at: Option<i64>,
}

impl AnnotationRecord {
    pub fn was_published(&self) -> bool {
        self.published_at.is_some()
    }
}

/// Per-category tally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCounts {
    pub question: u32,
    pub suggestion: u32,
    pub other: u32,
}

impl CategoryCounts {
    pub fn add(&mut self, category: AnnotationCategory, count: u32) {
        match category {
            AnnotationCategory::Question => self.question += count,
            AnnotationCategory::Suggestion => self.suggestion += count,
            AnnotationCategory::Other => self.other += count,
        }
    }

    pub fn total(&self) -> u32 {
        self.question + self.suggestion + self.other
    }
}

/// Lifecycle counts over published records of one document.
///
/// `pending` counts published records still awaiting a decision; drafts are
/// never counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationCounts {
    pub pending: CategoryCounts,
    pub dismissed: CategoryCounts,
    pub accepted: CategoryCounts,
}

impl AnnotationCounts {
    /// Adds `count` published records currently in `state`; unpublished
    /// drafts are ignored.
    pub fn add(&mut self, state: AnnotationState, category: AnnotationCategory, count: u32) {
        match state {
            AnnotationState::Published => self.pending.add(category, count),
            AnnotationState::Dismissed => self.dismissed.add(category, count),
            AnnotationState::Accepted => self.accepted.add(category, count),
            AnnotationState::Pending => {}
        }
    }
}

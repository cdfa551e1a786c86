//! Error types for turn orchestration.
//!
//! Errors are designed for layered context using rootcause:
//! - `CollaboratorError` reports a failed or slow external call; the
//!   orchestrator degrades these to fallback dialogue acts
//! - `OrchestrationError` is fatal for the turn: nothing was committed

use std::fmt;
use viki_core::ConversationId;

/// Errors from external collaborators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    /// The call did not finish within its time budget.
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },
    /// The collaborator reported a failure.
    Failure { message: String },
}

impl CollaboratorError {
    /// Creates a failure error.
    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure {
            message: message.into(),
        }
    }

    /// Returns true for timeouts.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl fmt::Display for CollaboratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout {
                operation,
                timeout_ms,
            } => write!(f, "{operation} timed out after {timeout_ms}ms"),
            Self::Failure { message } => write!(f, "collaborator failed: {message}"),
        }
    }
}

impl std::error::Error for CollaboratorError {}

/// Errors that abort a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrchestrationError {
    /// The turn input was rejected before anything was touched.
    InvalidInput { reason: String },
    /// The stored context could not be read.
    ContextLoad { conversation_id: ConversationId },
    /// The updated context could not be stored or evicted.
    ContextCommit { conversation_id: ConversationId },
    /// An ended conversation could not be archived; its context was kept.
    ArchivalFailed { conversation_id: ConversationId },
    /// The turn was cancelled before commit.
    Cancelled { conversation_id: ConversationId },
}

impl fmt::Display for OrchestrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInput { reason } => write!(f, "invalid turn input: {reason}"),
            Self::ContextLoad { conversation_id } => {
                write!(f, "failed to load context for conversation {conversation_id}")
            }
            Self::ContextCommit { conversation_id } => {
                write!(f, "failed to commit context for conversation {conversation_id}")
            }
            Self::ArchivalFailed { conversation_id } => {
                write!(f, "failed to archive conversation {conversation_id}")
            }
            Self::Cancelled { conversation_id } => {
                write!(f, "turn for conversation {conversation_id} was cancelled")
            }
        }
    }
}

impl std::error::Error for OrchestrationError {}

//! Error types for the context store.

use std::fmt;
use viki_core::ConversationId;

/// Errors from context store operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextStoreError {
    /// No live context for the conversation (absent or expired).
    NotFound { conversation_id: ConversationId },
    /// The store holds its configured maximum number of entries.
    CapacityExceeded { max_entries: usize },
    /// The context's own id differs from the key it was stored under.
    KeyMismatch {
        key: ConversationId,
        context_id: ConversationId,
    },
    /// A shard lock was poisoned by a panicking writer.
    Poisoned { shard: usize },
}

impl ContextStoreError {
    /// Returns true for the recoverable "no context" case.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl fmt::Display for ContextStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { conversation_id } => {
                write!(f, "no context for conversation {conversation_id}")
            }
            Self::CapacityExceeded { max_entries } => {
                write!(f, "context store is full ({max_entries} entries)")
            }
            Self::KeyMismatch { key, context_id } => {
                write!(
                    f,
                    "context for conversation {context_id} cannot be stored under key {key}"
                )
            }
            Self::Poisoned { shard } => write!(f, "context store shard {shard} is poisoned"),
        }
    }
}

impl std::error::Error for ContextStoreError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display() {
        let err = ContextStoreError::NotFound {
            conversation_id: ConversationId::new("conv-1"),
        };
        assert!(err.is_not_found());
        assert!(err.to_string().contains("conv-1"));
    }

    #[test]
    fn capacity_display() {
        let err = ContextStoreError::CapacityExceeded { max_entries: 3 };
        assert!(!err.is_not_found());
        assert!(err.to_string().contains("full"));
    }
}

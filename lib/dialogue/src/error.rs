//! Error types for the dialogue policy.
//!
//! The policy is total over well-formed input: ambiguity becomes a
//! clarification act, never an error. Only structurally invalid turns are
//! rejected.

use std::fmt;

/// Errors from policy evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    /// A required turn field is missing or inconsistent.
    InvalidInput { field: &'static str, reason: String },
}

impl fmt::Display for PolicyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInput { field, reason } => {
                write!(f, "invalid turn input '{field}': {reason}")
            }
        }
    }
}

impl std::error::Error for PolicyError {}

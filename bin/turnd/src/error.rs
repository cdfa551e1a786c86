//! Error types for the turn driver.

use std::fmt;

/// Errors from the turn driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurndError {
    /// Configuration could not be loaded.
    Config { message: String },
    /// Reading input or writing output failed.
    Io { message: String },
    /// An input line is not a valid turn.
    InvalidTurn { line: usize, message: String },
    /// A background task panicked or was aborted.
    Task { message: String },
}

impl fmt::Display for TurndError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { message } => write!(f, "configuration error: {message}"),
            Self::Io { message } => write!(f, "i/o error: {message}"),
            Self::InvalidTurn { line, message } => {
                write!(f, "invalid turn on line {line}: {message}")
            }
            Self::Task { message } => write!(f, "background task failed: {message}"),
        }
    }
}

impl std::error::Error for TurndError {}

//! Error types for the nodepin library
//!
//! Most conditions this subsystem meets are deliberately *not* errors: a
//! missing store file is an empty set, an unreadable working-copy parent is
//! "no parent", and identifiers the host no longer knows are dropped. What is
//! left here are the failures a caller can actually act on, chiefly
//! [`PinError::LockHeld`] when another process keeps the pin store busy.

use std::path::PathBuf;
use thiserror::Error;

use crate::types::RevisionNumber;

/// Type alias for Results in the nodepin library
pub type Result<T> = std::result::Result<T, PinError>;

/// Main error type for all pin tracking operations
#[derive(Debug, Error)]
pub enum PinError {
    /// I/O errors during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors during JSON serialization/deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The pin store lock is held by someone else and the wait ran out
    #[error("Lock held: {description} ({path:?}, errno {errno})")]
    LockHeld {
        /// Path of the lock file
        path: PathBuf,
        /// What the lock was being taken for
        description: String,
        /// OS error code reported by the failed attempt
        errno: i32,
    },

    /// The host could not resolve a revision number to an identifier
    #[error("Unknown revision: {0}")]
    RevisionLookup(RevisionNumber),

    /// Text that does not parse as a 20-byte identifier
    #[error("Invalid node id: {0}")]
    InvalidNodeId(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PinError {
    /// Create an internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        PinError::Internal(msg.into())
    }

    /// Check if retrying the operation later may succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(self, PinError::LockHeld { .. })
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            PinError::LockHeld { path, description, .. } => {
                format!(
                    "Could not {} because {:?} is locked by another process. \
                     Pinned nodes will be recomputed by the next command.",
                    description, path
                )
            }
            PinError::InvalidNodeId(text) => {
                format!("'{}' is not a 40 character hex node id.", text)
            }
            _ => self.to_string(),
        }
    }
}

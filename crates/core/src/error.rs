//! Error types for transactional variables
//!
//! All fallible operations return [`StmResult`]. Only [`StmError::Conflict`]
//! is handled internally (by retrying the atomic block); every other variant
//! is surfaced to the caller.

use crate::admission::AdmissionError;
use std::io;
use thiserror::Error;

/// Result type alias for TVar operations
pub type StmResult<T> = std::result::Result<T, StmError>;

/// Error types for TVar operations
#[derive(Debug, Error)]
pub enum StmError {
    /// A TVar was read or written with no active transaction on this thread
    #[error("can not {operation} a TVar without an active transaction")]
    NoTransaction {
        /// The attempted operation ("read", "write", ...)
        operation: &'static str,
    },

    /// A value was refused by the admission policy
    #[error("value not admissible: {0}")]
    Admission(#[from] AdmissionError),

    /// The running attempt observed a conflicting commit and will be retried
    ///
    /// Returned only to code executing inside a doomed attempt. The retry
    /// loop intercepts it; it never escapes the outermost atomic block.
    #[error("transaction conflict")]
    Conflict,

    /// The transaction was abandoned and can no longer commit
    #[error("transaction aborted: {reason}")]
    TransactionAborted {
        /// Why the transaction was abandoned
        reason: String,
    },

    /// A configured retry limit was exhausted
    #[error("transaction gave up after {attempts} attempts")]
    TooManyRetries {
        /// Number of attempts made
        attempts: usize,
    },

    /// A numeric operation found a value of the wrong type
    #[error("type mismatch: expected {expected}, found {actual}")]
    TypeMismatch {
        /// Expected type
        expected: &'static str,
        /// Actual type found
        actual: &'static str,
    },

    /// Integer arithmetic overflowed
    #[error("integer overflow")]
    Overflow,

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error while loading configuration
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl StmError {
    /// Create a NoTransaction error for `operation`
    pub fn no_transaction(operation: &'static str) -> Self {
        StmError::NoTransaction { operation }
    }

    /// Create a TransactionAborted error
    pub fn aborted(reason: impl Into<String>) -> Self {
        StmError::TransactionAborted {
            reason: reason.into(),
        }
    }

    /// Create a Config error
    pub fn config(message: impl Into<String>) -> Self {
        StmError::Config(message.into())
    }

    /// Check if this is the internal conflict signal
    pub fn is_conflict(&self) -> bool {
        matches!(self, StmError::Conflict)
    }

    /// Check if re-running the attempt could succeed
    ///
    /// Only a conflict qualifies. `TooManyRetries` means the retry budget
    /// is already spent.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StmError::Conflict)
    }

    /// Check if this is a missing-transaction error
    pub fn is_no_transaction(&self) -> bool {
        matches!(self, StmError::NoTransaction { .. })
    }

    /// Check if this is an admission error
    pub fn is_admission(&self) -> bool {
        matches!(self, StmError::Admission(_))
    }
}

//! Error handling for PcbMill
//!
//! Provides the workspace-wide error type. Crate-specific failures
//! (Gerber parsing, job generation, settings) live in their own crates
//! and convert into this one at the application boundary.
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for PcbMill
#[derive(Error, Debug)]
pub enum Error {
    /// The operation was cancelled through a [`crate::CancellationToken`]
    #[error("Operation cancelled")]
    Cancelled,

    /// A unit string could not be interpreted
    #[error("Unknown unit: {0}")]
    UnknownUnit(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a generic error from any message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check whether this error is a cancellation rather than a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

/// Result type alias for PcbMill operations
pub type Result<T> = std::result::Result<T, Error>;

//! # ESS Error Handling
//!
//! This module defines the EssError enum, which represents the different error
//! types that can occur in the ess-rs crate.
//!
//! Frame-level and field-level decode problems are deliberately absent: those are
//! soft failures that get logged by the polling loop and never reach the caller.

use thiserror::Error;

/// Result type alias for ESS operations.
pub type Result<T> = std::result::Result<T, EssError>;

/// Represents the different error types that can occur in the ESS crate.
#[derive(Debug, Error)]
pub enum EssError {
    /// The serial endpoint could not be opened (bad name, permissions, already in use).
    #[error("Failed to open {endpoint}: {reason}")]
    Connect { endpoint: String, reason: String },

    /// A read or write failed on an open link. Fatal to the current session.
    #[error("Transport error: {0}")]
    Transport(String),

    /// An operation needed an open link but none is present.
    #[error("Not connected")]
    NotConnected,

    /// `connect` was called while a session is still open.
    #[error("Already connected to {0}")]
    AlreadyConnected(String),

    /// A typed command carried an out-of-range argument.
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// The configured protocol variant has no support for the requested operation.
    #[error("Unsupported by this protocol variant: {0}")]
    Unsupported(String),
}

impl From<std::io::Error> for EssError {
    fn from(err: std::io::Error) -> Self {
        EssError::Transport(err.to_string())
    }
}

impl From<tokio_serial::Error> for EssError {
    fn from(err: tokio_serial::Error) -> Self {
        EssError::Transport(err.to_string())
    }
}

impl EssError {
    /// Whether this error ends the current session.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EssError::Transport(_))
    }
}

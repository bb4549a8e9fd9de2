//! Error types for the core library.

use thiserror::Error;

use crate::mailbox::MailboxError;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The mailbox service could not be reached or rejected the request.
    #[error("Mailbox error: {0}")]
    Mailbox(#[from] MailboxError),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A message, folder or user does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The user has not been provisioned and auto-creation is disabled.
    #[error("User not provisioned: {0}")]
    UserNotProvisioned(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

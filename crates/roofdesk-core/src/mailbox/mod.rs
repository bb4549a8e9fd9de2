//! Mailbox service contract.
//!
//! The remote protocol client lives outside this crate. Everything here
//! talks to it through [`MailboxService`], which exposes exactly two
//! capabilities: list a page of summaries, and fetch the full detail of one
//! message.

mod folder;
mod model;

pub use folder::WellKnownFolder;
pub use model::{Importance, MailboxAddress, MessageDetail, MessageSummary};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors surfaced by a mailbox service implementation.
#[derive(Debug, Clone, Error)]
pub enum MailboxError {
    /// The service could not be reached (connection, auth, timeout).
    #[error("Transport failure: {0}")]
    Transport(String),

    /// The requested folder or message does not exist remotely.
    #[error("Not found on mailbox service: {0}")]
    NotFound(String),

    /// The service answered with something that could not be understood.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Remote mailbox capability for a single authenticated principal.
///
/// Implementations may honour `since` server-side or ignore it; callers
/// always re-filter the returned page.
#[async_trait]
pub trait MailboxService: Send + Sync {
    /// Fetches one page of message summaries from `folder`, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the service cannot be reached or the folder is
    /// unknown.
    async fn fetch_page(
        &self,
        folder: &str,
        page_size: usize,
        offset: usize,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<MessageSummary>, MailboxError>;

    /// Fetches the full detail of one message.
    ///
    /// # Errors
    ///
    /// Returns an error if the service cannot be reached or the message no
    /// longer exists.
    async fn fetch_detail(&self, protocol_id: &str) -> Result<MessageDetail, MailboxError>;
}

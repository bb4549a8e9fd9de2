//! Message shapes returned by a mailbox service.
//!
//! Every field that a protocol may omit is optional or defaulted; the
//! resolver is responsible for turning gaps into usable values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A display name plus address as reported by the service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MailboxAddress {
    /// Display name, if any.
    pub name: Option<String>,
    /// Email address; may be empty when the service only knows a name.
    pub address: String,
}

impl MailboxAddress {
    /// Creates an address with a display name.
    #[must_use]
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            address: address.into(),
        }
    }

    /// Creates an address without a display name.
    #[must_use]
    pub fn bare(address: impl Into<String>) -> Self {
        Self {
            name: None,
            address: address.into(),
        }
    }
}

/// Message importance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    /// Low importance.
    Low,
    /// Normal importance.
    #[default]
    Normal,
    /// High importance.
    High,
}

impl Importance {
    /// Database representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
        }
    }

    /// Parses the database representation; unknown values are normal.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Self::Low,
            "high" => Self::High,
            _ => Self::Normal,
        }
    }
}

/// Page-level view of a message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageSummary {
    /// Protocol message identifier, unique per mailbox.
    pub protocol_id: String,
    /// Subject line.
    pub subject: Option<String>,
    /// Structured "from" field.
    pub from: Option<MailboxAddress>,
    /// Structured "sender" field, distinct from "from" in some protocols.
    pub sender: Option<MailboxAddress>,
    /// When the message was received.
    pub received_at: Option<DateTime<Utc>>,
    /// Whether the message has been read remotely.
    pub is_read: bool,
    /// Whether the message has attachments.
    pub has_attachments: bool,
    /// Body, when the service includes it in listings.
    pub body: Option<String>,
    /// RFC 5322 `Message-ID`.
    pub internet_message_id: Option<String>,
}

impl MessageSummary {
    /// Returns true if the summary carries a usable body.
    #[must_use]
    pub fn has_body(&self) -> bool {
        self.body.as_deref().is_some_and(|b| !b.trim().is_empty())
    }

    /// Returns true if the message falls inside an incremental window.
    ///
    /// Items without a received timestamp are always kept.
    #[must_use]
    pub fn is_newer_than(&self, since: Option<DateTime<Utc>>) -> bool {
        match (since, self.received_at) {
            (Some(since), Some(received)) => received > since,
            _ => true,
        }
    }
}

/// Full view of a message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageDetail {
    /// Summary fields.
    #[serde(flatten)]
    pub summary: MessageSummary,
    /// "To" recipients.
    pub to: Vec<MailboxAddress>,
    /// "Cc" recipients.
    pub cc: Vec<MailboxAddress>,
    /// "Bcc" recipients.
    pub bcc: Vec<MailboxAddress>,
    /// Raw RFC 5322 payload, when the service exposes it.
    pub raw: Option<String>,
    /// Size in bytes.
    pub size: Option<i64>,
    /// Importance.
    pub importance: Importance,
}

impl MessageDetail {
    /// Fills fields the detail response left empty from the page summary.
    pub fn fill_from(&mut self, summary: &MessageSummary) {
        let own = &mut self.summary;
        if own.protocol_id.is_empty() {
            own.protocol_id.clone_from(&summary.protocol_id);
        }
        if own.subject.as_deref().is_none_or(|s| s.trim().is_empty()) {
            own.subject.clone_from(&summary.subject);
        }
        if own.from.is_none() {
            own.from.clone_from(&summary.from);
        }
        if own.sender.is_none() {
            own.sender.clone_from(&summary.sender);
        }
        if own.received_at.is_none() {
            own.received_at = summary.received_at;
        }
        if own.internet_message_id.is_none() {
            own.internet_message_id.clone_from(&summary.internet_message_id);
        }
        own.has_attachments |= summary.has_attachments;
        own.is_read |= summary.is_read;
    }
}

impl From<MessageSummary> for MessageDetail {
    fn from(summary: MessageSummary) -> Self {
        Self {
            summary,
            ..Self::default()
        }
    }
}

//! Persistence layer data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::mailbox::{Importance, MailboxAddress, MessageDetail};
use crate::resolve::{Resolution, SenderSource};

/// Unique identifier for a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub i64);

/// Unique identifier for a folder row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FolderId(pub i64);

/// Unique identifier for a message row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub i64);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Recipient role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecipientKind {
    /// Primary recipient.
    To,
    /// Carbon copy.
    Cc,
    /// Blind carbon copy.
    Bcc,
}

impl RecipientKind {
    /// Database representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::To => "to",
            Self::Cc => "cc",
            Self::Bcc => "bcc",
        }
    }

    /// Parses the database representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "to" => Some(Self::To),
            "cc" => Some(Self::Cc),
            "bcc" => Some(Self::Bcc),
            _ => None,
        }
    }
}

/// One recipient of a stored message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    /// Role.
    pub kind: RecipientKind,
    /// Email address.
    pub address: String,
    /// Display name.
    pub name: Option<String>,
}

/// How an update treats a read flag that is already set locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadFlagPolicy {
    /// A locally set read flag survives the update.
    PreserveLocal,
    /// The incoming read flag always wins.
    Overwrite,
}

/// A message ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRecord {
    /// Protocol message id.
    pub protocol_id: String,
    /// Subject.
    pub subject: String,
    /// Sender address.
    pub sender_address: String,
    /// Sender display name.
    pub sender_name: String,
    /// True if the sender is the placeholder; an existing real sender is
    /// then kept on update.
    pub sender_is_placeholder: bool,
    /// Body; `None` until detail has been fetched.
    pub body: Option<String>,
    /// When the message was received.
    pub received_at: Option<DateTime<Utc>>,
    /// Read flag.
    pub is_read: bool,
    /// Attachment flag.
    pub has_attachments: bool,
    /// Importance.
    pub importance: Importance,
    /// RFC 5322 `Message-ID`.
    pub internet_message_id: Option<String>,
    /// Size in bytes.
    pub size: Option<i64>,
    /// Full recipient set, replacing whatever was stored. `None` when only
    /// the summary is known; stored recipients are then kept.
    pub recipients: Option<Vec<Recipient>>,
}

impl MessageRecord {
    /// Builds a record from a fetched message and its resolved fields.
    ///
    /// `hydrated` is false when only the summary is known, in which case the
    /// body and recipients stay unset.
    #[must_use]
    pub fn from_resolved(detail: &MessageDetail, resolution: Resolution, hydrated: bool) -> Self {
        let recipients: Vec<Recipient> = [
            (RecipientKind::To, &detail.to),
            (RecipientKind::Cc, &detail.cc),
            (RecipientKind::Bcc, &detail.bcc),
        ]
        .into_iter()
        .flat_map(|(kind, list)| list.iter().filter_map(move |a| recipient(kind, a)))
        .collect();

        Self {
            protocol_id: detail.summary.protocol_id.clone(),
            subject: resolution.subject,
            sender_is_placeholder: resolution.sender.source == SenderSource::Placeholder,
            sender_address: resolution.sender.address,
            sender_name: resolution.sender.name,
            body: hydrated.then_some(resolution.body.content),
            received_at: detail.summary.received_at,
            is_read: detail.summary.is_read,
            has_attachments: detail.summary.has_attachments,
            importance: detail.importance,
            internet_message_id: detail.summary.internet_message_id.clone(),
            size: detail.size,
            recipients: hydrated.then_some(recipients),
        }
    }
}

fn recipient(kind: RecipientKind, address: &MailboxAddress) -> Option<Recipient> {
    let trimmed = address.address.trim();
    (!trimmed.is_empty()).then(|| Recipient {
        kind,
        address: trimmed.to_string(),
        name: address.name.clone().filter(|n| !n.trim().is_empty()),
    })
}

/// A folder row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderRecord {
    /// Row id.
    pub id: FolderId,
    /// Protocol folder id.
    pub protocol_folder_id: String,
    /// Display name.
    pub display_name: String,
    /// When the last sync started.
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Items written by the last sync.
    pub last_sync_count: i64,
}

/// List-view projection of a stored message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageListItem {
    /// Local id.
    pub id: MessageId,
    /// Protocol message id.
    pub protocol_id: String,
    /// Subject.
    pub subject: String,
    /// Sender address.
    pub sender_address: String,
    /// Sender display name.
    pub sender_name: String,
    /// When the message was received.
    pub received_at: Option<DateTime<Utc>>,
    /// Read flag.
    pub is_read: bool,
    /// Attachment flag.
    pub has_attachments: bool,
    /// Importance.
    pub importance: Importance,
}

/// A stored message with its recipients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    /// Local id.
    pub id: MessageId,
    /// Owning folder.
    pub folder_id: FolderId,
    /// Protocol message id.
    pub protocol_id: String,
    /// Subject.
    pub subject: String,
    /// Sender address.
    pub sender_address: String,
    /// Sender display name.
    pub sender_name: String,
    /// Body; `None` until detail has been fetched.
    pub body: Option<String>,
    /// When the message was received.
    pub received_at: Option<DateTime<Utc>>,
    /// Read flag.
    pub is_read: bool,
    /// Attachment flag.
    pub has_attachments: bool,
    /// Importance.
    pub importance: Importance,
    /// RFC 5322 `Message-ID`.
    pub internet_message_id: Option<String>,
    /// Size in bytes.
    pub size: Option<i64>,
    /// When this row was last written by a sync.
    pub last_synced_at: DateTime<Utc>,
    /// Recipients.
    pub recipients: Vec<Recipient>,
}

impl StoredMessage {
    /// Recipients of one role.
    pub fn recipients_of(&self, kind: RecipientKind) -> impl Iterator<Item = &Recipient> {
        self.recipients.iter().filter(move |r| r.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox::MessageSummary;
    use crate::resolve::Resolver;

    #[test]
    fn test_record_from_resolved() {
        let detail = MessageDetail {
            summary: MessageSummary {
                protocol_id: "p1".into(),
                ..MessageSummary::default()
            },
            to: vec![
                MailboxAddress::new("Office", "office@example.com"),
                MailboxAddress::bare("  "),
            ],
            cc: vec![MailboxAddress::new(" ", "crew@example.com")],
            ..MessageDetail::default()
        };
        let resolver = Resolver::default();
        let record = MessageRecord::from_resolved(&detail, resolver.resolve(&detail), true);

        let recipients = record.recipients.unwrap();
        assert_eq!(recipients.len(), 2);
        assert_eq!(recipients[0].kind, RecipientKind::To);
        assert_eq!(recipients[1].name, None);
        assert!(record.sender_is_placeholder);
        assert_eq!(record.subject, "(No Subject)");

        let summary_only = MessageRecord::from_resolved(&detail, resolver.resolve(&detail), false);
        assert_eq!(summary_only.recipients, None);
        assert_eq!(summary_only.body, None);
    }

    #[test]
    fn test_recipient_kind_roundtrip() {
        for kind in [RecipientKind::To, RecipientKind::Cc, RecipientKind::Bcc] {
            assert_eq!(RecipientKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(RecipientKind::parse("from"), None);
    }
}

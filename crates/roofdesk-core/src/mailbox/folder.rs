//! Well-known mailbox folders.

use serde::{Deserialize, Serialize};

/// Folders every mailbox has, synced by a full-account run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WellKnownFolder {
    /// Inbox.
    Inbox,
    /// Sent items.
    SentItems,
    /// Drafts.
    Drafts,
    /// Deleted items.
    DeletedItems,
    /// Junk email.
    JunkEmail,
}

impl WellKnownFolder {
    /// All well-known folders, in sync order.
    pub const ALL: [Self; 5] = [
        Self::Inbox,
        Self::SentItems,
        Self::Drafts,
        Self::DeletedItems,
        Self::JunkEmail,
    ];

    /// Protocol folder identifier.
    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            Self::Inbox => "INBOX",
            Self::SentItems => "SENT_ITEMS",
            Self::Drafts => "DRAFTS",
            Self::DeletedItems => "DELETED_ITEMS",
            Self::JunkEmail => "JUNK_EMAIL",
        }
    }

    /// Human-readable folder name.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Inbox => "Inbox",
            Self::SentItems => "Sent Items",
            Self::Drafts => "Drafts",
            Self::DeletedItems => "Deleted Items",
            Self::JunkEmail => "Junk Email",
        }
    }

    /// Default number of items fetched per sync batch.
    #[must_use]
    pub const fn default_page_size(self) -> usize {
        match self {
            Self::Inbox | Self::SentItems => 50,
            Self::Drafts | Self::DeletedItems | Self::JunkEmail => 25,
        }
    }

    /// Detects a well-known folder from a protocol id, display name or
    /// short alias (`inbox`, `sent`, `drafts`, `deleted`, `junk`).
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let normalized = name.trim().to_lowercase().replace(['_', '-'], " ");
        match normalized.as_str() {
            "inbox" => Some(Self::Inbox),
            "sent" | "sent items" => Some(Self::SentItems),
            "drafts" | "draft" => Some(Self::Drafts),
            "deleted" | "deleted items" | "trash" => Some(Self::DeletedItems),
            "junk" | "junk email" | "spam" => Some(Self::JunkEmail),
            _ => None,
        }
    }

    /// Maps any caller-supplied folder name onto the protocol id stored
    /// locally. Unknown folders are passed through unchanged.
    #[must_use]
    pub fn canonical_id(name: &str) -> String {
        Self::from_name(name).map_or_else(|| name.trim().to_string(), |f| f.id().to_string())
    }

    /// Display name for any protocol folder id.
    #[must_use]
    pub fn display_name_for(protocol_folder_id: &str) -> String {
        Self::from_name(protocol_folder_id).map_or_else(
            || protocol_folder_id.to_string(),
            |f| f.display_name().to_string(),
        )
    }
}

impl std::fmt::Display for WellKnownFolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

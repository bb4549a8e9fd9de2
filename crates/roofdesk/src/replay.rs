//! Mailbox service backed by a directory export.
//!
//! Layout: one subdirectory per protocol folder id (`INBOX`, `SENT_ITEMS`,
//! ...), each holding messages as `*.json` ([`MessageDetail`] documents) or
//! `*.eml` (raw RFC 5322). The file stem is the protocol id unless a JSON
//! document names its own.
//!
//! Listings omit bodies, so bodies are always obtained through
//! [`MailboxService::fetch_detail`], as with a real protocol client.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use roofdesk_core::{MailboxError, MailboxService, MessageDetail, MessageSummary};
use roofdesk_mime::Message;
use tracing::{debug, warn};

/// Replays an exported mailbox.
#[derive(Debug, Clone)]
pub struct ReplayMailbox {
    root: PathBuf,
}

impl ReplayMailbox {
    /// Opens an export directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    async fn load_folder(&self, folder: &str) -> Result<Vec<MessageDetail>, MailboxError> {
        let dir = self.root.join(folder);
        if !dir.is_dir() {
            debug!(folder, "Folder not present in export");
            return Ok(Vec::new());
        }

        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| MailboxError::Transport(format!("{}: {e}", dir.display())))?;

        let mut messages = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| MailboxError::Transport(e.to_string()))?
        {
            match load_message(&entry.path()).await {
                Ok(Some(message)) => messages.push(message),
                Ok(None) => {}
                Err(e) => warn!(path = %entry.path().display(), error = %e, "Skipping unreadable export file"),
            }
        }

        messages.sort_by(|a, b| {
            b.summary
                .received_at
                .cmp(&a.summary.received_at)
                .then_with(|| a.summary.protocol_id.cmp(&b.summary.protocol_id))
        });
        Ok(messages)
    }

    async fn folders(&self) -> Result<Vec<String>, MailboxError> {
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| MailboxError::Transport(format!("{}: {e}", self.root.display())))?;

        let mut folders = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| MailboxError::Transport(e.to_string()))?
        {
            if entry.path().is_dir() {
                folders.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        Ok(folders)
    }
}

#[async_trait]
impl MailboxService for ReplayMailbox {
    async fn fetch_page(
        &self,
        folder: &str,
        page_size: usize,
        offset: usize,
        _since: Option<DateTime<Utc>>,
    ) -> Result<Vec<MessageSummary>, MailboxError> {
        Ok(self
            .load_folder(folder)
            .await?
            .into_iter()
            .skip(offset)
            .take(page_size)
            .map(|detail| MessageSummary {
                body: None,
                ..detail.summary
            })
            .collect())
    }

    async fn fetch_detail(&self, protocol_id: &str) -> Result<MessageDetail, MailboxError> {
        for folder in self.folders().await? {
            if let Some(found) = self
                .load_folder(&folder)
                .await?
                .into_iter()
                .find(|m| m.summary.protocol_id == protocol_id)
            {
                return Ok(found);
            }
        }
        Err(MailboxError::NotFound(protocol_id.to_string()))
    }
}

async fn load_message(path: &Path) -> Result<Option<MessageDetail>, MailboxError> {
    let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
        return Ok(None);
    };
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
    if !matches!(extension, "json" | "eml") {
        return Ok(None);
    }

    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| MailboxError::Transport(e.to_string()))?;

    let mut detail = if extension == "json" {
        serde_json::from_str::<MessageDetail>(&text)
            .map_err(|e| MailboxError::Protocol(e.to_string()))?
    } else {
        from_raw(text)
    };
    if detail.summary.protocol_id.trim().is_empty() {
        detail.summary.protocol_id = stem;
    }
    Ok(Some(detail))
}

/// Builds a detail from a raw message; the resolver recovers the rest.
fn from_raw(raw: String) -> MessageDetail {
    let parsed = Message::parse(&raw);
    let received_at = parsed
        .headers
        .get("date")
        .and_then(|d| DateTime::parse_from_rfc2822(d.trim()).ok())
        .map(|d| d.with_timezone(&Utc));
    let internet_message_id = parsed.headers.get("message-id").map(|id| id.trim().to_string());
    let size = i64::try_from(raw.len()).ok();

    let mut detail = MessageDetail {
        raw: Some(raw),
        size,
        ..MessageDetail::default()
    };
    detail.summary.received_at = received_at;
    detail.summary.internet_message_id = internet_message_id;
    detail
}

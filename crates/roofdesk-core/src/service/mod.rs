//! Caller-facing desk operations.
//!
//! A [`MailDesk`] binds the shared [`DeskResources`] to one mailbox
//! principal and exposes the list, detail, mark-read, sync-trigger and
//! sender-repair operations. Reads always prefer best-effort data over
//! failure: a failed sync or an unreachable cache never fails a list or
//! detail read.

mod resources;

pub use resources::DeskResources;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::cache::{ListSnapshot, MailCache};
use crate::config::UserProvisioning;
use crate::jobs::{BackgroundRunner, JobCoordinator, JobKey};
use crate::mailbox::{MailboxAddress, MailboxService, MessageSummary, WellKnownFolder};
use crate::resolve::{Resolver, SenderSource};
use crate::store::{
    MailStore, MessageListItem, MessageRecord, ReadFlagPolicy, StoredMessage, UserId,
};
use crate::sync::{SyncAllReport, SyncOrchestrator, SyncOutcome};
use crate::{Error, Result};

/// Parameters of a list read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListQuery {
    /// Folder id or alias.
    pub folder: String,
    /// 1-based page number.
    pub page: usize,
    /// Page size; the folder's sync page size when unset.
    pub page_size: Option<usize>,
    /// Sync the folder before reading unless its cached list is fresh.
    pub sync_first: bool,
    /// Run that sync on the background runner instead of waiting for it.
    pub background: bool,
    /// Ignore the incremental window and always sync.
    pub force_full: bool,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            folder: WellKnownFolder::Inbox.id().to_string(),
            page: 1,
            page_size: None,
            sync_first: false,
            background: false,
            force_full: false,
        }
    }
}

impl ListQuery {
    /// First page of a folder.
    #[must_use]
    pub fn folder(folder: impl Into<String>) -> Self {
        Self {
            folder: folder.into(),
            ..Self::default()
        }
    }
}

/// One page of a folder list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePage {
    /// Protocol folder id.
    pub folder: String,
    /// 1-based page number.
    pub page: usize,
    /// Page size.
    pub page_size: usize,
    /// Messages in the folder.
    pub total: i64,
    /// Messages on this page, newest first.
    pub messages: Vec<MessageListItem>,
    /// When the folder last synced.
    pub last_synced_at: Option<DateTime<Utc>>,
    /// True if the page came from the read cache.
    pub from_cache: bool,
    /// What the pre-read sync did, if one was requested.
    pub sync: Option<SyncTrigger>,
    /// Why the pre-read sync failed, if it did.
    pub sync_error: Option<String>,
}

/// What to sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTarget {
    /// One folder, by id or alias.
    Folder(String),
    /// Every well-known folder.
    All,
}

/// Counts from a completed sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncReport {
    /// A single folder.
    Folder(SyncOutcome),
    /// Every well-known folder.
    All(SyncAllReport),
}

/// Result of asking for a sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "report", rename_all = "snake_case")]
pub enum SyncTrigger {
    /// The sync ran to completion before returning.
    Completed(SyncReport),
    /// The sync was handed to the background runner.
    Started,
    /// A sync with the same key is already in flight.
    AlreadyRunning,
}

/// Desk operations for one mailbox principal.
pub struct MailDesk {
    user_email: String,
    store: MailStore,
    cache: MailCache,
    jobs: Arc<JobCoordinator>,
    runner: BackgroundRunner,
    resolver: Resolver,
    provisioning: UserProvisioning,
    mailbox: Arc<dyn MailboxService>,
    sync: Arc<SyncOrchestrator>,
}

impl std::fmt::Debug for MailDesk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailDesk")
            .field("user_email", &self.user_email)
            .field("provisioning", &self.provisioning)
            .finish_non_exhaustive()
    }
}

impl MailDesk {
    /// Creates a desk over shared resources.
    #[must_use]
    pub fn new(
        resources: &DeskResources,
        user_email: &str,
        mailbox: Arc<dyn MailboxService>,
    ) -> Self {
        let config = &resources.config;
        let resolver = Resolver::new(config.resolver.clone());
        let sync = SyncOrchestrator::new(
            user_email,
            Arc::clone(&mailbox),
            resources.store.clone(),
            resources.cache.clone(),
            resolver.clone(),
            config.sync.clone(),
            config.users,
        );

        Self {
            user_email: user_email.trim().to_lowercase(),
            store: resources.store.clone(),
            cache: resources.cache.clone(),
            jobs: Arc::clone(&resources.jobs),
            runner: resources.runner.clone(),
            resolver,
            provisioning: config.users,
            mailbox,
            sync: Arc::new(sync),
        }
    }

    /// The principal this desk serves.
    #[must_use]
    pub fn user_email(&self) -> &str {
        &self.user_email
    }

    /// The orchestrator behind this desk.
    #[must_use]
    pub fn orchestrator(&self) -> &SyncOrchestrator {
        &self.sync
    }

    /// Reads one page of a folder, optionally syncing first.
    ///
    /// # Errors
    ///
    /// Returns an error if the user cannot be resolved or the store fails.
    /// Sync failures are reported in [`MessagePage::sync_error`] instead.
    pub async fn list_messages(&self, query: &ListQuery) -> Result<MessagePage> {
        let folder = WellKnownFolder::canonical_id(&query.folder);
        let page = query.page.max(1);
        let page_size = query
            .page_size
            .unwrap_or_else(|| self.sync.config().page_size_for(&folder))
            .max(1);
        let offset = (page - 1).saturating_mul(page_size);

        let mut sync = None;
        let mut sync_error = None;
        if query.force_full || (query.sync_first && !self.list_is_fresh(&folder).await) {
            match self
                .trigger_sync(
                    SyncTarget::Folder(folder.clone()),
                    query.background,
                    query.force_full,
                )
                .await
            {
                Ok(trigger) => sync = Some(trigger),
                Err(e) => {
                    warn!(folder = %folder, error = %e, "Pre-read sync failed, serving stored data");
                    sync_error = Some(e.to_string());
                }
            }
        }

        if let Some(snapshot) = self
            .cache
            .list(&self.user_email, &folder, page_size, offset)
            .await
        {
            debug!(folder = %folder, page, "List served from cache");
            return Ok(MessagePage {
                folder,
                page,
                page_size,
                total: snapshot.total,
                messages: snapshot.messages,
                last_synced_at: snapshot.last_synced_at,
                from_cache: true,
                sync,
                sync_error,
            });
        }

        let user_id = self.user_id().await?;
        let folder_id = self.store.get_or_create_folder(&folder, user_id).await?;
        let snapshot = ListSnapshot {
            messages: self
                .store
                .get_messages(user_id, folder_id, page_size, offset)
                .await?,
            total: self.store.get_message_count(user_id, folder_id).await?,
            last_synced_at: self
                .store
                .folder(&folder, user_id)
                .await?
                .and_then(|f| f.last_synced_at),
        };
        self.cache
            .put_list(&self.user_email, &folder, page_size, offset, &snapshot)
            .await;

        Ok(MessagePage {
            folder,
            page,
            page_size,
            total: snapshot.total,
            messages: snapshot.messages,
            last_synced_at: snapshot.last_synced_at,
            from_cache: false,
            sync,
            sync_error,
        })
    }

    /// Reads one message by local id, protocol id or protocol id prefix.
    ///
    /// A stored message without a body or with the placeholder sender is
    /// completed from the mailbox service first. If that fetch fails the
    /// stored record is returned as is.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no message matches.
    pub async fn get_message(&self, id: &str) -> Result<StoredMessage> {
        if let Some(message) = self.cache.detail(&self.user_email, id).await {
            return Ok(message);
        }

        let user_id = self.user_id().await?;
        let mut message = self
            .store
            .find_message(id, user_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("message {id}")))?;

        if message.body.is_none() || self.resolver.is_placeholder(&message.sender_address) {
            message = self.complete(message, user_id).await;
        }

        self.cache
            .put_detail(&self.user_email, id, &message)
            .await;
        Ok(message)
    }

    /// Marks a message read locally. Returns true if the flag changed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no message matches.
    pub async fn mark_read(&self, id: &str) -> Result<bool> {
        let user_id = self.user_id().await?;
        let message = self
            .store
            .find_message(id, user_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("message {id}")))?;

        let changed = self.store.mark_read(&message.protocol_id, user_id).await?;

        self.cache.invalidate_detail(&self.user_email, id).await;
        self.cache
            .invalidate_detail(&self.user_email, &message.protocol_id)
            .await;
        self.cache
            .invalidate_detail(&self.user_email, &message.id.to_string())
            .await;
        self.cache.invalidate_user_lists(&self.user_email).await;

        Ok(changed)
    }

    /// Runs or schedules a sync, unless one with the same key is in flight.
    ///
    /// # Errors
    ///
    /// In the foreground, returns the folder sync's error (for example an
    /// unreachable mailbox). Background failures are only logged.
    pub async fn trigger_sync(
        &self,
        target: SyncTarget,
        background: bool,
        force_full: bool,
    ) -> Result<SyncTrigger> {
        let key = match &target {
            SyncTarget::Folder(folder) => {
                JobKey::folder(&self.user_email, &WellKnownFolder::canonical_id(folder))
            }
            SyncTarget::All => JobKey::user(&self.user_email),
        };

        let Some(guard) = self.jobs.try_lock(key) else {
            info!(user = %self.user_email, ?target, "Sync already running");
            return Ok(SyncTrigger::AlreadyRunning);
        };

        if background {
            let sync = Arc::clone(&self.sync);
            self.runner.submit(async move {
                let _guard = guard;
                match target {
                    SyncTarget::Folder(folder) => {
                        if let Err(e) = sync.sync_folder_batched(&folder, force_full).await {
                            error!(folder = %folder, error = %e, "Background sync failed");
                        }
                    }
                    SyncTarget::All => {
                        let report = sync.sync_all(force_full).await;
                        info!(written = report.total_written(), "Background full sync finished");
                    }
                }
            });
            return Ok(SyncTrigger::Started);
        }

        let report = match target {
            SyncTarget::Folder(folder) => {
                SyncReport::Folder(self.sync.sync_folder_batched(&folder, force_full).await?)
            }
            SyncTarget::All => SyncReport::All(self.sync.sync_all(force_full).await),
        };
        drop(guard);
        Ok(SyncTrigger::Completed(report))
    }

    /// Re-resolves up to `batch` messages whose sender is missing or the
    /// placeholder. Returns the number fixed.
    ///
    /// # Errors
    ///
    /// Returns an error if the user cannot be resolved or the candidate
    /// query fails. Per-message failures are skipped.
    pub async fn repair_senders(&self, batch: usize) -> Result<usize> {
        let user_id = self.user_id().await?;
        let candidates = self
            .store
            .messages_missing_sender(user_id, &self.resolver.placeholder_address(), batch)
            .await?;

        let mut fixed = 0;
        for protocol_id in &candidates {
            let detail = match self.mailbox.fetch_detail(protocol_id).await {
                Ok(detail) => detail,
                Err(e) => {
                    warn!(protocol_id = %protocol_id, error = %e, "Repair fetch failed");
                    continue;
                }
            };

            let sender = self.resolver.resolve_sender(&detail);
            if sender.source == SenderSource::Placeholder {
                debug!(protocol_id = %protocol_id, "No sender recoverable");
                continue;
            }

            match self
                .store
                .update_sender(protocol_id, user_id, &sender.address, &sender.name)
                .await
            {
                Ok(true) => fixed += 1,
                Ok(false) => {}
                Err(e) => warn!(protocol_id = %protocol_id, error = %e, "Sender update failed"),
            }
        }

        if fixed > 0 {
            self.cache.invalidate_user_details(&self.user_email).await;
            self.cache.invalidate_user_lists(&self.user_email).await;
        }
        info!(candidates = candidates.len(), fixed, "Sender repair finished");
        Ok(fixed)
    }

    /// Messages stored in a folder.
    ///
    /// # Errors
    ///
    /// Returns an error if the user cannot be resolved or the store fails.
    pub async fn message_count(&self, folder: &str) -> Result<i64> {
        let folder = WellKnownFolder::canonical_id(folder);
        let user_id = self.user_id().await?;
        let folder_id = self.store.get_or_create_folder(&folder, user_id).await?;
        self.store.get_message_count(user_id, folder_id).await
    }

    async fn user_id(&self) -> Result<UserId> {
        self.store
            .resolve_user(&self.user_email, self.provisioning)
            .await
    }

    async fn list_is_fresh(&self, folder: &str) -> bool {
        let max_age = self.cache.config().fresh_max_age();
        self.cache
            .is_list_fresh(&self.user_email, folder, max_age)
            .await
    }

    /// Fetches the detail of a stored message and writes the resolved
    /// fields back, keeping whatever the detail response leaves out.
    async fn complete(&self, stored: StoredMessage, user_id: UserId) -> StoredMessage {
        let mut detail = match self.mailbox.fetch_detail(&stored.protocol_id).await {
            Ok(detail) => detail,
            Err(e) => {
                warn!(protocol_id = %stored.protocol_id, error = %e, "Detail fetch failed, serving stored record");
                return stored;
            }
        };
        detail.fill_from(&self.known_fields(&stored));

        let resolution = self.resolver.resolve(&detail);
        let record = MessageRecord::from_resolved(&detail, resolution, true);
        let written = self
            .store
            .upsert_message(&record, user_id, stored.folder_id, ReadFlagPolicy::PreserveLocal)
            .await;
        if let Err(e) = written {
            warn!(protocol_id = %stored.protocol_id, error = %e, "Could not store completed message");
            return stored;
        }

        self.cache.invalidate_user_lists(&self.user_email).await;
        match self.store.get_message_by_id(&stored.protocol_id, user_id).await {
            Ok(message) => message,
            Err(e) => {
                warn!(protocol_id = %stored.protocol_id, error = %e, "Re-read after completion failed");
                stored
            }
        }
    }

    /// Stored fields as a summary, for filling gaps in a detail response.
    fn known_fields(&self, stored: &StoredMessage) -> MessageSummary {
        let from = (!self.resolver.is_placeholder(&stored.sender_address)).then(|| {
            MailboxAddress::new(stored.sender_name.clone(), stored.sender_address.clone())
        });
        MessageSummary {
            protocol_id: stored.protocol_id.clone(),
            subject: Some(stored.subject.clone()),
            from,
            sender: None,
            received_at: stored.received_at,
            is_read: stored.is_read,
            has_attachments: stored.has_attachments,
            body: None,
            internet_message_id: stored.internet_message_id.clone(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::DeskConfig;
    use crate::mailbox::{MailboxError, MessageDetail};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FixedMailbox {
        inbox: Vec<MessageSummary>,
        details: HashMap<String, MessageDetail>,
        detail_calls: Mutex<usize>,
    }

    #[async_trait]
    impl MailboxService for FixedMailbox {
        async fn fetch_page(
            &self,
            folder: &str,
            page_size: usize,
            offset: usize,
            _since: Option<DateTime<Utc>>,
        ) -> std::result::Result<Vec<MessageSummary>, MailboxError> {
            if folder != "INBOX" {
                return Ok(Vec::new());
            }
            Ok(self.inbox.iter().skip(offset).take(page_size).cloned().collect())
        }

        async fn fetch_detail(
            &self,
            protocol_id: &str,
        ) -> std::result::Result<MessageDetail, MailboxError> {
            *self.detail_calls.lock().unwrap() += 1;
            self.details
                .get(protocol_id)
                .cloned()
                .ok_or_else(|| MailboxError::NotFound(protocol_id.to_string()))
        }
    }

    fn summary(id: &str, body: Option<&str>) -> MessageSummary {
        MessageSummary {
            protocol_id: id.to_string(),
            subject: Some(format!("Estimate {id}")),
            from: Some(MailboxAddress::new("Jane", "jane@example.com")),
            received_at: Some(Utc::now()),
            body: body.map(str::to_string),
            ..MessageSummary::default()
        }
    }

    async fn desk(mailbox: FixedMailbox) -> MailDesk {
        let resources = DeskResources::open(DeskConfig::default()).await.unwrap();
        resources.desk("Owner@Example.com", Arc::new(mailbox))
    }

    #[tokio::test]
    async fn test_list_syncs_then_serves_cache() {
        let mailbox = FixedMailbox {
            inbox: vec![summary("a", Some("hi")), summary("b", Some("there"))],
            ..FixedMailbox::default()
        };
        let desk = desk(mailbox).await;

        let query = ListQuery {
            sync_first: true,
            ..ListQuery::folder("inbox")
        };
        let first = desk.list_messages(&query).await.unwrap();
        assert_eq!(first.folder, "INBOX");
        assert_eq!(first.total, 2);
        assert!(!first.from_cache);
        assert!(matches!(first.sync, Some(SyncTrigger::Completed(_))));
        assert!(first.last_synced_at.is_some());

        let second = desk.list_messages(&query).await.unwrap();
        assert!(second.from_cache);
        assert!(second.sync.is_none());
        assert_eq!(second.messages, first.messages);
    }

    #[tokio::test]
    async fn test_get_message_completes_missing_body() {
        let mut details = HashMap::new();
        details.insert(
            "a".to_string(),
            MessageDetail {
                summary: MessageSummary {
                    body: Some("<p>Full estimate</p>".into()),
                    ..MessageSummary::default()
                },
                ..MessageDetail::default()
            },
        );
        let mailbox = FixedMailbox {
            details,
            ..FixedMailbox::default()
        };
        let desk = desk(mailbox).await;

        let user_id = desk.user_id().await.unwrap();
        let folder_id = desk.store.get_or_create_folder("INBOX", user_id).await.unwrap();
        let detail = MessageDetail::from(summary("a", None));
        let record = MessageRecord::from_resolved(&detail, desk.resolver.resolve(&detail), false);
        desk.store
            .upsert_message(&record, user_id, folder_id, ReadFlagPolicy::PreserveLocal)
            .await
            .unwrap();

        let message = desk.get_message("a").await.unwrap();
        assert_eq!(message.body.as_deref(), Some("<p>Full estimate</p>"));
        assert_eq!(message.subject, "Estimate a");
        assert_eq!(message.sender_address, "jane@example.com");

        let again = desk.get_message("a").await.unwrap();
        assert_eq!(again, message);
    }

    #[tokio::test]
    async fn test_get_message_unknown_id() {
        let desk = desk(FixedMailbox::default()).await;
        assert!(matches!(desk.get_message("nope").await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_mark_read_by_local_id() {
        let mailbox = FixedMailbox {
            inbox: vec![summary("a", Some("hi"))],
            ..FixedMailbox::default()
        };
        let desk = desk(mailbox).await;
        desk.trigger_sync(SyncTarget::Folder("INBOX".into()), false, true)
            .await
            .unwrap();

        let stored = desk.get_message("a").await.unwrap();
        assert!(!stored.is_read);

        assert!(desk.mark_read(&stored.id.to_string()).await.unwrap());
        assert!(!desk.mark_read("a").await.unwrap());
        assert!(desk.get_message("a").await.unwrap().is_read);
    }

    #[tokio::test]
    async fn test_repair_senders() {
        let mut details = HashMap::new();
        details.insert(
            "a".to_string(),
            MessageDetail {
                raw: Some("From: Roof Supply <orders@roofsupply.example>\r\n\r\nInvoice".into()),
                ..MessageDetail::default()
            },
        );
        let mut anonymous = summary("a", Some("Invoice"));
        anonymous.from = None;
        let mailbox = FixedMailbox {
            inbox: vec![anonymous, summary("b", Some("hi"))],
            details,
            ..FixedMailbox::default()
        };
        let desk = desk(mailbox).await;
        desk.trigger_sync(SyncTarget::Folder("INBOX".into()), false, true)
            .await
            .unwrap();

        assert_eq!(desk.repair_senders(10).await.unwrap(), 1);
        let user_id = desk.user_id().await.unwrap();
        let fixed = desk.store.get_message_by_id("a", user_id).await.unwrap();
        assert_eq!(fixed.sender_address, "orders@roofsupply.example");
        assert_eq!(fixed.sender_name, "Roof Supply");
        assert_eq!(desk.repair_senders(10).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_message_count() {
        let mailbox = FixedMailbox {
            inbox: vec![summary("a", Some("1")), summary("b", Some("2"))],
            ..FixedMailbox::default()
        };
        let desk = desk(mailbox).await;
        assert_eq!(desk.message_count("inbox").await.unwrap(), 0);
        desk.trigger_sync(SyncTarget::All, false, false).await.unwrap();
        assert_eq!(desk.message_count("inbox").await.unwrap(), 2);
        assert_eq!(desk.message_count("junk").await.unwrap(), 0);
    }
}

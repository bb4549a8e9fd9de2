//! Sync orchestration.
//!
//! A folder sync resolves the local user and folder, pulls one page from the
//! mailbox service, hydrates summaries that lack a body, runs the resolver,
//! and upserts each item. Per-item failures are counted and skipped; only a
//! failure to reach the mailbox service aborts the call.

mod report;

pub use report::{FolderSyncResult, SyncAllReport, SyncOutcome};

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use tracing::{debug, error, info, warn};

use crate::cache::MailCache;
use crate::config::{SyncConfig, UserProvisioning};
use crate::mailbox::{MailboxService, MessageDetail, MessageSummary, WellKnownFolder};
use crate::resolve::Resolver;
use crate::store::{FolderId, MailStore, MessageRecord, ReadFlagPolicy, UserId};
use crate::Result;

/// Pulls one user's mailbox into the local store.
pub struct SyncOrchestrator {
    user_email: String,
    mailbox: Arc<dyn MailboxService>,
    store: MailStore,
    cache: MailCache,
    resolver: Resolver,
    config: SyncConfig,
    provisioning: UserProvisioning,
}

impl std::fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("user_email", &self.user_email)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Target of one page fetch.
struct FolderTarget<'a> {
    folder: &'a str,
    user_id: UserId,
    folder_id: FolderId,
    since: Option<DateTime<Utc>>,
    read_policy: ReadFlagPolicy,
}

impl SyncOrchestrator {
    /// Creates an orchestrator for one mailbox principal.
    #[must_use]
    pub fn new(
        user_email: impl Into<String>,
        mailbox: Arc<dyn MailboxService>,
        store: MailStore,
        cache: MailCache,
        resolver: Resolver,
        config: SyncConfig,
        provisioning: UserProvisioning,
    ) -> Self {
        Self {
            user_email: user_email.into(),
            mailbox,
            store,
            cache,
            resolver,
            config,
            provisioning,
        }
    }

    /// The principal this orchestrator syncs.
    #[must_use]
    pub fn user_email(&self) -> &str {
        &self.user_email
    }

    /// Sync tuning.
    #[must_use]
    pub const fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Syncs one page of a folder.
    ///
    /// Unless `force_full` is set, only items received after the folder's
    /// last sync are kept, whether or not the service filtered them. The
    /// folder's last sync time advances only when the page starts at offset
    /// zero and exhausts the window, so a full page leaves older unseen
    /// items reachable by the next incremental sync.
    ///
    /// # Errors
    ///
    /// Returns an error if the user cannot be resolved, the store fails on
    /// folder bookkeeping, or the mailbox service cannot be reached.
    pub async fn sync_folder(
        &self,
        folder: &str,
        page_size: usize,
        offset: usize,
        force_full: bool,
    ) -> Result<SyncOutcome> {
        let folder = WellKnownFolder::canonical_id(folder);
        let started_at = Utc::now();
        let target = self.prepare(&folder, force_full).await?;

        let mut outcome = self.process_page(&target, page_size, offset).await?;
        outcome.complete &= offset == 0;
        self.finish(&target, started_at, outcome).await
    }

    /// Syncs a folder in bounded batches.
    ///
    /// Batches continue while every item of the previous page fell inside
    /// the sync window, up to `max_batches`. If the cap is hit first, the
    /// folder's last sync time is left where it was.
    ///
    /// # Errors
    ///
    /// Returns an error if any page cannot be fetched or folder bookkeeping
    /// fails. Items written by earlier batches stay stored, but the folder's
    /// last sync time does not advance, so the next incremental sync covers
    /// the same window again.
    pub async fn sync_folder_batched(&self, folder: &str, force_full: bool) -> Result<SyncOutcome> {
        let folder = WellKnownFolder::canonical_id(folder);
        let page_size = self.config.page_size_for(&folder);
        let started_at = Utc::now();
        let target = self.prepare(&folder, force_full).await?;

        let mut total = SyncOutcome::new(&folder);
        for batch in 0..self.config.max_batches {
            if batch > 0 && !self.config.batch_delay().is_zero() {
                tokio::time::sleep(self.config.batch_delay()).await;
            }

            let page = match self.process_page(&target, page_size, batch * page_size).await {
                Ok(page) => page,
                Err(e) => {
                    if total.written > 0 {
                        warn!(
                            folder = %folder,
                            batch,
                            written = total.written,
                            error = %e,
                            "Batch failed, keeping last sync time"
                        );
                        self.cache.invalidate_user_lists(&self.user_email).await;
                        self.cache.invalidate_user_details(&self.user_email).await;
                    }
                    return Err(e);
                }
            };

            total.absorb(&page);
            if page.complete {
                break;
            }
            if batch + 1 == self.config.max_batches {
                info!(folder = %folder, batches = total.batches, "Batch cap reached");
            }
        }

        self.finish(&target, started_at, total).await
    }

    /// Syncs every well-known folder in turn.
    ///
    /// A failing folder is recorded in the report and the rest still run.
    pub async fn sync_all(&self, force_full: bool) -> SyncAllReport {
        let mut folders = BTreeMap::new();
        for folder in WellKnownFolder::ALL {
            let result = match self.sync_folder_batched(folder.id(), force_full).await {
                Ok(outcome) => FolderSyncResult::Synced(outcome),
                Err(e) => {
                    error!(folder = %folder, error = %e, "Folder sync failed");
                    FolderSyncResult::Failed(e.to_string())
                }
            };
            folders.insert(folder.id().to_string(), result);
        }
        SyncAllReport { folders }
    }

    async fn prepare<'a>(&self, folder: &'a str, force_full: bool) -> Result<FolderTarget<'a>> {
        let user_id = self
            .store
            .resolve_user(&self.user_email, self.provisioning)
            .await?;
        let folder_id = self.store.get_or_create_folder(folder, user_id).await?;
        let since = if force_full {
            None
        } else {
            self.store
                .folder(folder, user_id)
                .await?
                .and_then(|f| f.last_synced_at)
        };

        let read_policy = if force_full || !self.config.preserve_local_read {
            ReadFlagPolicy::Overwrite
        } else {
            ReadFlagPolicy::PreserveLocal
        };

        debug!(folder, ?since, force_full, "Prepared folder sync");
        Ok(FolderTarget {
            folder,
            user_id,
            folder_id,
            since,
            read_policy,
        })
    }

    async fn process_page(
        &self,
        target: &FolderTarget<'_>,
        page_size: usize,
        offset: usize,
    ) -> Result<SyncOutcome> {
        let summaries = self
            .mailbox
            .fetch_page(target.folder, page_size, offset, target.since)
            .await
            .inspect_err(|e| error!(folder = target.folder, error = %e, "Mailbox unreachable"))?;

        let mut outcome = SyncOutcome::new(target.folder);
        outcome.batches = 1;
        outcome.fetched = summaries.len();

        let accepted: Vec<MessageSummary> = summaries
            .into_iter()
            .filter(|s| s.is_newer_than(target.since))
            .collect();
        outcome.accepted = accepted.len();
        outcome.complete = outcome.fetched < page_size || outcome.accepted < outcome.fetched;

        let hydrated: Vec<(MessageDetail, bool)> = futures::stream::iter(accepted)
            .map(|summary| self.hydrate(summary))
            .buffer_unordered(self.config.detail_concurrency.max(1))
            .collect()
            .await;

        for (detail, has_detail) in hydrated {
            if !has_detail {
                outcome.detail_failures += 1;
            }
            if detail.summary.protocol_id.trim().is_empty() {
                warn!(folder = target.folder, "Skipping item without a protocol id");
                outcome.skipped += 1;
                continue;
            }

            let resolution = self.resolver.resolve(&detail);
            let record = MessageRecord::from_resolved(&detail, resolution, has_detail);
            match self
                .store
                .upsert_message(&record, target.user_id, target.folder_id, target.read_policy)
                .await
            {
                Ok(_) => outcome.written += 1,
                Err(e) => {
                    warn!(protocol_id = %record.protocol_id, error = %e, "Upsert failed, skipping item");
                    outcome.skipped += 1;
                }
            }
        }

        debug!(
            folder = target.folder,
            offset,
            fetched = outcome.fetched,
            written = outcome.written,
            "Page processed"
        );
        Ok(outcome)
    }

    /// Returns the detail for a summary, or the summary alone (flagged
    /// incomplete) if the detail fetch fails.
    async fn hydrate(&self, summary: MessageSummary) -> (MessageDetail, bool) {
        if summary.has_body() {
            return (MessageDetail::from(summary), true);
        }
        match self.mailbox.fetch_detail(&summary.protocol_id).await {
            Ok(mut detail) => {
                detail.fill_from(&summary);
                (detail, true)
            }
            Err(e) => {
                warn!(protocol_id = %summary.protocol_id, error = %e, "Detail fetch failed, keeping summary");
                (MessageDetail::from(summary), false)
            }
        }
    }

    async fn finish(
        &self,
        target: &FolderTarget<'_>,
        started_at: DateTime<Utc>,
        outcome: SyncOutcome,
    ) -> Result<SyncOutcome> {
        if outcome.complete {
            self.store
                .record_folder_sync(target.folder_id, started_at, outcome.written)
                .await?;
        } else {
            debug!(folder = target.folder, "Window not exhausted, keeping last sync time");
        }
        self.cache.invalidate_user_lists(&self.user_email).await;
        if outcome.written > 0 {
            self.cache.invalidate_user_details(&self.user_email).await;
        }

        info!(
            folder = target.folder,
            fetched = outcome.fetched,
            written = outcome.written,
            skipped = outcome.skipped,
            incremental = target.since.is_some(),
            complete = outcome.complete,
            "Folder sync complete"
        );
        Ok(outcome)
    }
}

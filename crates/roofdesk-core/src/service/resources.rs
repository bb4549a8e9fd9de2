//! Process-wide resources shared by every desk.

use std::sync::Arc;

use tracing::info;

use crate::cache::MailCache;
use crate::config::DeskConfig;
use crate::jobs::{BackgroundRunner, JobCoordinator};
use crate::mailbox::MailboxService;
use crate::store::MailStore;
use crate::Result;

use super::MailDesk;

/// Store, cache, job registry and worker pool, opened once per process and
/// shared by all users.
#[derive(Debug, Clone)]
pub struct DeskResources {
    pub(super) store: MailStore,
    pub(super) cache: MailCache,
    pub(super) jobs: Arc<JobCoordinator>,
    pub(super) runner: BackgroundRunner,
    pub(super) config: Arc<DeskConfig>,
}

impl DeskResources {
    /// Opens the store and cache named in the configuration.
    ///
    /// Without a `database_path` the store lives in memory.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the database
    /// cannot be opened. An unavailable cache is not an error.
    pub async fn open(config: DeskConfig) -> Result<Self> {
        config.validate()?;
        let store = match &config.database_path {
            Some(path) => MailStore::new(&path.to_string_lossy()).await?,
            None => MailStore::in_memory().await?,
        };
        let cache = MailCache::open(config.cache.clone()).await;
        info!(
            database = ?config.database_path,
            workers = config.sync.background_workers,
            "Desk resources ready"
        );
        Ok(Self::new(store, cache, config))
    }

    /// Assembles resources from an already opened store and cache.
    #[must_use]
    pub fn new(store: MailStore, cache: MailCache, config: DeskConfig) -> Self {
        Self {
            store,
            cache,
            jobs: Arc::new(JobCoordinator::new()),
            runner: BackgroundRunner::new(config.sync.background_workers),
            config: Arc::new(config),
        }
    }

    /// Desk for one mailbox principal.
    #[must_use]
    pub fn desk(&self, user_email: &str, mailbox: Arc<dyn MailboxService>) -> MailDesk {
        MailDesk::new(self, user_email, mailbox)
    }

    /// The persistence layer.
    #[must_use]
    pub const fn store(&self) -> &MailStore {
        &self.store
    }

    /// The read cache.
    #[must_use]
    pub const fn cache(&self) -> &MailCache {
        &self.cache
    }

    /// The sync job registry.
    #[must_use]
    pub const fn jobs(&self) -> &Arc<JobCoordinator> {
        &self.jobs
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &DeskConfig {
        &self.config
    }
}

//! Read cache for message lists and details.
//!
//! The cache is an optimisation only. Every backend failure is logged and
//! turned into a miss or a no-op; nothing in here returns an error.
//!
//! Key families (user emails are lowercased):
//! - `emails:{user}:{folder}:{limit}:{offset}` - one page of a folder list
//! - `emails:timestamp:{user}:{folder}` - when a page of that folder was last cached
//! - `email:{user}:{id}` - one message detail, keyed by the id the caller used

mod kv;
mod sqlite;

pub use kv::{CacheError, DisabledKvStore, KvStore, MemoryKvStore};
pub use sqlite::SqliteKvStore;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{CacheBackend, CacheConfig};
use crate::store::{MessageListItem, StoredMessage};

/// A cached page of a folder list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListSnapshot {
    /// Messages on the page.
    pub messages: Vec<MessageListItem>,
    /// Total messages in the folder.
    pub total: i64,
    /// When the folder was last synced.
    pub last_synced_at: Option<DateTime<Utc>>,
}

/// Typed, failure-tolerant cache facade.
#[derive(Clone)]
pub struct MailCache {
    kv: Arc<dyn KvStore>,
    config: CacheConfig,
}

impl std::fmt::Debug for MailCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailCache")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl MailCache {
    /// Wraps an existing backend.
    #[must_use]
    pub fn new(kv: Arc<dyn KvStore>, config: CacheConfig) -> Self {
        Self { kv, config }
    }

    /// Opens the backend named in the configuration.
    ///
    /// A backend that cannot be opened is logged and replaced with a
    /// disabled cache.
    pub async fn open(config: CacheConfig) -> Self {
        let kv: Arc<dyn KvStore> = match &config.backend {
            CacheBackend::Memory => Arc::new(MemoryKvStore::new()),
            CacheBackend::Disabled => Arc::new(DisabledKvStore),
            CacheBackend::Sqlite { path } => {
                match SqliteKvStore::new(&path.to_string_lossy()).await {
                    Ok(store) => Arc::new(store),
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Cache backend unavailable, caching disabled");
                        Arc::new(DisabledKvStore)
                    }
                }
            }
        };
        Self::new(kv, config)
    }

    /// A cache that never stores anything.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(
            Arc::new(DisabledKvStore),
            CacheConfig {
                backend: CacheBackend::Disabled,
                ..CacheConfig::default()
            },
        )
    }

    /// Cache settings.
    #[must_use]
    pub const fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Gets and deserializes a value. Failures are misses.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.kv.get(key).await {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(key, error = %e, "Cache read failed");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "Discarding undecodable cache entry");
                self.invalidate(key).await;
                None
            }
        }
    }

    /// Serializes and stores a value. Failures are ignored.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key, error = %e, "Cache value not serializable");
                return;
            }
        };
        if let Err(e) = self.kv.set(key, raw, ttl).await {
            warn!(key, error = %e, "Cache write failed");
        }
    }

    /// Removes one key.
    pub async fn invalidate(&self, key: &str) {
        if let Err(e) = self.kv.delete(key).await {
            warn!(key, error = %e, "Cache invalidation failed");
        }
    }

    /// Removes every key starting with `prefix`.
    pub async fn invalidate_prefix(&self, prefix: &str) {
        match self.kv.delete_prefix(prefix).await {
            Ok(removed) => debug!(prefix, removed, "Cache prefix invalidated"),
            Err(e) => warn!(prefix, error = %e, "Cache prefix invalidation failed"),
        }
    }

    /// Cached page of a folder list.
    pub async fn list(
        &self,
        user: &str,
        folder: &str,
        limit: usize,
        offset: usize,
    ) -> Option<ListSnapshot> {
        self.get(&list_key(user, folder, limit, offset)).await
    }

    /// Caches a page of a folder list and stamps the folder as fresh.
    pub async fn put_list(
        &self,
        user: &str,
        folder: &str,
        limit: usize,
        offset: usize,
        snapshot: &ListSnapshot,
    ) {
        let ttl = self.config.list_ttl();
        self.set(&list_key(user, folder, limit, offset), snapshot, ttl)
            .await;
        self.set(&list_timestamp_key(user, folder), &Utc::now(), ttl)
            .await;
    }

    /// Returns true if a page of the folder was cached less than `max_age`
    /// ago.
    pub async fn is_list_fresh(&self, user: &str, folder: &str, max_age: Duration) -> bool {
        let Some(cached_at) = self
            .get::<DateTime<Utc>>(&list_timestamp_key(user, folder))
            .await
        else {
            return false;
        };
        let max_age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
        Utc::now().signed_duration_since(cached_at) < max_age
    }

    /// Cached message detail.
    pub async fn detail(&self, user: &str, id: &str) -> Option<StoredMessage> {
        self.get(&detail_key(user, id)).await
    }

    /// Caches a message detail.
    pub async fn put_detail(&self, user: &str, id: &str, message: &StoredMessage) {
        self.set(&detail_key(user, id), message, self.config.detail_ttl())
            .await;
    }

    /// Drops every cached list page and freshness stamp of a user.
    pub async fn invalidate_user_lists(&self, user: &str) {
        let user = normalize(user);
        self.invalidate_prefix(&format!("emails:{user}:")).await;
        self.invalidate_prefix(&format!("emails:timestamp:{user}:"))
            .await;
    }

    /// Drops one cached message detail.
    pub async fn invalidate_detail(&self, user: &str, id: &str) {
        self.invalidate(&detail_key(user, id)).await;
    }

    /// Drops every cached message detail of a user.
    pub async fn invalidate_user_details(&self, user: &str) {
        self.invalidate_prefix(&format!("email:{}:", normalize(user)))
            .await;
    }
}

fn normalize(user: &str) -> String {
    user.trim().to_lowercase()
}

fn list_key(user: &str, folder: &str, limit: usize, offset: usize) -> String {
    format!("emails:{}:{folder}:{limit}:{offset}", normalize(user))
}

fn list_timestamp_key(user: &str, folder: &str) -> String {
    format!("emails:timestamp:{}:{folder}", normalize(user))
}

fn detail_key(user: &str, id: &str) -> String {
    format!("email:{}:{id}", normalize(user))
}

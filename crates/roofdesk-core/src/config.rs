//! Desk configuration.
//!
//! Every field has a default, so an empty JSON object (or no file at all)
//! yields a working configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::mailbox::WellKnownFolder;
use crate::{Error, Result};

/// Upper bound for cache lifetimes, in seconds (30 days).
pub const MAX_CACHE_SECS: u64 = 30 * 24 * 60 * 60;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeskConfig {
    /// `SQLite` database file. `None` lets the caller choose a location.
    pub database_path: Option<PathBuf>,
    /// How unknown users are handled.
    pub users: UserProvisioning,
    /// Placeholder sender settings.
    pub resolver: ResolverConfig,
    /// Sync tuning.
    pub sync: SyncConfig,
    /// Read cache.
    pub cache: CacheConfig,
}

impl DeskConfig {
    /// Parses configuration from JSON text.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or a value is out of range.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a file, returning defaults if it does not
    /// exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.sync.detail_concurrency == 0 {
            return Err(Error::Config("sync.detail_concurrency must be at least 1".into()));
        }
        if self.sync.background_workers == 0 {
            return Err(Error::Config("sync.background_workers must be at least 1".into()));
        }
        if self.sync.max_batches == 0 {
            return Err(Error::Config("sync.max_batches must be at least 1".into()));
        }
        if let Some((folder, _)) = self.sync.page_sizes.iter().find(|(_, size)| **size == 0) {
            return Err(Error::Config(format!("sync.page_sizes.{folder} must be at least 1")));
        }
        for (field, secs) in [
            ("list_ttl_secs", self.cache.list_ttl_secs),
            ("detail_ttl_secs", self.cache.detail_ttl_secs),
            ("fresh_secs", self.cache.fresh_secs),
        ] {
            if secs > MAX_CACHE_SECS {
                return Err(Error::Config(format!(
                    "cache.{field} must be at most {MAX_CACHE_SECS}"
                )));
            }
        }
        if self.resolver.service_domain.trim().is_empty() {
            return Err(Error::Config("resolver.service_domain cannot be empty".into()));
        }
        Ok(())
    }
}

/// User provisioning policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserProvisioning {
    /// Create the user row on first sync.
    #[default]
    AutoCreate,
    /// Users must already exist; unknown principals are rejected.
    External,
}

/// Placeholder sender used when no sender can be recovered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Domain of the mailbox service itself.
    pub service_domain: String,
    /// Display name of the placeholder sender.
    pub placeholder_name: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            service_domain: "mailbox.local".to_string(),
            placeholder_name: "Unknown Sender".to_string(),
        }
    }
}

impl ResolverConfig {
    /// Placeholder sender address.
    #[must_use]
    pub fn placeholder_address(&self) -> String {
        format!("no-sender@{}", self.service_domain.trim())
    }
}

/// Sync tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Batch size per protocol folder id.
    pub page_sizes: BTreeMap<String, usize>,
    /// Batch size for folders not listed in `page_sizes`.
    pub default_page_size: usize,
    /// Hard cap on batches per batched sync.
    pub max_batches: usize,
    /// Pause between batches, in milliseconds.
    pub batch_delay_ms: u64,
    /// Parallel detail fetches within one page.
    pub detail_concurrency: usize,
    /// Concurrent background sync tasks.
    pub background_workers: usize,
    /// Keep a locally set read flag during incremental syncs.
    pub preserve_local_read: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_sizes: WellKnownFolder::ALL
                .iter()
                .map(|f| (f.id().to_string(), f.default_page_size()))
                .collect(),
            default_page_size: 50,
            max_batches: 20,
            batch_delay_ms: 0,
            detail_concurrency: 10,
            background_workers: 2,
            preserve_local_read: true,
        }
    }
}

impl SyncConfig {
    /// Batch size for a protocol folder id.
    #[must_use]
    pub fn page_size_for(&self, folder: &str) -> usize {
        self.page_sizes
            .get(folder)
            .copied()
            .unwrap_or(self.default_page_size)
            .max(1)
    }

    /// Pause between batches.
    #[must_use]
    pub const fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }
}

/// Cache backend selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CacheBackend {
    /// Process-local map.
    #[default]
    Memory,
    /// `SQLite` table that survives restarts.
    Sqlite {
        /// Database file.
        path: PathBuf,
    },
    /// No caching.
    Disabled,
}

/// Cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Backend.
    pub backend: CacheBackend,
    /// TTL of message list entries, in seconds.
    pub list_ttl_secs: u64,
    /// TTL of message detail entries, in seconds.
    pub detail_ttl_secs: u64,
    /// Max age of a list entry for it to count as fresh enough to skip a
    /// sync, in seconds.
    pub fresh_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory,
            list_ttl_secs: 300,
            detail_ttl_secs: 600,
            fresh_secs: 60,
        }
    }
}

impl CacheConfig {
    /// TTL of message list entries.
    #[must_use]
    pub const fn list_ttl(&self) -> Duration {
        Duration::from_secs(self.list_ttl_secs)
    }

    /// TTL of message detail entries.
    #[must_use]
    pub const fn detail_ttl(&self) -> Duration {
        Duration::from_secs(self.detail_ttl_secs)
    }

    /// Freshness window for skip-sync decisions.
    #[must_use]
    pub const fn fresh_max_age(&self) -> Duration {
        Duration::from_secs(self.fresh_secs)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_is_default() {
        let config = DeskConfig::from_json("{}").unwrap();
        assert_eq!(config, DeskConfig::default());
        assert_eq!(config.users, UserProvisioning::AutoCreate);
        assert_eq!(config.sync.page_size_for("INBOX"), 50);
        assert_eq!(config.sync.page_size_for("DRAFTS"), 25);
        assert_eq!(config.sync.page_size_for("Custom"), 50);
        assert_eq!(config.resolver.placeholder_address(), "no-sender@mailbox.local");
    }

    #[test]
    fn test_partial_override() {
        let config = DeskConfig::from_json(
            r#"{
                "users": "external",
                "resolver": { "service_domain": "weroof.example" },
                "sync": { "max_batches": 3 },
                "cache": { "backend": { "kind": "sqlite", "path": "/tmp/kv.db" }, "fresh_secs": 5 }
            }"#,
        )
        .unwrap();
        assert_eq!(config.users, UserProvisioning::External);
        assert_eq!(config.resolver.placeholder_name, "Unknown Sender");
        assert_eq!(config.resolver.placeholder_address(), "no-sender@weroof.example");
        assert_eq!(config.sync.max_batches, 3);
        assert_eq!(config.sync.detail_concurrency, 10);
        assert_eq!(
            config.cache.backend,
            CacheBackend::Sqlite { path: PathBuf::from("/tmp/kv.db") }
        );
        assert_eq!(config.cache.fresh_max_age(), Duration::from_secs(5));
        assert_eq!(config.cache.list_ttl(), Duration::from_secs(300));
    }

    #[test]
    fn test_disabled_backend() {
        let config = DeskConfig::from_json(r#"{"cache": {"backend": {"kind": "disabled"}}}"#).unwrap();
        assert_eq!(config.cache.backend, CacheBackend::Disabled);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            DeskConfig::from_json(r#"{"sync": {"detail_concurrency": 0}}"#),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            DeskConfig::from_json(r#"{"sync": {"page_sizes": {"INBOX": 0}}}"#),
            Err(Error::Config(_))
        ));
        assert!(matches!(DeskConfig::from_json("not json"), Err(Error::Serde(_))));
    }

    #[test]
    fn test_cache_lifetimes_are_bounded() {
        assert!(matches!(
            DeskConfig::from_json(r#"{"cache": {"list_ttl_secs": 18446744073709551615}}"#),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            DeskConfig::from_json(r#"{"cache": {"detail_ttl_secs": 2592001}}"#),
            Err(Error::Config(_))
        ));
        let config = DeskConfig::from_json(r#"{"cache": {"detail_ttl_secs": 2592000}}"#).unwrap();
        assert_eq!(config.cache.detail_ttl(), Duration::from_secs(MAX_CACHE_SECS));
    }

    #[test]
    fn test_missing_file_is_default() {
        let config = DeskConfig::load(Path::new("/nonexistent/roofdesk/config.json")).unwrap();
        assert_eq!(config, DeskConfig::default());
    }
}

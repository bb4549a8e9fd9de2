//! Sync outcome types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Counters for one folder sync.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOutcome {
    /// Protocol folder id.
    pub folder: String,
    /// Items returned by the mailbox service.
    pub fetched: usize,
    /// Items inside the sync window.
    pub accepted: usize,
    /// Items written to the store.
    pub written: usize,
    /// Items dropped because they had no id or the write failed.
    pub skipped: usize,
    /// Items stored without a body because the detail fetch failed.
    pub detail_failures: usize,
    /// Pages fetched.
    pub batches: usize,
    /// True if the sync window was exhausted. Only then does the folder's
    /// last sync time advance.
    #[serde(default)]
    pub complete: bool,
}

impl SyncOutcome {
    pub(crate) fn new(folder: &str) -> Self {
        Self {
            folder: folder.to_string(),
            ..Self::default()
        }
    }

    pub(crate) fn absorb(&mut self, page: &Self) {
        self.fetched += page.fetched;
        self.accepted += page.accepted;
        self.written += page.written;
        self.skipped += page.skipped;
        self.detail_failures += page.detail_failures;
        self.batches += page.batches;
        self.complete = page.complete;
    }
}

/// Result of one folder inside a full sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum FolderSyncResult {
    /// The folder synced.
    Synced(SyncOutcome),
    /// The folder failed; other folders were unaffected.
    Failed(String),
}

/// Per-folder results of a full sync, keyed by protocol folder id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncAllReport {
    /// Folder results.
    pub folders: BTreeMap<String, FolderSyncResult>,
}

impl SyncAllReport {
    /// Items written across all folders.
    #[must_use]
    pub fn total_written(&self) -> usize {
        self.folders
            .values()
            .map(|r| match r {
                FolderSyncResult::Synced(o) => o.written,
                FolderSyncResult::Failed(_) => 0,
            })
            .sum()
    }

    /// Folders that failed, with their error text.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &str)> {
        self.folders.iter().filter_map(|(folder, r)| match r {
            FolderSyncResult::Failed(e) => Some((folder.as_str(), e.as_str())),
            FolderSyncResult::Synced(_) => None,
        })
    }
}

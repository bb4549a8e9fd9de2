//! Per-key job deduplication.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

/// Identity of a sync job.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobKey(String);

impl JobKey {
    /// Job syncing one folder of one user.
    #[must_use]
    pub fn folder(user: &str, folder: &str) -> Self {
        Self(format!("sync:{}:{folder}", user.trim().to_lowercase()))
    }

    /// Job syncing every folder of one user.
    #[must_use]
    pub fn user(user: &str) -> Self {
        Self(format!("sync:{}", user.trim().to_lowercase()))
    }

    /// Key text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Registry of in-flight job keys.
///
/// Advisory and process-local: it deduplicates work inside one process and
/// offers no protection across processes.
#[derive(Debug, Default)]
pub struct JobCoordinator {
    running: Mutex<HashSet<JobKey>>,
}

impl JobCoordinator {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `key` as running. Returns false without blocking if it already
    /// is.
    pub fn try_acquire(&self, key: &JobKey) -> bool {
        let acquired = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone());
        debug!(job = %key, acquired, "Job acquire attempt");
        acquired
    }

    /// Marks `key` as no longer running. Releasing a key that is not held is
    /// a no-op.
    pub fn release(&self, key: &JobKey) {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        debug!(job = %key, "Job released");
    }

    /// Returns true if `key` is currently held.
    #[must_use]
    pub fn is_running(&self, key: &JobKey) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }

    /// Acquires `key` and returns a guard that releases it on drop.
    #[must_use]
    pub fn try_lock(self: &Arc<Self>, key: JobKey) -> Option<JobGuard> {
        self.try_acquire(&key).then(|| JobGuard {
            coordinator: Arc::clone(self),
            key,
        })
    }
}

/// Holds a job key until dropped.
#[derive(Debug)]
pub struct JobGuard {
    coordinator: Arc<JobCoordinator>,
    key: JobKey,
}

impl JobGuard {
    /// The held key.
    #[must_use]
    pub const fn key(&self) -> &JobKey {
        &self.key
    }
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        self.coordinator.release(&self.key);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_release() {
        let jobs = JobCoordinator::new();
        let key = JobKey::folder("owner@example.com", "INBOX");
        assert!(jobs.try_acquire(&key));
        assert!(!jobs.try_acquire(&key));
        assert!(jobs.is_running(&key));

        jobs.release(&key);
        assert!(!jobs.is_running(&key));
        assert!(jobs.try_acquire(&key));
    }

    #[test]
    fn test_keys_are_independent() {
        let jobs = JobCoordinator::new();
        assert!(jobs.try_acquire(&JobKey::folder("a@example.com", "INBOX")));
        assert!(jobs.try_acquire(&JobKey::folder("a@example.com", "DRAFTS")));
        assert!(jobs.try_acquire(&JobKey::folder("b@example.com", "INBOX")));
        assert!(jobs.try_acquire(&JobKey::user("a@example.com")));
    }

    #[test]
    fn test_key_normalizes_user() {
        assert_eq!(
            JobKey::folder(" Owner@Example.com", "INBOX"),
            JobKey::folder("owner@example.com", "INBOX")
        );
        assert_eq!(JobKey::user("A@x.com").as_str(), "sync:a@x.com");
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let jobs = Arc::new(JobCoordinator::new());
        let key = JobKey::user("owner@example.com");
        {
            let guard = jobs.try_lock(key.clone()).unwrap();
            assert_eq!(guard.key(), &key);
            assert!(jobs.try_lock(key.clone()).is_none());
        }
        assert!(jobs.try_lock(key).is_some());
    }

    #[test]
    fn test_concurrent_acquire_single_winner() {
        let jobs = Arc::new(JobCoordinator::new());
        let key = JobKey::folder("owner@example.com", "INBOX");
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let jobs = Arc::clone(&jobs);
                let key = key.clone();
                std::thread::spawn(move || jobs.try_acquire(&key))
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}

//! Bounded background execution.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::warn;

/// Runs detached tasks with at most `workers` executing at once; the rest
/// wait for a permit.
#[derive(Debug, Clone)]
pub struct BackgroundRunner {
    permits: Arc<Semaphore>,
}

impl BackgroundRunner {
    /// Creates a runner with the given worker count (at least one).
    #[must_use]
    pub fn new(workers: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    /// Workers currently idle.
    #[must_use]
    pub fn idle_workers(&self) -> usize {
        self.permits.available_permits()
    }

    /// Spawns `task` on the tokio runtime. It starts once a worker is free.
    ///
    /// The returned handle may be dropped; the task keeps running.
    pub fn submit<F>(&self, task: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                warn!("Background runner closed, dropping task");
                return;
            };
            task.await;
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_submit_runs_task() {
        let runner = BackgroundRunner::new(2);
        let (tx, rx) = tokio::sync::oneshot::channel();
        runner.submit(async move {
            tx.send(42).unwrap();
        });
        assert_eq!(rx.await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_worker_limit_enforced() {
        let runner = BackgroundRunner::new(2);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let active = Arc::clone(&active);
                let peak = Arc::clone(&peak);
                runner.submit(async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(runner.idle_workers(), 2);
    }
}

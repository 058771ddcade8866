//! Bounded pool for blocking work
//!
//! The Gmail, Pub/Sub and Discord clients use blocking HTTP. Calls are moved
//! onto tokio's blocking threads, with a semaphore capping how many run at
//! once so a burst of notifications cannot exhaust the blocking pool.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Semaphore-bounded `spawn_blocking`
#[derive(Clone)]
pub struct BlockingPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl BlockingPool {
    /// Create a pool allowing `size` concurrent blocking calls (at least one)
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    /// Maximum number of concurrent blocking calls
    pub fn size(&self) -> usize {
        self.size
    }

    /// Run `task` on a blocking thread once a slot is free
    pub async fn run<T, F>(&self, task: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .context("Blocking pool closed")?;

        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            task()
        });

        handle.await.context("Blocking task panicked")?
    }
}

impl Default for BlockingPool {
    fn default() -> Self {
        Self::new(4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_run_returns_value() {
        let pool = BlockingPool::new(2);
        let value = tokio_test::block_on(pool.run(|| Ok(21 * 2))).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_run_propagates_error() {
        let pool = BlockingPool::new(1);
        let result = tokio_test::block_on(pool.run(|| -> Result<()> { anyhow::bail!("remote down") }));
        assert_eq!(result.unwrap_err().to_string(), "remote down");
    }

    #[test]
    fn test_zero_size_clamped() {
        assert_eq!(BlockingPool::new(0).size(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_is_bounded() {
        let pool = BlockingPool::new(2);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..6 {
            let pool = pool.clone();
            let active = active.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                pool.run(move || {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(20));
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
                .await
            }));
        }

        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }
}

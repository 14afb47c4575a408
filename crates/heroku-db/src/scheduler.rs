//! Debounced deferred flush for the remote backend

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

/// Coalesces bursts of saves into a single delayed flush.
///
/// At most one flush is pending at a time. The pending flag is cleared once
/// the delay has elapsed, right before the flush reads the store, so a save
/// that races with the write schedules a fresh flush instead of being lost.
#[derive(Debug, Clone)]
pub struct FlushScheduler {
    pending: Arc<AtomicBool>,
    flushes: Arc<AtomicU64>,
    delay: Duration,
}

impl FlushScheduler {
    pub fn new(delay: Duration) -> Self {
        Self {
            pending: Arc::new(AtomicBool::new(false)),
            flushes: Arc::new(AtomicU64::new(0)),
            delay,
        }
    }

    /// Schedule `flush` after the debounce delay unless one is already pending.
    ///
    /// Returns whether a new flush was scheduled. Never waits for the flush.
    pub fn schedule<F, Fut>(&self, runtime: &Handle, flush: F) -> bool
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self
            .pending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::trace!("Flush already pending, coalescing save");
            return false;
        }

        let pending = Arc::clone(&self.pending);
        let flushes = Arc::clone(&self.flushes);
        let delay = self.delay;
        runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            pending.store(false, Ordering::Release);
            flush().await;
            flushes.fetch_add(1, Ordering::Relaxed);
        });
        true
    }

    /// Whether a flush is waiting for its delay to elapse
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Number of deferred flushes that have run
    pub fn completed_flushes(&self) -> u64 {
        self.flushes.load(Ordering::Relaxed)
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test(start_paused = true)]
    async fn test_saves_within_window_coalesce() {
        let scheduler = FlushScheduler::new(Duration::from_secs(5));
        let runs = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let runs = Arc::clone(&runs);
            scheduler.schedule(&Handle::current(), move || async move {
                runs.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert!(scheduler.is_pending());
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.completed_flushes(), 1);
        assert!(!scheduler.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_window_after_flush() {
        let scheduler = FlushScheduler::new(Duration::from_secs(5));
        let runs = Arc::new(AtomicUsize::new(0));

        let first = Arc::clone(&runs);
        assert!(scheduler.schedule(&Handle::current(), move || async move {
            first.fetch_add(1, Ordering::SeqCst);
        }));
        tokio::time::sleep(Duration::from_secs(6)).await;

        let second = Arc::clone(&runs);
        assert!(scheduler.schedule(&Handle::current(), move || async move {
            second.fetch_add(1, Ordering::SeqCst);
        }));
        tokio::time::sleep(Duration::from_secs(6)).await;

        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_racing_threads_schedule_one_flush() {
        let scheduler = FlushScheduler::new(Duration::from_secs(60));
        let barrier = Arc::new(std::sync::Barrier::new(8));

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let scheduler = scheduler.clone();
                let barrier = Arc::clone(&barrier);
                let runtime = Handle::current();
                std::thread::spawn(move || {
                    barrier.wait();
                    scheduler.schedule(&runtime, || async {})
                })
            })
            .collect();

        let scheduled = threads
            .into_iter()
            .map(|t| t.join().unwrap())
            .filter(|scheduled| *scheduled)
            .count();
        assert_eq!(scheduled, 1);
        assert!(scheduler.is_pending());
    }
}

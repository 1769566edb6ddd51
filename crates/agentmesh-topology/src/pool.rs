//! Bounded worker pool for message deliveries

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Runs delivery futures with at most `max_concurrent` in flight
///
/// Finished tasks are reaped on every submit so the set does not grow with
/// completed work.
pub(crate) struct DeliveryPool {
    permits: Arc<Semaphore>,
    tasks: Mutex<JoinSet<()>>,
}

impl DeliveryPool {
    pub(crate) fn new(max_concurrent: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    pub(crate) fn submit<F>(&self, delivery: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);

        while let Some(finished) = tasks.try_join_next() {
            if let Err(e) = finished
                && e.is_panic()
            {
                warn!("Delivery task panicked: {}", e);
            }
        }

        tasks.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            delivery.await;
        });
    }

    /// Deliveries submitted and not yet reaped
    pub(crate) fn in_flight(&self) -> usize {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Wait for in-flight deliveries until `deadline`, then abort the rest
    ///
    /// Returns the number of deliveries that had to be aborted.
    pub(crate) async fn drain(&self, deadline: Instant) -> usize {
        let mut tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        if tasks.is_empty() {
            return 0;
        }

        debug!("Draining {} in-flight deliveries", tasks.len());
        let finished = tokio::time::timeout_at(deadline, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;

        if finished.is_ok() {
            return 0;
        }

        let remaining = tasks.len();
        warn!("Aborting {} deliveries still running at drain deadline", remaining);
        tasks.abort_all();
        while tasks.join_next().await.is_some() {}
        remaining
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrency_bound() {
        let pool = DeliveryPool::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for _ in 0..8 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            pool.submit(async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            });
        }

        let aborted = pool.drain(Instant::now() + Duration::from_secs(5)).await;
        assert_eq!(aborted, 0);
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(pool.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_drain_aborts_after_deadline() {
        let pool = DeliveryPool::new(4);
        pool.submit(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });

        let aborted = pool.drain(Instant::now() + Duration::from_millis(20)).await;
        assert_eq!(aborted, 1);
    }
}

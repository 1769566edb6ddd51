//! Hub dispatch queue
//!
//! Unbounded FIFO between `route()` and the dispatch loop. Depth is watched
//! against a soft threshold: crossing it logs a warning but never blocks or
//! drops.

use std::collections::VecDeque;
use std::time::Duration;

use agentmesh_core::Message;
use serde::Serialize;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, warn};

/// Depth statistics for a [`DispatchQueue`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub current_depth: usize,
    /// Deepest the queue has been
    pub max_depth: usize,
    /// Times the warning threshold was crossed from below
    pub warning_count: u64,
}

pub(crate) struct DispatchQueue {
    inner: Mutex<QueueInner>,
    ready: Notify,
    warning_threshold: usize,
}

struct QueueInner {
    messages: VecDeque<Message>,
    stats: QueueStats,
}

impl DispatchQueue {
    pub(crate) fn new(warning_threshold: usize) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                messages: VecDeque::new(),
                stats: QueueStats::default(),
            }),
            ready: Notify::new(),
            warning_threshold,
        }
    }

    /// Append a message and wake the consumer; returns the new depth
    pub(crate) async fn push(&self, message: Message) -> usize {
        let depth = {
            let mut inner = self.inner.lock().await;
            inner.messages.push_back(message);
            let depth = inner.messages.len();
            inner.stats.current_depth = depth;
            inner.stats.max_depth = inner.stats.max_depth.max(depth);

            if depth == self.warning_threshold {
                inner.stats.warning_count = inner.stats.warning_count.saturating_add(1);
                warn!(
                    "Dispatch queue depth {} reached warning threshold {}",
                    depth, self.warning_threshold
                );
            }
            depth
        };

        self.ready.notify_one();
        depth
    }

    pub(crate) async fn pop(&self) -> Option<Message> {
        let mut inner = self.inner.lock().await;
        let message = inner.messages.pop_front();
        inner.stats.current_depth = inner.messages.len();
        message
    }

    /// Wait for a push, at most `timeout`
    ///
    /// A push that lands between a failed `pop` and this call is not lost:
    /// `Notify` keeps the permit.
    pub(crate) async fn wait(&self, timeout: Duration) {
        let _ = tokio::time::timeout(timeout, self.ready.notified()).await;
    }

    pub(crate) async fn len(&self) -> usize {
        self.inner.lock().await.messages.len()
    }

    pub(crate) async fn stats(&self) -> QueueStats {
        self.inner.lock().await.stats
    }

    /// Discard everything still queued; returns how many were dropped
    pub(crate) async fn clear(&self) -> usize {
        let mut inner = self.inner.lock().await;
        let dropped = inner.messages.len();
        inner.messages.clear();
        inner.stats.current_depth = 0;
        if dropped > 0 {
            debug!("Cleared {} queued messages", dropped);
        }
        dropped
    }
}

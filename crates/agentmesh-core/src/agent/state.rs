//! Lock-free agent bookkeeping.

use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicI64, AtomicU8, AtomicU64, Ordering};

use super::AgentStatus;

/// Status and activity counters for one agent
///
/// Safe to share across delivery tasks without a lock. `ShutDown` is sticky:
/// once set, later status writes are ignored.
#[derive(Debug)]
pub struct AgentState {
    status: AtomicU8,
    last_active_ms: AtomicI64,
    message_count: AtomicU64,
}

impl AgentState {
    /// Fresh state in `Initialized`
    pub fn new() -> Self {
        Self {
            status: AtomicU8::new(AgentStatus::Initialized.to_u8()),
            last_active_ms: AtomicI64::new(Utc::now().timestamp_millis()),
            message_count: AtomicU64::new(0),
        }
    }

    pub fn status(&self) -> AgentStatus {
        AgentStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// Set the status unless the agent is already shut down
    pub fn set_status(&self, status: AgentStatus) {
        let shut_down = AgentStatus::ShutDown.to_u8();
        let _ = self
            .status
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current != shut_down).then_some(status.to_u8())
            });
    }

    /// Count one processed message and refresh the activity timestamp
    pub fn record_message(&self) {
        self.message_count.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    /// Refresh the activity timestamp
    pub fn touch(&self) {
        self.last_active_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn message_count(&self) -> u64 {
        self.message_count.load(Ordering::Relaxed)
    }

    pub fn last_active(&self) -> DateTime<Utc> {
        let ms = self.last_active_ms.load(Ordering::Relaxed);
        Utc.timestamp_millis_opt(ms)
            .single()
            .unwrap_or_default()
    }

    pub fn is_shut_down(&self) -> bool {
        self.status() == AgentStatus::ShutDown
    }
}

impl Default for AgentState {
    fn default() -> Self {
        Self::new()
    }
}

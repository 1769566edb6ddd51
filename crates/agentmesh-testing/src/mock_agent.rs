//! # Mock Agent for Testing
//!
//! An agent that records every message handed to it, can be told to fail
//! initialization or delivery, and counts lifecycle calls.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use agentmesh_core::{
    AgentId, AgentState, AgentStatus, DeliveryError, MeshAgent, MeshError, MeshResult, Message,
};
use async_trait::async_trait;
use tokio::sync::watch;
use tracing::debug;

/// A [`MeshAgent`] double
///
/// Messages are recorded on arrival, before any configured delay or failure,
/// so a test can observe a delivery attempt even when it fails.
#[derive(Debug)]
pub struct MockAgent {
    id: AgentId,
    agent_type: String,
    state: AgentState,
    delay: Option<Duration>,
    received: Mutex<Vec<Message>>,
    arrivals: watch::Sender<usize>,
    delivery_failure: Mutex<Option<String>>,
    init_failure: Mutex<Option<String>>,
    initialize_calls: AtomicUsize,
    shutdown_calls: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockAgent {
    /// Create a mock agent of type `"mock"`
    ///
    /// # Panics
    /// Panics if `id` is not a valid [`AgentId`].
    pub fn new(id: impl AsRef<str>) -> Self {
        Self::with_type(id, "mock")
    }

    pub fn with_type(id: impl AsRef<str>, agent_type: impl Into<String>) -> Self {
        let (arrivals, _) = watch::channel(0);
        Self {
            id: AgentId::from(id.as_ref()),
            agent_type: agent_type.into(),
            state: AgentState::new(),
            delay: None,
            received: Mutex::new(Vec::new()),
            arrivals,
            delivery_failure: Mutex::new(None),
            init_failure: Mutex::new(None),
            initialize_calls: AtomicUsize::new(0),
            shutdown_calls: AtomicUsize::new(0),
        }
    }

    /// Sleep this long inside every `process_message`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Make every following delivery fail with `reason`
    pub fn fail_deliveries(&self, reason: impl Into<String>) {
        *lock(&self.delivery_failure) = Some(reason.into());
    }

    /// Let deliveries succeed again
    pub fn succeed_deliveries(&self) {
        *lock(&self.delivery_failure) = None;
    }

    /// Make the next `initialize` calls fail with `reason`
    pub fn fail_initialize(&self, reason: impl Into<String>) {
        *lock(&self.init_failure) = Some(reason.into());
    }

    /// Every message handed to this agent, in arrival order
    pub fn received(&self) -> Vec<Message> {
        lock(&self.received).clone()
    }

    pub fn received_count(&self) -> usize {
        *self.arrivals.borrow()
    }

    /// Wait until at least `count` messages have arrived
    ///
    /// Returns `false` on timeout.
    pub async fn wait_for_messages(&self, count: usize, timeout: Duration) -> bool {
        let mut arrivals = self.arrivals.subscribe();
        tokio::time::timeout(timeout, arrivals.wait_for(|seen| *seen >= count))
            .await
            .is_ok_and(|result| result.is_ok())
    }

    pub fn initialize_calls(&self) -> usize {
        self.initialize_calls.load(Ordering::SeqCst)
    }

    pub fn shutdown_calls(&self) -> usize {
        self.shutdown_calls.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> &AgentState {
        &self.state
    }

    /// Forget recorded messages
    pub fn reset(&self) {
        lock(&self.received).clear();
        self.arrivals.send_replace(0);
    }
}

#[async_trait]
impl MeshAgent for MockAgent {
    fn id(&self) -> &AgentId {
        &self.id
    }

    fn agent_type(&self) -> &str {
        &self.agent_type
    }

    async fn initialize(&self) -> MeshResult<()> {
        self.initialize_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = lock(&self.init_failure).clone() {
            self.state.set_status(AgentStatus::Error);
            return Err(MeshError::AgentLifecycle {
                agent: self.id.clone(),
                reason,
            });
        }
        self.state.set_status(AgentStatus::Active);
        Ok(())
    }

    async fn process_message(&self, message: &Message) -> Result<(), DeliveryError> {
        self.state.touch();
        lock(&self.received).push(message.clone());
        self.arrivals.send_modify(|seen| *seen += 1);
        debug!(agent = %self.id, message_id = %message.id(), "Mock agent received message");

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(reason) = lock(&self.delivery_failure).clone() {
            return Err(DeliveryError::new(self.id.clone(), reason));
        }

        self.state.record_message();
        Ok(())
    }

    fn status(&self) -> AgentStatus {
        self.state.status()
    }

    fn set_status(&self, status: AgentStatus) {
        self.state.set_status(status);
    }

    async fn shutdown(&self) -> MeshResult<()> {
        self.shutdown_calls.fetch_add(1, Ordering::SeqCst);
        self.state.set_status(AgentStatus::ShutDown);
        Ok(())
    }
}

/// One shared [`MockAgent`] per id, in the given order
pub fn mock_agents(ids: &[&str]) -> Vec<Arc<MockAgent>> {
    ids.iter().map(|id| Arc::new(MockAgent::new(id))).collect()
}

//! The contract every topology implements, plus its injected collaborators

use std::sync::Arc;
use std::time::Instant;

use agentmesh_core::{AgentId, AgentStatus, DeliveryError, Message, MeshResult, SharedAgent};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::metrics::{MetricsSink, NoopMetrics, names};
use crate::notify::{NoopNotifier, Notification, Notifier};
use crate::persistence::{MemoryStore, PersistenceStore, PersistenceStoreExt, state_key};
use crate::state::{SharedState, TopologyState};

/// Shared topology contract
///
/// Lifecycle calls follow the state machine in [`crate::TopologyStatus`] and
/// are serialized per topology: a `stop` issued while `start` is running waits
/// for it.
#[async_trait]
pub trait Topology: Send + Sync {
    fn id(&self) -> &str;

    /// `"hub-spoke"`, `"p2p"` or `"pipeline"`
    fn pattern(&self) -> &'static str;

    /// Register an agent; an existing id is replaced in place
    async fn add_agent(&self, agent: SharedAgent);

    /// Unregister an agent; unknown ids are a no-op
    async fn remove_agent(&self, id: &AgentId) -> Option<SharedAgent>;

    async fn agents(&self) -> Vec<SharedAgent>;

    /// Initialize every registered agent (`Created` only)
    async fn initialize(&self) -> MeshResult<()>;

    /// Begin background work (`Initialized` only)
    async fn start(&self) -> MeshResult<()>;

    /// Stop background work, drain deliveries and shut agents down
    ///
    /// Idempotent once `Stopped`; also valid from `Error`.
    async fn stop(&self) -> MeshResult<()>;

    async fn state(&self) -> TopologyState;
}

/// Collaborators injected into a topology at construction
#[derive(Clone)]
pub struct TopologyDeps {
    pub notifier: Arc<dyn Notifier>,
    pub metrics: Arc<dyn MetricsSink>,
    /// Receives a state snapshot after every lifecycle call
    pub persistence: Arc<dyn PersistenceStore>,
}

impl Default for TopologyDeps {
    fn default() -> Self {
        Self {
            notifier: Arc::new(NoopNotifier),
            metrics: Arc::new(NoopMetrics),
            persistence: Arc::new(MemoryStore::new()),
        }
    }
}

impl std::fmt::Debug for TopologyDeps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopologyDeps").finish_non_exhaustive()
    }
}

impl TopologyDeps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_persistence(mut self, persistence: Arc<dyn PersistenceStore>) -> Self {
        self.persistence = persistence;
        self
    }

    /// Store the current snapshot under [`state_key`]
    ///
    /// A failing store is logged and otherwise ignored.
    pub(crate) async fn persist_state(&self, state: &SharedState) {
        let snapshot = state.snapshot().await;
        if let Err(e) = self
            .persistence
            .store_as(&state_key(&snapshot.id), &snapshot)
        {
            warn!(topology = %snapshot.id, error = %e, "Failed to persist topology state");
        }
    }

    /// Deliver `message` to `agent`, then report the outcome
    ///
    /// A failing agent is marked `Error`. Shut-down agents never see the
    /// message.
    pub(crate) async fn deliver(
        &self,
        agent: &SharedAgent,
        message: &Message,
    ) -> Result<(), DeliveryError> {
        let receiver = agent.id();
        let result = if agent.status() == AgentStatus::ShutDown {
            Err(DeliveryError::new(receiver.clone(), "agent is shut down"))
        } else {
            let started = Instant::now();
            let result = agent.process_message(message).await;
            self.metrics.record_average(
                names::DELIVERY_LATENCY_MS,
                started.elapsed().as_secs_f64() * 1000.0,
            );
            result
        };

        match &result {
            Ok(()) => {
                debug!(message_id = %message.id(), receiver = %receiver, "Message delivered");
                self.metrics.increment_counter(names::MESSAGES_DELIVERED);
                self.notifier
                    .notify(Notification::delivered(message, receiver));
            }
            Err(e) => {
                warn!(message_id = %message.id(), receiver = %receiver, "Delivery failed: {}", e.reason);
                if agent.status() != AgentStatus::ShutDown {
                    agent.set_status(AgentStatus::Error);
                }
                self.metrics.increment_counter(names::DELIVERY_FAILURES);
                self.notifier
                    .notify(Notification::failed(message, receiver, e.reason.clone()));
            }
        }

        result
    }
}

//! Topology lifecycle state

use std::fmt;
use std::sync::Arc;

use agentmesh_core::{MeshError, MeshResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Lifecycle status shared by every topology
///
/// ```text
/// Created -> Initializing -> Initialized -> Running -> Stopping -> Stopped
///                 |                                       ^
///                 +--------------> Error -----------------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopologyStatus {
    Created,
    Initializing,
    Initialized,
    Running,
    Stopping,
    Stopped,
    Error,
}

impl TopologyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TopologyStatus::Created => "created",
            TopologyStatus::Initializing => "initializing",
            TopologyStatus::Initialized => "initialized",
            TopologyStatus::Running => "running",
            TopologyStatus::Stopping => "stopping",
            TopologyStatus::Stopped => "stopped",
            TopologyStatus::Error => "error",
        }
    }
}

impl fmt::Display for TopologyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a topology's lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyState {
    pub id: String,
    /// `"hub-spoke"`, `"p2p"` or `"pipeline"`
    pub pattern: String,
    pub status: TopologyStatus,
    /// Number of currently registered agents
    pub agent_count: usize,
    /// Set when the topology enters `Running`
    pub start_time: Option<DateTime<Utc>>,
    pub last_update: DateTime<Utc>,
}

impl TopologyState {
    pub fn new(id: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            pattern: pattern.into(),
            status: TopologyStatus::Created,
            agent_count: 0,
            start_time: None,
            last_update: Utc::now(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == TopologyStatus::Running
    }

    /// Move to `to` if the current status is one of `allowed`
    pub fn transition(
        &mut self,
        operation: &'static str,
        allowed: &[TopologyStatus],
        to: TopologyStatus,
    ) -> MeshResult<()> {
        if !allowed.contains(&self.status) {
            return Err(MeshError::invalid_state(operation, self.status));
        }
        self.set_status(to);
        Ok(())
    }

    pub(crate) fn set_status(&mut self, status: TopologyStatus) {
        let now = Utc::now();
        if status == TopologyStatus::Running && self.start_time.is_none() {
            self.start_time = Some(now);
        }
        self.status = status;
        self.last_update = now;
    }

    pub(crate) fn set_agent_count(&mut self, count: usize) {
        self.agent_count = count;
        self.last_update = Utc::now();
    }
}

/// State cell shared between a topology and its background loops
#[derive(Debug, Clone)]
pub(crate) struct SharedState(Arc<RwLock<TopologyState>>);

impl SharedState {
    pub(crate) fn new(id: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self(Arc::new(RwLock::new(TopologyState::new(id, pattern))))
    }

    pub(crate) async fn snapshot(&self) -> TopologyState {
        self.0.read().await.clone()
    }

    pub(crate) async fn status(&self) -> TopologyStatus {
        self.0.read().await.status
    }

    pub(crate) async fn is_running(&self) -> bool {
        self.0.read().await.is_running()
    }

    /// Fail with `InvalidState` unless running
    pub(crate) async fn ensure_running(&self, operation: &'static str) -> MeshResult<()> {
        let status = self.status().await;
        if status != TopologyStatus::Running {
            return Err(MeshError::invalid_state(operation, status));
        }
        Ok(())
    }

    pub(crate) async fn transition(
        &self,
        operation: &'static str,
        allowed: &[TopologyStatus],
        to: TopologyStatus,
    ) -> MeshResult<()> {
        self.0.write().await.transition(operation, allowed, to)
    }

    pub(crate) async fn set_status(&self, status: TopologyStatus) {
        self.0.write().await.set_status(status);
    }

    pub(crate) async fn set_agent_count(&self, count: usize) {
        self.0.write().await.set_agent_count(count);
    }
}

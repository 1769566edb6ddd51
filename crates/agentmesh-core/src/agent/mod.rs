//! # Agent contract
//!
//! The topology engine only ever talks to agents through [`MeshAgent`]: it
//! initializes them, hands them messages, reads their status and shuts them
//! down. What an agent does with a message is its own business.

mod handler;
mod state;

pub use handler::{HandlerAgent, MessageHandler};
pub use state::AgentState;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{DeliveryError, MeshResult};
use crate::message::Message;
use crate::types::AgentId;

/// Lifecycle status reported by an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Constructed, not yet initialized by a topology
    Initialized,
    /// Ready to take messages
    Active,
    /// Working; still reachable
    Busy,
    /// Last delivery or lifecycle call failed
    Error,
    /// Terminal: no further messages are delivered
    ShutDown,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Initialized => "initialized",
            AgentStatus::Active => "active",
            AgentStatus::Busy => "busy",
            AgentStatus::Error => "error",
            AgentStatus::ShutDown => "shut_down",
        }
    }

    pub(crate) fn to_u8(self) -> u8 {
        match self {
            AgentStatus::Initialized => 0,
            AgentStatus::Active => 1,
            AgentStatus::Busy => 2,
            AgentStatus::Error => 3,
            AgentStatus::ShutDown => 4,
        }
    }

    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            0 => AgentStatus::Initialized,
            1 => AgentStatus::Active,
            2 => AgentStatus::Busy,
            3 => AgentStatus::Error,
            _ => AgentStatus::ShutDown,
        }
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A participant registered with a topology
///
/// Implementations own their internal state and must be safe to call from
/// several delivery tasks at once. [`AgentState`] covers the bookkeeping most
/// implementations need.
///
/// # Example
///
/// ```rust
/// use agentmesh_core::{AgentId, AgentState, AgentStatus, DeliveryError, MeshAgent, MeshResult, Message};
/// use async_trait::async_trait;
///
/// struct Logger {
///     id: AgentId,
///     state: AgentState,
/// }
///
/// #[async_trait]
/// impl MeshAgent for Logger {
///     fn id(&self) -> &AgentId { &self.id }
///     fn agent_type(&self) -> &str { "logger" }
///     async fn initialize(&self) -> MeshResult<()> {
///         self.state.set_status(AgentStatus::Active);
///         Ok(())
///     }
///     async fn process_message(&self, message: &Message) -> Result<(), DeliveryError> {
///         self.state.record_message();
///         println!("{} got {}", self.id, message.id());
///         Ok(())
///     }
///     fn status(&self) -> AgentStatus { self.state.status() }
///     fn set_status(&self, status: AgentStatus) { self.state.set_status(status) }
///     async fn shutdown(&self) -> MeshResult<()> {
///         self.state.set_status(AgentStatus::ShutDown);
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait MeshAgent: Send + Sync {
    /// Unique identifier within a topology
    fn id(&self) -> &AgentId;

    /// Category tag (e.g. "gateway", "temperature")
    fn agent_type(&self) -> &str;

    /// Prepare the agent; called once by the topology's `initialize()`
    async fn initialize(&self) -> MeshResult<()>;

    /// Handle one message
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError` on any internal failure. The topology logs it
    /// and marks the agent `Error`; it never propagates to the sender.
    async fn process_message(&self, message: &Message) -> Result<(), DeliveryError>;

    /// Current status
    fn status(&self) -> AgentStatus;

    /// Overwrite the status; topologies use this to flag failed deliveries
    fn set_status(&self, status: AgentStatus);

    /// Release resources; called once by the topology's `stop()`
    async fn shutdown(&self) -> MeshResult<()>;
}

/// Agents are shared between the registry and in-flight delivery tasks
pub type SharedAgent = Arc<dyn MeshAgent>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_byte_mapping_is_stable() {
        for status in [
            AgentStatus::Initialized,
            AgentStatus::Active,
            AgentStatus::Busy,
            AgentStatus::Error,
            AgentStatus::ShutDown,
        ] {
            assert_eq!(AgentStatus::from_u8(status.to_u8()), status);
        }
    }

    #[test]
    fn test_status_serde_names() {
        assert_eq!(
            serde_json::to_string(&AgentStatus::ShutDown).unwrap(),
            "\"shut_down\""
        );
        assert_eq!(AgentStatus::Busy.to_string(), "busy");
    }
}

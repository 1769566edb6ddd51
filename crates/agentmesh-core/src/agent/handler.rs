//! Kind-dispatching agent adapter.

use async_trait::async_trait;
use tracing::debug;

use super::{AgentState, AgentStatus, MeshAgent};
use crate::error::{DeliveryError, MeshResult};
use crate::message::{Message, MessageKind};
use crate::types::AgentId;

/// Per-kind hooks for a [`HandlerAgent`]
///
/// Every hook defaults to accepting the message and doing nothing, so an
/// implementation only overrides the kinds it cares about. Returning `Err`
/// turns into a [`DeliveryError`].
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn on_command(&self, _message: &Message) -> Result<(), String> {
        Ok(())
    }

    async fn on_query(&self, _message: &Message) -> Result<(), String> {
        Ok(())
    }

    async fn on_event(&self, _message: &Message) -> Result<(), String> {
        Ok(())
    }

    async fn on_response(&self, _message: &Message) -> Result<(), String> {
        Ok(())
    }
}

/// A [`MeshAgent`] that routes each message to a [`MessageHandler`] hook by kind
///
/// Keeps its own [`AgentState`], optionally rejects messages tagged with a
/// foreign protocol, and refuses delivery once shut down.
pub struct HandlerAgent<H> {
    id: AgentId,
    agent_type: String,
    protocol: Option<String>,
    state: AgentState,
    handler: H,
}

impl<H: MessageHandler> HandlerAgent<H> {
    pub fn new(id: AgentId, agent_type: impl Into<String>, handler: H) -> Self {
        Self {
            id,
            agent_type: agent_type.into(),
            protocol: None,
            state: AgentState::new(),
            handler,
        }
    }

    /// Only accept messages carrying this protocol tag
    pub fn accepting_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = Some(protocol.into());
        self
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn state(&self) -> &AgentState {
        &self.state
    }
}

#[async_trait]
impl<H: MessageHandler> MeshAgent for HandlerAgent<H> {
    fn id(&self) -> &AgentId {
        &self.id
    }

    fn agent_type(&self) -> &str {
        &self.agent_type
    }

    async fn initialize(&self) -> MeshResult<()> {
        self.state.set_status(AgentStatus::Active);
        Ok(())
    }

    async fn process_message(&self, message: &Message) -> Result<(), DeliveryError> {
        if self.state.is_shut_down() {
            return Err(DeliveryError::new(self.id.clone(), "agent is shut down"));
        }

        if let Some(expected) = &self.protocol {
            if message.protocol() != expected {
                return Err(DeliveryError::new(
                    self.id.clone(),
                    format!(
                        "unsupported protocol '{}' (expected '{}')",
                        message.protocol(),
                        expected
                    ),
                ));
            }
        }

        self.state.record_message();
        debug!(agent = %self.id, message_id = %message.id(), kind = %message.kind(), "Handling message");

        let outcome = match message.kind() {
            MessageKind::Command => self.handler.on_command(message).await,
            MessageKind::Query => self.handler.on_query(message).await,
            MessageKind::Event => self.handler.on_event(message).await,
            MessageKind::Response => self.handler.on_response(message).await,
        };

        outcome.map_err(|reason| DeliveryError::new(self.id.clone(), reason))
    }

    fn status(&self) -> AgentStatus {
        self.state.status()
    }

    fn set_status(&self, status: AgentStatus) {
        self.state.set_status(status);
    }

    async fn shutdown(&self) -> MeshResult<()> {
        self.state.set_status(AgentStatus::ShutDown);
        Ok(())
    }
}

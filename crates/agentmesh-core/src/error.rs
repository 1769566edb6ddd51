//! Error types for topology operations

use thiserror::Error;

use crate::types::AgentId;

/// Result type for topology operations
pub type MeshResult<T> = Result<T, MeshError>;

/// An agent failed to process a message
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Delivery to agent {agent} failed: {reason}")]
pub struct DeliveryError {
    /// The agent whose `process_message` failed
    pub agent: AgentId,
    /// Human-readable cause
    pub reason: String,
}

impl DeliveryError {
    pub fn new(agent: AgentId, reason: impl Into<String>) -> Self {
        Self {
            agent,
            reason: reason.into(),
        }
    }
}

/// Errors that can occur during topology operations
///
/// Everything except [`MeshError::Delivery`] is a validation failure: it is
/// returned synchronously from the offending call and nothing is mutated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MeshError {
    /// Operation is not valid in the current lifecycle state
    #[error("Cannot {operation} while topology is {status}")]
    InvalidState {
        operation: &'static str,
        status: String,
    },

    /// Operation referenced an unregistered agent
    #[error("Agent not found: {0}")]
    UnknownAgent(AgentId),

    /// Peer send between agents that are not directly connected
    #[error("No connection between {from} and {to}")]
    NoConnection { from: AgentId, to: AgentId },

    /// Hub topology has no hub agent
    #[error("Hub agent not set")]
    MissingHub,

    /// Pipeline order is not a permutation of the registered agents
    #[error("Invalid pipeline order: {0}")]
    InvalidOrder(String),

    /// An agent failed to process a message
    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    /// An agent failed to initialize or shut down
    #[error("Agent {agent} lifecycle failure: {reason}")]
    AgentLifecycle { agent: AgentId, reason: String },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl MeshError {
    /// Build an [`MeshError::InvalidState`] from anything displayable
    pub fn invalid_state(operation: &'static str, status: impl std::fmt::Display) -> Self {
        MeshError::InvalidState {
            operation,
            status: status.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = MeshError::invalid_state("route", "initialized");
        assert_eq!(err.to_string(), "Cannot route while topology is initialized");

        let err = MeshError::NoConnection {
            from: "a".into(),
            to: "c".into(),
        };
        assert_eq!(err.to_string(), "No connection between a and c");
    }

    #[test]
    fn test_delivery_error_converts() {
        let err: MeshError = DeliveryError::new("s2".into(), "queue closed").into();
        assert!(matches!(err, MeshError::Delivery(_)));
        assert_eq!(err.to_string(), "Delivery to agent s2 failed: queue closed");
    }
}

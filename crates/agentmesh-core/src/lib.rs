//! # agentmesh core
//!
//! Shared building blocks for the agentmesh topology engine.
//!
//! This crate holds everything a topology needs to know about the outside
//! world without depending on any particular topology:
//!
//! - **Identity**: validated [`AgentId`]s
//! - **Messages**: immutable [`Message`] values tagged with a [`MessageKind`]
//! - **Agent contract**: the [`MeshAgent`] trait every participant implements,
//!   plus the lock-free [`AgentState`] helper and the kind-dispatching
//!   [`HandlerAgent`]
//! - **Errors**: the [`MeshError`] taxonomy shared by all topologies
//! - **Configuration**: [`TopologyConfig`], loadable from TOML
//!
//! ## Example
//!
//! ```rust
//! use agentmesh_core::{AgentId, Message, MessageKind};
//!
//! let msg = Message::unicast(
//!     AgentId::parse("sensor-1").unwrap(),
//!     AgentId::parse("gateway").unwrap(),
//!     MessageKind::Event,
//!     "temperature=21.5",
//! );
//! assert!(!msg.is_broadcast());
//! assert_eq!(msg.receiver().map(|id| id.as_str()), Some("gateway"));
//! ```

pub mod agent;
pub mod config;
pub mod error;
pub mod message;
pub mod types;

pub use agent::{AgentState, AgentStatus, HandlerAgent, MeshAgent, MessageHandler, SharedAgent};
pub use config::{LoadBalancingStrategy, TopologyConfig, TopologyKind};
pub use error::{DeliveryError, MeshError, MeshResult};
pub use message::{DEFAULT_PROTOCOL, Message, MessageId, MessageIdError, MessageKind, MessagePayload};
pub use types::{AgentId, IdValidationError};

//! # Agentmesh Testing
//!
//! Test doubles for exercising topologies without real agents.
//!
//! ```rust
//! use std::time::Duration;
//! use agentmesh_core::{MeshAgent, Message, MessageKind};
//! use agentmesh_testing::MockAgent;
//!
//! # tokio_test::block_on(async {
//! let agent = MockAgent::new("sensor-1");
//! agent.initialize().await.unwrap();
//!
//! let message = Message::unicast("hub".into(), "sensor-1".into(), MessageKind::Query, "temp?");
//! agent.process_message(&message).await.unwrap();
//!
//! assert!(agent.wait_for_messages(1, Duration::from_secs(1)).await);
//! assert_eq!(agent.received(), vec![message]);
//! # });
//! ```

/// Recording, fail-on-demand mock agent
pub mod mock_agent;

pub use mock_agent::{MockAgent, mock_agents};

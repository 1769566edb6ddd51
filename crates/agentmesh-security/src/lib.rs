//! # Agentmesh Security
//!
//! Optional message protection for agentmesh deployments. Topologies never
//! call into this crate; agents or callers wrap payloads before routing them
//! and unwrap them on receipt.
//!
//! - AES-256-GCM encryption, with the receiver id bound as associated data so
//!   a ciphertext only opens for the agent it was sealed for
//! - HMAC-SHA256 signatures
//! - Per-agent permission sets
//!
//! ```rust
//! use agentmesh_core::AgentId;
//! use agentmesh_security::SecurityManager;
//!
//! let security = SecurityManager::generate();
//! let hub = AgentId::from("hub");
//! let sensor = AgentId::from("sensor-1");
//!
//! let envelope = security.seal(&hub, &sensor, b"calibrate").unwrap();
//! assert_eq!(security.open(&envelope).unwrap(), b"calibrate");
//! ```

pub mod envelope;
pub mod error;
pub mod keys;
pub mod manager;

pub use envelope::SecureEnvelope;
pub use error::{SecurityError, SecurityResult};
pub use keys::{EncryptionKey, SigningKey};
pub use manager::SecurityManager;

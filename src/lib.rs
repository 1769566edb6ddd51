//! # agentmesh
//!
//! Message routing between autonomous agents under one of three topologies:
//!
//! - **Hub-and-spoke**: a queue and a dispatch loop deliver through a hub,
//!   with round-robin, least-loaded or random spoke selection
//! - **Peer-to-peer**: direct sends over an explicit connection graph that a
//!   monitor loop prunes and rebalances
//! - **Pipeline**: an ordered chain of stages
//!
//! This crate re-exports the workspace crates. Most programs only need the
//! [`prelude`].
//!
//! ```rust
//! use agentmesh_workspace::prelude::*;
//!
//! let config = TopologyConfig::new("sensors", TopologyKind::Hub);
//! let mesh = Mesh::from_config(config, TopologyDeps::default()).unwrap();
//! assert_eq!(mesh.topology().pattern(), "hub-spoke");
//! ```

pub use agentmesh_core as core;
#[cfg(feature = "security")]
pub use agentmesh_security as security;
pub use agentmesh_topology as topology;

/// Types needed to build, drive and observe a mesh
pub mod prelude {
    pub use agentmesh_core::{
        AgentId, AgentState, AgentStatus, DeliveryError, HandlerAgent, LoadBalancingStrategy,
        MeshAgent, MeshError, MeshResult, Message, MessageHandler, MessageKind, MessagePayload,
        SharedAgent, TopologyConfig, TopologyKind,
    };
    pub use agentmesh_topology::{
        AnyTopology, EventBus, HubTopology, JsonFileStore, MemoryStore, Mesh, MeshMetricsCollector,
        MetricsSink, Notification, NotificationKind, Notifier, PeerTopology, PersistenceStore,
        PersistenceStoreExt, PipelineTopology, Topology, TopologyDeps, TopologyState,
        TopologyStatus,
    };

    #[cfg(feature = "security")]
    pub use agentmesh_security::{SecureEnvelope, SecurityError, SecurityManager};
}

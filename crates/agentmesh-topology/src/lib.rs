//! # Agentmesh Topology
//!
//! Three ways of wiring agents together, behind one lifecycle:
//!
//! - **Hub-and-spoke** ([`HubTopology`]): messages are routed through a FIFO
//!   queue and delivered by a background dispatch loop. Includes spoke
//!   selection (round-robin, least-loaded, random) and a health loop.
//! - **Peer-to-peer** ([`PeerTopology`]): direct sends over an explicit,
//!   symmetric connection graph that a monitoring loop prunes and rebalances.
//! - **Pipeline** ([`PipelineTopology`]): an ordered chain of stages.
//!
//! All three implement [`Topology`] and move through the same
//! [`TopologyStatus`] state machine. [`Mesh`] wraps any of them; with
//! [`AnyTopology`] the variant is picked from configuration.
//!
//! Collaborators ([`Notifier`], [`MetricsSink`], [`PersistenceStore`]) are
//! injected through [`TopologyDeps`]. The default notifier and metrics sink
//! discard everything; the default store keeps state snapshots in memory.

pub mod hub;
mod lifecycle;
pub mod mesh;
pub mod metrics;
pub mod notify;
pub mod peer;
pub mod persistence;
pub mod pipeline;
mod pool;
mod queue;
pub mod registry;
pub mod state;
pub mod topology;

pub use hub::{HubStatistics, HubTopology};
pub use mesh::{AnyTopology, Mesh};
pub use metrics::{AverageStat, MeshMetricsCollector, MetricsSink, MetricsSnapshot, NoopMetrics};
pub use notify::{EventBus, NoopNotifier, Notification, NotificationKind, Notifier, Priority};
pub use peer::{ConnectionGraph, PeerTopology, RebalancePlan, min_connections};
pub use persistence::{
    JsonFileStore, MemoryStore, PersistenceError, PersistenceResult, PersistenceStore,
    PersistenceStoreExt, state_key,
};
pub use pipeline::PipelineTopology;
pub use queue::QueueStats;
pub use registry::AgentRegistry;
pub use state::{TopologyState, TopologyStatus};
pub use topology::{Topology, TopologyDeps};

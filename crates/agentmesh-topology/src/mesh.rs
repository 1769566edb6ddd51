//! Mesh facade and the config-selected topology enum

use agentmesh_core::{AgentId, MeshResult, SharedAgent, TopologyConfig, TopologyKind};
use async_trait::async_trait;
use tracing::info;

use crate::hub::HubTopology;
use crate::peer::PeerTopology;
use crate::pipeline::PipelineTopology;
use crate::state::TopologyState;
use crate::topology::{Topology, TopologyDeps};

/// One of the three topologies, chosen at runtime
pub enum AnyTopology {
    Hub(HubTopology),
    Peer(PeerTopology),
    Pipeline(PipelineTopology),
}

impl AnyTopology {
    /// Build the topology named by `config.kind`
    pub fn from_config(config: TopologyConfig, deps: TopologyDeps) -> MeshResult<Self> {
        config.validate()?;
        Ok(match config.kind {
            TopologyKind::Hub => AnyTopology::Hub(HubTopology::with_deps(config, deps)),
            TopologyKind::Peer => AnyTopology::Peer(PeerTopology::with_deps(config, deps)),
            TopologyKind::Pipeline => AnyTopology::Pipeline(PipelineTopology::with_deps(config, deps)),
        })
    }

    pub fn kind(&self) -> TopologyKind {
        match self {
            AnyTopology::Hub(_) => TopologyKind::Hub,
            AnyTopology::Peer(_) => TopologyKind::Peer,
            AnyTopology::Pipeline(_) => TopologyKind::Pipeline,
        }
    }

    pub fn as_hub(&self) -> Option<&HubTopology> {
        match self {
            AnyTopology::Hub(hub) => Some(hub),
            _ => None,
        }
    }

    pub fn as_peer(&self) -> Option<&PeerTopology> {
        match self {
            AnyTopology::Peer(peer) => Some(peer),
            _ => None,
        }
    }

    pub fn as_pipeline(&self) -> Option<&PipelineTopology> {
        match self {
            AnyTopology::Pipeline(pipeline) => Some(pipeline),
            _ => None,
        }
    }

    fn inner(&self) -> &dyn Topology {
        match self {
            AnyTopology::Hub(hub) => hub,
            AnyTopology::Peer(peer) => peer,
            AnyTopology::Pipeline(pipeline) => pipeline,
        }
    }
}

impl From<HubTopology> for AnyTopology {
    fn from(topology: HubTopology) -> Self {
        AnyTopology::Hub(topology)
    }
}

impl From<PeerTopology> for AnyTopology {
    fn from(topology: PeerTopology) -> Self {
        AnyTopology::Peer(topology)
    }
}

impl From<PipelineTopology> for AnyTopology {
    fn from(topology: PipelineTopology) -> Self {
        AnyTopology::Pipeline(topology)
    }
}

#[async_trait]
impl Topology for AnyTopology {
    fn id(&self) -> &str {
        self.inner().id()
    }

    fn pattern(&self) -> &'static str {
        self.inner().pattern()
    }

    async fn add_agent(&self, agent: SharedAgent) {
        self.inner().add_agent(agent).await
    }

    async fn remove_agent(&self, id: &AgentId) -> Option<SharedAgent> {
        self.inner().remove_agent(id).await
    }

    async fn agents(&self) -> Vec<SharedAgent> {
        self.inner().agents().await
    }

    async fn initialize(&self) -> MeshResult<()> {
        self.inner().initialize().await
    }

    async fn start(&self) -> MeshResult<()> {
        self.inner().start().await
    }

    async fn stop(&self) -> MeshResult<()> {
        self.inner().stop().await
    }

    async fn state(&self) -> TopologyState {
        self.inner().state().await
    }
}

/// Owns one topology and exposes its lifecycle
///
/// Variant-specific entry points (`route`, `send`, `set_order`, ...) are
/// reached through [`Mesh::topology`].
///
/// ```no_run
/// use std::sync::Arc;
/// use agentmesh_core::{Message, MessageKind, TopologyConfig, TopologyKind};
/// use agentmesh_topology::{Mesh, TopologyDeps};
///
/// # async fn run(agents: Vec<agentmesh_core::SharedAgent>) -> agentmesh_core::MeshResult<()> {
/// let config = TopologyConfig::new("sensors", TopologyKind::Hub);
/// let mesh = Mesh::from_config(config, TopologyDeps::default())?;
/// for agent in agents {
///     mesh.add_agent(agent).await;
/// }
/// mesh.initialize().await?;
/// mesh.start().await?;
///
/// if let Some(hub) = mesh.topology().as_hub() {
///     let message = Message::broadcast("gateway".into(), MessageKind::Event, "calibrate");
///     hub.route(message).await?;
/// }
/// mesh.stop().await
/// # }
/// ```
pub struct Mesh<T: Topology = AnyTopology> {
    topology: T,
}

impl<T: Topology> Mesh<T> {
    pub fn new(topology: T) -> Self {
        Self { topology }
    }

    pub fn topology(&self) -> &T {
        &self.topology
    }

    pub fn into_inner(self) -> T {
        self.topology
    }

    pub async fn add_agent(&self, agent: SharedAgent) {
        self.topology.add_agent(agent).await;
    }

    pub async fn remove_agent(&self, id: &AgentId) -> Option<SharedAgent> {
        self.topology.remove_agent(id).await
    }

    pub async fn agents(&self) -> Vec<SharedAgent> {
        self.topology.agents().await
    }

    pub async fn initialize(&self) -> MeshResult<()> {
        self.topology.initialize().await
    }

    pub async fn start(&self) -> MeshResult<()> {
        self.topology.start().await
    }

    pub async fn stop(&self) -> MeshResult<()> {
        self.topology.stop().await
    }

    pub async fn state(&self) -> TopologyState {
        self.topology.state().await
    }
}

impl Mesh<AnyTopology> {
    /// Build a mesh around the topology named by `config.kind`
    pub fn from_config(config: TopologyConfig, deps: TopologyDeps) -> MeshResult<Self> {
        let topology = AnyTopology::from_config(config, deps)?;
        info!(topology = topology.id(), pattern = topology.pattern(), "Mesh created");
        Ok(Self::new(topology))
    }
}

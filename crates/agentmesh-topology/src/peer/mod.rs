//! Peer-to-peer topology
//!
//! Agents talk directly over an explicit, symmetric connection graph. A
//! monitoring loop keeps the graph healthy: under-connected agents discover
//! new peers, idle connections are pruned and over-connected agents are
//! trimmed back toward the mean.

mod graph;

pub use graph::{ConnectionGraph, RebalancePlan, min_connections};

use std::sync::Arc;

use agentmesh_core::{
    AgentId, Message, MeshError, MeshResult, SharedAgent, TopologyConfig, TopologyKind,
};
use async_trait::async_trait;
use dashmap::DashMap;
use rand::seq::SliceRandom;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use crate::lifecycle::Lifecycle;
use crate::metrics::names;
use crate::notify::Notification;
use crate::pool::DeliveryPool;
use crate::registry::AgentRegistry;
use crate::state::{SharedState, TopologyState};
use crate::topology::{Topology, TopologyDeps};

/// Full peer-to-peer topology
///
/// Lock order is registry before graph; no path takes them the other way
/// round.
pub struct PeerTopology {
    inner: Arc<PeerInner>,
}

struct PeerInner {
    config: TopologyConfig,
    deps: TopologyDeps,
    lifecycle: Lifecycle,
    registry: RwLock<AgentRegistry>,
    graph: RwLock<ConnectionGraph>,
    /// Directed `(sender, receiver)` successful-delivery counters
    traffic: DashMap<(AgentId, AgentId), u64>,
    pool: DeliveryPool,
}

impl PeerTopology {
    pub fn new(config: TopologyConfig) -> Self {
        Self::with_deps(config, TopologyDeps::default())
    }

    pub fn with_deps(config: TopologyConfig, deps: TopologyDeps) -> Self {
        let state = SharedState::new(config.id.clone(), TopologyKind::Peer.pattern_name());
        Self {
            inner: Arc::new(PeerInner {
                lifecycle: Lifecycle::new(state, config.drain_timeout),
                pool: DeliveryPool::new(config.max_concurrent_deliveries),
                registry: RwLock::new(AgentRegistry::new()),
                graph: RwLock::new(ConnectionGraph::new()),
                traffic: DashMap::new(),
                config,
                deps,
            }),
        }
    }

    /// Connect two registered agents in both directions
    pub async fn connect(&self, a: &AgentId, b: &AgentId) -> MeshResult<()> {
        let registry = self.inner.registry.read().await;
        for id in [a, b] {
            if !registry.contains(id) {
                return Err(MeshError::UnknownAgent(id.clone()));
            }
        }

        if self.inner.graph.write().await.connect(a, b) {
            debug!(a = %a, b = %b, "Connected peers");
        }
        Ok(())
    }

    pub async fn disconnect(&self, a: &AgentId, b: &AgentId) {
        if self.inner.graph.write().await.disconnect(a, b) {
            debug!(a = %a, b = %b, "Disconnected peers");
        }
    }

    /// Send to a directly connected peer, or broadcast if no receiver is set
    ///
    /// Validation happens here; delivery runs on the worker pool and this call
    /// does not wait for it.
    pub async fn send(&self, message: Message) -> MeshResult<()> {
        let Some(receiver) = message.receiver().cloned() else {
            return self.broadcast(message).await;
        };

        self.inner.lifecycle.state().ensure_running("send").await?;

        let agent = {
            let registry = self.inner.registry.read().await;
            if !registry.contains(message.sender()) {
                return Err(MeshError::UnknownAgent(message.sender().clone()));
            }
            let agent = registry
                .get(&receiver)
                .cloned()
                .ok_or_else(|| MeshError::UnknownAgent(receiver.clone()))?;

            if !self
                .inner
                .graph
                .read()
                .await
                .is_connected(message.sender(), &receiver)
            {
                return Err(MeshError::NoConnection {
                    from: message.sender().clone(),
                    to: receiver,
                });
            }
            agent
        };

        debug!(message_id = %message.id(), from = %message.sender(), to = %receiver, "Sending direct message");
        self.inner.deps.metrics.increment_counter(names::MESSAGES_ROUTED);
        self.inner.deps.notifier.notify(Notification::direct(&message));
        PeerInner::submit(&self.inner, agent, Arc::new(message));
        Ok(())
    }

    /// Deliver to every registered agent except the sender, regardless of the
    /// connection graph
    pub async fn broadcast(&self, message: Message) -> MeshResult<()> {
        self.inner.lifecycle.state().ensure_running("broadcast").await?;

        let recipients: Vec<SharedAgent> = {
            let registry = self.inner.registry.read().await;
            if !registry.contains(message.sender()) {
                return Err(MeshError::UnknownAgent(message.sender().clone()));
            }
            registry
                .iter()
                .filter(|agent| agent.id() != message.sender())
                .cloned()
                .collect()
        };

        debug!(message_id = %message.id(), from = %message.sender(), recipients = recipients.len(), "Broadcasting message");
        self.inner.deps.metrics.increment_counter(names::MESSAGES_ROUTED);
        self.inner.deps.notifier.notify(Notification::broadcast(&message));

        let message = Arc::new(message);
        for agent in recipients {
            PeerInner::submit(&self.inner, agent, Arc::clone(&message));
        }
        Ok(())
    }

    /// Current peers of `id`, sorted
    pub async fn peers(&self, id: &AgentId) -> Vec<AgentId> {
        self.inner
            .graph
            .read()
            .await
            .peers(id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Successful deliveries from `from` to `to`
    pub fn message_count(&self, from: &AgentId, to: &AgentId) -> u64 {
        self.inner.message_count(from, to)
    }

    /// Peer count per agent, in registration order
    pub async fn connection_counts(&self) -> Vec<(AgentId, usize)> {
        self.inner.connection_counts().await
    }

    /// Copy of the current connection graph
    pub async fn graph(&self) -> ConnectionGraph {
        self.inner.graph.read().await.clone()
    }

    /// One full monitoring pass: health check, then rebalance
    pub async fn monitor_cycle(&self) {
        self.inner.monitor_cycle().await;
    }

    /// Top up under-connected agents and prune idle connections
    pub async fn check_network_health(&self) {
        self.inner.check_network_health().await;
    }

    /// Trim over-connected agents and grow under-connected ones
    pub async fn rebalance_connections(&self) {
        self.inner.rebalance_connections().await;
    }
}

impl PeerInner {
    async fn persist_state(&self) {
        self.deps.persist_state(self.lifecycle.state()).await;
    }

    fn submit(inner: &Arc<Self>, agent: SharedAgent, message: Arc<Message>) {
        let this = Arc::clone(inner);
        inner.pool.submit(async move {
            if this.deps.deliver(&agent, &message).await.is_ok() {
                let key = (message.sender().clone(), agent.id().clone());
                let mut count = this.traffic.entry(key).or_insert(0);
                *count = count.saturating_add(1);
            }
        });
    }

    fn message_count(&self, from: &AgentId, to: &AgentId) -> u64 {
        self.traffic
            .get(&(from.clone(), to.clone()))
            .map_or(0, |count| *count)
    }

    async fn connection_counts(&self) -> Vec<(AgentId, usize)> {
        let registry = self.registry.read().await;
        let graph = self.graph.read().await;
        registry
            .ids()
            .iter()
            .map(|id| (id.clone(), graph.degree(id)))
            .collect()
    }

    #[instrument(skip(self), fields(topology = %self.config.id))]
    async fn monitor_cycle(&self) {
        self.check_network_health().await;
        self.rebalance_connections().await;
    }

    async fn check_network_health(&self) {
        let ids = self.registry.read().await.ids().to_vec();
        let min = min_connections(ids.len());

        // Only links present when the cycle began may be pruned. Pruning goes
        // first so that links discovered below are never pruned in their own
        // cycle and every agent ends at the minimum.
        let before = self.graph.read().await.clone();
        {
            let mut graph = self.graph.write().await;
            for id in &ids {
                let Some(existing) = before.peers(id) else {
                    continue;
                };
                for peer in existing {
                    if self.message_count(id, peer) == 0 && graph.disconnect(id, peer) {
                        debug!(agent = %id, peer = %peer, "Pruned idle connection");
                    }
                }
            }
        }

        for id in &ids {
            let degree = self.graph.read().await.degree(id);
            if degree < min {
                self.discover_peers(id, min - degree).await;
            }
        }
    }

    async fn rebalance_connections(&self) {
        let counts = self.connection_counts().await;
        let plan = RebalancePlan::from_counts(&counts);
        if plan.is_empty() {
            return;
        }

        debug!(average = plan.average, trim = plan.trim.len(), grow = plan.grow.len(), "Rebalancing connections");

        let min = min_connections(counts.len());
        for (id, excess) in &plan.trim {
            self.remove_excess_connections(id, *excess, min).await;
        }

        // Grow toward whichever is larger: the network minimum or half the mean
        let target = min.max((plan.average * 0.5).ceil() as usize);
        for id in &plan.grow {
            let degree = self.graph.read().await.degree(id);
            let needed = target.saturating_sub(degree).max(1);
            self.discover_peers(id, needed).await;
        }
    }

    /// Connect `id` to up to `needed` random unconnected agents
    ///
    /// Returns the peers actually connected.
    async fn discover_peers(&self, id: &AgentId, needed: usize) -> Vec<AgentId> {
        let mut candidates: Vec<AgentId> = {
            let registry = self.registry.read().await;
            let graph = self.graph.read().await;
            registry
                .ids()
                .iter()
                .filter(|candidate| *candidate != id && !graph.is_connected(id, candidate))
                .cloned()
                .collect()
        };
        candidates.shuffle(&mut rand::rng());
        candidates.truncate(needed);

        let mut graph = self.graph.write().await;
        candidates.retain(|peer| graph.connect(id, peer));
        if !candidates.is_empty() {
            debug!(agent = %id, added = candidates.len(), "Discovered new peers");
        }
        candidates
    }

    /// Drop the `excess` connections of `id` that carried the least traffic
    ///
    /// A peer holding exactly `min` connections is skipped, so a trim never
    /// takes an agent that meets the minimum below it.
    async fn remove_excess_connections(&self, id: &AgentId, excess: usize, min: usize) {
        let mut graph = self.graph.write().await;
        let Some(peers) = graph.peers(id) else {
            return;
        };

        // Peers are already sorted by id, so the stable sort breaks ties by id
        let mut ranked: Vec<(AgentId, u64)> = peers
            .iter()
            .map(|peer| (peer.clone(), self.message_count(id, peer)))
            .collect();
        ranked.sort_by_key(|(_, count)| *count);

        let mut removed = 0;
        for (peer, _) in ranked {
            if removed == excess {
                break;
            }
            if graph.degree(&peer) == min {
                continue;
            }
            graph.disconnect(id, &peer);
            removed += 1;
            debug!(agent = %id, peer = %peer, "Trimmed connection");
        }
    }
}

#[async_trait]
impl Topology for PeerTopology {
    fn id(&self) -> &str {
        &self.inner.config.id
    }

    fn pattern(&self) -> &'static str {
        TopologyKind::Peer.pattern_name()
    }

    async fn add_agent(&self, agent: SharedAgent) {
        let id = agent.id().clone();
        let mut registry = self.inner.registry.write().await;
        registry.insert(agent);
        self.inner.graph.write().await.add_node(id.clone());
        self.inner.lifecycle.state().set_agent_count(registry.len()).await;
        debug!(agent = %id, "Added peer agent");
    }

    async fn remove_agent(&self, id: &AgentId) -> Option<SharedAgent> {
        let mut registry = self.inner.registry.write().await;
        let removed = registry.remove(id)?;
        self.inner.graph.write().await.remove_node(id);
        self.inner
            .traffic
            .retain(|(from, to), _| from != id && to != id);
        self.inner.lifecycle.state().set_agent_count(registry.len()).await;
        debug!(agent = %id, "Removed peer agent");
        Some(removed)
    }

    async fn agents(&self) -> Vec<SharedAgent> {
        self.inner.registry.read().await.snapshot()
    }

    async fn initialize(&self) -> MeshResult<()> {
        let result = self
            .inner
            .lifecycle
            .initialize(async { Ok(self.agents().await) })
            .await;
        self.inner.persist_state().await;
        result
    }

    async fn start(&self) -> MeshResult<()> {
        let inner = Arc::clone(&self.inner);
        let period = self.inner.config.monitor_interval;
        let result = self
            .inner
            .lifecycle
            .start(move |tasks| {
                tasks.spawn_periodic("peer-monitor", period, period, move || {
                    let inner = Arc::clone(&inner);
                    async move { inner.monitor_cycle().await }
                });
            })
            .await;
        self.inner.persist_state().await;
        result?;
        info!(topology = %self.inner.config.id, "Peer topology running");
        Ok(())
    }

    async fn stop(&self) -> MeshResult<()> {
        let result = self
            .inner
            .lifecycle
            .stop(Some(&self.inner.pool), self.agents())
            .await;
        self.inner.persist_state().await;
        result
    }

    async fn state(&self) -> TopologyState {
        self.inner.lifecycle.state().snapshot().await
    }
}

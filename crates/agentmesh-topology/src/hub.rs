//! Hub-and-spoke topology
//!
//! One agent is the hub; every other agent is a spoke. Callers `route`
//! messages into a FIFO queue and a single dispatch loop delivers them:
//! unicast inline, so per-queue order is kept, and broadcasts fanned out to
//! every spoke on the worker pool.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use agentmesh_core::{
    AgentId, AgentStatus, LoadBalancingStrategy, Message, MeshAgent, MeshError, MeshResult,
    SharedAgent, TopologyConfig, TopologyKind,
};
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use futures::FutureExt;
use rand::Rng;
use serde::Serialize;
use tokio::sync::{RwLock, watch};
use tracing::{debug, error, info, warn};

use crate::lifecycle::{Lifecycle, panic_message};
use crate::metrics::names;
use crate::notify::Notification;
use crate::pool::DeliveryPool;
use crate::queue::{DispatchQueue, QueueStats};
use crate::registry::AgentRegistry;
use crate::state::{SharedState, TopologyState, TopologyStatus};
use crate::topology::{Topology, TopologyDeps};

/// Point-in-time view of a hub topology
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HubStatistics {
    pub total_agents: usize,
    /// Agents reported `Active` by the last health check
    pub active_agents: usize,
    pub queue_depth: usize,
    pub queue: QueueStats,
    /// Successful deliveries per agent
    pub agent_loads: BTreeMap<AgentId, u64>,
    pub hub: Option<AgentId>,
    pub strategy: LoadBalancingStrategy,
}

#[derive(Default)]
struct HubRoster {
    agents: AgentRegistry,
    hub: Option<AgentId>,
}

impl HubRoster {
    fn spokes(&self) -> Vec<SharedAgent> {
        self.agents
            .iter()
            .filter(|agent| Some(agent.id()) != self.hub.as_ref())
            .cloned()
            .collect()
    }
}

/// Hub-and-spoke topology
pub struct HubTopology {
    inner: Arc<HubInner>,
}

struct HubInner {
    config: TopologyConfig,
    deps: TopologyDeps,
    lifecycle: Lifecycle,
    roster: RwLock<HubRoster>,
    strategy: RwLock<LoadBalancingStrategy>,
    loads: DashMap<AgentId, u64>,
    active: DashSet<AgentId>,
    queue: DispatchQueue,
    pool: DeliveryPool,
}

impl HubTopology {
    pub fn new(config: TopologyConfig) -> Self {
        Self::with_deps(config, TopologyDeps::default())
    }

    pub fn with_deps(config: TopologyConfig, deps: TopologyDeps) -> Self {
        let state = SharedState::new(config.id.clone(), TopologyKind::Hub.pattern_name());
        Self {
            inner: Arc::new(HubInner {
                lifecycle: Lifecycle::new(state, config.drain_timeout),
                roster: RwLock::new(HubRoster::default()),
                strategy: RwLock::new(config.load_balancing),
                loads: DashMap::new(),
                active: DashSet::new(),
                queue: DispatchQueue::new(config.queue_warning_threshold),
                pool: DeliveryPool::new(config.max_concurrent_deliveries),
                config,
                deps,
            }),
        }
    }

    /// Make a registered agent the hub
    pub async fn set_hub(&self, id: &AgentId) -> MeshResult<()> {
        let mut roster = self.inner.roster.write().await;
        if !roster.agents.contains(id) {
            return Err(MeshError::UnknownAgent(id.clone()));
        }
        roster.hub = Some(id.clone());
        info!(hub = %id, "Hub reassigned");
        Ok(())
    }

    pub async fn hub(&self) -> Option<SharedAgent> {
        let roster = self.inner.roster.read().await;
        roster.hub.as_ref().and_then(|id| roster.agents.get(id)).cloned()
    }

    /// Every agent except the hub, in registration order
    pub async fn spokes(&self) -> Vec<SharedAgent> {
        self.inner.roster.read().await.spokes()
    }

    pub async fn find_agents<P>(&self, predicate: P) -> Vec<SharedAgent>
    where
        P: Fn(&dyn MeshAgent) -> bool,
    {
        self.inner
            .roster
            .read()
            .await
            .agents
            .iter()
            .filter(|agent| predicate(Arc::as_ref(agent)))
            .cloned()
            .collect()
    }

    /// Queue a message for the dispatch loop
    ///
    /// Only valid while running. Never waits for delivery.
    pub async fn route(&self, message: Message) -> MeshResult<()> {
        self.inner.lifecycle.state().ensure_running("route").await?;

        debug!(message_id = %message.id(), from = %message.sender(), broadcast = message.is_broadcast(), "Routing message");
        let depth = self.inner.enqueue(message).await?;
        self.inner.deps.metrics.increment_counter(names::MESSAGES_ROUTED);
        self.inner.deps.metrics.set_gauge(names::QUEUE_DEPTH, depth as i64);
        Ok(())
    }

    /// Pick a spoke under the current strategy
    ///
    /// Routes nothing. `previous` only matters for round-robin.
    pub async fn next_agent(&self, previous: Option<&AgentId>) -> Option<SharedAgent> {
        let strategy = *self.inner.strategy.read().await;
        let spokes = self.spokes().await;
        if spokes.is_empty() {
            return None;
        }

        let index = match strategy {
            LoadBalancingStrategy::RoundRobin => previous
                .and_then(|prev| spokes.iter().position(|agent| agent.id() == prev))
                .map_or(0, |i| (i + 1) % spokes.len()),
            LoadBalancingStrategy::LeastLoaded => spokes
                .iter()
                .enumerate()
                .min_by_key(|(_, agent)| self.load(agent.id()))
                .map_or(0, |(i, _)| i),
            LoadBalancingStrategy::Random => rand::rng().random_range(0..spokes.len()),
        };

        spokes.into_iter().nth(index)
    }

    pub async fn set_load_balancing_strategy(&self, strategy: LoadBalancingStrategy) {
        *self.inner.strategy.write().await = strategy;
        info!(%strategy, "Load-balancing strategy changed");
    }

    pub async fn load_balancing_strategy(&self) -> LoadBalancingStrategy {
        *self.inner.strategy.read().await
    }

    /// Successful deliveries to `id`
    pub fn load(&self, id: &AgentId) -> u64 {
        self.inner.loads.get(id).map_or(0, |load| *load)
    }

    pub async fn queue_depth(&self) -> usize {
        self.inner.queue.len().await
    }

    /// Reclassify agents as active or inactive now, outside the health loop
    pub async fn check_health(&self) {
        self.inner.check_health().await;
    }

    pub async fn statistics(&self) -> HubStatistics {
        let (total_agents, hub) = {
            let roster = self.inner.roster.read().await;
            (roster.agents.len(), roster.hub.clone())
        };

        HubStatistics {
            total_agents,
            active_agents: self.inner.active.len(),
            queue_depth: self.inner.queue.len().await,
            queue: self.inner.queue.stats().await,
            agent_loads: self
                .inner
                .loads
                .iter()
                .map(|entry| (entry.key().clone(), *entry.value()))
                .collect(),
            hub,
            strategy: *self.inner.strategy.read().await,
        }
    }
}

impl HubInner {
    async fn persist_state(&self) {
        self.deps.persist_state(self.lifecycle.state()).await;
    }

    /// Push `message` and return the new depth
    ///
    /// A stop that began after the caller's running check may already have
    /// cleared the queue, so the status is read again once the message is in.
    /// If the topology left `Running`, the queue is discarded and counted as
    /// dropped.
    async fn enqueue(&self, message: Message) -> MeshResult<usize> {
        let depth = self.queue.push(message).await;
        let status = self.lifecycle.state().status().await;
        if status != TopologyStatus::Running {
            self.discard_queued().await;
            return Err(MeshError::invalid_state("route", status));
        }
        Ok(depth)
    }

    async fn dispatch_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        debug!(topology = %self.config.id, "Dispatch loop started");

        loop {
            let stopping = *shutdown.borrow();
            if stopping || !self.lifecycle.state().is_running().await {
                break;
            }

            let Some(message) = self.queue.pop().await else {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = self.queue.wait(self.config.idle_backoff) => {}
                }
                continue;
            };

            self.deps
                .metrics
                .set_gauge(names::QUEUE_DEPTH, self.queue.len().await as i64);

            let message_id = message.id().clone();
            if let Err(panic) = AssertUnwindSafe(self.dispatch(message)).catch_unwind().await {
                error!(message_id = %message_id, "Dispatch panicked: {}", panic_message(&panic));
            }
        }

        self.discard_queued().await;
        debug!(topology = %self.config.id, "Dispatch loop exited");
    }

    async fn dispatch(self: &Arc<Self>, message: Message) {
        let Some(receiver) = message.receiver().cloned() else {
            let spokes = self.roster.read().await.spokes();
            debug!(message_id = %message.id(), spokes = spokes.len(), "Dispatching broadcast");
            self.deps.notifier.notify(Notification::broadcast(&message));

            let message = Arc::new(message);
            for spoke in spokes {
                let this = Arc::clone(self);
                let message = Arc::clone(&message);
                self.pool.submit(async move {
                    this.deliver(&spoke, &message).await;
                });
            }
            return;
        };

        let agent = self.roster.read().await.agents.get(&receiver).cloned();
        match agent {
            Some(agent) => {
                self.deps.notifier.notify(Notification::direct(&message));
                self.deliver(&agent, &message).await;
            }
            None => {
                warn!(message_id = %message.id(), receiver = %receiver, "Dropping message for unknown receiver");
                self.deps.metrics.increment_counter(names::MESSAGES_DROPPED);
            }
        }
    }

    async fn deliver(&self, agent: &SharedAgent, message: &Message) {
        if self.deps.deliver(agent, message).await.is_ok()
            && let Some(mut load) = self.loads.get_mut(agent.id())
        {
            *load = load.saturating_add(1);
        }
    }

    async fn check_health(&self) {
        let agents = self.roster.read().await.agents.snapshot();
        for agent in &agents {
            if agent.status() == AgentStatus::Active {
                self.active.insert(agent.id().clone());
            } else if self.active.remove(agent.id()).is_some() {
                debug!(agent = %agent.id(), status = agent.status().as_str(), "Agent no longer active");
            }
        }
        self.deps
            .metrics
            .set_gauge(names::ACTIVE_AGENTS, self.active.len() as i64);
    }

    async fn discard_queued(&self) {
        let dropped = self.queue.clear().await;
        if dropped > 0 {
            warn!(topology = %self.config.id, "Discarded {} undelivered messages", dropped);
            self.deps
                .metrics
                .add_counter(names::MESSAGES_DROPPED, dropped as u64);
        }
        self.deps.metrics.set_gauge(names::QUEUE_DEPTH, 0);
    }
}

#[async_trait]
impl Topology for HubTopology {
    fn id(&self) -> &str {
        &self.inner.config.id
    }

    fn pattern(&self) -> &'static str {
        TopologyKind::Hub.pattern_name()
    }

    async fn add_agent(&self, agent: SharedAgent) {
        let id = agent.id().clone();
        let mut roster = self.inner.roster.write().await;
        roster.agents.insert(agent);
        if roster.hub.is_none() {
            info!(hub = %id, "Hub elected");
            roster.hub = Some(id.clone());
        }
        self.inner.loads.entry(id.clone()).or_insert(0);
        self.inner
            .lifecycle
            .state()
            .set_agent_count(roster.agents.len())
            .await;
        debug!(agent = %id, "Added agent");
    }

    async fn remove_agent(&self, id: &AgentId) -> Option<SharedAgent> {
        let mut roster = self.inner.roster.write().await;
        let removed = roster.agents.remove(id)?;
        if roster.hub.as_ref() == Some(id) {
            warn!(hub = %id, "Hub removed; topology has no hub");
            roster.hub = None;
        }
        self.inner.loads.remove(id);
        self.inner.active.remove(id);
        self.inner
            .lifecycle
            .state()
            .set_agent_count(roster.agents.len())
            .await;
        debug!(agent = %id, "Removed agent");
        Some(removed)
    }

    async fn agents(&self) -> Vec<SharedAgent> {
        self.inner.roster.read().await.agents.snapshot()
    }

    async fn initialize(&self) -> MeshResult<()> {
        let result = self
            .inner
            .lifecycle
            .initialize(async {
                let roster = self.inner.roster.read().await;
                if roster.hub.is_none() {
                    return Err(MeshError::MissingHub);
                }
                Ok(roster.agents.snapshot())
            })
            .await;
        self.inner.persist_state().await;
        result
    }

    async fn start(&self) -> MeshResult<()> {
        let inner = Arc::clone(&self.inner);
        let result = self
            .inner
            .lifecycle
            .start(move |tasks| {
                let dispatcher = Arc::clone(&inner);
                tasks.spawn("hub-dispatch", move |shutdown| {
                    dispatcher.dispatch_loop(shutdown)
                });

                let period = inner.config.health_check_interval;
                tasks.spawn_periodic("hub-health", period, std::time::Duration::ZERO, move || {
                    let inner = Arc::clone(&inner);
                    async move { inner.check_health().await }
                });
            })
            .await;
        self.inner.persist_state().await;
        result?;
        info!(topology = %self.inner.config.id, "Hub topology running");
        Ok(())
    }

    async fn stop(&self) -> MeshResult<()> {
        let result = self
            .inner
            .lifecycle
            .stop(Some(&self.inner.pool), self.agents())
            .await;
        if result.is_ok() {
            // The dispatch loop may have been aborted before clearing the queue
            self.inner.discard_queued().await;
        }
        self.inner.persist_state().await;
        result
    }

    async fn state(&self) -> TopologyState {
        self.inner.lifecycle.state().snapshot().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MeshMetricsCollector;
    use crate::persistence::{MemoryStore, PersistenceStoreExt, state_key};
    use agentmesh_core::MessageKind;
    use agentmesh_testing::MockAgent;
    use std::time::Duration;

    fn id(s: &str) -> AgentId {
        AgentId::from(s)
    }

    fn config() -> TopologyConfig {
        TopologyConfig::new("hub", TopologyKind::Hub)
            .with_idle_backoff(Duration::from_millis(10))
            .with_drain_timeout(Duration::from_secs(5))
    }

    async fn build(
        topology: HubTopology,
        names: &[&str],
    ) -> (HubTopology, Vec<Arc<MockAgent>>) {
        let mut agents = Vec::new();
        for name in names {
            let agent = Arc::new(MockAgent::new(name));
            topology.add_agent(agent.clone()).await;
            agents.push(agent);
        }
        (topology, agents)
    }

    async fn running(names: &[&str]) -> (HubTopology, Vec<Arc<MockAgent>>) {
        let (topology, agents) = build(HubTopology::new(config()), names).await;
        topology.initialize().await.unwrap();
        topology.start().await.unwrap();
        (topology, agents)
    }

    fn unicast(from: &str, to: &str, payload: &str) -> Message {
        Message::unicast(id(from), id(to), MessageKind::Command, payload)
    }

    #[tokio::test]
    async fn test_first_agent_is_hub() {
        let (topology, _) = build(HubTopology::new(config()), &["h", "s1", "s2"]).await;
        assert_eq!(topology.hub().await.unwrap().id(), &id("h"));
        assert_eq!(topology.spokes().await.len(), 2);

        topology.set_hub(&id("s2")).await.unwrap();
        assert_eq!(topology.hub().await.unwrap().id(), &id("s2"));
        let err = topology.set_hub(&id("ghost")).await.unwrap_err();
        assert_eq!(err, MeshError::UnknownAgent(id("ghost")));

        // Re-adding an existing id changes neither hub nor count
        topology.add_agent(Arc::new(MockAgent::new("s1"))).await;
        assert_eq!(topology.state().await.agent_count, 3);
        assert_eq!(topology.hub().await.unwrap().id(), &id("s2"));
    }

    #[tokio::test]
    async fn test_removing_hub_blocks_initialize() {
        let (topology, _) = build(HubTopology::new(config()), &["h", "s1"]).await;
        topology.remove_agent(&id("h")).await.unwrap();
        assert!(topology.hub().await.is_none());
        assert!(topology.remove_agent(&id("h")).await.is_none());

        let err = topology.initialize().await.unwrap_err();
        assert_eq!(err, MeshError::MissingHub);
        assert_eq!(topology.state().await.status, crate::TopologyStatus::Created);

        topology.set_hub(&id("s1")).await.unwrap();
        topology.initialize().await.unwrap();
    }

    #[tokio::test]
    async fn test_route_requires_running() {
        let (topology, _) = build(HubTopology::new(config()), &["h", "s1"]).await;
        let err = topology.route(unicast("h", "s1", "x")).await.unwrap_err();
        assert_eq!(err, MeshError::invalid_state("route", "created"));
        assert_eq!(topology.queue_depth().await, 0);
    }

    #[tokio::test]
    async fn test_unicast_reaches_only_receiver() {
        let (topology, agents) = running(&["h", "s1", "s2"]).await;
        let message = unicast("s1", "s2", "hello");
        topology.route(message.clone()).await.unwrap();

        assert!(agents[2].wait_for_messages(1, Duration::from_secs(2)).await);
        topology.stop().await.unwrap();

        assert_eq!(agents[2].received(), vec![message]);
        assert!(agents[0].received().is_empty());
        assert!(agents[1].received().is_empty());
        assert_eq!(topology.load(&id("s2")), 1);
    }

    #[tokio::test]
    async fn test_unicast_fifo() {
        let (topology, agents) = running(&["h", "s1"]).await;
        let sent: Vec<Message> = (0..25)
            .map(|n| unicast("h", "s1", &n.to_string()))
            .collect();
        for message in &sent {
            topology.route(message.clone()).await.unwrap();
        }

        assert!(agents[1].wait_for_messages(25, Duration::from_secs(5)).await);
        topology.stop().await.unwrap();
        assert_eq!(agents[1].received(), sent);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_spoke() {
        let (topology, agents) = running(&["h", "s1", "s2", "s3"]).await;
        topology
            .route(Message::broadcast(id("h"), MessageKind::Event, "all"))
            .await
            .unwrap();

        for spoke in &agents[1..] {
            assert!(spoke.wait_for_messages(1, Duration::from_secs(2)).await);
        }
        topology.stop().await.unwrap();
        assert!(agents[0].received().is_empty());
    }

    #[tokio::test]
    async fn test_failures_and_unknown_receivers_do_not_stop_loop() {
        let metrics = Arc::new(MeshMetricsCollector::with_defaults());
        let deps = TopologyDeps::new().with_metrics(metrics.clone());
        let (topology, agents) =
            build(HubTopology::with_deps(config(), deps), &["h", "bad", "good"]).await;
        agents[1].fail_deliveries("crashed");
        topology.initialize().await.unwrap();
        topology.start().await.unwrap();

        topology.route(unicast("h", "bad", "1")).await.unwrap();
        topology.route(unicast("h", "nobody", "2")).await.unwrap();
        topology.route(unicast("h", "good", "3")).await.unwrap();

        assert!(agents[2].wait_for_messages(1, Duration::from_secs(2)).await);
        topology.stop().await.unwrap();

        assert_eq!(agents[1].status(), AgentStatus::ShutDown);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.counter(names::MESSAGES_ROUTED), 3);
        assert_eq!(snapshot.counter(names::DELIVERY_FAILURES), 1);
        assert_eq!(snapshot.counter(names::MESSAGES_DROPPED), 1);
        assert_eq!(snapshot.counter(names::MESSAGES_DELIVERED), 1);
        // Failed attempts are timed too; unknown receivers are not
        assert_eq!(snapshot.averages[names::DELIVERY_LATENCY_MS].count, 2);
        assert!(snapshot.average(names::DELIVERY_LATENCY_MS).unwrap() >= 0.0);
        assert_eq!(topology.load(&id("bad")), 0);
    }

    #[tokio::test]
    async fn test_failed_delivery_sets_error_status() {
        let (topology, agents) = running(&["h", "s1"]).await;
        agents[1].fail_deliveries("boom");
        topology.route(unicast("h", "s1", "x")).await.unwrap();
        assert!(agents[1].wait_for_messages(1, Duration::from_secs(2)).await);

        // Status is set right after process_message returns
        tokio::time::timeout(Duration::from_secs(2), async {
            while agents[1].status() != AgentStatus::Error {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        topology.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_round_robin() {
        let (topology, _) = build(HubTopology::new(config()), &["h", "s1", "s2", "s3"]).await;
        let first = topology.next_agent(None).await.unwrap();
        assert_eq!(first.id(), &id("s1"));

        let second = topology.next_agent(Some(first.id())).await.unwrap();
        assert_eq!(second.id(), &id("s2"));
        let wrapped = topology.next_agent(Some(&id("s3"))).await.unwrap();
        assert_eq!(wrapped.id(), &id("s1"));
        let unknown = topology.next_agent(Some(&id("ghost"))).await.unwrap();
        assert_eq!(unknown.id(), &id("s1"));
    }

    #[tokio::test]
    async fn test_least_loaded_and_random() {
        let (topology, agents) = running(&["h", "s1", "s2", "s3"]).await;
        topology
            .set_load_balancing_strategy(LoadBalancingStrategy::LeastLoaded)
            .await;

        // Ties resolve to registration order
        assert_eq!(topology.next_agent(None).await.unwrap().id(), &id("s1"));

        topology.route(unicast("h", "s1", "a")).await.unwrap();
        topology.route(unicast("h", "s2", "b")).await.unwrap();
        assert!(agents[2].wait_for_messages(1, Duration::from_secs(2)).await);
        topology.stop().await.unwrap();
        assert_eq!(topology.next_agent(None).await.unwrap().id(), &id("s3"));

        topology
            .set_load_balancing_strategy(LoadBalancingStrategy::Random)
            .await;
        assert_eq!(
            topology.load_balancing_strategy().await,
            LoadBalancingStrategy::Random
        );
        for _ in 0..20 {
            let picked = topology.next_agent(None).await.unwrap();
            assert_ne!(picked.id(), &id("h"));
        }
    }

    #[tokio::test]
    async fn test_next_agent_without_spokes() {
        let (topology, _) = build(HubTopology::new(config()), &["h"]).await;
        assert!(topology.next_agent(None).await.is_none());
    }

    #[tokio::test]
    async fn test_health_check_tracks_active_agents() {
        let (topology, agents) = build(HubTopology::new(config()), &["h", "s1", "s2"]).await;
        topology.initialize().await.unwrap();
        agents[2].set_status(AgentStatus::Busy);

        topology.check_health().await;
        let stats = topology.statistics().await;
        assert_eq!(stats.total_agents, 3);
        assert_eq!(stats.active_agents, 2);
        assert_eq!(stats.hub, Some(id("h")));
        assert_eq!(stats.strategy, LoadBalancingStrategy::RoundRobin);
        assert_eq!(stats.agent_loads.len(), 3);

        agents[2].set_status(AgentStatus::Active);
        topology.check_health().await;
        assert_eq!(topology.statistics().await.active_agents, 3);
    }

    #[tokio::test]
    async fn test_find_agents() {
        let (topology, _) = build(HubTopology::new(config()), &["h", "s1", "s2"]).await;
        topology
            .add_agent(Arc::new(MockAgent::with_type("sensor-1", "sensor")))
            .await;
        let sensors = topology
            .find_agents(|agent| agent.agent_type() == "sensor")
            .await;
        assert_eq!(sensors.len(), 1);
        assert_eq!(sensors[0].id(), &id("sensor-1"));
    }

    #[tokio::test]
    async fn test_stop_discards_queued_messages() {
        let metrics = Arc::new(MeshMetricsCollector::with_defaults());
        let deps = TopologyDeps::new().with_metrics(metrics.clone());
        let topology = HubTopology::with_deps(config(), deps);
        let hub = Arc::new(MockAgent::new("h"));
        let slow = Arc::new(MockAgent::new("slow").with_delay(Duration::from_millis(300)));
        topology.add_agent(hub).await;
        topology.add_agent(slow.clone()).await;
        topology.initialize().await.unwrap();
        topology.start().await.unwrap();

        for n in 0..4 {
            topology.route(unicast("h", "slow", &n.to_string())).await.unwrap();
        }
        assert!(slow.wait_for_messages(1, Duration::from_secs(2)).await);
        topology.stop().await.unwrap();

        assert_eq!(slow.received().len(), 1);
        assert_eq!(topology.queue_depth().await, 0);
        assert_eq!(metrics.snapshot().counter(names::MESSAGES_DROPPED), 3);
    }

    #[tokio::test]
    async fn test_message_queued_after_stop_began_is_dropped() {
        let metrics = Arc::new(MeshMetricsCollector::with_defaults());
        let deps = TopologyDeps::new().with_metrics(metrics.clone());
        let (topology, _) = build(HubTopology::with_deps(config(), deps), &["h", "s1"]).await;
        topology.initialize().await.unwrap();
        topology.start().await.unwrap();
        topology.stop().await.unwrap();

        // A route that passed its running check just before stop cleared the queue
        let err = topology
            .inner
            .enqueue(unicast("h", "s1", "late"))
            .await
            .unwrap_err();
        assert!(matches!(err, MeshError::InvalidState { operation: "route", .. }));
        assert_eq!(topology.queue_depth().await, 0);
        assert_eq!(metrics.snapshot().counter(names::MESSAGES_DROPPED), 1);
    }

    #[tokio::test]
    async fn test_lifecycle_persists_state_snapshots() {
        let store = Arc::new(MemoryStore::new());
        let deps = TopologyDeps::new().with_persistence(store.clone());
        let (topology, _) = build(HubTopology::with_deps(config(), deps), &["h", "s1"]).await;
        let key = state_key("hub");

        topology.initialize().await.unwrap();
        let saved: TopologyState = store.load_as(&key).unwrap().unwrap();
        assert_eq!(saved.status, TopologyStatus::Initialized);

        topology.start().await.unwrap();
        topology.stop().await.unwrap();
        let saved: TopologyState = store.load_as(&key).unwrap().unwrap();
        assert_eq!(saved, topology.state().await);
        assert_eq!(saved.status, TopologyStatus::Stopped);
        assert_eq!(saved.agent_count, 2);
        assert!(saved.start_time.is_some());
    }

    #[tokio::test]
    async fn test_stop_idempotent() {
        let (topology, agents) = running(&["h", "s1", "s2"]).await;
        topology.stop().await.unwrap();
        topology.stop().await.unwrap();

        let state = topology.state().await;
        assert_eq!(state.status, crate::TopologyStatus::Stopped);
        assert_eq!(state.pattern, "hub-spoke");
        for agent in &agents {
            assert_eq!(agent.initialize_calls(), 1);
            assert_eq!(agent.shutdown_calls(), 1);
        }
    }
}

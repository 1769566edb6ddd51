//! `agentmesh simulate`: drive mock agents through one topology

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use agentmesh_core::{
    AgentId, MeshAgent, Message, MessageKind, SharedAgent, TopologyConfig, TopologyKind,
};
use agentmesh_testing::MockAgent;
use agentmesh_topology::{
    AnyTopology, EventBus, HubTopology, Mesh, MeshMetricsCollector, MetricsSnapshot,
    Notification, PeerTopology, PipelineTopology, Topology, TopologyDeps, TopologyStatus,
};
use anyhow::{Context, bail, ensure};
use serde::Serialize;
use tokio::sync::broadcast::{Receiver, error::TryRecvError};
use tracing::{info, warn};

/// How long to wait for asynchronous deliveries before stopping
const SETTLE_TIMEOUT: Duration = Duration::from_secs(10);
const SETTLE_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct SimulationOptions {
    pub config: TopologyConfig,
    pub agents: usize,
    pub messages: usize,
}

#[derive(Debug, Serialize)]
pub struct SimulationSummary {
    pub topology: String,
    pub pattern: &'static str,
    pub status: TopologyStatus,
    pub agents: usize,
    pub messages_sent: usize,
    pub deliveries_expected: usize,
    pub deliveries_observed: usize,
    pub received_per_agent: BTreeMap<String, usize>,
    pub notifications: u64,
    pub metrics: MetricsSnapshot,
    pub elapsed_ms: u128,
}

/// Read `path`, or fall back to the default configuration
pub fn load_config(path: Option<&Path>) -> anyhow::Result<TopologyConfig> {
    match path {
        Some(path) => TopologyConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Ok(TopologyConfig::default()),
    }
}

fn build_agents(count: usize) -> Vec<Arc<MockAgent>> {
    (0..count)
        .map(|i| Arc::new(MockAgent::with_type(format!("agent-{:02}", i), "simulated")))
        .collect()
}

fn total_received(agents: &[Arc<MockAgent>]) -> usize {
    agents.iter().map(|agent| agent.received_count()).sum()
}

async fn settle(agents: &[Arc<MockAgent>], expected: usize) -> bool {
    let deadline = Instant::now() + SETTLE_TIMEOUT;
    while total_received(agents) < expected {
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(SETTLE_POLL).await;
    }
    true
}

fn count_notifications(receiver: &mut Receiver<Notification>) -> u64 {
    let mut count = 0u64;
    loop {
        match receiver.try_recv() {
            Ok(_) => count += 1,
            Err(TryRecvError::Lagged(missed)) => count += missed,
            Err(TryRecvError::Empty | TryRecvError::Closed) => return count,
        }
    }
}

/// Hub is `agents[0]`; messages go from the hub to spokes picked by the
/// configured load-balancing strategy
async fn drive_hub(hub: &HubTopology, messages: usize) -> anyhow::Result<usize> {
    let Some(hub_agent) = hub.hub().await else {
        bail!("hub topology has no hub");
    };
    let sender = hub_agent.id().clone();

    let mut previous: Option<AgentId> = None;
    for i in 0..messages {
        let Some(spoke) = hub.next_agent(previous.as_ref()).await else {
            bail!("hub topology has no spokes");
        };
        let receiver = spoke.id().clone();
        let message = Message::unicast(
            sender.clone(),
            receiver.clone(),
            MessageKind::Event,
            format!("reading-{}", i),
        );
        hub.route(message).await?;
        previous = Some(receiver);
    }
    Ok(messages)
}

/// Agents form a ring; message `i` goes from agent `i` to its successor
async fn drive_peer(peer: &PeerTopology, ids: &[AgentId], messages: usize) -> anyhow::Result<usize> {
    for (i, id) in ids.iter().enumerate() {
        let next = &ids[(i + 1) % ids.len()];
        if id != next {
            peer.connect(id, next).await?;
        }
    }

    for i in 0..messages {
        let from = &ids[i % ids.len()];
        let to = &ids[(i + 1) % ids.len()];
        let message = Message::unicast(
            from.clone(),
            to.clone(),
            MessageKind::Command,
            format!("task-{}", i),
        );
        peer.send(message).await?;
    }
    Ok(messages)
}

/// Each message is handed stage to stage by the caller
async fn drive_pipeline(pipeline: &PipelineTopology, messages: usize) -> anyhow::Result<usize> {
    let Some(first) = pipeline.first_agent().await else {
        bail!("pipeline has no stages");
    };
    let source = first.id().clone();

    let mut deliveries = 0;
    for i in 0..messages {
        let message = Message::broadcast(source.clone(), MessageKind::Event, format!("record-{}", i));
        let mut stage: Option<SharedAgent> = Some(first.clone());
        while let Some(agent) = stage {
            agent.process_message(&message).await?;
            deliveries += 1;
            stage = pipeline.next_agent(agent.id()).await;
        }
    }
    Ok(deliveries)
}

pub async fn run_simulation(options: SimulationOptions) -> anyhow::Result<SimulationSummary> {
    let SimulationOptions {
        config,
        agents: agent_count,
        messages,
    } = options;

    let minimum = match config.kind {
        TopologyKind::Hub | TopologyKind::Peer => 2,
        TopologyKind::Pipeline => 1,
    };
    ensure!(
        agent_count >= minimum,
        "{} topology needs at least {} agents",
        config.kind.pattern_name(),
        minimum
    );

    let bus = EventBus::default();
    let mut notifications = bus.subscribe();
    let metrics = Arc::new(MeshMetricsCollector::with_defaults());
    let deps = TopologyDeps::new()
        .with_notifier(Arc::new(bus))
        .with_metrics(metrics.clone());

    let mesh: Mesh<AnyTopology> = Mesh::from_config(config, deps)?;
    let agents = build_agents(agent_count);
    for agent in &agents {
        mesh.add_agent(agent.clone()).await;
    }
    let ids: Vec<AgentId> = agents.iter().map(|agent| agent.id().clone()).collect();

    let started = Instant::now();
    mesh.initialize().await?;
    mesh.start().await?;

    let driven = match mesh.topology() {
        AnyTopology::Hub(hub) => drive_hub(hub, messages).await,
        AnyTopology::Peer(peer) => drive_peer(peer, &ids, messages).await,
        AnyTopology::Pipeline(pipeline) => drive_pipeline(pipeline, messages).await,
    };
    let expected = match driven {
        Ok(expected) => expected,
        Err(e) => {
            mesh.stop().await?;
            return Err(e);
        }
    };

    if !settle(&agents, expected).await {
        warn!(
            expected,
            observed = total_received(&agents),
            "Deliveries did not settle before timeout"
        );
    }

    if let Some(peer) = mesh.topology().as_peer() {
        peer.monitor_cycle().await;
    }

    mesh.stop().await?;
    let elapsed = started.elapsed();
    let state = mesh.state().await;

    let received_per_agent = agents
        .iter()
        .map(|agent| (agent.id().to_string(), agent.received_count()))
        .collect();

    info!(
        topology = %state.id,
        messages,
        elapsed_ms = elapsed.as_millis() as u64,
        "Simulation finished"
    );

    Ok(SimulationSummary {
        topology: state.id,
        pattern: mesh.topology().pattern(),
        status: state.status,
        agents: agent_count,
        messages_sent: messages,
        deliveries_expected: expected,
        deliveries_observed: total_received(&agents),
        received_per_agent,
        notifications: count_notifications(&mut notifications),
        metrics: metrics.snapshot(),
        elapsed_ms: elapsed.as_millis(),
    })
}

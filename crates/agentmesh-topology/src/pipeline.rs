//! Linear pipeline topology
//!
//! Agents form an explicit order; callers ask which agent comes after a given
//! stage and move work along themselves. The topology routes nothing on its
//! own.

use std::collections::HashSet;

use agentmesh_core::{AgentId, MeshError, MeshResult, SharedAgent, TopologyConfig, TopologyKind};
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::lifecycle::Lifecycle;
use crate::registry::AgentRegistry;
use crate::state::{SharedState, TopologyState};
use crate::topology::{Topology, TopologyDeps};

/// Registry plus stage order, kept consistent under one lock
#[derive(Default)]
struct Stages {
    agents: AgentRegistry,
    order: Vec<AgentId>,
}

pub struct PipelineTopology {
    config: TopologyConfig,
    lifecycle: Lifecycle,
    stages: RwLock<Stages>,
    deps: TopologyDeps,
}

impl PipelineTopology {
    pub fn new(config: TopologyConfig) -> Self {
        Self::with_deps(config, TopologyDeps::default())
    }

    /// Stages route nothing, so only `deps.persistence` is used
    pub fn with_deps(config: TopologyConfig, deps: TopologyDeps) -> Self {
        let state = SharedState::new(config.id.clone(), TopologyKind::Pipeline.pattern_name());
        Self {
            lifecycle: Lifecycle::new(state, config.drain_timeout),
            stages: RwLock::new(Stages::default()),
            deps,
            config,
        }
    }

    /// Replace the stage order
    ///
    /// `order` must be a permutation of exactly the registered ids; anything
    /// else is rejected and the current order is kept.
    pub async fn set_order(&self, order: Vec<AgentId>) -> MeshResult<()> {
        let mut stages = self.stages.write().await;

        if order.len() != stages.agents.len() {
            return Err(MeshError::InvalidOrder(format!(
                "expected {} agents, got {}",
                stages.agents.len(),
                order.len()
            )));
        }

        let mut seen = HashSet::with_capacity(order.len());
        for id in &order {
            if !stages.agents.contains(id) {
                return Err(MeshError::InvalidOrder(format!("unknown agent {}", id)));
            }
            if !seen.insert(id) {
                return Err(MeshError::InvalidOrder(format!("duplicate agent {}", id)));
            }
        }

        debug!(order = ?order.iter().map(AgentId::as_str).collect::<Vec<_>>(), "Pipeline order set");
        stages.order = order;
        Ok(())
    }

    /// The stage after `id`; `None` for the last stage or an unknown id
    pub async fn next_agent(&self, id: &AgentId) -> Option<SharedAgent> {
        let stages = self.stages.read().await;
        let position = stages.order.iter().position(|stage| stage == id)?;
        let next = stages.order.get(position + 1)?;
        stages.agents.get(next).cloned()
    }

    /// The first stage, if any
    pub async fn first_agent(&self) -> Option<SharedAgent> {
        let stages = self.stages.read().await;
        stages.order.first().and_then(|id| stages.agents.get(id)).cloned()
    }

    pub async fn order(&self) -> Vec<AgentId> {
        self.stages.read().await.order.clone()
    }
}

#[async_trait]
impl Topology for PipelineTopology {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn pattern(&self) -> &'static str {
        TopologyKind::Pipeline.pattern_name()
    }

    async fn add_agent(&self, agent: SharedAgent) {
        let id = agent.id().clone();
        let mut stages = self.stages.write().await;
        if stages.agents.insert(agent) {
            stages.order.push(id.clone());
        }
        self.lifecycle
            .state()
            .set_agent_count(stages.agents.len())
            .await;
        debug!(agent = %id, "Added pipeline stage");
    }

    async fn remove_agent(&self, id: &AgentId) -> Option<SharedAgent> {
        let mut stages = self.stages.write().await;
        let removed = stages.agents.remove(id)?;
        stages.order.retain(|stage| stage != id);
        self.lifecycle
            .state()
            .set_agent_count(stages.agents.len())
            .await;
        debug!(agent = %id, "Removed pipeline stage");
        Some(removed)
    }

    /// Agents in pipeline order
    async fn agents(&self) -> Vec<SharedAgent> {
        let stages = self.stages.read().await;
        stages
            .order
            .iter()
            .filter_map(|id| stages.agents.get(id))
            .cloned()
            .collect()
    }

    async fn initialize(&self) -> MeshResult<()> {
        let result = self
            .lifecycle
            .initialize(async { Ok(self.agents().await) })
            .await;
        self.deps.persist_state(self.lifecycle.state()).await;
        result
    }

    async fn start(&self) -> MeshResult<()> {
        let result = self.lifecycle.start(|_| {}).await;
        self.deps.persist_state(self.lifecycle.state()).await;
        result?;
        info!(topology = %self.config.id, "Pipeline topology running");
        Ok(())
    }

    async fn stop(&self) -> MeshResult<()> {
        let result = self.lifecycle.stop(None, self.agents()).await;
        self.deps.persist_state(self.lifecycle.state()).await;
        result
    }

    async fn state(&self) -> TopologyState {
        self.lifecycle.state().snapshot().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentmesh_testing::MockAgent;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn id(s: &str) -> AgentId {
        AgentId::from(s)
    }

    async fn pipeline(names: &[&str]) -> PipelineTopology {
        let pipeline = PipelineTopology::new(TopologyConfig::new("etl", TopologyKind::Pipeline));
        for name in names {
            pipeline.add_agent(Arc::new(MockAgent::new(name))).await;
        }
        pipeline
    }

    async fn next(pipeline: &PipelineTopology, of: &str) -> Option<String> {
        pipeline
            .next_agent(&id(of))
            .await
            .map(|agent| agent.id().to_string())
    }

    #[tokio::test]
    async fn test_next_agent_follows_order() {
        let pipeline = pipeline(&["a", "b", "c"]).await;
        assert_eq!(next(&pipeline, "a").await.as_deref(), Some("b"));
        assert_eq!(next(&pipeline, "b").await.as_deref(), Some("c"));
        assert_eq!(next(&pipeline, "c").await, None);
        assert_eq!(next(&pipeline, "ghost").await, None);

        pipeline
            .set_order(vec![id("c"), id("a"), id("b")])
            .await
            .unwrap();
        assert_eq!(next(&pipeline, "c").await.as_deref(), Some("a"));
        assert_eq!(next(&pipeline, "b").await, None);
        assert_eq!(pipeline.first_agent().await.unwrap().id(), &id("c"));

        let ids: Vec<AgentId> = pipeline
            .agents()
            .await
            .iter()
            .map(|agent| agent.id().clone())
            .collect();
        assert_eq!(ids, vec![id("c"), id("a"), id("b")]);
    }

    #[tokio::test]
    async fn test_set_order_rejects_non_permutations() {
        let pipeline = pipeline(&["a", "b", "c"]).await;
        let original = pipeline.order().await;

        for bad in [
            vec![id("a"), id("b")],
            vec![id("a"), id("b"), id("b")],
            vec![id("a"), id("b"), id("x")],
            vec![id("a"), id("b"), id("c"), id("c")],
        ] {
            let err = pipeline.set_order(bad).await.unwrap_err();
            assert!(matches!(err, MeshError::InvalidOrder(_)));
            assert_eq!(pipeline.order().await, original);
        }
    }

    #[tokio::test]
    async fn test_remove_agent_updates_order() {
        let pipeline = pipeline(&["a", "b", "c"]).await;
        pipeline.remove_agent(&id("b")).await.unwrap();

        assert_eq!(pipeline.order().await, vec![id("a"), id("c")]);
        assert_eq!(next(&pipeline, "a").await.as_deref(), Some("c"));
        assert_eq!(pipeline.state().await.agent_count, 2);
    }

    #[tokio::test]
    async fn test_readding_keeps_position() {
        let pipeline = pipeline(&["a", "b"]).await;
        pipeline.add_agent(Arc::new(MockAgent::new("a"))).await;
        assert_eq!(pipeline.order().await, vec![id("a"), id("b")]);
        assert_eq!(pipeline.state().await.agent_count, 2);
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let stages: Vec<Arc<MockAgent>> =
            ["a", "b"].iter().map(|n| Arc::new(MockAgent::new(n))).collect();
        let pipeline = PipelineTopology::new(TopologyConfig::new("etl", TopologyKind::Pipeline));
        for stage in &stages {
            pipeline.add_agent(stage.clone()).await;
        }

        pipeline.initialize().await.unwrap();
        pipeline.start().await.unwrap();
        assert!(pipeline.state().await.is_running());
        pipeline.stop().await.unwrap();
        pipeline.stop().await.unwrap();

        for stage in &stages {
            assert_eq!(stage.initialize_calls(), 1);
            assert_eq!(stage.shutdown_calls(), 1);
        }
    }

    proptest! {
        #[test]
        fn prop_order_is_always_a_permutation(
            picks in prop::collection::vec(0usize..6, 0..8)
        ) {
            tokio_test::block_on(async {
                let names = ["a", "b", "c", "d"];
                let pipeline = pipeline(&names).await;
                let candidate: Vec<AgentId> = picks
                    .iter()
                    .map(|i| id(["a", "b", "c", "d", "e", "f"][*i]))
                    .collect();

                let mut sorted: Vec<&str> = candidate.iter().map(AgentId::as_str).collect();
                sorted.sort_unstable();
                let is_permutation = sorted == names;

                let accepted = pipeline.set_order(candidate.clone()).await.is_ok();
                assert_eq!(accepted, is_permutation);

                let mut order: Vec<String> =
                    pipeline.order().await.iter().map(AgentId::to_string).collect();
                order.sort();
                assert_eq!(order, names);
                if accepted {
                    assert_eq!(pipeline.order().await, candidate);
                }
            });
        }
    }
}

//! Ordered agent registry

use std::collections::HashMap;

use agentmesh_core::{AgentId, SharedAgent};

/// Agents keyed by id, remembering registration order
///
/// Re-registering an id replaces the agent in place; it keeps its original
/// position and the count does not change.
#[derive(Default, Clone)]
pub struct AgentRegistry {
    agents: HashMap<AgentId, SharedAgent>,
    order: Vec<AgentId>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent; returns `true` if the id was not present before
    pub fn insert(&mut self, agent: SharedAgent) -> bool {
        let id = agent.id().clone();
        let is_new = self.agents.insert(id.clone(), agent).is_none();
        if is_new {
            self.order.push(id);
        }
        is_new
    }

    pub fn remove(&mut self, id: &AgentId) -> Option<SharedAgent> {
        let removed = self.agents.remove(id)?;
        self.order.retain(|existing| existing != id);
        Some(removed)
    }

    pub fn get(&self, id: &AgentId) -> Option<&SharedAgent> {
        self.agents.get(id)
    }

    pub fn contains(&self, id: &AgentId) -> bool {
        self.agents.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Ids in registration order
    pub fn ids(&self) -> &[AgentId] {
        &self.order
    }

    /// Agents in registration order
    pub fn iter(&self) -> impl Iterator<Item = &SharedAgent> {
        self.order.iter().filter_map(|id| self.agents.get(id))
    }

    pub fn snapshot(&self) -> Vec<SharedAgent> {
        self.iter().cloned().collect()
    }
}

impl std::fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRegistry")
            .field("agents", &self.order)
            .finish()
    }
}

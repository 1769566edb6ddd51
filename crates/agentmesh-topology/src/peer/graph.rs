//! Undirected connection graph and rebalancing arithmetic

use std::collections::{BTreeSet, HashMap};

use agentmesh_core::AgentId;

/// Symmetric adjacency sets, one per registered agent
///
/// Every edge is stored in both directions and an agent is never its own
/// peer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionGraph {
    peers: HashMap<AgentId, BTreeSet<AgentId>>,
}

impl ConnectionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, id: AgentId) {
        self.peers.entry(id).or_default();
    }

    /// Remove a node and every edge touching it
    pub fn remove_node(&mut self, id: &AgentId) {
        if let Some(peers) = self.peers.remove(id) {
            for peer in peers {
                if let Some(set) = self.peers.get_mut(&peer) {
                    set.remove(id);
                }
            }
        }
    }

    pub fn contains(&self, id: &AgentId) -> bool {
        self.peers.contains_key(id)
    }

    /// Connect two distinct nodes; returns `true` if the edge is new
    pub fn connect(&mut self, a: &AgentId, b: &AgentId) -> bool {
        if a == b || !self.contains(a) || !self.contains(b) {
            return false;
        }
        let added = self.peers.get_mut(a).is_some_and(|set| set.insert(b.clone()));
        if let Some(set) = self.peers.get_mut(b) {
            set.insert(a.clone());
        }
        added
    }

    /// Returns `true` if an edge was removed
    pub fn disconnect(&mut self, a: &AgentId, b: &AgentId) -> bool {
        let removed = self.peers.get_mut(a).is_some_and(|set| set.remove(b));
        if let Some(set) = self.peers.get_mut(b) {
            set.remove(a);
        }
        removed
    }

    pub fn is_connected(&self, a: &AgentId, b: &AgentId) -> bool {
        self.peers.get(a).is_some_and(|set| set.contains(b))
    }

    /// Peers of `id`, sorted; `None` if the node is unknown
    pub fn peers(&self, id: &AgentId) -> Option<&BTreeSet<AgentId>> {
        self.peers.get(id)
    }

    pub fn degree(&self, id: &AgentId) -> usize {
        self.peers.get(id).map_or(0, BTreeSet::len)
    }

    pub fn node_count(&self) -> usize {
        self.peers.len()
    }

    pub fn edge_count(&self) -> usize {
        self.peers.values().map(BTreeSet::len).sum::<usize>() / 2
    }

    /// Every edge appears in both endpoint sets and no node lists itself
    pub fn is_symmetric(&self) -> bool {
        self.peers.iter().all(|(id, set)| {
            !set.contains(id) && set.iter().all(|peer| self.is_connected(peer, id))
        })
    }
}

/// Minimum peer count an agent should hold in a network of `agent_count`
///
/// `max(2, floor(log2(n)))`.
pub fn min_connections(agent_count: usize) -> usize {
    let log = agent_count.checked_ilog2().unwrap_or(0) as usize;
    log.max(2)
}

/// Adjustments derived from the spread of connection counts
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RebalancePlan {
    pub average: f64,
    /// Over-connected agents and how many edges each should drop
    pub trim: Vec<(AgentId, usize)>,
    /// Under-connected agents that should discover more peers
    pub grow: Vec<AgentId>,
}

impl RebalancePlan {
    /// Above 1.5x the mean an agent drops `count - floor(mean)` edges; below
    /// 0.5x the mean it discovers more peers.
    pub fn from_counts(counts: &[(AgentId, usize)]) -> Self {
        if counts.is_empty() {
            return Self::default();
        }

        let total: usize = counts.iter().map(|(_, count)| count).sum();
        let average = total as f64 / counts.len() as f64;
        let mut plan = Self {
            average,
            ..Self::default()
        };

        for (id, count) in counts {
            let count = *count as f64;
            if count > average * 1.5 {
                let excess = (count - average.floor()) as usize;
                plan.trim.push((id.clone(), excess));
            } else if count < average * 0.5 {
                plan.grow.push(id.clone());
            }
        }

        plan
    }

    pub fn is_empty(&self) -> bool {
        self.trim.is_empty() && self.grow.is_empty()
    }
}

//! Property-based tests for routing and connection-health invariants
//!
//! Each case builds a fresh topology and drives it on its own runtime.

use std::sync::Arc;
use std::time::Duration;

use agentmesh_testing::MockAgent;
use agentmesh_workspace::prelude::*;
use agentmesh_workspace::topology::min_connections;
use proptest::prelude::*;

fn id(s: &str) -> AgentId {
    AgentId::from(s)
}

fn config(name: &str, kind: TopologyKind) -> TopologyConfig {
    TopologyConfig::new(name, kind)
        .with_idle_backoff(Duration::from_millis(5))
        .with_drain_timeout(Duration::from_secs(5))
}

// Undirected edges between agent indices, self-loops included on purpose
fn edges_strategy(max_agents: usize) -> impl Strategy<Value = Vec<(usize, usize)>> {
    prop::collection::vec((0..max_agents, 0..max_agents), 0..24)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// A monitor cycle leaves every agent at the network minimum, whatever the
    /// starting graph, and the graph symmetric
    #[test]
    fn prop_monitor_cycle_reaches_minimum(
        agent_count in 3usize..10,
        edges in edges_strategy(10)
    ) {
        tokio_test::block_on(async {
            let peer = PeerTopology::new(config("p2p", TopologyKind::Peer));
            let names: Vec<String> = (0..agent_count).map(|n| format!("agent-{}", n)).collect();
            for name in &names {
                peer.add_agent(Arc::new(MockAgent::new(name))).await;
            }
            for (a, b) in edges {
                if a < agent_count && b < agent_count && a != b {
                    peer.connect(&id(&names[a]), &id(&names[b])).await.unwrap();
                }
            }

            peer.monitor_cycle().await;

            let min = min_connections(agent_count);
            for (agent, degree) in peer.connection_counts().await {
                assert!(degree >= min, "{} has {} peers", agent, degree);
            }
            assert!(peer.graph().await.is_symmetric());
        });
    }

    /// Unicast messages to one spoke arrive in the order they were routed
    #[test]
    fn prop_hub_preserves_route_order(payloads in prop::collection::vec("[a-z]{1,8}", 1..12)) {
        tokio_test::block_on(async {
            let hub = HubTopology::new(config("hub", TopologyKind::Hub));
            let spoke = Arc::new(MockAgent::new("spoke"));
            hub.add_agent(Arc::new(MockAgent::new("hub"))).await;
            hub.add_agent(spoke.clone()).await;
            hub.initialize().await.unwrap();
            hub.start().await.unwrap();

            for payload in &payloads {
                let message =
                    Message::unicast(id("hub"), id("spoke"), MessageKind::Command, payload.as_str());
                hub.route(message).await.unwrap();
            }
            assert!(spoke.wait_for_messages(payloads.len(), Duration::from_secs(5)).await);
            hub.stop().await.unwrap();

            let received: Vec<String> = spoke
                .received()
                .iter()
                .map(|message| match message.payload() {
                    MessagePayload::Text(text) => text.clone(),
                    other => panic!("unexpected payload {:?}", other),
                })
                .collect();
            assert_eq!(received, payloads);
        });
    }
}

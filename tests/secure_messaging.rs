//! Encrypted payloads carried through a running hub

use std::sync::Arc;
use std::time::Duration;

use agentmesh_testing::MockAgent;
use agentmesh_workspace::prelude::*;

fn id(s: &str) -> AgentId {
    AgentId::from(s)
}

#[tokio::test]
async fn test_encrypted_payload_survives_routing() {
    let security = SecurityManager::generate();
    let hub = HubTopology::new(
        TopologyConfig::new("secure", TopologyKind::Hub)
            .with_idle_backoff(Duration::from_millis(10))
            .with_drain_timeout(Duration::from_secs(5)),
    );
    let gateway = Arc::new(MockAgent::new("gateway"));
    let sensor = Arc::new(MockAgent::new("sensor"));
    hub.add_agent(gateway.clone()).await;
    hub.add_agent(sensor.clone()).await;
    hub.initialize().await.unwrap();
    hub.start().await.unwrap();

    let ciphertext = security
        .encrypt(&id("sensor"), &id("gateway"), b"21.5C")
        .unwrap();
    let message = Message::unicast(id("sensor"), id("gateway"), MessageKind::Response, ciphertext);
    hub.route(message).await.unwrap();

    assert!(gateway.wait_for_messages(1, Duration::from_secs(2)).await);
    hub.stop().await.unwrap();

    let received = gateway.received();
    let bytes = received[0].payload().as_bytes().unwrap();
    assert_eq!(security.decrypt(&id("gateway"), bytes).unwrap(), b"21.5C");
    assert_eq!(
        security.decrypt(&id("sensor"), bytes),
        Err(SecurityError::DecryptionFailed)
    );
}

#[test]
fn test_envelope_survives_json_round_trip_of_message() {
    let security = SecurityManager::generate();
    let envelope = security.seal(&id("hub"), &id("worker"), b"job-42").unwrap();

    let message = Message::unicast(
        envelope.sender.clone(),
        envelope.receiver.clone(),
        MessageKind::Command,
        envelope.ciphertext.clone(),
    );
    let restored = Message::from_json(&message.to_json().unwrap()).unwrap();

    let mut carried = envelope.clone();
    carried.ciphertext = restored.payload().as_bytes().unwrap().to_vec();
    assert_eq!(security.open(&carried).unwrap(), b"job-42");
}

#[test]
fn test_permissions_gate_senders() {
    let security = SecurityManager::generate();
    security.register_agent(&id("gateway"));
    security.grant_permission(&id("sensor"), "data.send");

    assert_eq!(security.registered_agents(), vec![id("gateway"), id("sensor")]);
    assert!(security.has_permission(&id("sensor"), "data.send"));
    assert!(!security.has_permission(&id("gateway"), "data.send"));
}

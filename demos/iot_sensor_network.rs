//! Secure IoT sensor network on a hub-and-spoke mesh
//!
//! The gateway is the hub and broadcasts `READ` commands. Each sensor answers
//! with an encrypted reading that only the gateway can open.
//!
//! ```sh
//! RUST_LOG=info cargo run --example iot_sensor_network
//! ```

use std::sync::Arc;
use std::time::Duration;

use agentmesh_workspace::prelude::*;
use async_trait::async_trait;
use rand::Rng;
use tokio::sync::mpsc;

const READ_ROUNDS: usize = 5;

struct Gateway {
    id: AgentId,
    security: Arc<SecurityManager>,
}

#[async_trait]
impl MessageHandler for Gateway {
    async fn on_response(&self, message: &Message) -> Result<(), String> {
        let ciphertext = message
            .payload()
            .as_bytes()
            .ok_or_else(|| "reading is not binary".to_string())?;
        let reading = self
            .security
            .decrypt(&self.id, ciphertext)
            .map_err(|e| e.to_string())?;
        println!(
            "gateway <- {}: {}",
            message.sender(),
            String::from_utf8_lossy(&reading)
        );
        Ok(())
    }
}

struct Sensor {
    id: AgentId,
    gateway: AgentId,
    unit: &'static str,
    range: (f64, f64),
    security: Arc<SecurityManager>,
    outbox: mpsc::UnboundedSender<Message>,
}

#[async_trait]
impl MessageHandler for Sensor {
    async fn on_command(&self, command: &Message) -> Result<(), String> {
        let value = rand::rng().random_range(self.range.0..self.range.1);
        let reading = format!("{:.1}{}", value, self.unit);

        let encrypted = self
            .security
            .encrypt(&self.id, &self.gateway, reading.as_bytes())
            .map_err(|e| e.to_string())?;
        let response = Message::unicast(
            self.id.clone(),
            self.gateway.clone(),
            MessageKind::Response,
            encrypted,
        );
        tracing::debug!(sensor = %self.id, command = %command.id(), "Reading taken");
        self.outbox.send(response).map_err(|e| e.to_string())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let security = Arc::new(SecurityManager::generate());
    let gateway_id = AgentId::parse("gateway")?;
    let (outbox, mut readings) = mpsc::unbounded_channel();

    let gateway = HandlerAgent::new(
        gateway_id.clone(),
        "iot-gateway",
        Gateway {
            id: gateway_id.clone(),
            security: security.clone(),
        },
    );

    let sensors = [
        ("temp-sensor", "temperature", "C", (20.0, 30.0)),
        ("humidity-sensor", "humidity", "%", (40.0, 60.0)),
    ];

    let bus = EventBus::default();
    let metrics = Arc::new(MeshMetricsCollector::with_defaults());
    let config = TopologyConfig::new("iot-sensor-network", TopologyKind::Hub)
        .with_load_balancing(LoadBalancingStrategy::LeastLoaded)
        .with_drain_timeout(Duration::from_secs(5));
    let network = HubTopology::with_deps(
        config,
        TopologyDeps::new()
            .with_notifier(Arc::new(bus.clone()))
            .with_metrics(metrics.clone()),
    );

    security.register_agent(&gateway_id);
    security.grant_permission(&gateway_id, "command.send");
    network.add_agent(Arc::new(gateway)).await;

    for (name, agent_type, unit, range) in sensors {
        let id = AgentId::parse(name)?;
        security.register_agent(&id);
        security.grant_permission(&id, "data.send");

        let sensor = Sensor {
            id: id.clone(),
            gateway: gateway_id.clone(),
            unit,
            range,
            security: security.clone(),
            outbox: outbox.clone(),
        };
        network
            .add_agent(Arc::new(HandlerAgent::new(id, agent_type, sensor)))
            .await;
    }
    drop(outbox);

    network.initialize().await?;
    network.start().await?;

    for round in 0..READ_ROUNDS {
        let command = Message::broadcast(gateway_id.clone(), MessageKind::Command, "READ");
        network.route(command).await?;

        for _ in 0..sensors.len() {
            let Ok(Some(reading)) =
                tokio::time::timeout(Duration::from_secs(2), readings.recv()).await
            else {
                tracing::warn!(round, "Sensor reading missing");
                break;
            };
            if security.has_permission(reading.sender(), "data.send") {
                network.route(reading).await?;
            }
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    network.stop().await?;

    let stats = network.statistics().await;
    println!("hub: {:?}, loads: {:?}", stats.hub, stats.agent_loads);
    println!("metrics: {:?}", metrics.snapshot());
    println!("state: {:?}", network.state().await.status);
    Ok(())
}

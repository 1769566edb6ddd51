//! Topology configuration
//!
//! Values are read once, when a topology is built, and never touched on the
//! hot path. Durations use humantime notation (`"30s"`, `"250ms"`).
//!
//! ```toml
//! id = "iot-sensor-network"
//! kind = "hub"
//! load_balancing = "least_loaded"
//! health_check_interval = "30s"
//! idle_backoff = "100ms"
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{MeshError, MeshResult};

/// Which topology a mesh runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TopologyKind {
    /// Hub-and-spoke
    #[default]
    Hub,
    /// Full peer-to-peer
    Peer,
    /// Linear pipeline
    Pipeline,
}

impl TopologyKind {
    /// Pattern name reported in topology state
    pub fn pattern_name(&self) -> &'static str {
        match self {
            TopologyKind::Hub => "hub-spoke",
            TopologyKind::Peer => "p2p",
            TopologyKind::Pipeline => "pipeline",
        }
    }
}

/// How the hub picks a spoke
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalancingStrategy {
    /// Cycle through spokes after the previously selected one
    #[default]
    RoundRobin,
    /// Spoke with the fewest delivered messages
    LeastLoaded,
    /// Uniform random spoke
    Random,
}

impl std::fmt::Display for LoadBalancingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            LoadBalancingStrategy::RoundRobin => "round_robin",
            LoadBalancingStrategy::LeastLoaded => "least_loaded",
            LoadBalancingStrategy::Random => "random",
        })
    }
}

/// Construction-time settings for a topology
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
    /// Topology identifier, used in state and logs
    pub id: String,
    /// Which topology to build
    pub kind: TopologyKind,
    /// Initial hub load-balancing strategy
    pub load_balancing: LoadBalancingStrategy,
    /// Hub health-check period
    #[serde(with = "humantime_serde")]
    pub health_check_interval: Duration,
    /// Peer network-monitoring period
    #[serde(with = "humantime_serde")]
    pub monitor_interval: Duration,
    /// How long the hub dispatch loop waits on an empty queue
    #[serde(with = "humantime_serde")]
    pub idle_backoff: Duration,
    /// Upper bound on how long `stop()` waits for in-flight work
    #[serde(with = "humantime_serde")]
    pub drain_timeout: Duration,
    /// Concurrent deliveries allowed in the worker pool
    pub max_concurrent_deliveries: usize,
    /// Queue depth at which the hub starts warning
    pub queue_warning_threshold: usize,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            id: "mesh".to_string(),
            kind: TopologyKind::Hub,
            load_balancing: LoadBalancingStrategy::RoundRobin,
            health_check_interval: Duration::from_secs(30),
            monitor_interval: Duration::from_secs(30),
            idle_backoff: Duration::from_millis(100),
            drain_timeout: Duration::from_secs(60),
            max_concurrent_deliveries: 64,
            queue_warning_threshold: 1000,
        }
    }
}

impl TopologyConfig {
    /// Default configuration for a given topology kind
    pub fn new(id: impl Into<String>, kind: TopologyKind) -> Self {
        Self {
            id: id.into(),
            kind,
            ..Default::default()
        }
    }

    pub fn with_load_balancing(mut self, strategy: LoadBalancingStrategy) -> Self {
        self.load_balancing = strategy;
        self
    }

    pub fn with_health_check_interval(mut self, interval: Duration) -> Self {
        self.health_check_interval = interval;
        self
    }

    pub fn with_monitor_interval(mut self, interval: Duration) -> Self {
        self.monitor_interval = interval;
        self
    }

    pub fn with_idle_backoff(mut self, backoff: Duration) -> Self {
        self.idle_backoff = backoff;
        self
    }

    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    pub fn with_max_concurrent_deliveries(mut self, max: usize) -> Self {
        self.max_concurrent_deliveries = max;
        self
    }

    /// Parse a TOML document; missing keys take their defaults
    pub fn from_toml_str(input: &str) -> MeshResult<Self> {
        let config: Self =
            toml::from_str(input).map_err(|e| MeshError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> MeshResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            MeshError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Render as TOML
    pub fn to_toml_string(&self) -> MeshResult<String> {
        toml::to_string_pretty(self).map_err(|e| MeshError::InvalidConfig(e.to_string()))
    }

    /// Reject values the topologies cannot run with
    pub fn validate(&self) -> MeshResult<()> {
        if self.id.trim().is_empty() {
            return Err(MeshError::InvalidConfig("id cannot be empty".to_string()));
        }

        for (name, value) in [
            ("health_check_interval", self.health_check_interval),
            ("monitor_interval", self.monitor_interval),
            ("idle_backoff", self.idle_backoff),
            ("drain_timeout", self.drain_timeout),
        ] {
            if value.is_zero() {
                return Err(MeshError::InvalidConfig(format!("{} must be non-zero", name)));
            }
        }

        if self.max_concurrent_deliveries == 0 {
            return Err(MeshError::InvalidConfig(
                "max_concurrent_deliveries must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

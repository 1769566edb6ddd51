//! Metrics collection for topology operations
//!
//! Topologies report through the [`MetricsSink`] trait with a fixed set of
//! metric names and no per-agent labels, so cardinality stays bounded.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use serde::Serialize;
use tracing::debug;

/// Metric names emitted by the topologies
pub mod names {
    /// Messages accepted by `route`/`send`/`broadcast`
    pub const MESSAGES_ROUTED: &str = "messages_routed_total";
    /// Successful `process_message` calls
    pub const MESSAGES_DELIVERED: &str = "messages_delivered_total";
    /// Failed `process_message` calls
    pub const DELIVERY_FAILURES: &str = "delivery_failures_total";
    /// Hub messages for unknown receivers, or discarded at stop
    pub const MESSAGES_DROPPED: &str = "messages_dropped_total";
    /// Hub dispatch queue depth
    pub const QUEUE_DEPTH: &str = "queue_depth";
    /// Agents currently reporting `Active`
    pub const ACTIVE_AGENTS: &str = "active_agents";
    /// Time spent in `process_message`, averaged over every delivery attempt
    pub const DELIVERY_LATENCY_MS: &str = "delivery_latency_ms";
}

/// Where topologies send their counters, gauges and running averages
pub trait MetricsSink: Send + Sync {
    fn increment_counter(&self, name: &str) {
        self.add_counter(name, 1);
    }

    fn add_counter(&self, name: &str, value: u64);

    fn set_gauge(&self, name: &str, value: i64);

    /// Fold one sample into the running average `name`
    fn record_average(&self, name: &str, value: f64);
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn add_counter(&self, _name: &str, _value: u64) {}

    fn set_gauge(&self, _name: &str, _value: i64) {}

    fn record_average(&self, _name: &str, _value: f64) {}
}

/// Sample count and mean of a running average
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AverageStat {
    pub count: u64,
    pub mean: f64,
}

impl AverageStat {
    fn observe(&mut self, value: f64) {
        self.count = self.count.saturating_add(1);
        self.mean += (value - self.mean) / self.count as f64;
    }
}

/// Point-in-time copy of collected metrics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub counters: BTreeMap<String, u64>,
    pub gauges: BTreeMap<String, i64>,
    pub averages: BTreeMap<String, AverageStat>,
}

impl MetricsSnapshot {
    pub fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    pub fn gauge(&self, name: &str) -> Option<i64> {
        self.gauges.get(name).copied()
    }

    /// Mean of `name`; `None` before the first sample
    pub fn average(&self, name: &str) -> Option<f64> {
        self.averages.get(name).map(|stat| stat.mean)
    }
}

/// In-memory metrics collector with a cardinality limit
///
/// Names beyond `max_series` are ignored rather than tracked.
#[derive(Debug)]
pub struct MeshMetricsCollector {
    metrics: RwLock<MetricsSnapshot>,
    max_series: usize,
}

impl MeshMetricsCollector {
    pub fn new(max_series: usize) -> Self {
        Self {
            metrics: RwLock::new(MetricsSnapshot::default()),
            max_series,
        }
    }

    /// Create with default limits
    pub fn with_defaults() -> Self {
        Self::new(64)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.metrics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn reset(&self) {
        *self.metrics.write().unwrap_or_else(PoisonError::into_inner) =
            MetricsSnapshot::default();
        debug!("Reset mesh metrics");
    }

    fn series_count(metrics: &MetricsSnapshot) -> usize {
        metrics.counters.len() + metrics.gauges.len() + metrics.averages.len()
    }
}

impl Default for MeshMetricsCollector {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl MetricsSink for MeshMetricsCollector {
    fn add_counter(&self, name: &str, value: u64) {
        let mut metrics = self.metrics.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(counter) = metrics.counters.get_mut(name) {
            // Saturate rather than wrap on overflow
            *counter = counter.saturating_add(value);
        } else if Self::series_count(&metrics) < self.max_series {
            metrics.counters.insert(name.to_string(), value);
        }
    }

    fn set_gauge(&self, name: &str, value: i64) {
        let mut metrics = self.metrics.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(gauge) = metrics.gauges.get_mut(name) {
            *gauge = value;
        } else if Self::series_count(&metrics) < self.max_series {
            metrics.gauges.insert(name.to_string(), value);
        }
    }

    fn record_average(&self, name: &str, value: f64) {
        if !value.is_finite() {
            return;
        }
        let mut metrics = self.metrics.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(stat) = metrics.averages.get_mut(name) {
            stat.observe(value);
        } else if Self::series_count(&metrics) < self.max_series {
            let mut stat = AverageStat::default();
            stat.observe(value);
            metrics.averages.insert(name.to_string(), stat);
        }
    }
}

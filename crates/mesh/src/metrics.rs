//! Instrumentation emitted by the protocol and the per-node summary built from it.
//!
//! Handlers never write metrics themselves; they return [`ProtocolEvent`]s in
//! their outbox and the host feeds them to a [`MetricsSink`].

use clustermesh_core::NodeId;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::trace;

use crate::message::Role;

/// One instrumentation sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProtocolEvent {
    RoleChange { from: Role, to: Role },
    /// How long a cluster head held the role before stepping down.
    ClusterHeadTenure { duration: Duration },
    /// One beacon sent.
    ControlOverhead,
    ClusterSize { members: usize },
    /// End-to-end latency of a delivered packet.
    Latency { latency: Duration },
    DeliverySuccess,
    DataSent,
    DataReceived,
}

/// Consumer of instrumentation samples.
pub trait MetricsSink {
    fn record(&mut self, node_id: NodeId, event: &ProtocolEvent);
}

impl MetricsSink for Vec<ProtocolEvent> {
    fn record(&mut self, _node_id: NodeId, event: &ProtocolEvent) {
        self.push(*event);
    }
}

/// Per-node result record persisted at shutdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSummary {
    pub node_id: NodeId,
    pub packets_sent: u64,
    pub packets_received: u64,
    /// Received over sent, in percent.
    pub delivery_ratio: f64,
    /// Mean end-to-end latency in seconds.
    pub average_latency: f64,
    /// Bits per second received over the whole run.
    pub throughput_bps: f64,
    pub beacons_sent: u64,
    pub role_changes: u64,
}

/// Network-wide figures aggregated over the summaries of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkTotals {
    pub nodes: usize,
    /// Total received over total sent, in percent.
    pub delivery_ratio: f64,
    /// Mean latency in milliseconds, weighted by packets received per node.
    pub average_latency_ms: f64,
    pub total_throughput_bps: f64,
    /// Beacons sent by all nodes.
    pub control_overhead: u64,
    /// Mean role changes per node.
    pub average_role_changes: f64,
}

impl NetworkTotals {
    pub fn from_summaries(summaries: &[NodeSummary]) -> Self {
        let sent: u64 = summaries.iter().map(|s| s.packets_sent).sum();
        let received: u64 = summaries.iter().map(|s| s.packets_received).sum();
        let weighted_latency: f64 = summaries
            .iter()
            .map(|s| s.average_latency * s.packets_received as f64)
            .sum();
        let role_changes: u64 = summaries.iter().map(|s| s.role_changes).sum();

        Self {
            nodes: summaries.len(),
            delivery_ratio: if sent > 0 {
                received as f64 / sent as f64 * 100.0
            } else {
                0.0
            },
            average_latency_ms: if received > 0 {
                weighted_latency / received as f64 * 1000.0
            } else {
                0.0
            },
            total_throughput_bps: summaries.iter().map(|s| s.throughput_bps).sum(),
            control_overhead: summaries.iter().map(|s| s.beacons_sent).sum(),
            average_role_changes: if summaries.is_empty() {
                0.0
            } else {
                role_changes as f64 / summaries.len() as f64
            },
        }
    }
}

/// Accumulates samples for one node.
#[derive(Debug, Clone, Default)]
pub struct MetricsRecorder {
    packets_sent: u64,
    packets_received: u64,
    total_latency: Duration,
    beacons_sent: u64,
    role_changes: u64,
    tenures: Vec<Duration>,
    cluster_sizes: Vec<usize>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Completed cluster-head tenures, in the order they ended.
    pub fn tenures(&self) -> &[Duration] {
        &self.tenures
    }

    pub fn cluster_sizes(&self) -> &[usize] {
        &self.cluster_sizes
    }

    /// Build the summary record for a run that lasted `elapsed`.
    pub fn summary(&self, node_id: NodeId, elapsed: Duration, packet_bytes: u64) -> NodeSummary {
        let delivery_ratio = if self.packets_sent > 0 {
            self.packets_received as f64 / self.packets_sent as f64 * 100.0
        } else {
            0.0
        };
        let average_latency = if self.packets_received > 0 {
            self.total_latency.as_secs_f64() / self.packets_received as f64
        } else {
            0.0
        };
        let seconds = elapsed.as_secs_f64();
        let throughput_bps = if seconds > 0.0 {
            (self.packets_received * packet_bytes * 8) as f64 / seconds
        } else {
            0.0
        };

        NodeSummary {
            node_id,
            packets_sent: self.packets_sent,
            packets_received: self.packets_received,
            delivery_ratio,
            average_latency,
            throughput_bps,
            beacons_sent: self.beacons_sent,
            role_changes: self.role_changes,
        }
    }
}

impl MetricsSink for MetricsRecorder {
    fn record(&mut self, node_id: NodeId, event: &ProtocolEvent) {
        trace!(node_id, ?event, "metric");
        match *event {
            ProtocolEvent::RoleChange { .. } => self.role_changes += 1,
            ProtocolEvent::ClusterHeadTenure { duration } => self.tenures.push(duration),
            ProtocolEvent::ControlOverhead => self.beacons_sent += 1,
            ProtocolEvent::ClusterSize { members } => self.cluster_sizes.push(members),
            ProtocolEvent::Latency { latency } => self.total_latency += latency,
            ProtocolEvent::DataReceived => self.packets_received += 1,
            ProtocolEvent::DataSent => self.packets_sent += 1,
            ProtocolEvent::DeliverySuccess => {}
        }
    }
}

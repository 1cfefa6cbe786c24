//! Configuration management for clustermesh.
//!
//! All intervals are expressed in milliseconds in the file format and exposed
//! as [`Duration`]s through accessor methods.

use crate::error::{CoreError, Result};
use crate::types::NodeId;
use serde::{Deserialize, Serialize};
#[cfg(feature = "toml")]
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub protocol: ProtocolConfig,
    pub traffic: TrafficConfig,
    pub simulation: SimulationConfig,
}

/// Timing of the clustering protocol itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Period between two beacons.
    pub beacon_interval_ms: u64,
    /// Upper bound of the random delay before the first beacon.
    pub beacon_jitter_ms: u64,
    /// A neighbor not heard from for longer than this is evicted.
    pub neighbor_validity_ms: u64,
    /// Lifetime of a duplicate-suppression entry. Defaults to four validity windows.
    pub seen_packet_ttl_ms: Option<u64>,
    /// Lifetime of a gateway candidate that is not re-reported. Defaults to one validity window.
    pub route_ttl_ms: Option<u64>,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            beacon_interval_ms: 1000,
            beacon_jitter_ms: 2000,
            neighbor_validity_ms: 3000,
            seen_packet_ttl_ms: None,
            route_ttl_ms: None,
        }
    }
}

impl ProtocolConfig {
    pub fn beacon_interval(&self) -> Duration {
        Duration::from_millis(self.beacon_interval_ms)
    }

    pub fn beacon_jitter(&self) -> Duration {
        Duration::from_millis(self.beacon_jitter_ms)
    }

    pub fn neighbor_validity(&self) -> Duration {
        Duration::from_millis(self.neighbor_validity_ms)
    }

    /// The timeout sweep runs twice per validity window.
    pub fn timeout_check_interval(&self) -> Duration {
        self.neighbor_validity() / 2
    }

    pub fn seen_packet_ttl(&self) -> Duration {
        self.seen_packet_ttl_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.neighbor_validity() * 4)
    }

    pub fn route_ttl(&self) -> Duration {
        self.route_ttl_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.neighbor_validity())
    }
}

/// How an originating node picks the destination of a data packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationPolicy {
    /// Any host id in `0..num_hosts` other than self, routed hierarchically.
    AnyHost,
    /// A live neighbor, sent as a single broadcast.
    Neighbor,
}

/// Data traffic generated by every node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrafficConfig {
    pub destination: DestinationPolicy,
    /// Size of the host id space used by [`DestinationPolicy::AnyHost`].
    pub num_hosts: u32,
    pub start_min_ms: u64,
    pub start_max_ms: u64,
    pub interval_min_ms: u64,
    pub interval_max_ms: u64,
    /// Nominal size of one data packet, used for the throughput estimate.
    pub packet_bytes: u64,
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            destination: DestinationPolicy::AnyHost,
            num_hosts: 5,
            start_min_ms: 1000,
            start_max_ms: 3000,
            interval_min_ms: 2000,
            interval_max_ms: 4000,
            packet_bytes: 1024,
        }
    }
}

/// Shape of the neighbor graph hosted by the node service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TopologyConfig {
    /// Every node hears every other node.
    Full,
    /// Node `i` hears `i - 1` and `i + 1`.
    Line,
    /// Row-major grid, 4-neighborhood.
    Grid { columns: u32 },
    /// Explicit undirected links.
    Edges { links: Vec<(NodeId, NodeId)> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub node_count: u32,
    pub topology: TopologyConfig,
    /// Probability that one frame is lost on one link.
    pub loss_rate: f64,
    pub duration_ms: u64,
    pub seed: u64,
    /// Per-node summaries are appended here, one JSON object per line.
    pub results_path: PathBuf,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            node_count: 5,
            topology: TopologyConfig::Line,
            loss_rate: 0.0,
            duration_ms: 60_000,
            seed: 1,
            results_path: PathBuf::from("results.jsonl"),
        }
    }
}

impl SimulationConfig {
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

impl Config {
    #[cfg(feature = "toml")]
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn default_config() -> Self {
        Self::default()
    }

    /// Reject settings the protocol cannot run with.
    pub fn validate(&self) -> Result<()> {
        let p = &self.protocol;
        if p.beacon_interval_ms == 0 {
            return Err(CoreError::Config("beacon_interval_ms must be positive".into()));
        }
        if p.neighbor_validity_ms < 2 {
            return Err(CoreError::Config(
                "neighbor_validity_ms must be at least 2".into(),
            ));
        }

        let t = &self.traffic;
        if t.start_min_ms > t.start_max_ms || t.interval_min_ms > t.interval_max_ms {
            return Err(CoreError::Config("traffic ranges must have min <= max".into()));
        }
        if t.interval_max_ms == 0 {
            return Err(CoreError::Config("traffic interval must be positive".into()));
        }
        if t.destination == DestinationPolicy::AnyHost && t.num_hosts < 2 {
            return Err(CoreError::Config(
                "num_hosts must be at least 2 to pick a destination other than self".into(),
            ));
        }

        let s = &self.simulation;
        if !(0.0..1.0).contains(&s.loss_rate) {
            return Err(CoreError::Config(format!(
                "loss_rate {} outside [0, 1)",
                s.loss_rate
            )));
        }
        if t.destination == DestinationPolicy::AnyHost && t.num_hosts > s.node_count {
            return Err(CoreError::Config(format!(
                "num_hosts {} exceeds node_count {}; packets would target absent nodes",
                t.num_hosts, s.node_count
            )));
        }
        if let TopologyConfig::Grid { columns: 0 } = s.topology {
            return Err(CoreError::Config("grid needs at least one column".into()));
        }
        Ok(())
    }
}

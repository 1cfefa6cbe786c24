//! ClusterMesh - Lowest-ID Clustering for Ad-Hoc Wireless Networks
//!
//! Organizes a flat multi-hop network into one-hop clusters and forwards
//! data through cluster heads and the gateways between clusters.
//!
//! # Core Components
//!
//! - **Beacon Protocol**: periodic role announcements that build neighbor tables
//! - **Role Election**: a node leads unless a lower id can lead it
//! - **Cluster Head Registry**: members and the gateways that reach foreign clusters
//! - **Data Forwarding**: relay to head, final delivery, gateway flooding and emergency relay
//! - **Runtime**: a tokio task per node over a lossy in-memory medium
//!
//! # Design Principles
//!
//! 1. **Sans-IO core**: handlers take the current time and return an [`Outbox`]
//! 2. **Soft state**: everything a node knows expires unless it is re-announced
//! 3. **Determinism**: every random choice goes through an [`IndexSource`]
//!
//! # Example Usage
//!
//! ```rust
//! use clustermesh_core::Timestamp;
//! use clustermesh_mesh::{ClusterNode, NodeSettings, Role, ScriptedIndices};
//!
//! let mut head = ClusterNode::new(0, NodeSettings::default(), ScriptedIndices::first());
//! let mut member = ClusterNode::new(1, NodeSettings::default(), ScriptedIndices::first());
//!
//! let beacon = head.on_beacon_tick(Timestamp::ZERO);
//! for send in beacon.sends {
//!     if let clustermesh_mesh::Outgoing::Broadcast(message) = send {
//!         member.on_message(message, Timestamp::ZERO);
//!     }
//! }
//! head.on_timeout_tick(Timestamp::from_millis(1000));
//! member.on_timeout_tick(Timestamp::from_millis(1000));
//!
//! assert_eq!(head.role(), Role::ClusterHead);
//! assert_eq!(member.cluster_head(), Some(0));
//! ```

pub mod beacon;
pub mod election;
pub mod error;
pub mod foreign;
pub mod forwarder;
pub mod medium;
pub mod message;
pub mod metrics;
pub mod neighbor;
pub mod node;
pub mod registry;
pub mod runtime;
pub mod seen;
pub mod selector;
pub mod transport;

// Re-export main types
pub use election::{Evaluation, RoleChange, RoleElection, RoleState};
pub use error::{MeshError, MeshResult};
pub use foreign::ForeignClusterTracker;
pub use medium::{InMemoryMedium, Topology};
pub use message::{BeaconMessage, DataFrame, DataMessage, HopKind, Message, PacketId, Role};
pub use metrics::{MetricsRecorder, MetricsSink, NetworkTotals, NodeSummary, ProtocolEvent};
pub use neighbor::{NeighborDirectory, NeighborRecord};
pub use node::{ClusterNode, DisplayClass, NodeSettings, Outbox, Outgoing};
pub use registry::ClusterHeadRegistry;
pub use runtime::{
    NodeHandle, NodeReport, NodeRuntime, NodeStatus, RuntimeClock, RuntimeSettings, TimerPlan,
};
pub use seen::SeenPacketCache;
pub use selector::{IndexSource, RngIndices, ScriptedIndices};
pub use transport::Transport;

//! Wire messages exchanged between nodes.
//!
//! Two kinds travel over the air: periodic beacons and data frames. Both are
//! immutable once built; forwarding wraps a copy of the same [`DataMessage`]
//! in a new [`DataFrame`].

use clustermesh_core::{NodeId, Timestamp};
use serde::{Deserialize, Serialize};

use crate::error::MeshResult;

/// Role a node announces in its beacons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// No election has run yet, or the cluster head was lost.
    Undecided,
    /// Bound to a cluster head.
    Member,
    /// Leader of its neighborhood.
    ClusterHead,
}

/// Periodic announcement of a node's role and binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeaconMessage {
    pub src_id: NodeId,
    pub role: Role,
    /// Cluster head the sender defers to; its own id for a head.
    pub cluster_head_id: Option<NodeId>,
    /// Distinct foreign cluster heads the sender can reach. Empty unless the sender is a gateway.
    pub seen_foreign_heads: Vec<NodeId>,
}

/// One unit of application data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataMessage {
    pub src_id: NodeId,
    pub dest_id: NodeId,
    /// Unique per `src_id`, assigned from the originator's private counter.
    pub seq_no: u64,
    pub send_time: Timestamp,
}

impl DataMessage {
    /// Key used for duplicate suppression.
    pub fn packet_id(&self) -> PacketId {
        PacketId {
            src_id: self.src_id,
            seq_no: self.seq_no,
        }
    }
}

/// Identity of a data unit across all its copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PacketId {
    pub src_id: NodeId,
    pub seq_no: u64,
}

/// Why a copy of a data message is on the air.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HopKind {
    Origin,
    RelayToHead,
    FinalDelivery,
    /// Sent by a cluster head to a gateway member; the member floods it to foreign contacts.
    InterCluster,
    GatewayForward,
    EmergencyRelay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataFrame {
    pub message: DataMessage,
    pub hop: HopKind,
}

impl DataFrame {
    pub fn new(message: DataMessage, hop: HopKind) -> Self {
        Self { message, hop }
    }

    pub fn is_inter_cluster(&self) -> bool {
        self.hop == HopKind::InterCluster
    }
}

/// Everything a node can receive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Message {
    Beacon(BeaconMessage),
    Data(DataFrame),
}

impl Message {
    pub fn encode(&self) -> MeshResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode a frame. Unknown kinds and malformed payloads are errors the caller drops.
    pub fn decode(bytes: &[u8]) -> MeshResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn src_id(&self) -> NodeId {
        match self {
            Message::Beacon(beacon) => beacon.src_id,
            Message::Data(frame) => frame.message.src_id,
        }
    }
}

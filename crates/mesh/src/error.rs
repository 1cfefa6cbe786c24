//! Error types for clustermesh operations.
//!
//! Protocol handlers never fail: a packet without a next hop is simply lost.
//! These errors only surface at the codec, transport and configuration
//! boundaries around a node.

use clustermesh_core::NodeId;
use thiserror::Error;

/// Errors that can occur around the protocol core.
#[derive(Debug, Error)]
pub enum MeshError {
    /// Frame could not be decoded into a known message kind
    #[error("Malformed frame: {0}")]
    Decode(#[from] serde_json::Error),

    /// The node's inbox or the medium has shut down
    #[error("Transport closed for node {node_id}")]
    TransportClosed { node_id: NodeId },

    /// Node id not registered with the medium
    #[error("Unknown node: {node_id}")]
    UnknownNode { node_id: NodeId },

    /// Node id registered twice
    #[error("Node {node_id} is already attached")]
    DuplicateNode { node_id: NodeId },

    /// Node task ended abnormally
    #[error("Node task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Result type for mesh operations.
pub type MeshResult<T> = Result<T, MeshError>;

//! Frame delivery seam between a node runtime and the medium carrying it.

use clustermesh_core::NodeId;

/// Carries encoded frames between nodes.
///
/// Delivery is best effort: a frame may be dropped by range or loss and the
/// sender is never told.
pub trait Transport: Send + Sync + 'static {
    /// Deliver `frame` to every node in range of `from`.
    fn broadcast(&self, from: NodeId, frame: Vec<u8>);

    /// Deliver `frame` to `to` alone, if it is in range of `from`.
    fn send_to(&self, from: NodeId, to: NodeId, frame: Vec<u8>);
}

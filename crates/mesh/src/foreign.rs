//! Foreign cluster sightings and the derived gateway flag.
//!
//! A node is a gateway while at least one live neighbor reports a cluster
//! head different from its own. Sightings are dropped together with the
//! neighbor that produced them, so the flag never outlives its evidence.

use clustermesh_core::NodeId;
use std::collections::{BTreeMap, BTreeSet};

use crate::neighbor::NeighborDirectory;

#[derive(Debug, Default, Clone)]
pub struct ForeignClusterTracker {
    /// neighbor id -> foreign cluster head it reports
    sightings: BTreeMap<NodeId, NodeId>,
}

impl ForeignClusterTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `neighbor_id` belongs to `foreign_head`.
    ///
    /// Nothing is recorded when the neighbor reports no head or the same head
    /// as ours; an older sighting of that neighbor is withdrawn instead, since
    /// the neighbor itself now contradicts it.
    pub fn report(
        &mut self,
        neighbor_id: NodeId,
        foreign_head: Option<NodeId>,
        own_head: Option<NodeId>,
    ) {
        match foreign_head {
            Some(head) if Some(head) != own_head => {
                self.sightings.insert(neighbor_id, head);
            }
            _ => {
                self.sightings.remove(&neighbor_id);
            }
        }
    }

    /// Drop sightings of `head`, which just became our own cluster head.
    pub fn forget_head(&mut self, head: NodeId) -> usize {
        let before = self.sightings.len();
        self.sightings.retain(|_, foreign| *foreign != head);
        before - self.sightings.len()
    }

    /// Drop sightings of neighbors no longer in the directory.
    pub fn prune_to_neighbors(&mut self, neighbors: &NeighborDirectory) -> usize {
        let before = self.sightings.len();
        self.sightings.retain(|id, _| neighbors.contains(*id));
        before - self.sightings.len()
    }

    pub fn is_gateway(&self) -> bool {
        !self.sightings.is_empty()
    }

    /// Neighbors known to sit in another cluster, ascending
    pub fn contacts(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.sightings.keys().copied()
    }

    /// Distinct foreign cluster heads currently sighted
    pub fn foreign_heads(&self) -> BTreeSet<NodeId> {
        self.sightings.values().copied().collect()
    }

    pub fn sighting(&self, neighbor_id: NodeId) -> Option<NodeId> {
        self.sightings.get(&neighbor_id).copied()
    }

    pub fn len(&self) -> usize {
        self.sightings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sightings.is_empty()
    }
}

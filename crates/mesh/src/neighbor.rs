//! Neighbor Directory
//!
//! Tracks which nodes have been heard recently and the role each one last
//! announced. A record lives exactly as long as its owner keeps beaconing
//! within the validity window.

use clustermesh_core::{NodeId, Timestamp};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use crate::message::Role;

/// What this node knows about one neighbor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeighborRecord {
    /// Time of the last beacon received from the neighbor
    pub last_seen: Timestamp,
    /// Role announced in that beacon
    pub role: Role,
}

/// Live neighbors indexed by node ID, kept in id order
#[derive(Debug, Default, Clone)]
pub struct NeighborDirectory {
    neighbors: BTreeMap<NodeId, NeighborRecord>,
}

impl NeighborDirectory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or refresh a neighbor
    pub fn observe(&mut self, neighbor_id: NodeId, role: Role, now: Timestamp) {
        self.neighbors.insert(
            neighbor_id,
            NeighborRecord {
                last_seen: now,
                role,
            },
        );
    }

    /// Remove every neighbor silent for longer than `validity` and return their ids
    pub fn evict_expired(&mut self, now: Timestamp, validity: Duration) -> BTreeSet<NodeId> {
        let expired: BTreeSet<NodeId> = self
            .neighbors
            .iter()
            .filter(|(_, record)| now.saturating_duration_since(record.last_seen) > validity)
            .map(|(id, _)| *id)
            .collect();

        for id in &expired {
            self.neighbors.remove(id);
        }
        expired
    }

    pub fn get(&self, neighbor_id: NodeId) -> Option<&NeighborRecord> {
        self.neighbors.get(&neighbor_id)
    }

    pub fn contains(&self, neighbor_id: NodeId) -> bool {
        self.neighbors.contains_key(&neighbor_id)
    }

    /// Live neighbor ids in ascending order
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.neighbors.keys().copied()
    }

    /// Live neighbors with their records, in ascending id order
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &NeighborRecord)> + '_ {
        self.neighbors.iter().map(|(id, record)| (*id, record))
    }

    /// Smallest live neighbor id
    pub fn lowest_id(&self) -> Option<NodeId> {
        self.neighbors.keys().next().copied()
    }

    /// Number of live neighbors whose last announced role is `role`
    pub fn count_with_role(&self, role: Role) -> usize {
        self.neighbors.values().filter(|r| r.role == role).count()
    }

    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }
}

//! Cluster Head Registry - membership and inter-cluster routing
//!
//! Exists only while this node heads a cluster. Members beacon the foreign
//! cluster heads they can hear; the head records each such member as a
//! gateway candidate towards that foreign cluster.

use clustermesh_core::{NodeId, Timestamp};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use crate::neighbor::NeighborDirectory;

/// Membership and routing state of one cluster-head tenure
#[derive(Debug, Clone)]
pub struct ClusterHeadRegistry {
    /// Local node ID
    node_id: NodeId,
    /// Nodes that beaconed us as their head
    members: BTreeSet<NodeId>,
    /// Routes: foreign head -> gateway candidate -> time of the last report
    routes: BTreeMap<NodeId, BTreeMap<NodeId, Timestamp>>,
}

impl ClusterHeadRegistry {
    /// Start a fresh tenure with no members and no routes
    pub fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            members: BTreeSet::new(),
            routes: BTreeMap::new(),
        }
    }

    /// Record a beacon from a neighbor claiming `claimed_head` as its head.
    ///
    /// Beacons addressed to another head are ignored. Returns true when the
    /// sender was not yet a member.
    pub fn on_member_beacon(
        &mut self,
        sender_id: NodeId,
        claimed_head: Option<NodeId>,
        reported_foreign_heads: &[NodeId],
        now: Timestamp,
    ) -> bool {
        if claimed_head != Some(self.node_id) {
            return false;
        }

        let joined = self.members.insert(sender_id);
        for foreign_head in reported_foreign_heads {
            self.routes
                .entry(*foreign_head)
                .or_default()
                .insert(sender_id, now);
        }
        joined
    }

    pub fn is_member(&self, node_id: NodeId) -> bool {
        self.members.contains(&node_id)
    }

    pub fn members(&self) -> &BTreeSet<NodeId> {
        &self.members
    }

    /// Foreign heads with their gateway candidates, in ascending order
    pub fn routes(&self) -> impl Iterator<Item = (NodeId, Vec<NodeId>)> + '_ {
        self.routes
            .iter()
            .map(|(head, candidates)| (*head, candidates.keys().copied().collect()))
    }

    /// Gateway candidates towards one foreign head
    pub fn candidates(&self, foreign_head: NodeId) -> Vec<NodeId> {
        self.routes
            .get(&foreign_head)
            .map(|candidates| candidates.keys().copied().collect())
            .unwrap_or_default()
    }

    /// True when at least one foreign head has a candidate
    pub fn has_routes(&self) -> bool {
        self.routes.values().any(|candidates| !candidates.is_empty())
    }

    /// Drop members and candidates that left the neighborhood, and candidates
    /// that stopped reporting their foreign head for longer than `route_ttl`.
    ///
    /// Returns the number of removed candidate entries.
    pub fn prune(
        &mut self,
        neighbors: &NeighborDirectory,
        now: Timestamp,
        route_ttl: Duration,
    ) -> usize {
        self.members.retain(|id| neighbors.contains(*id));

        let mut removed = 0;
        for candidates in self.routes.values_mut() {
            let before = candidates.len();
            candidates.retain(|id, reported| {
                neighbors.contains(*id) && now.saturating_duration_since(*reported) <= route_ttl
            });
            removed += before - candidates.len();
        }
        self.routes.retain(|_, candidates| !candidates.is_empty());
        removed
    }
}

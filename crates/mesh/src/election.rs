//! Lowest-ID Role Election
//!
//! State machine deciding whether this node leads its neighborhood or
//! defers to a lower identifier.
//!
//! ```text
//!   Undecided --(own id lowest)--> ClusterHead
//!   Undecided --(lower neighbor)--> Member
//!   Member    --(head evicted)----> Undecided
//!   ClusterHead --(lower head heard)--> Member
//! ```
//!
//! Ids are unique, so every comparison has a strict winner and the
//! network settles without negotiation.

use clustermesh_core::{NodeId, Timestamp};
use std::collections::BTreeSet;
use std::time::Duration;

use crate::message::Role;
use crate::neighbor::NeighborDirectory;

/// Role together with the data that is only valid in that role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleState {
    Undecided,
    Member { head: NodeId },
    ClusterHead { since: Timestamp },
}

impl RoleState {
    pub fn role(&self) -> Role {
        match self {
            RoleState::Undecided => Role::Undecided,
            RoleState::Member { .. } => Role::Member,
            RoleState::ClusterHead { .. } => Role::ClusterHead,
        }
    }
}

/// A completed transition between two different roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleChange {
    pub from: Role,
    pub to: Role,
}

/// Outcome of one re-evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Evaluation {
    pub change: Option<RoleChange>,
    /// Tenure of a head that just stepped down.
    pub tenure: Option<Duration>,
    /// Live neighbors announcing `Member`, sampled while heading a cluster.
    pub cluster_size: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct RoleElection {
    node_id: NodeId,
    state: RoleState,
}

impl RoleElection {
    pub fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            state: RoleState::Undecided,
        }
    }

    pub fn state(&self) -> RoleState {
        self.state
    }

    pub fn role(&self) -> Role {
        self.state.role()
    }

    /// Cluster head this node defers to; its own id while heading a cluster.
    pub fn cluster_head(&self) -> Option<NodeId> {
        match self.state {
            RoleState::Undecided => None,
            RoleState::Member { head } => Some(head),
            RoleState::ClusterHead { .. } => Some(self.node_id),
        }
    }

    /// React to a timeout sweep: a member whose head was evicted becomes undecided.
    pub fn on_neighbors_evicted(&mut self, evicted: &BTreeSet<NodeId>) -> Option<RoleChange> {
        match self.state {
            RoleState::Member { head } if evicted.contains(&head) => {
                self.state = RoleState::Undecided;
                Some(RoleChange {
                    from: Role::Member,
                    to: Role::Undecided,
                })
            }
            _ => None,
        }
    }

    /// Run the election rules against the current neighbor snapshot.
    pub fn evaluate(&mut self, neighbors: &NeighborDirectory, now: Timestamp) -> Evaluation {
        let old = self.state.role();
        let mut evaluation = Evaluation::default();

        match self.state {
            RoleState::Undecided => {
                self.state = match neighbors.lowest_id() {
                    Some(lowest) if lowest < self.node_id => RoleState::Member { head: lowest },
                    _ => RoleState::ClusterHead { since: now },
                };
            }
            RoleState::ClusterHead { since } => {
                let lower_head = neighbors
                    .iter()
                    .find(|(id, record)| *id < self.node_id && record.role == Role::ClusterHead)
                    .map(|(id, _)| id);

                if let Some(head) = lower_head {
                    self.state = RoleState::Member { head };
                    evaluation.tenure = Some(now.saturating_duration_since(since));
                }
                evaluation.cluster_size = Some(neighbors.count_with_role(Role::Member));
            }
            RoleState::Member { .. } => {}
        }

        let new = self.state.role();
        if old != new {
            evaluation.change = Some(RoleChange { from: old, to: new });
        }
        evaluation
    }
}

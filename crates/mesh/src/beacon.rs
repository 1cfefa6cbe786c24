//! Beacon Protocol
//!
//! Builds the periodic announcement of this node's role and binding and
//! folds received announcements into the neighbor directory, the foreign
//! cluster tracker and, on a cluster head, the registry.

use clustermesh_core::{NodeId, Timestamp};
use tracing::{debug, trace};

use crate::message::{BeaconMessage, Message, Role};
use crate::metrics::ProtocolEvent;
use crate::node::{ClusterNode, Outbox};
use crate::selector::IndexSource;

impl<R: IndexSource> ClusterNode<R> {
    /// Current announcement. Only gateways attach the foreign heads they can reach.
    pub fn build_beacon(&self) -> BeaconMessage {
        let seen_foreign_heads = if self.foreign.is_gateway() {
            self.foreign.foreign_heads().into_iter().collect()
        } else {
            Vec::new()
        };

        BeaconMessage {
            src_id: self.node_id,
            role: self.role(),
            cluster_head_id: self.cluster_head(),
            seen_foreign_heads,
        }
    }

    /// Broadcast one beacon.
    pub fn on_beacon_tick(&mut self, _now: Timestamp) -> Outbox {
        let mut out = Outbox::default();
        let beacon = self.build_beacon();
        trace!(node_id = self.node_id, ?beacon, "beacon");
        out.broadcast(Message::Beacon(beacon));
        out.emit(ProtocolEvent::ControlOverhead);
        out
    }

    pub(crate) fn on_beacon(&mut self, beacon: &BeaconMessage, now: Timestamp) -> Outbox {
        let out = Outbox::default();
        if beacon.src_id == self.node_id {
            return out;
        }

        let claimed_head = reconciled_head(beacon);

        // Foreign sightings first, so the registry below files this sender
        // under the clusters it reports in this very beacon.
        self.foreign
            .report(beacon.src_id, claimed_head, self.cluster_head());
        self.neighbors.observe(beacon.src_id, beacon.role, now);

        if let Some(registry) = self.registry.as_mut() {
            if registry.on_member_beacon(
                beacon.src_id,
                claimed_head,
                &beacon.seen_foreign_heads,
                now,
            ) {
                debug!(
                    node_id = self.node_id,
                    member = beacon.src_id,
                    members = registry.members().len(),
                    "member joined"
                );
            }
        }
        out
    }
}

/// The head a beacon binds its sender to, ignoring claims its role cannot make.
fn reconciled_head(beacon: &BeaconMessage) -> Option<NodeId> {
    let head = match beacon.role {
        Role::Undecided => None,
        Role::ClusterHead => Some(beacon.src_id),
        Role::Member => beacon.cluster_head_id.filter(|head| *head != beacon.src_id),
    };
    if head != beacon.cluster_head_id {
        debug!(
            src_id = beacon.src_id,
            role = ?beacon.role,
            claimed = ?beacon.cluster_head_id,
            "ignoring inconsistent cluster head claim"
        );
    }
    head
}

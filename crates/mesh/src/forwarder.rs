//! Data Forwarder
//!
//! Originates data packets and decides, for every packet seen for the first
//! time, whether to deliver it, relay it to the cluster head, hand it to
//! gateways towards foreign clusters or, as a last resort, push it to any
//! neighbor. Packets without a next hop are dropped silently.

use clustermesh_core::{DestinationPolicy, NodeId, Timestamp};
use std::collections::BTreeSet;
use tracing::debug;

use crate::election::RoleState;
use crate::message::{DataFrame, DataMessage, HopKind, Message};
use crate::metrics::ProtocolEvent;
use crate::node::{ClusterNode, Outbox};
use crate::selector::IndexSource;

impl<R: IndexSource> ClusterNode<R> {
    /// Generate one packet towards a randomly chosen destination.
    pub fn on_data_tick(&mut self, now: Timestamp) -> Outbox {
        let mut out = Outbox::default();
        if self.role_state() == RoleState::Undecided && self.neighbors.is_empty() {
            return out;
        }

        let Some(dest_id) = self.choose_destination() else {
            return out;
        };
        let message = DataMessage {
            src_id: self.node_id,
            dest_id,
            seq_no: self.next_seq,
            send_time: now,
        };
        self.next_seq += 1;
        // An echo of our own packet must never be processed
        self.seen.insert(message.packet_id(), now);
        out.emit(ProtocolEvent::DataSent);

        debug!(
            node_id = self.node_id,
            dest_id,
            seq_no = message.seq_no,
            role = ?self.role(),
            "originating packet"
        );

        if self.settings.destination == DestinationPolicy::Neighbor {
            out.broadcast(Message::Data(DataFrame::new(message, HopKind::Origin)));
            return out;
        }

        match self.role_state() {
            RoleState::Member { head } => {
                out.unicast(head, Message::Data(DataFrame::new(message, HopKind::Origin)));
            }
            RoleState::ClusterHead { .. } => self.route_as_head(message, &mut out),
            RoleState::Undecided => {
                // No cluster yet: let whoever hears it carry it on
                out.broadcast(Message::Data(DataFrame::new(message, HopKind::InterCluster)));
            }
        }
        out
    }

    pub(crate) fn on_data(&mut self, frame: DataFrame, now: Timestamp) -> Outbox {
        let mut out = Outbox::default();
        let message = frame.message;

        if !self.seen.insert(message.packet_id(), now) {
            debug!(
                node_id = self.node_id,
                src_id = message.src_id,
                seq_no = message.seq_no,
                "duplicate dropped"
            );
            return out;
        }

        if message.dest_id == self.node_id {
            let latency = now.saturating_duration_since(message.send_time);
            debug!(
                node_id = self.node_id,
                src_id = message.src_id,
                seq_no = message.seq_no,
                ?latency,
                "delivered"
            );
            out.emit(ProtocolEvent::DeliverySuccess);
            out.emit(ProtocolEvent::Latency { latency });
            out.emit(ProtocolEvent::DataReceived);
            return out;
        }

        match self.role_state() {
            RoleState::Member { head } => {
                if frame.is_inter_cluster() && self.foreign.is_gateway() {
                    for contact in self.foreign.contacts() {
                        out.unicast(
                            contact,
                            Message::Data(DataFrame::new(message, HopKind::GatewayForward)),
                        );
                    }
                    debug!(
                        node_id = self.node_id,
                        seq_no = message.seq_no,
                        copies = out.sends.len(),
                        "gateway flooded foreign contacts"
                    );
                } else {
                    out.unicast(
                        head,
                        Message::Data(DataFrame::new(message, HopKind::RelayToHead)),
                    );
                }
            }
            RoleState::ClusterHead { .. } => self.route_as_head(message, &mut out),
            RoleState::Undecided => {
                debug!(
                    node_id = self.node_id,
                    dest_id = message.dest_id,
                    "no route, packet dropped"
                );
            }
        }
        out
    }

    /// Cluster-head forwarding: direct delivery, one fresh gateway per foreign
    /// cluster, or an emergency relay when the head is isolated.
    fn route_as_head(&mut self, message: DataMessage, out: &mut Outbox) {
        if self.neighbors.contains(message.dest_id) {
            out.unicast(
                message.dest_id,
                Message::Data(DataFrame::new(message, HopKind::FinalDelivery)),
            );
            return;
        }

        let (routes, has_members): (Vec<(NodeId, Vec<NodeId>)>, bool) = match &self.registry {
            Some(registry) => (registry.routes().collect(), !registry.members().is_empty()),
            None => (Vec::new(), false),
        };

        // A gateway is asked at most once per packet, even when it leads to
        // several foreign clusters.
        let mut used: BTreeSet<NodeId> = BTreeSet::new();
        let mut any_route = false;
        for (foreign_head, candidates) in routes {
            if candidates.is_empty() {
                continue;
            }
            any_route = true;

            let fresh: Vec<NodeId> = candidates
                .into_iter()
                .filter(|candidate| !used.contains(candidate))
                .collect();
            if fresh.is_empty() {
                continue;
            }
            let gateway = fresh[self.indices.pick(fresh.len())];
            used.insert(gateway);
            debug!(
                node_id = self.node_id,
                foreign_head,
                gateway,
                seq_no = message.seq_no,
                "handing packet to gateway"
            );
            out.unicast(
                gateway,
                Message::Data(DataFrame::new(message, HopKind::InterCluster)),
            );
        }

        if any_route || has_members {
            return;
        }

        let neighbors: Vec<NodeId> = self.neighbors.ids().collect();
        if neighbors.is_empty() {
            debug!(node_id = self.node_id, "isolated head, packet dropped");
            return;
        }
        let relay = neighbors[self.indices.pick(neighbors.len())];
        debug!(node_id = self.node_id, relay, "emergency relay");
        out.unicast(
            relay,
            Message::Data(DataFrame::new(message, HopKind::EmergencyRelay)),
        );
    }

    fn choose_destination(&mut self) -> Option<NodeId> {
        match self.settings.destination {
            DestinationPolicy::Neighbor => {
                let neighbors: Vec<NodeId> = self.neighbors.ids().collect();
                if neighbors.is_empty() {
                    return None;
                }
                Some(neighbors[self.indices.pick(neighbors.len())])
            }
            DestinationPolicy::AnyHost => {
                let hosts = self.settings.num_hosts;
                if self.node_id < hosts {
                    if hosts < 2 {
                        return None;
                    }
                    // Pick from the host space with our own slot removed
                    let index = self.indices.pick(hosts as usize - 1) as NodeId;
                    Some(if index >= self.node_id { index + 1 } else { index })
                } else if hosts > 0 {
                    Some(self.indices.pick(hosts as usize) as NodeId)
                } else {
                    None
                }
            }
        }
    }
}

//! Per-node protocol state.
//!
//! [`ClusterNode`] owns everything one node knows and is driven purely by its
//! four handlers. It performs no I/O and reads no clock: the host passes
//! `now` in and carries the returned [`Outbox`] to the transport and the
//! metrics sink. Beacon handling lives in [`crate::beacon`], data handling in
//! [`crate::forwarder`].

use clustermesh_core::{Config, DestinationPolicy, NodeId, Timestamp};
use std::time::Duration;
use tracing::{debug, info};

use crate::election::{Evaluation, RoleChange, RoleElection, RoleState};
use crate::foreign::ForeignClusterTracker;
use crate::message::{Message, Role};
use crate::metrics::{MetricsSink, ProtocolEvent};
use crate::neighbor::NeighborDirectory;
use crate::registry::ClusterHeadRegistry;
use crate::seen::SeenPacketCache;
use crate::selector::{IndexSource, RngIndices};

/// Tunables a node needs at run time.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSettings {
    pub neighbor_validity: Duration,
    pub seen_packet_ttl: Duration,
    pub route_ttl: Duration,
    pub destination: DestinationPolicy,
    pub num_hosts: u32,
}

impl NodeSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            neighbor_validity: config.protocol.neighbor_validity(),
            seen_packet_ttl: config.protocol.seen_packet_ttl(),
            route_ttl: config.protocol.route_ttl(),
            destination: config.traffic.destination,
            num_hosts: config.traffic.num_hosts,
        }
    }
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self::from_config(&Config::default_config())
    }
}

/// A frame the host must put on the air.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    /// To every node in range.
    Broadcast(Message),
    /// To one logical node.
    Unicast { to: NodeId, message: Message },
}

/// Side effects produced by one handler invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outbox {
    pub sends: Vec<Outgoing>,
    pub events: Vec<ProtocolEvent>,
}

impl Outbox {
    pub(crate) fn broadcast(&mut self, message: Message) {
        self.sends.push(Outgoing::Broadcast(message));
    }

    pub(crate) fn unicast(&mut self, to: NodeId, message: Message) {
        self.sends.push(Outgoing::Unicast { to, message });
    }

    pub(crate) fn emit(&mut self, event: ProtocolEvent) {
        self.events.push(event);
    }

    /// Hand every event to `sink`, leaving the sends in place.
    pub fn flush_events(&mut self, node_id: NodeId, sink: &mut impl MetricsSink) {
        for event in self.events.drain(..) {
            sink.record(node_id, &event);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sends.is_empty() && self.events.is_empty()
    }
}

/// How a visualiser should draw the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayClass {
    Undecided,
    Member,
    /// Member with at least one foreign contact.
    Gateway,
    ClusterHead,
}

/// One node's complete protocol state.
#[derive(Debug)]
pub struct ClusterNode<R = RngIndices> {
    pub(crate) node_id: NodeId,
    pub(crate) settings: NodeSettings,
    pub(crate) election: RoleElection,
    pub(crate) neighbors: NeighborDirectory,
    pub(crate) foreign: ForeignClusterTracker,
    /// Present exactly while this node is a cluster head.
    pub(crate) registry: Option<ClusterHeadRegistry>,
    pub(crate) seen: SeenPacketCache,
    pub(crate) next_seq: u64,
    pub(crate) indices: R,
}

impl<R: IndexSource> ClusterNode<R> {
    pub fn new(node_id: NodeId, settings: NodeSettings, indices: R) -> Self {
        Self {
            node_id,
            settings,
            election: RoleElection::new(node_id),
            neighbors: NeighborDirectory::new(),
            foreign: ForeignClusterTracker::new(),
            registry: None,
            seen: SeenPacketCache::new(),
            next_seq: 0,
            indices,
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn settings(&self) -> &NodeSettings {
        &self.settings
    }

    pub fn role(&self) -> Role {
        self.election.role()
    }

    pub fn role_state(&self) -> RoleState {
        self.election.state()
    }

    /// Cluster head this node defers to; its own id while heading a cluster.
    pub fn cluster_head(&self) -> Option<NodeId> {
        self.election.cluster_head()
    }

    pub fn is_gateway(&self) -> bool {
        self.foreign.is_gateway()
    }

    pub fn neighbors(&self) -> &NeighborDirectory {
        &self.neighbors
    }

    pub fn foreign(&self) -> &ForeignClusterTracker {
        &self.foreign
    }

    pub fn registry(&self) -> Option<&ClusterHeadRegistry> {
        self.registry.as_ref()
    }

    pub fn seen_packets(&self) -> &SeenPacketCache {
        &self.seen
    }

    pub fn display_class(&self) -> DisplayClass {
        match self.role() {
            Role::Undecided => DisplayClass::Undecided,
            Role::ClusterHead => DisplayClass::ClusterHead,
            Role::Member if self.is_gateway() => DisplayClass::Gateway,
            Role::Member => DisplayClass::Member,
        }
    }

    /// Dispatch an inbound frame by kind.
    pub fn on_message(&mut self, message: Message, now: Timestamp) -> Outbox {
        match message {
            Message::Beacon(beacon) => self.on_beacon(&beacon, now),
            Message::Data(frame) => self.on_data(frame, now),
        }
    }

    /// Evict silent neighbors, then re-run the election.
    ///
    /// A member that loses its head passes through undecided and is
    /// re-elected against the surviving neighbors in the same sweep.
    pub fn on_timeout_tick(&mut self, now: Timestamp) -> Outbox {
        let mut out = Outbox::default();

        let evicted = self
            .neighbors
            .evict_expired(now, self.settings.neighbor_validity);
        let dropped_sightings = self.foreign.prune_to_neighbors(&self.neighbors);
        if !evicted.is_empty() {
            debug!(
                node_id = self.node_id,
                ?evicted,
                dropped_sightings,
                gateway = self.foreign.is_gateway(),
                "evicted silent neighbors"
            );
        }

        if let Some(change) = self.election.on_neighbors_evicted(&evicted) {
            info!(node_id = self.node_id, "cluster head lost");
            self.record_change(change, &mut out);
        }
        let evaluation = self.election.evaluate(&self.neighbors, now);
        self.apply_evaluation(evaluation, &mut out);

        if let Some(head) = self.cluster_head() {
            self.foreign.forget_head(head);
        }
        self.sync_registry();
        if let Some(registry) = self.registry.as_mut() {
            registry.prune(&self.neighbors, now, self.settings.route_ttl);
        }
        self.seen.prune(now, self.settings.seen_packet_ttl);

        out
    }

    fn apply_evaluation(&mut self, evaluation: Evaluation, out: &mut Outbox) {
        if let Some(duration) = evaluation.tenure {
            out.emit(ProtocolEvent::ClusterHeadTenure { duration });
        }
        if let Some(change) = evaluation.change {
            self.record_change(change, out);
        }
        if let Some(members) = evaluation.cluster_size {
            out.emit(ProtocolEvent::ClusterSize { members });
        }
    }

    fn record_change(&self, change: RoleChange, out: &mut Outbox) {
        info!(
            node_id = self.node_id,
            from = ?change.from,
            to = ?change.to,
            cluster_head = ?self.cluster_head(),
            "role changed"
        );
        out.emit(ProtocolEvent::RoleChange {
            from: change.from,
            to: change.to,
        });
    }

    /// Open a registry when a tenure starts and drop it when it ends.
    fn sync_registry(&mut self) {
        match (self.election.state(), self.registry.is_some()) {
            (RoleState::ClusterHead { .. }, false) => {
                self.registry = Some(ClusterHeadRegistry::new(self.node_id));
            }
            (RoleState::Undecided | RoleState::Member { .. }, true) => {
                self.registry = None;
            }
            _ => {}
        }
    }
}

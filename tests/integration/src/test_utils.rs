//! Deterministic lockstep harness for multi-node tests
//!
//! Drives a set of [`ClusterNode`]s with a manual clock over a [`Topology`].
//! Every frame a handler emits is delivered before the call returns, so a
//! test sees the network in a quiescent state between steps.

use clustermesh_core::{NodeId, Timestamp};
use clustermesh_mesh::{
    ClusterNode, DataFrame, IndexSource, Message, NodeSettings, Outbox, Outgoing, PacketId,
    ProtocolEvent, RngIndices, Role, RoleState, Topology,
};
use rand::rngs::StdRng;
use rand::Rng;
use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;
use tracing::trace;
use tracing_subscriber::EnvFilter;

/// Default time between two lockstep cycles.
pub const CYCLE: Duration = Duration::from_millis(1000);

/// Install a test-friendly subscriber once; later calls are no-ops.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// One data frame that reached a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRecord {
    pub from: NodeId,
    pub to: NodeId,
    pub frame: DataFrame,
}

/// A whole network advanced one step at a time.
pub struct Harness<R = RngIndices> {
    topology: Topology,
    nodes: BTreeMap<NodeId, ClusterNode<R>>,
    now: Timestamp,
    events: BTreeMap<NodeId, Vec<ProtocolEvent>>,
    /// Number of times a node acted on a given packet
    processed: BTreeMap<(NodeId, PacketId), usize>,
    frames: Vec<FrameRecord>,
}

impl Harness<RngIndices> {
    /// Nodes `0..count` with seeded index sources.
    pub fn seeded(topology: Topology, count: u32, seed: u64) -> Self {
        Self::new(topology, 0..count, NodeSettings::default(), |id| {
            RngIndices::seeded(seed.wrapping_add(u64::from(id)))
        })
    }
}

impl<R: IndexSource> Harness<R> {
    pub fn new(
        topology: Topology,
        ids: impl IntoIterator<Item = NodeId>,
        settings: NodeSettings,
        mut indices: impl FnMut(NodeId) -> R,
    ) -> Self {
        let nodes = ids
            .into_iter()
            .map(|id| (id, ClusterNode::new(id, settings.clone(), indices(id))))
            .collect();
        Self {
            topology,
            nodes,
            now: Timestamp::ZERO,
            events: BTreeMap::new(),
            processed: BTreeMap::new(),
            frames: Vec::new(),
        }
    }

    pub fn now(&self) -> Timestamp {
        self.now
    }

    pub fn advance(&mut self, by: Duration) {
        self.now = self.now + by;
    }

    pub fn node(&self, id: NodeId) -> &ClusterNode<R> {
        &self.nodes[&id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut ClusterNode<R> {
        self.nodes.get_mut(&id).expect("unknown node")
    }

    pub fn ids(&self) -> Vec<NodeId> {
        self.nodes.keys().copied().collect()
    }

    pub fn link(&mut self, a: NodeId, b: NodeId) {
        self.topology.link(a, b);
    }

    pub fn unlink(&mut self, a: NodeId, b: NodeId) {
        self.topology.unlink(a, b);
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Every node beacons once.
    pub fn beacon_round(&mut self) {
        for id in self.ids() {
            let now = self.now;
            let out = self.node_mut(id).on_beacon_tick(now);
            self.run(id, out);
        }
    }

    /// Every node runs its timeout sweep once.
    pub fn sweep(&mut self) {
        for id in self.ids() {
            let now = self.now;
            let out = self.node_mut(id).on_timeout_tick(now);
            self.run(id, out);
        }
    }

    /// Beacon, sweep, then let [`CYCLE`] pass.
    pub fn cycle(&mut self) {
        self.beacon_round();
        self.sweep();
        self.advance(CYCLE);
    }

    pub fn cycles(&mut self, count: usize) {
        for _ in 0..count {
            self.cycle();
        }
    }

    /// Cycle until the role states stop changing; returns the cycles used.
    pub fn settle(&mut self, max_cycles: usize) -> Option<usize> {
        let mut previous = self.role_states();
        for used in 1..=max_cycles {
            self.cycle();
            let current = self.role_states();
            if current == previous && used > 1 {
                return Some(used);
            }
            previous = current;
        }
        None
    }

    /// `id` generates one data packet, carried until the network is quiet.
    pub fn originate(&mut self, id: NodeId) {
        let now = self.now;
        let out = self.node_mut(id).on_data_tick(now);
        self.run(id, out);
    }

    /// Hand `message` to `to` as if `from` had sent it, ignoring range.
    pub fn inject(&mut self, from: NodeId, to: NodeId, message: Message) {
        self.deliver_to(from, to, message, &mut VecDeque::new());
    }

    pub fn role_states(&self) -> BTreeMap<NodeId, RoleState> {
        self.nodes
            .iter()
            .map(|(id, node)| (*id, node.role_state()))
            .collect()
    }

    pub fn cluster_heads(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|(_, node)| node.role() == Role::ClusterHead)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn events(&self, id: NodeId) -> &[ProtocolEvent] {
        self.events.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn count_events(&self, id: NodeId, matches: impl Fn(&ProtocolEvent) -> bool) -> usize {
        self.events(id).iter().filter(|e| matches(e)).count()
    }

    /// Highest number of times any node acted on any one packet.
    pub fn max_times_processed(&self) -> usize {
        self.processed.values().copied().max().unwrap_or(0)
    }

    pub fn frames(&self) -> &[FrameRecord] {
        &self.frames
    }

    pub fn clear_frames(&mut self) {
        self.frames.clear();
    }

    fn run(&mut self, from: NodeId, mut out: Outbox) {
        out.flush_events(from, self.events.entry(from).or_default());
        let mut queue: VecDeque<(NodeId, Outgoing)> =
            out.sends.into_iter().map(|send| (from, send)).collect();

        while let Some((from, send)) = queue.pop_front() {
            match send {
                Outgoing::Broadcast(message) => {
                    let targets: Vec<NodeId> = self.topology.neighbors(from).collect();
                    for to in targets {
                        self.deliver_to(from, to, message.clone(), &mut queue);
                    }
                }
                Outgoing::Unicast { to, message } => {
                    if self.topology.in_range(from, to) {
                        self.deliver_to(from, to, message, &mut queue);
                    } else {
                        trace!(from, to, "unicast out of range");
                    }
                }
            }
        }
    }

    fn deliver_to(
        &mut self,
        from: NodeId,
        to: NodeId,
        message: Message,
        queue: &mut VecDeque<(NodeId, Outgoing)>,
    ) {
        let now = self.now;
        let Some(node) = self.nodes.get_mut(&to) else {
            return;
        };
        let data = match &message {
            Message::Data(frame) => Some(*frame),
            Message::Beacon(_) => None,
        };
        let mut out = node.on_message(message, now);

        if let Some(frame) = data {
            self.frames.push(FrameRecord { from, to, frame });
            if !out.is_empty() {
                *self
                    .processed
                    .entry((to, frame.message.packet_id()))
                    .or_default() += 1;
            }
        }
        out.flush_events(to, self.events.entry(to).or_default());
        queue.extend(out.sends.into_iter().map(|send| (to, send)));
    }
}

/// Random connected graph over `0..count`: a random spanning tree plus `extra` links.
pub fn random_connected_topology(count: u32, extra: usize, rng: &mut StdRng) -> Topology {
    let mut topology = Topology::new();
    for id in 1..count {
        topology.link(id, rng.gen_range(0..id));
    }
    if count > 1 {
        for _ in 0..extra {
            topology.link(rng.gen_range(0..count), rng.gen_range(0..count));
        }
    }
    topology
}

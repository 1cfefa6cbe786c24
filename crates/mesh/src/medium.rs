//! In-process radio medium.
//!
//! Nodes attach with their id and get an inbox. A broadcast reaches every
//! attached node linked to the sender; a unicast reaches its addressee only
//! when the two are linked. Each delivery is dropped independently with the
//! configured loss rate.

use clustermesh_core::{NodeId, TopologyConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::error::{MeshError, MeshResult};
use crate::transport::Transport;

/// Undirected radio links between nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Topology {
    links: BTreeMap<NodeId, BTreeSet<NodeId>>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn full(node_count: u32) -> Self {
        let mut topology = Self::new();
        for a in 0..node_count {
            for b in (a + 1)..node_count {
                topology.link(a, b);
            }
        }
        topology
    }

    pub fn line(node_count: u32) -> Self {
        let mut topology = Self::new();
        for a in 1..node_count {
            topology.link(a - 1, a);
        }
        topology
    }

    /// Row-major grid where each node hears the nodes left, right, above and below it.
    pub fn grid(node_count: u32, columns: u32) -> Self {
        let mut topology = Self::new();
        let columns = columns.max(1);
        for id in 0..node_count {
            if id % columns + 1 < columns && id + 1 < node_count {
                topology.link(id, id + 1);
            }
            if id + columns < node_count {
                topology.link(id, id + columns);
            }
        }
        topology
    }

    pub fn from_edges(links: &[(NodeId, NodeId)]) -> Self {
        let mut topology = Self::new();
        for &(a, b) in links {
            topology.link(a, b);
        }
        topology
    }

    pub fn from_config(config: &TopologyConfig, node_count: u32) -> Self {
        match config {
            TopologyConfig::Full => Self::full(node_count),
            TopologyConfig::Line => Self::line(node_count),
            TopologyConfig::Grid { columns } => Self::grid(node_count, *columns),
            TopologyConfig::Edges { links } => Self::from_edges(links),
        }
    }

    /// Self-links are ignored.
    pub fn link(&mut self, a: NodeId, b: NodeId) {
        if a == b {
            return;
        }
        self.links.entry(a).or_default().insert(b);
        self.links.entry(b).or_default().insert(a);
    }

    pub fn unlink(&mut self, a: NodeId, b: NodeId) {
        if let Some(peers) = self.links.get_mut(&a) {
            peers.remove(&b);
        }
        if let Some(peers) = self.links.get_mut(&b) {
            peers.remove(&a);
        }
    }

    /// Nodes in range of `id`, ascending.
    pub fn neighbors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.links.get(&id).into_iter().flatten().copied()
    }

    pub fn in_range(&self, a: NodeId, b: NodeId) -> bool {
        self.links.get(&a).is_some_and(|peers| peers.contains(&b))
    }
}

struct MediumState {
    topology: Topology,
    inboxes: HashMap<NodeId, mpsc::UnboundedSender<Vec<u8>>>,
    loss_rate: f64,
    rng: StdRng,
}

impl MediumState {
    fn deliver(&mut self, from: NodeId, to: NodeId, frame: Vec<u8>) {
        if self.loss_rate > 0.0 && self.rng.gen_bool(self.loss_rate) {
            trace!(from, to, "frame lost");
            return;
        }
        if let Some(inbox) = self.inboxes.get(&to) {
            if inbox.send(frame).is_err() {
                debug!(from, to, "receiver gone, frame dropped");
            }
        }
    }
}

/// Shared medium every simulated node talks through.
pub struct InMemoryMedium {
    state: Mutex<MediumState>,
}

impl InMemoryMedium {
    pub fn new(topology: Topology, loss_rate: f64, seed: u64) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(MediumState {
                topology,
                inboxes: HashMap::new(),
                loss_rate: loss_rate.clamp(0.0, 1.0),
                rng: StdRng::seed_from_u64(seed),
            }),
        })
    }

    fn state(&self) -> MutexGuard<'_, MediumState> {
        // The state holds no invariant a panicking sender could break.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register `node_id` and return the receiving end of its inbox.
    pub fn attach(&self, node_id: NodeId) -> MeshResult<mpsc::UnboundedReceiver<Vec<u8>>> {
        let mut state = self.state();
        if state.inboxes.contains_key(&node_id) {
            return Err(MeshError::DuplicateNode { node_id });
        }
        let (tx, rx) = mpsc::unbounded_channel();
        state.inboxes.insert(node_id, tx);
        Ok(rx)
    }

    pub fn detach(&self, node_id: NodeId) -> MeshResult<()> {
        self.state()
            .inboxes
            .remove(&node_id)
            .map(|_| ())
            .ok_or(MeshError::UnknownNode { node_id })
    }

    /// Bring a link up or down while the network runs.
    pub fn set_link(&self, a: NodeId, b: NodeId, up: bool) {
        let mut state = self.state();
        if up {
            state.topology.link(a, b);
        } else {
            state.topology.unlink(a, b);
        }
        debug!(a, b, up, "link changed");
    }

    pub fn topology(&self) -> Topology {
        self.state().topology.clone()
    }
}

impl Transport for InMemoryMedium {
    fn broadcast(&self, from: NodeId, frame: Vec<u8>) {
        let mut state = self.state();
        let targets: Vec<NodeId> = state.topology.neighbors(from).collect();
        for to in targets {
            state.deliver(from, to, frame.clone());
        }
    }

    fn send_to(&self, from: NodeId, to: NodeId, frame: Vec<u8>) {
        let mut state = self.state();
        if state.topology.in_range(from, to) {
            state.deliver(from, to, frame);
        } else {
            trace!(from, to, "unicast out of range");
        }
    }
}

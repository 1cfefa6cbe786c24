//! Tokio host for one [`ClusterNode`].
//!
//! Each node runs as its own task that owns its state outright. The task
//! multiplexes three timers and its inbox with `tokio::select!`, feeds the
//! node's events into a [`MetricsRecorder`] and hands encoded frames to the
//! [`Transport`]. Nothing is shared between nodes except the medium.

use clustermesh_core::{Config, NodeId, Timestamp};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::{MeshError, MeshResult};
use crate::message::{Message, Role};
use crate::metrics::{MetricsRecorder, NodeSummary};
use crate::node::{ClusterNode, DisplayClass, Outbox, Outgoing};
use crate::selector::IndexSource;
use crate::transport::Transport;

/// Common time origin for every node of one run.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeClock {
    epoch: Instant,
}

impl RuntimeClock {
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    pub fn epoch(&self) -> Instant {
        self.epoch
    }

    pub fn elapsed(&self) -> Duration {
        self.epoch.elapsed()
    }

    pub fn now(&self) -> Timestamp {
        Timestamp::from(self.elapsed())
    }
}

/// When a node's timers fire, relative to the run epoch.
#[derive(Debug, Clone, PartialEq)]
pub struct TimerPlan {
    pub beacon_interval: Duration,
    /// First beacon goes out uniformly within this window.
    pub beacon_jitter: Duration,
    /// First sweep runs one beacon interval in, then at this period.
    pub timeout_check_interval: Duration,
    pub data_start: (Duration, Duration),
    pub data_interval: (Duration, Duration),
}

impl TimerPlan {
    pub fn from_config(config: &Config) -> Self {
        let t = &config.traffic;
        Self {
            beacon_interval: config.protocol.beacon_interval(),
            beacon_jitter: config.protocol.beacon_jitter(),
            timeout_check_interval: config.protocol.timeout_check_interval(),
            data_start: (
                Duration::from_millis(t.start_min_ms),
                Duration::from_millis(t.start_max_ms),
            ),
            data_interval: (
                Duration::from_millis(t.interval_min_ms),
                Duration::from_millis(t.interval_max_ms),
            ),
        }
    }
}

/// Everything a node task needs besides the node itself.
#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub timers: TimerPlan,
    /// Payload size used for throughput figures.
    pub packet_bytes: u64,
    /// Base seed for timer jitter; mixed with the node id.
    pub seed: u64,
}

impl RuntimeSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            timers: TimerPlan::from_config(config),
            packet_bytes: config.traffic.packet_bytes,
            seed: config.simulation.seed,
        }
    }
}

/// Externally visible snapshot of a running node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeStatus {
    pub role: Role,
    pub cluster_head: Option<NodeId>,
    pub display_class: DisplayClass,
    pub neighbors: Vec<NodeId>,
}

impl NodeStatus {
    fn of<R: IndexSource>(node: &ClusterNode<R>) -> Self {
        Self {
            role: node.role(),
            cluster_head: node.cluster_head(),
            display_class: node.display_class(),
            neighbors: node.neighbors().ids().collect(),
        }
    }
}

/// What a node task hands back when it stops.
#[derive(Debug, Clone)]
pub struct NodeReport {
    pub summary: NodeSummary,
    pub tenures: Vec<Duration>,
    pub cluster_sizes: Vec<usize>,
    pub final_status: NodeStatus,
}

/// Control handle for a spawned node task.
pub struct NodeHandle {
    node_id: NodeId,
    shutdown: watch::Sender<bool>,
    status: watch::Receiver<NodeStatus>,
    task: JoinHandle<MeshResult<NodeReport>>,
}

impl NodeHandle {
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn status(&self) -> NodeStatus {
        self.status.borrow().clone()
    }

    /// Receiver that wakes on every status change.
    pub fn subscribe(&self) -> watch::Receiver<NodeStatus> {
        self.status.clone()
    }

    /// Stop the node and collect its report.
    ///
    /// Fails with [`MeshError::TransportClosed`] if the medium dropped the
    /// node's inbox before it was told to stop.
    pub async fn stop(self) -> MeshResult<NodeReport> {
        // The task may already be gone, in which case there is nobody to tell.
        let _ = self.shutdown.send(true);
        self.task.await?
    }
}

/// Event loop driving one node.
pub struct NodeRuntime<R, T> {
    node: ClusterNode<R>,
    inbox: mpsc::UnboundedReceiver<Vec<u8>>,
    transport: Arc<T>,
    settings: RuntimeSettings,
    clock: RuntimeClock,
    recorder: MetricsRecorder,
    rng: StdRng,
    status: watch::Sender<NodeStatus>,
}

impl<R, T> NodeRuntime<R, T>
where
    R: IndexSource + Send + 'static,
    T: Transport,
{
    /// Start `node` on the current tokio runtime.
    pub fn spawn(
        node: ClusterNode<R>,
        inbox: mpsc::UnboundedReceiver<Vec<u8>>,
        transport: Arc<T>,
        settings: RuntimeSettings,
        clock: RuntimeClock,
    ) -> NodeHandle {
        let node_id = node.node_id();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (status_tx, status_rx) = watch::channel(NodeStatus::of(&node));
        let rng = StdRng::seed_from_u64(settings.seed ^ u64::from(node_id).rotate_left(32));

        let runtime = Self {
            node,
            inbox,
            transport,
            settings,
            clock,
            recorder: MetricsRecorder::new(),
            rng,
            status: status_tx,
        };
        let task = tokio::spawn(runtime.run(shutdown_rx));

        NodeHandle {
            node_id,
            shutdown: shutdown_tx,
            status: status_rx,
            task,
        }
    }

    async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> MeshResult<NodeReport> {
        let node_id = self.node.node_id();
        let timers = self.settings.timers.clone();
        let epoch = self.clock.epoch();

        let first_beacon = epoch + self.uniform(Duration::ZERO, timers.beacon_jitter);
        let mut beacon = time::interval_at(first_beacon, timers.beacon_interval);
        beacon.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut sweep = time::interval_at(
            epoch + timers.beacon_interval,
            timers.timeout_check_interval,
        );
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let first_data = epoch + self.uniform(timers.data_start.0, timers.data_start.1);
        let data = time::sleep_until(first_data);
        tokio::pin!(data);

        info!(node_id, "node started");

        let mut inbox_closed = false;
        loop {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = beacon.tick() => {
                    let out = self.node.on_beacon_tick(self.clock.now());
                    self.dispatch(out);
                }
                _ = sweep.tick() => {
                    let out = self.node.on_timeout_tick(self.clock.now());
                    self.dispatch(out);
                }
                _ = &mut data => {
                    let out = self.node.on_data_tick(self.clock.now());
                    self.dispatch(out);
                    let next = self.uniform(timers.data_interval.0, timers.data_interval.1);
                    data.as_mut().reset(Instant::now() + next);
                }
                frame = self.inbox.recv() => {
                    let Some(bytes) = frame else {
                        warn!(node_id, "inbox closed");
                        inbox_closed = true;
                        break;
                    };
                    match Message::decode(&bytes) {
                        Ok(message) => {
                            let out = self.node.on_message(message, self.clock.now());
                            self.dispatch(out);
                        }
                        Err(e) => warn!(node_id, error = %e, "dropping malformed frame"),
                    }
                }
            }
            self.publish_status();
        }

        let summary = self
            .recorder
            .summary(node_id, self.clock.elapsed(), self.settings.packet_bytes);
        info!(
            node_id,
            sent = summary.packets_sent,
            received = summary.packets_received,
            beacons = summary.beacons_sent,
            "node stopped"
        );

        if inbox_closed {
            return Err(MeshError::TransportClosed { node_id });
        }
        Ok(NodeReport {
            summary,
            tenures: self.recorder.tenures().to_vec(),
            cluster_sizes: self.recorder.cluster_sizes().to_vec(),
            final_status: NodeStatus::of(&self.node),
        })
    }

    fn dispatch(&mut self, mut out: Outbox) {
        let node_id = self.node.node_id();
        out.flush_events(node_id, &mut self.recorder);

        for send in out.sends {
            let (to, message) = match send {
                Outgoing::Broadcast(message) => (None, message),
                Outgoing::Unicast { to, message } => (Some(to), message),
            };
            let frame = match message.encode() {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(node_id, error = %e, "failed to encode frame");
                    continue;
                }
            };
            match to {
                None => self.transport.broadcast(node_id, frame),
                Some(to) => self.transport.send_to(node_id, to, frame),
            }
        }
    }

    fn publish_status(&self) {
        let current = NodeStatus::of(&self.node);
        let changed = self.status.send_if_modified(|status| {
            if *status == current {
                return false;
            }
            *status = current.clone();
            true
        });
        if changed {
            debug!(node_id = self.node.node_id(), status = ?current, "status changed");
        }
    }

    fn uniform(&mut self, min: Duration, max: Duration) -> Duration {
        if max <= min {
            return min;
        }
        self.rng.gen_range(min..=max)
    }
}

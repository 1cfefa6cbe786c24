//! The same protocol hosted on tokio tasks over the in-memory medium.

use clustermesh_core::{Config, DestinationPolicy, NodeId, TopologyConfig};
use clustermesh_mesh::{
    ClusterNode, InMemoryMedium, NetworkTotals, NodeHandle, NodeRuntime, NodeSettings, RngIndices,
    Role, RuntimeClock, RuntimeSettings, Topology, Transport,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn config(node_count: u32, topology: TopologyConfig) -> Config {
    let mut config = Config::default_config();
    config.protocol.beacon_jitter_ms = 200;
    config.traffic.num_hosts = node_count;
    config.simulation.node_count = node_count;
    config.simulation.topology = topology;
    config.validate().unwrap();
    config
}

fn start(config: &Config) -> (Arc<InMemoryMedium>, Vec<NodeHandle>) {
    let sim = &config.simulation;
    let medium = InMemoryMedium::new(
        Topology::from_config(&sim.topology, sim.node_count),
        sim.loss_rate,
        sim.seed,
    );
    let clock = RuntimeClock::start();
    let settings = RuntimeSettings::from_config(config);

    let handles = (0..sim.node_count)
        .map(|id: NodeId| {
            let node = ClusterNode::new(
                id,
                NodeSettings::from_config(config),
                RngIndices::seeded(sim.seed + u64::from(id)),
            );
            NodeRuntime::spawn(
                node,
                medium.attach(id).unwrap(),
                medium.clone(),
                settings.clone(),
                clock,
            )
        })
        .collect();
    (medium, handles)
}

#[tokio::test(start_paused = true)]
async fn test_head_loss_over_the_medium() {
    let config = config(3, TopologyConfig::Full);
    let (medium, handles) = start(&config);

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(handles[1].status().cluster_head, Some(0));

    let mut status = handles[1].subscribe();
    medium.set_link(0, 1, false);
    // Node 1 only hears node 2 now and heads its own cluster
    status
        .wait_for(|s| s.role == Role::ClusterHead)
        .await
        .unwrap();
    assert_eq!(status.borrow().cluster_head, Some(1));
    assert!(!status.borrow().neighbors.contains(&0));

    let report = handles.into_iter().nth(1).unwrap().stop().await.unwrap();
    // Undecided -> Member -> Undecided -> ClusterHead
    assert!(report.summary.role_changes >= 3);
}

/// Counts frames handed to the medium per sender.
struct CountingTransport {
    medium: Arc<InMemoryMedium>,
    sent: Mutex<BTreeMap<NodeId, usize>>,
}

impl CountingTransport {
    fn sent_by(&self, node_id: NodeId) -> usize {
        self.sent
            .lock()
            .unwrap()
            .get(&node_id)
            .copied()
            .unwrap_or(0)
    }

    fn count(&self, from: NodeId) {
        *self.sent.lock().unwrap().entry(from).or_default() += 1;
    }
}

impl Transport for CountingTransport {
    fn broadcast(&self, from: NodeId, frame: Vec<u8>) {
        self.count(from);
        self.medium.broadcast(from, frame);
    }

    fn send_to(&self, from: NodeId, to: NodeId, frame: Vec<u8>) {
        self.count(from);
        self.medium.send_to(from, to, frame);
    }
}

#[tokio::test(start_paused = true)]
async fn test_stopped_node_goes_silent_and_is_forgotten() {
    let config = config(3, TopologyConfig::Full);
    let sim = &config.simulation;
    let medium = InMemoryMedium::new(Topology::full(3), 0.0, sim.seed);
    let transport = Arc::new(CountingTransport {
        medium: medium.clone(),
        sent: Mutex::new(BTreeMap::new()),
    });
    let clock = RuntimeClock::start();
    let settings = RuntimeSettings::from_config(&config);

    let mut handles: Vec<NodeHandle> = (0..3)
        .map(|id: NodeId| {
            let node = ClusterNode::new(
                id,
                NodeSettings::from_config(&config),
                RngIndices::seeded(sim.seed + u64::from(id)),
            );
            NodeRuntime::spawn(
                node,
                medium.attach(id).unwrap(),
                transport.clone(),
                settings.clone(),
                clock,
            )
        })
        .collect();

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(handles[0].status().role, Role::ClusterHead);
    assert_eq!(handles[1].status().cluster_head, Some(0));

    let head = handles.remove(0);
    head.stop().await.unwrap();
    let sent_at_stop = transport.sent_by(0);
    assert!(sent_at_stop > 0);

    let validity = config.protocol.neighbor_validity();
    tokio::time::sleep(validity * 2).await;

    assert_eq!(transport.sent_by(0), sent_at_stop);
    let node1 = handles[0].status();
    let node2 = handles[1].status();
    assert!(!node1.neighbors.contains(&0), "{node1:?}");
    assert!(!node2.neighbors.contains(&0), "{node2:?}");
    assert_eq!(node1.role, Role::ClusterHead);
    assert_eq!(node2.cluster_head, Some(1));

    for handle in handles {
        handle.stop().await.unwrap();
    }
}

#[tokio::test(start_paused = true)]
async fn test_lossy_grid_still_delivers() {
    let mut config = config(9, TopologyConfig::Grid { columns: 3 });
    config.simulation.loss_rate = 0.1;
    let (_medium, handles) = start(&config);

    tokio::time::sleep(Duration::from_secs(60)).await;

    let mut summaries = Vec::new();
    for handle in handles {
        summaries.push(handle.stop().await.unwrap().summary);
    }
    let totals = NetworkTotals::from_summaries(&summaries);
    assert_eq!(totals.nodes, 9);
    assert!(totals.control_overhead >= 9 * 50);
    assert!(totals.delivery_ratio > 0.0, "{totals:?}");
}

#[tokio::test(start_paused = true)]
async fn test_neighbor_policy_traffic_is_delivered() {
    let mut config = config(4, TopologyConfig::Line);
    config.traffic.destination = DestinationPolicy::Neighbor;
    let (_medium, handles) = start(&config);

    tokio::time::sleep(Duration::from_secs(20)).await;

    let mut summaries = Vec::new();
    for handle in handles {
        summaries.push(handle.stop().await.unwrap().summary);
    }
    let totals = NetworkTotals::from_summaries(&summaries);
    assert!(summaries.iter().all(|s| s.packets_sent > 0));
    assert!(totals.delivery_ratio > 90.0, "{totals:?}");
}

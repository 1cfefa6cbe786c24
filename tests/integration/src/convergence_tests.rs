//! Election convergence and deference across whole networks.

use crate::test_utils::{init_test_logging, random_connected_topology, Harness};
use clustermesh_core::NodeId;
use clustermesh_mesh::{NodeSettings, ProtocolEvent, RngIndices, Role, RoleState, Topology};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// No head may see a lower-id head among its neighbors, and every member
/// must be bound to a live neighbor with a lower id.
fn assert_stable_clustering(harness: &Harness) {
    for id in harness.ids() {
        let node = harness.node(id);
        match node.role_state() {
            RoleState::ClusterHead { .. } => {
                for neighbor in harness.topology().neighbors(id) {
                    assert!(
                        !(neighbor < id && harness.node(neighbor).role() == Role::ClusterHead),
                        "head {id} still sees lower head {neighbor}"
                    );
                }
            }
            RoleState::Member { head } => {
                assert!(head < id, "member {id} bound to higher id {head}");
                assert!(
                    harness.topology().in_range(id, head),
                    "member {id} bound to out-of-range {head}"
                );
            }
            RoleState::Undecided => panic!("node {id} still undecided"),
        }
    }
}

#[test]
fn test_line_has_single_head() {
    let mut harness = Harness::seeded(Topology::line(6), 6, 1);
    harness.settle(10).expect("line did not settle");

    assert_eq!(harness.cluster_heads(), vec![0]);
    for id in 1..6 {
        assert_eq!(harness.node(id).role_state(), RoleState::Member { head: id - 1 });
    }
    assert_stable_clustering(&harness);
}

#[test]
fn test_grid_clustering_is_stable() {
    let mut harness = Harness::seeded(Topology::grid(12, 4), 12, 3);
    harness.settle(10).expect("grid did not settle");
    assert_stable_clustering(&harness);
}

#[test]
fn test_random_graphs_reach_fixed_point() {
    init_test_logging();
    let mut rng = StdRng::seed_from_u64(0x5eed);

    for trial in 0..25 {
        let count = 4 + trial % 12;
        let topology = random_connected_topology(count, count as usize / 2, &mut rng);
        let mut harness = Harness::seeded(topology, count, u64::from(trial));

        harness
            .settle(20)
            .unwrap_or_else(|| panic!("trial {trial} did not settle"));
        assert_stable_clustering(&harness);

        // Further sweeps change nothing
        let settled = harness.role_states();
        harness.cycles(5);
        assert_eq!(harness.role_states(), settled, "trial {trial} drifted");
    }
}

#[test]
fn test_late_link_makes_higher_head_defer() {
    // Two isolated pairs that each elect their own head: {1, 4} and {3, 6}.
    let mut harness = Harness::new(
        Topology::from_edges(&[(1, 4), (3, 6)]),
        [1, 3, 4, 6],
        NodeSettings::default(),
        |id: NodeId| RngIndices::seeded(u64::from(id)),
    );
    harness.settle(10).expect("pairs did not settle");
    assert_eq!(harness.cluster_heads(), vec![1, 3]);

    harness.link(1, 3);
    harness.cycles(2);

    assert_eq!(harness.node(3).role_state(), RoleState::Member { head: 1 });
    assert_eq!(harness.cluster_heads(), vec![1]);
    assert_eq!(
        harness.count_events(3, |e| matches!(e, ProtocolEvent::ClusterHeadTenure { .. })),
        1
    );
    // Node 6 stays bound to 3; lowest-ID clustering never rebinds a member
    assert_eq!(harness.node(6).role_state(), RoleState::Member { head: 3 });
}

#[test]
fn test_head_reports_cluster_size_each_sweep() {
    let mut harness = Harness::seeded(Topology::full(4), 4, 9);
    harness.cycles(3);

    let sizes: Vec<usize> = harness
        .events(0)
        .iter()
        .filter_map(|e| match e {
            ProtocolEvent::ClusterSize { members } => Some(*members),
            _ => None,
        })
        .collect();
    // Sampled only while already heading a cluster, so the electing sweep has none
    assert_eq!(sizes, vec![3, 3]);
}

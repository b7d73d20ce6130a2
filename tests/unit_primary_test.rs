mod common;

use replimon::node::NodeFlags;
use replimon::primary::{self, PrimaryValidityInputs, RequireRunning};

fn permissive_validity() -> PrimaryValidityInputs {
    PrimaryValidityInputs {
        down_ticks: 0,
        failcount: 5,
        enforce_writable_master: false,
        cooperative: false,
        primary_monitor_concurs: true,
    }
}

#[test]
fn root_node_with_largest_reach_is_selected() {
    // n1 has two running children (n2, n3); n4 is an isolated root.
    let nodes = common::build_from_edges(4, &[(2, 1), (3, 1)]);
    let result = primary::select(&nodes, RequireRunning::Required);
    assert_eq!(result.selected, Some(0));
}

#[test]
fn down_root_is_rejected_when_running_required() {
    let mut nodes = common::build_from_edges(2, &[(2, 1)]);
    nodes[0].flags.remove(NodeFlags::RUNNING);
    let result = primary::select(&nodes, RequireRunning::Required);
    assert_ne!(result.selected, Some(0));
    assert!(!result.rejections.is_empty());
}

#[test]
fn down_root_accepted_when_running_optional_and_no_other_candidate() {
    let mut nodes = common::build_from_edges(1, &[]);
    nodes[0].flags.remove(NodeFlags::RUNNING);
    let required = primary::select(&nodes, RequireRunning::Required);
    assert_eq!(required.selected, None);

    let optional = primary::select(&nodes, RequireRunning::Optional);
    assert_eq!(optional.selected, Some(0));
}

#[test]
fn excluded_from_promotion_node_is_never_selected() {
    let mut nodes = common::build_from_edges(2, &[]);
    nodes[0].excluded_from_promotion = true;
    let result = primary::select(&nodes, RequireRunning::Required);
    assert_eq!(result.selected, Some(1));
}

#[test]
fn cycle_with_external_master_is_not_a_valid_root() {
    // n1 <-> n2 form a cycle, but n2 also replicates from external n3.
    let mut nodes = common::build_from_edges(3, &[(1, 2), (2, 1), (2, 3)]);
    replimon::cycle::find_cycles(&mut nodes);
    assert_eq!(nodes[0].cycle_id, nodes[1].cycle_id);
    assert!(nodes[0].cycle_id.is_some());

    let result = primary::select(&nodes, RequireRunning::Required);
    // n3 has no parents and is a valid root on its own; the {n1,n2} cycle
    // must be excluded since n2 reports an external parent (n3).
    assert_eq!(result.selected, Some(2));
}

#[test]
fn reach_counts_only_running_descendants() {
    let mut nodes = common::build_from_edges(3, &[(2, 1), (3, 2)]);
    assert_eq!(primary::reach(&nodes, 0), 3);

    nodes[2].flags.remove(NodeFlags::RUNNING);
    assert_eq!(primary::reach(&nodes, 0), 2);
}

#[test]
fn is_still_valid_rejects_a_maintenance_incumbent() {
    let mut nodes = common::build_from_edges(2, &[(2, 1)]);
    let inputs = permissive_validity();
    assert!(primary::is_still_valid(&nodes, 0, &inputs));
    nodes[0].flags.insert(NodeFlags::MAINTENANCE);
    assert!(!primary::is_still_valid(&nodes, 0, &inputs));
}

#[test]
fn is_still_valid_rejects_a_read_only_incumbent_unless_enforced_off() {
    let nodes = common::build_from_edges(2, &[(2, 1)]);
    let mut inputs = permissive_validity();
    assert!(primary::is_still_valid(&nodes, 0, &inputs));

    let mut read_only_nodes = nodes.clone();
    read_only_nodes[0].read_only = true;
    assert!(!primary::is_still_valid(&read_only_nodes, 0, &inputs));

    inputs.enforce_writable_master = true;
    assert!(primary::is_still_valid(&read_only_nodes, 0, &inputs));
}

#[test]
fn is_still_valid_rejects_incumbent_without_peer_concurrence_when_cooperative() {
    let nodes = common::build_from_edges(2, &[(2, 1)]);
    let mut inputs = permissive_validity();
    inputs.cooperative = true;
    inputs.primary_monitor_concurs = false;
    assert!(!primary::is_still_valid(&nodes, 0, &inputs));

    inputs.primary_monitor_concurs = true;
    assert!(primary::is_still_valid(&nodes, 0, &inputs));
}

#[test]
fn is_still_valid_rejects_a_long_down_incumbent_with_no_reach() {
    let mut nodes = common::build_from_edges(1, &[]);
    nodes[0].flags.remove(NodeFlags::RUNNING);
    let mut inputs = permissive_validity();

    // Down, but not yet past failcount: still valid.
    inputs.down_ticks = inputs.failcount;
    assert!(primary::is_still_valid(&nodes, 0, &inputs));

    // Down past failcount with zero reach (no running descendants): invalid.
    inputs.down_ticks = inputs.failcount + 1;
    assert!(!primary::is_still_valid(&nodes, 0, &inputs));
}

mod common;

use replimon::cycle;

/// §8 S1: edges {(1→2),(2→1),(3→2),(3→4),(4→3)} — cycles {{1,2},{3,4}},
/// no other cycles, no node in two cycles.
#[test]
fn scenario_s1_two_bridged_cycles() {
    let mut nodes = common::build_from_edges(4, &[(1, 2), (2, 1), (3, 2), (3, 4), (4, 3)]);
    cycle::find_cycles(&mut nodes);

    let cycle_of = |name: &str| nodes.iter().find(|n| n.name == name).unwrap().cycle_id;

    assert!(cycle_of("n1").is_some());
    assert_eq!(cycle_of("n1"), cycle_of("n2"));
    assert!(cycle_of("n3").is_some());
    assert_eq!(cycle_of("n3"), cycle_of("n4"));
    assert_ne!(cycle_of("n1"), cycle_of("n3"));
}

/// §8 S2: edges {(2→1),(3→2),(4→3),(2→4),(5→1),(6→5),(6→4)} — cycle
/// {{2,3,4}}; nodes 1,5,6 uncycled.
#[test]
fn scenario_s2_non_cycle_path_plus_one_cycle() {
    let mut nodes = common::build_from_edges(
        6,
        &[(2, 1), (3, 2), (4, 3), (2, 4), (5, 1), (6, 5), (6, 4)],
    );
    cycle::find_cycles(&mut nodes);

    let cycle_of = |name: &str| nodes.iter().find(|n| n.name == name).unwrap().cycle_id;

    assert!(cycle_of("n1").is_none());
    assert!(cycle_of("n5").is_none());
    assert!(cycle_of("n6").is_none());

    let c = cycle_of("n2");
    assert!(c.is_some());
    assert_eq!(cycle_of("n3"), c);
    assert_eq!(cycle_of("n4"), c);
}

#[test]
fn single_node_self_loop_free_graph_has_no_cycles() {
    let mut nodes = common::build_from_edges(3, &[(2, 1), (3, 2)]);
    cycle::find_cycles(&mut nodes);
    assert!(nodes.iter().all(|n| n.cycle_id.is_none()));
}

#[test]
fn cycle_finder_is_idempotent_up_to_renumbering() {
    let mut nodes = common::build_from_edges(4, &[(1, 2), (2, 1), (3, 4), (4, 3)]);
    cycle::find_cycles(&mut nodes);
    let first_pass: Vec<Option<u32>> = nodes.iter().map(|n| n.cycle_id).collect();

    cycle::find_cycles(&mut nodes);
    let second_pass: Vec<Option<u32>> = nodes.iter().map(|n| n.cycle_id).collect();

    // Membership (which nodes share a cycle) must match across runs, even
    // if the numeric ids assigned differ.
    for i in 0..nodes.len() {
        for j in 0..nodes.len() {
            assert_eq!(
                first_pass[i] == first_pass[j],
                second_pass[i] == second_pass[j]
            );
        }
    }
}

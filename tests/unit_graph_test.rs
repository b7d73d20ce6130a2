mod common;

use replimon::graph::{self, UpstreamResolution};
use replimon::node::{Endpoint, IoState, Node, NodeFlags, ReplicaConnection, SqlState};

#[test]
fn build_is_idempotent_given_unchanged_inputs() {
    let mut nodes = common::build_from_edges(3, &[(2, 1), (3, 2)]);
    let first: Vec<(Vec<usize>, Vec<usize>)> = nodes
        .iter()
        .map(|n| (n.parents.clone(), n.children.clone()))
        .collect();

    graph::build(&mut nodes, UpstreamResolution::ByEndpoint);
    let second: Vec<(Vec<usize>, Vec<usize>)> = nodes
        .iter()
        .map(|n| (n.parents.clone(), n.children.clone()))
        .collect();

    assert_eq!(first, second);
}

#[test]
fn non_replicating_connection_admits_no_edge() {
    let mut nodes = common::make_running_nodes(2);
    let parent_endpoint = nodes[1].endpoint.clone();
    let mut conn = ReplicaConnection::new("c", parent_endpoint);
    conn.io_state = IoState::No;
    conn.sql_state = SqlState::No;
    nodes[0].replicas.push(conn);

    graph::build(&mut nodes, UpstreamResolution::ByEndpoint);

    assert!(nodes[0].parents.is_empty());
    assert!(nodes[1].children.is_empty());
}

#[test]
fn by_server_id_resolution_requires_seen_connected() {
    let mut nodes = common::make_running_nodes(2);
    nodes[1].server_id = Some(42);

    let mut conn = ReplicaConnection::new("c", Endpoint::new("unused", 1));
    conn.io_state = IoState::Yes;
    conn.sql_state = SqlState::Yes;
    conn.upstream_server_id = Some(42);
    // seen_connected deliberately left false.
    nodes[0].replicas.push(conn);

    graph::build(&mut nodes, UpstreamResolution::ByServerId);
    assert!(nodes[0].parents.is_empty(), "unseen connection must not resolve to a parent");

    nodes[0].replicas[0].observe_io_state(IoState::Yes, Some(42));
    graph::build(&mut nodes, UpstreamResolution::ByServerId);
    assert_eq!(nodes[0].parents, vec![1]);
}

#[test]
fn unresolved_upstream_becomes_an_external_master() {
    let mut nodes: Vec<Node> = common::make_running_nodes(1);
    let mut conn = ReplicaConnection::new("c", Endpoint::new("elsewhere.example", 3306));
    conn.io_state = IoState::Yes;
    conn.sql_state = SqlState::Yes;
    nodes[0].replicas.push(conn);

    graph::build(&mut nodes, UpstreamResolution::ByEndpoint);

    assert!(nodes[0].parents.is_empty());
    assert_eq!(nodes[0].external_masters.len(), 1);
    assert_eq!(nodes[0].external_masters[0].host, "elsewhere.example");
}

#[test]
fn reset_graph_fields_preserves_cycle_id_until_cycle_finder_runs() {
    let mut node = Node::new("n", Endpoint::new("127.0.0.1", 1), 0);
    node.cycle_id = Some(7);
    node.children.push(1);
    node.flags.insert(NodeFlags::RUNNING);

    node.reset_graph_fields();

    assert!(node.children.is_empty());
    assert_eq!(node.cycle_id, Some(7));
}

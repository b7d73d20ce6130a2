// tests/common/mod.rs

//! Shared fixtures for building small clusters of `Node`s without a real
//! `SqlConnection`.

use replimon::graph::{self, UpstreamResolution};
use replimon::node::{Endpoint, IoState, Node, NodeFlags, ReplicaConnection, SqlState};

/// Builds `count` nodes named `n1..nN` on distinct ports, all running.
pub fn make_running_nodes(count: usize) -> Vec<Node> {
    (0..count)
        .map(|i| {
            let mut node = Node::new(format!("n{}", i + 1), Endpoint::new("127.0.0.1", 10000 + i as u16), i);
            node.flags.insert(NodeFlags::RUNNING);
            node
        })
        .collect()
}

/// Adds a live replica connection on `nodes[child]` pointing at
/// `nodes[parent]`, then rebuilds the graph by endpoint.
pub fn link(nodes: &mut [Node], child: usize, parent: usize) {
    let parent_endpoint = nodes[parent].endpoint.clone();
    let mut conn = ReplicaConnection::new(format!("link_{child}_{parent}"), parent_endpoint);
    conn.io_state = IoState::Yes;
    conn.sql_state = SqlState::Yes;
    nodes[child].replicas.push(conn);
}

/// Links every (child, parent) 1-indexed pair (matching the spec's S1/S2
/// notation) and rebuilds the graph once.
pub fn build_from_edges(node_count: usize, edges: &[(usize, usize)]) -> Vec<Node> {
    let mut nodes = make_running_nodes(node_count);
    for &(child, parent) in edges {
        link(&mut nodes, child - 1, parent - 1);
    }
    graph::build(&mut nodes, UpstreamResolution::ByEndpoint);
    nodes
}

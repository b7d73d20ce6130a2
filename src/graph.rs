// src/graph.rs

//! C2 GraphBuilder: rebuilds the directed "replicates-from" graph
//! (`parents`/`children` index lists on each `Node`) from the current
//! `ReplicaConnection` rows (§4.2).

use crate::node::Node;

/// How replica upstreams are resolved to a known `Node` (§6.2
/// `assume_unique_hostnames`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamResolution {
    /// Resolve by endpoint; hostnames are assumed unique.
    ByEndpoint,
    /// Resolve by server id, and only once a connection has been seen
    /// connected at least once.
    ByServerId,
}

/// Rebuilds `parents`/`children`/`external_masters` on every node in place.
/// Construction is idempotent: identical inputs always produce an
/// identical graph (§4.2 algorithm step 3, §8 round-trip law).
pub fn build(nodes: &mut [Node], resolution: UpstreamResolution) {
    for node in nodes.iter_mut() {
        node.reset_graph_fields();
    }

    // Resolve edges against a read-only view of addressable node keys first,
    // since resolution needs to look up *other* nodes by endpoint/server id
    // while we're about to mutate `parents`/`children` on potentially the
    // same nodes.
    let endpoints: Vec<_> = nodes.iter().map(|n| n.endpoint.clone()).collect();
    let server_ids: Vec<_> = nodes.iter().map(|n| n.server_id).collect();

    // (child_idx, parent_idx, connection_idx)
    let mut edges: Vec<(usize, usize, usize)> = Vec::new();
    let mut externals: Vec<(usize, crate::node::Endpoint)> = Vec::new();

    for (child_idx, node) in nodes.iter().enumerate() {
        for (conn_idx, conn) in node.replicas.iter().enumerate() {
            if !conn.is_replicating() {
                continue;
            }

            let resolved = match resolution {
                UpstreamResolution::ByEndpoint => endpoints
                    .iter()
                    .position(|e| *e == conn.upstream_endpoint),
                UpstreamResolution::ByServerId => {
                    if conn.seen_connected {
                        conn.upstream_server_id.and_then(|wanted| {
                            server_ids.iter().position(|sid| *sid == Some(wanted))
                        })
                    } else {
                        None
                    }
                }
            };

            match resolved {
                Some(parent_idx) => edges.push((child_idx, parent_idx, conn_idx)),
                None => externals.push((child_idx, conn.upstream_endpoint.clone())),
            }
        }
    }

    for (child_idx, parent_idx, conn_idx) in edges {
        nodes[child_idx].parents.push(parent_idx);
        nodes[parent_idx].children.push(child_idx);
        nodes[child_idx].replicas[conn_idx].master_server = Some(parent_idx);
    }

    for (child_idx, endpoint) in externals {
        nodes[child_idx].external_masters.push(endpoint);
    }
}

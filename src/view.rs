// src/view.rs

//! The `MonitorView`: an aggregate, read-only snapshot of observable
//! Node fields, published atomically at tick end (§6.4, §5 "Shared-resource
//! policy").

use crate::locks::LockCoordinatorState;
use crate::node::{Endpoint, LockStatus, Node, NodeFlags};
use parking_lot::RwLock;
use std::sync::Arc;

/// One replication link as shown to external readers.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SlaveConnectionView {
    pub name: String,
    pub upstream: Endpoint,
    pub io_running: bool,
    pub sql_running: bool,
    pub seconds_behind: Option<u64>,
}

/// The published shape of one Node (§6.4).
#[derive(Debug, Clone, serde::Serialize)]
pub struct NodeView {
    pub name: String,
    pub endpoint: Endpoint,
    pub server_id: Option<u32>,
    pub read_only: bool,
    pub gtid_current_pos: String,
    pub gtid_binlog_pos: String,
    pub cycle_id: Option<u32>,
    pub lock_held: Option<&'static str>,
    pub slave_connections: Vec<SlaveConnectionView>,
    pub running: bool,
    pub master: bool,
    pub slave: bool,
    pub relay: bool,
    pub binlog_relay: bool,
    pub maintenance: bool,
    pub draining: bool,
    pub auth_error: bool,
    pub disk_space_exhausted: bool,
    pub replication_lag: Option<u64>,
}

impl NodeView {
    fn from_node(node: &Node) -> Self {
        let lock_held = match (node.lock_master.clone(), node.lock_server.clone()) {
            (LockStatus::OwnedSelf, _) => Some("master"),
            (_, LockStatus::OwnedSelf) => Some("server"),
            _ => None,
        };
        Self {
            name: node.name.clone(),
            endpoint: node.endpoint.clone(),
            server_id: node.server_id,
            read_only: node.read_only,
            gtid_current_pos: node.gtid_current_pos.to_string_sorted(),
            gtid_binlog_pos: node.gtid_binlog_pos.to_string_sorted(),
            cycle_id: node.cycle_id,
            lock_held,
            slave_connections: node
                .replicas
                .iter()
                .map(|c| SlaveConnectionView {
                    name: c.name.clone(),
                    upstream: c.upstream_endpoint.clone(),
                    io_running: c.io_state == crate::node::IoState::Yes,
                    sql_running: c.sql_state == crate::node::SqlState::Yes,
                    seconds_behind: c.seconds_behind,
                })
                .collect(),
            running: node.flags.contains(NodeFlags::RUNNING),
            master: node.flags.contains(NodeFlags::MASTER),
            slave: node.flags.contains(NodeFlags::SLAVE),
            relay: node.flags.contains(NodeFlags::RELAY),
            binlog_relay: node.flags.contains(NodeFlags::BINLOG_RELAY),
            maintenance: node.flags.contains(NodeFlags::MAINTENANCE),
            draining: node.flags.contains(NodeFlags::DRAINING),
            auth_error: node.flags.contains(NodeFlags::AUTH_ERROR),
            disk_space_exhausted: node.flags.contains(NodeFlags::DISK_SPACE_EXHAUSTED),
            replication_lag: node.replication_lag,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, Default)]
pub struct MonitorView {
    pub nodes: Vec<NodeView>,
    pub primary: Option<String>,
    pub have_lock_majority: bool,
    pub tick_sequence: u64,
}

/// Shared handle readers clone out of. Publication is a single write lock
/// acquisition per tick (§5: "published under a short lock; readers copy
/// out fields they need").
#[derive(Clone, Default)]
pub struct SharedView(Arc<RwLock<MonitorView>>);

impl SharedView {
    pub fn new() -> Self {
        Self(Arc::new(RwLock::new(MonitorView::default())))
    }

    pub fn read(&self) -> MonitorView {
        self.0.read().clone()
    }

    pub fn publish(
        &self,
        nodes: &[Node],
        primary_idx: Option<usize>,
        lock_state: &LockCoordinatorState,
        tick_sequence: u64,
    ) {
        let view = MonitorView {
            nodes: nodes.iter().map(NodeView::from_node).collect(),
            primary: primary_idx.map(|idx| nodes[idx].name.clone()),
            have_lock_majority: lock_state.have_lock_majority,
            tick_sequence,
        };
        *self.0.write() = view;
    }
}

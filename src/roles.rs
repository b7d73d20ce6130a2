// src/roles.rs

//! C4 RoleAssigner: applies master/slave/relay/binlog-relay flags given the
//! graph, cycles, the selected primary, and the configured conditions
//! (§4.4).

use crate::node::{IoState, Node, NodeFlags};
use bitflags::bitflags;
use std::collections::{BinaryHeap, HashSet};

bitflags! {
    /// Conditions a candidate master must meet before `Master` is set
    /// (§6.2 `master_conditions`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MasterConditions: u32 {
        const CONNECTING_SLAVE   = 1 << 0;
        const CONNECTED_SLAVE    = 1 << 1;
        const RUNNING_SLAVE      = 1 << 2;
        const COOPERATIVE_MASTER = 1 << 3;
        const DISK_SPACE_OK      = 1 << 4;
    }
}

bitflags! {
    /// Conditions a replica must meet before `Slave` is set
    /// (§6.2 `slave_conditions`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SlaveConditions: u32 {
        const LINKED_MASTER      = 1 << 0;
        const RUNNING_MASTER     = 1 << 1;
        const WRITABLE_MASTER    = 1 << 2;
        const COOPERATIVE_MASTER = 1 << 3;
        const DISK_SPACE_OK      = 1 << 4;
    }
}

/// §6.2 `cooperative_monitoring_locks`: whether/how this monitor requires
/// a majority of advisory server locks before performing cluster
/// operations. Shared with the lock coordinator (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CooperativeLockMode {
    None,
    MajorityOfRunning,
    MajorityOfAll,
}

/// Inputs to a single `RoleAssigner` pass (§4.4). Everything here is
/// required to make the pass a pure function of its inputs (§8).
pub struct RoleAssignerInputs {
    pub selected_primary: Option<usize>,
    pub master_conditions: MasterConditions,
    pub slave_conditions: SlaveConditions,
    pub cooperative: bool,
    /// Whether the peer monitor that owns the cluster concurs this node is
    /// primary; irrelevant unless `cooperative` is set.
    pub primary_monitor_concurs: bool,
    pub enforce_writable_master: bool,
    /// Whether stale (non-live) links still promote a replica to `Slave`.
    pub allow_stale_replicas: bool,
}

/// Clears and recomputes role flags and replication lag on every node
/// (§4.4). Pure given `nodes`' graph/GTID fields and `inputs`.
pub fn assign(nodes: &mut [Node], inputs: &RoleAssignerInputs) {
    for node in nodes.iter_mut() {
        node.reset_role_flags();
    }

    let Some(primary_idx) = inputs.selected_primary else {
        return;
    };
    if primary_idx >= nodes.len() {
        return;
    }

    if !master_conditions_met(nodes, primary_idx, inputs) {
        return;
    }
    nodes[primary_idx].flags.insert(NodeFlags::MASTER);

    if !slave_conditions_allow_any(nodes, primary_idx, inputs) {
        return;
    }

    breadth_first_assign(nodes, primary_idx, inputs);
}

/// §4.4 step 2: whether the primary itself qualifies for `Master`.
fn master_conditions_met(nodes: &[Node], primary_idx: usize, inputs: &RoleAssignerInputs) -> bool {
    let primary = &nodes[primary_idx];
    if !primary.is_running() || primary.is_maintenance() {
        return false;
    }
    if primary.read_only && !inputs.enforce_writable_master {
        return false;
    }

    let mc = inputs.master_conditions;
    if mc.contains(MasterConditions::DISK_SPACE_OK)
        && primary.flags.contains(NodeFlags::DISK_SPACE_EXHAUSTED)
    {
        return false;
    }
    if mc.contains(MasterConditions::COOPERATIVE_MASTER)
        && inputs.cooperative
        && !inputs.primary_monitor_concurs
    {
        return false;
    }
    if mc.intersects(
        MasterConditions::CONNECTING_SLAVE
            | MasterConditions::CONNECTED_SLAVE
            | MasterConditions::RUNNING_SLAVE,
    ) {
        let has_matching_replica = primary.children.iter().any(|&child_idx| {
            let child = &nodes[child_idx];
            let conn = child
                .replicas
                .iter()
                .find(|c| c.master_server == Some(primary_idx));
            match conn {
                None => false,
                Some(conn) => {
                    (mc.contains(MasterConditions::CONNECTING_SLAVE)
                        && conn.io_state != IoState::No)
                        || (mc.contains(MasterConditions::CONNECTED_SLAVE)
                            && conn.io_state == IoState::Yes)
                        || (mc.contains(MasterConditions::RUNNING_SLAVE) && child.is_running())
                }
            }
        });
        if !has_matching_replica {
            return false;
        }
    }
    true
}

/// §4.4 step 4: the short-circuit that blanks out all `Slave` flags.
fn slave_conditions_allow_any(nodes: &[Node], primary_idx: usize, inputs: &RoleAssignerInputs) -> bool {
    let sc = inputs.slave_conditions;
    let primary = &nodes[primary_idx];
    if sc.contains(SlaveConditions::WRITABLE_MASTER) && !primary.is_master() {
        return false;
    }
    if sc.contains(SlaveConditions::RUNNING_MASTER) && !primary.is_running() {
        return false;
    }
    if sc.contains(SlaveConditions::COOPERATIVE_MASTER)
        && inputs.cooperative
        && !inputs.primary_monitor_concurs
    {
        return false;
    }
    true
}

/// A queue entry ordered so nodes with a currently-live link to the
/// primary are visited before ones without (§4.4 step 3 "priority queue
/// keyed by active link to primary").
#[derive(Eq, PartialEq)]
struct VisitEntry {
    live_link: bool,
    node_idx: usize,
}

impl Ord for VisitEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.live_link
            .cmp(&other.live_link)
            .then_with(|| other.node_idx.cmp(&self.node_idx))
    }
}
impl PartialOrd for VisitEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// §4.4 step 3: breadth-first traversal from the primary, assigning
/// Slave/Relay/BinlogRelay.
fn breadth_first_assign(nodes: &mut [Node], primary_idx: usize, inputs: &RoleAssignerInputs) {
    let mut live_link: Vec<bool> = vec![false; nodes.len()];
    live_link[primary_idx] = true;
    let mut visited: HashSet<usize> = HashSet::new();
    visited.insert(primary_idx);

    let mut queue: BinaryHeap<VisitEntry> = BinaryHeap::new();
    for &child_idx in &nodes[primary_idx].children.clone() {
        queue.push(VisitEntry {
            live_link: false,
            node_idx: child_idx,
        });
    }

    while let Some(entry) = queue.pop() {
        let v = entry.node_idx;
        if visited.contains(&v) {
            continue;
        }
        visited.insert(v);

        let parent_idx = nodes[v]
            .replicas
            .iter()
            .find_map(|c| c.master_server)
            .filter(|&p| nodes[v].parents.contains(&p));
        let Some(parent_idx) = parent_idx else {
            continue;
        };

        let conn = nodes[v]
            .replicas
            .iter()
            .find(|c| c.master_server == Some(parent_idx))
            .cloned();
        let Some(conn) = conn else { continue };

        let parent_live = live_link[parent_idx];
        let is_live = conn.io_state == IoState::Yes && parent_live && nodes[v].is_running();
        live_link[v] = is_live;

        let promote = is_live
            || (conn.io_state == IoState::Connecting)
            || (inputs.allow_stale_replicas && nodes[v].is_running());

        if promote && !nodes[v].is_maintenance() {
            nodes[v].flags.insert(NodeFlags::SLAVE);

            let has_running_child = nodes[v]
                .children
                .iter()
                .any(|&c| nodes[c].is_running());
            if nodes[v].is_running() && has_running_child && v != primary_idx {
                nodes[v].flags.insert(NodeFlags::RELAY);
            }

            if nodes[v].is_binlog_relay_server {
                nodes[v]
                    .flags
                    .remove(NodeFlags::SLAVE | NodeFlags::RELAY);
                nodes[v].flags.insert(NodeFlags::BINLOG_RELAY);
            }

            nodes[v].replication_lag = min_lag_over_accepted_edges(nodes, v);
        }

        for &child_idx in &nodes[v].children.clone() {
            queue.push(VisitEntry {
                live_link: live_link[v],
                node_idx: child_idx,
            });
        }
    }
}

/// §4.4 step 5: replication lag is the minimum `seconds_behind` across a
/// node's accepted upstream edges.
fn min_lag_over_accepted_edges(nodes: &[Node], idx: usize) -> Option<u64> {
    nodes[idx]
        .replicas
        .iter()
        .filter(|c| c.master_server.is_some())
        .filter_map(|c| c.seconds_behind)
        .min()
}

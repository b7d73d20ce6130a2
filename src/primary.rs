// src/primary.rs

//! C5 PrimarySelector: picks the server that should hold the `Master` role,
//! preferring the current primary when it is still valid and otherwise
//! searching for the node with the best "reach" — the number of running
//! nodes downstream of it (§4.5).

use crate::node::Node;
use std::collections::HashSet;

/// Whether a down candidate is acceptable. Normal reselection rejects down
/// servers; a monitor that has never had a primary (e.g. on startup) settles
/// for one, since failover may later resurrect the cluster (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequireRunning {
    Required,
    Optional,
}

/// Why a candidate was rejected, kept for operator-facing diagnostics.
#[derive(Debug, Clone)]
pub struct RejectionReason {
    pub node_idx: usize,
    pub reason: String,
}

pub struct SelectionResult {
    pub selected: Option<usize>,
    pub rejections: Vec<RejectionReason>,
}

/// Re-runs primary selection from scratch. Does not consider which node was
/// previously primary; callers that want "stick with the incumbent unless
/// it's disqualified" call [`is_still_valid`] first (§4.5 step 1).
pub fn select(nodes: &[Node], require_running: RequireRunning) -> SelectionResult {
    let mut candidates: Vec<usize> = Vec::new();
    let mut rejections = Vec::new();

    // Candidate set 1: nodes with no parents (outside any cycle).
    for (idx, node) in nodes.iter().enumerate() {
        if node.parents.is_empty() {
            match validity_reason(node, require_running) {
                None => candidates.push(idx),
                Some(reason) => rejections.push(RejectionReason { node_idx: idx, reason }),
            }
        }
    }

    // Candidate set 2: one representative per cycle, provided no member of
    // the cycle replicates from outside it.
    let mut seen_cycles: HashSet<u32> = HashSet::new();
    for (idx, node) in nodes.iter().enumerate() {
        let Some(cycle_id) = node.cycle_id else { continue };
        if !seen_cycles.insert(cycle_id) {
            continue;
        }
        let members: Vec<usize> = nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.cycle_id == Some(cycle_id))
            .map(|(i, _)| i)
            .collect();
        if cycle_has_external_master(nodes, &members) {
            continue;
        }
        let mut picked = None;
        for &member_idx in &members {
            if validity_reason(&nodes[member_idx], require_running).is_none() {
                picked = Some(member_idx);
                break;
            }
        }
        match picked {
            Some(member_idx) => candidates.push(member_idx),
            None => {
                for &member_idx in &members {
                    if let Some(reason) = validity_reason(&nodes[member_idx], require_running) {
                        rejections.push(RejectionReason { node_idx: member_idx, reason });
                    }
                }
            }
        }
    }

    if candidates.is_empty() {
        return SelectionResult { selected: None, rejections };
    }

    let selected = best_reach(nodes, &candidates);
    SelectionResult { selected: Some(selected), rejections }
}

/// Whether a cycle has any member replicating from a node outside the
/// cycle — such a cycle cannot be the top of the topology.
fn cycle_has_external_master(nodes: &[Node], members: &[usize]) -> bool {
    members.iter().any(|&idx| {
        nodes[idx]
            .parents
            .iter()
            .any(|&parent| nodes[parent].cycle_id != nodes[idx].cycle_id)
    })
}

/// §4.5: a candidate must be running (unless optional), writable-capable
/// (not excluded from promotion), and not in maintenance.
fn validity_reason(node: &Node, require_running: RequireRunning) -> Option<String> {
    if node.excluded_from_promotion {
        return Some(format!("{} is excluded from promotion", node.name));
    }
    if node.is_maintenance() {
        return Some(format!("{} is in maintenance", node.name));
    }
    if require_running == RequireRunning::Required && !node.is_running() {
        return Some(format!("{} is not running", node.name));
    }
    None
}

/// Picks the candidate with the largest reach, config_index as tie-break
/// for determinism (§4.5, §8 determinism law).
fn best_reach(nodes: &[Node], candidates: &[usize]) -> usize {
    candidates
        .iter()
        .copied()
        .max_by_key(|&idx| (reach(nodes, idx), std::cmp::Reverse(nodes[idx].config_index)))
        .expect("candidates non-empty")
}

/// Counts nodes reachable from `root` by following `children` edges,
/// expanding through a child only if that child is running. `root` itself
/// counts if running (§4.5 "Calculating reach").
pub fn reach(nodes: &[Node], root: usize) -> usize {
    let mut visited: HashSet<usize> = HashSet::new();
    let mut stack = vec![root];
    let mut count = 0;
    while let Some(idx) = stack.pop() {
        if !visited.insert(idx) {
            continue;
        }
        if !nodes[idx].is_running() {
            continue;
        }
        count += 1;
        for &child in &nodes[idx].children {
            if !visited.contains(&child) {
                stack.push(child);
            }
        }
    }
    count
}

/// Inputs to [`is_still_valid`] that aren't derivable from the `Node` slice
/// alone: monitor-level counters and configuration (§4.5 validity test).
pub struct PrimaryValidityInputs {
    pub down_ticks: u32,
    pub failcount: u32,
    pub enforce_writable_master: bool,
    pub cooperative: bool,
    pub primary_monitor_concurs: bool,
}

/// Whether the current primary is still fit to keep the role. Checks, in
/// the order of §4.5's validity test: not excluded/in maintenance; not
/// read-only unless `enforce_writable_master`; cooperative peer concurrence;
/// not down past `failcount` ticks with zero reachable running descendants;
/// still a topology root (no parents, or heads a cycle with no external
/// master).
pub fn is_still_valid(nodes: &[Node], current: usize, inputs: &PrimaryValidityInputs) -> bool {
    if current >= nodes.len() {
        return false;
    }
    let node = &nodes[current];
    // Excluded/maintenance disqualify regardless of running state; whether
    // being down itself disqualifies is handled below via failcount+reach,
    // so running is intentionally not required here.
    if validity_reason(node, RequireRunning::Optional).is_some() {
        return false;
    }
    if node.is_running() && node.read_only && !inputs.enforce_writable_master {
        return false;
    }
    if inputs.cooperative && !inputs.primary_monitor_concurs {
        return false;
    }
    if !node.is_running() && inputs.down_ticks > inputs.failcount && reach(nodes, current) == 0 {
        return false;
    }
    match node.cycle_id {
        None => node.parents.is_empty(),
        Some(cycle_id) => {
            let members: Vec<usize> = nodes
                .iter()
                .enumerate()
                .filter(|(_, n)| n.cycle_id == Some(cycle_id))
                .map(|(i, _)| i)
                .collect();
            !cycle_has_external_master(nodes, &members)
        }
    }
}

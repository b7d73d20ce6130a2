// src/operations/failover.rs

//! §4.7.1 Failover: promotes a replica when the primary is down.
//! Grounded on the C++ original's `failover_perform` (cluster_manipulation.cc):
//! promote, then redirect, then wait for stabilization — no undo, since
//! promotion is the point of no return.

use super::{query_node, Operation, OperationOutcome, StepResult};
use crate::client::ConnectionProvider;
use crate::error::OperationError;
use crate::gtid::MissingDomainMode;
use crate::node::{IoState, Node, ReplicaConnection, SqlState};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Prepare,
    Demote,
    Promote,
    Redirect,
    Stabilize,
}

/// §4.7.1 candidate selection: highest GTID IO position in the primary's
/// domain, tied by processed sequence, then `log_slave_updates`, then disk
/// space, then config order.
pub fn select_promotion_target(nodes: &[Node], demotion_target: usize) -> Option<usize> {
    let domain = nodes[demotion_target].gtid_domain?;
    nodes[demotion_target]
        .children
        .iter()
        .copied()
        .filter(|&idx| !nodes[idx].excluded_from_promotion && !nodes[idx].is_maintenance())
        .max_by_key(|&idx| {
            let n = &nodes[idx];
            let io_seq = n
                .replicas
                .iter()
                .find(|c| c.master_server == Some(demotion_target))
                .and_then(|c| c.gtid_io_pos.get(domain))
                .map(|t| t.sequence)
                .unwrap_or(0);
            let processed_seq = n.gtid_current_pos.get(domain).map(|t| t.sequence).unwrap_or(0);
            let disk_ok = !n
                .flags
                .contains(crate::node::NodeFlags::DISK_SPACE_EXHAUSTED);
            (
                io_seq,
                processed_seq,
                n.log_slave_updates,
                disk_ok,
                std::cmp::Reverse(n.config_index),
            )
        })
}

pub async fn advance(
    op: &mut Operation,
    nodes: &mut [Node],
    provider: &dyn ConnectionProvider,
    timeout: Duration,
) -> StepResult {
    let Phase::Failover(phase) = op.phase else {
        unreachable!("wrong phase type routed to failover::advance")
    };

    match phase {
        Phase::Prepare => prepare(op, nodes),
        Phase::Demote => {
            op.phase = super::Phase::Failover(Phase::Promote);
            StepResult::Continue
        }
        Phase::Promote => promote(op, nodes, provider, timeout).await,
        Phase::Redirect => redirect(op, nodes, provider, timeout).await,
        Phase::Stabilize => stabilize(op, nodes, provider, timeout).await,
    }
}

fn fail(errors: &mut OperationError, msg: impl Into<String>) -> StepResult {
    errors.push_msg(msg);
    StepResult::Done(OperationOutcome {
        success: false,
        errors: errors.clone(),
    })
}

fn prepare(op: &mut Operation, nodes: &[Node]) -> StepResult {
    let mut errors = OperationError::default();
    let Some(demotion_target) = op.demotion_target else {
        return fail(&mut errors, "failover: no down primary identified");
    };
    if nodes[demotion_target].is_running() {
        return fail(&mut errors, "failover: demotion target is still running");
    }

    let promotion_target = match op.promotion_target {
        Some(idx) => idx,
        None => match select_promotion_target(nodes, demotion_target) {
            Some(idx) => idx,
            None => return fail(&mut errors, "failover: no eligible promotion candidate"),
        },
    };
    op.promotion_target = Some(promotion_target);

    // Step 1: verify the candidate's relay log is clear of unprocessed
    // events relative to the demotion target's binlog position.
    let demotion_binlog = nodes[demotion_target].gtid_binlog_pos.clone();
    let candidate_io = nodes[promotion_target]
        .replicas
        .iter()
        .find(|c| c.master_server == Some(demotion_target))
        .map(|c| c.gtid_io_pos.clone())
        .unwrap_or_default();
    let ahead = crate::gtid::GtidList::events_ahead(&demotion_binlog, &candidate_io, MissingDomainMode::Ignore);
    if ahead != 0 {
        errors.push_msg(format!(
            "failover: candidate {} relay log is not fully caught up ({} events behind)",
            nodes[promotion_target].name, ahead
        ));
    }

    op.captured_replicas = nodes[demotion_target]
        .children
        .iter()
        .filter(|&&idx| idx != promotion_target)
        .filter_map(|&idx| {
            nodes[idx]
                .replicas
                .iter()
                .find(|c| c.master_server == Some(demotion_target))
                .cloned()
                .map(|mut c| {
                    c.non_gtid_warned = false;
                    c
                })
        })
        .collect();

    op.phase = super::Phase::Failover(Phase::Promote);
    StepResult::Continue
}

/// §4.7.1 steps 2-3: stop/reset the connection to the demotion target, set
/// read_only off, enable events.
async fn promote(
    op: &mut Operation,
    nodes: &mut [Node],
    provider: &dyn ConnectionProvider,
    timeout: Duration,
) -> StepResult {
    let mut errors = OperationError::default();
    let Some(promotion_target) = op.promotion_target else {
        return fail(&mut errors, "failover: promote called without a target");
    };

    let steps = [
        "STOP SLAVE",
        "RESET SLAVE ALL",
        "SET GLOBAL read_only=0",
    ];
    for sql in steps {
        if let Err(e) = query_node(&nodes[promotion_target], provider, timeout, sql).await {
            return fail(&mut errors, format!("failover: promotion step '{sql}' failed: {e}"));
        }
    }
    for event in &nodes[promotion_target].enabled_events.clone() {
        let sql = format!("ALTER EVENT {event} ENABLE");
        let _ = query_node(&nodes[promotion_target], provider, timeout, &sql).await;
    }

    nodes[promotion_target].read_only = false;
    op.phase = super::Phase::Failover(Phase::Redirect);
    StepResult::Continue
}

/// §4.7.1 step 4: point every other replica of the demotion target at the
/// new primary, reusing connection names (renaming on collision).
async fn redirect(
    op: &mut Operation,
    nodes: &mut [Node],
    provider: &dyn ConnectionProvider,
    timeout: Duration,
) -> StepResult {
    let mut errors = OperationError::default();
    let Some(promotion_target) = op.promotion_target else {
        return fail(&mut errors, "failover: redirect called without a target");
    };
    let new_primary_endpoint = nodes[promotion_target].endpoint.clone();
    let mut redirected = 0usize;

    for conn in op.captured_replicas.clone() {
        let Some(replica_idx) = nodes
            .iter()
            .position(|n| n.replicas.iter().any(|c| c.name == conn.name && c.master_server == conn.master_server))
        else {
            continue;
        };
        if replica_idx == promotion_target {
            continue;
        }
        let name = used_name(&op.captured_replicas, &conn.name);
        let sql = format!(
            "CHANGE MASTER '{name}' TO MASTER_HOST='{}', MASTER_PORT={}, MASTER_USE_GTID=slave_pos{}; START SLAVE '{name}'",
            new_primary_endpoint.host, new_primary_endpoint.port, op.replication_options.change_master_clause()
        );
        match query_node(&nodes[replica_idx], provider, timeout, &sql).await {
            Ok(_) => redirected += 1,
            Err(e) => errors.push_msg(format!("failover: redirect {} failed: {e}", nodes[replica_idx].name)),
        }
    }

    if !op.captured_replicas.is_empty() && redirected == 0 {
        return fail(&mut errors, "failover: no replica could be redirected");
    }

    op.phase = super::Phase::Failover(Phase::Stabilize);
    StepResult::Continue
}

fn used_name(existing: &[ReplicaConnection], wanted: &str) -> String {
    if existing.iter().filter(|c| c.name == wanted).count() <= 1 {
        wanted.to_string()
    } else {
        format!("{wanted}_redirected")
    }
}

/// §4.7.1 step 5: a redirected replica is "stable" once its SQL thread
/// reports no error and it has fully caught up to the new primary.
async fn stabilize(
    op: &mut Operation,
    nodes: &mut [Node],
    _provider: &dyn ConnectionProvider,
    _timeout: Duration,
) -> StepResult {
    let mut errors = OperationError::default();
    let Some(promotion_target) = op.promotion_target else {
        return fail(&mut errors, "failover: stabilize called without a target");
    };
    let primary_gtid = nodes[promotion_target].gtid_current_pos.clone();

    let mut stable = 0usize;
    let mut lagging = Vec::new();
    for &child_idx in &nodes[promotion_target].children.clone() {
        let node = &nodes[child_idx];
        let sql_ok = node
            .replicas
            .iter()
            .find(|c| c.master_server == Some(promotion_target))
            .map(|c| c.sql_state == SqlState::Yes && c.io_state != IoState::No)
            .unwrap_or(false);
        let caught_up = crate::gtid::GtidList::events_ahead(
            &node.gtid_current_pos,
            &primary_gtid,
            MissingDomainMode::Ignore,
        ) == 0;
        if sql_ok && caught_up {
            stable += 1;
        } else {
            lagging.push(node.name.clone());
        }
    }

    if nodes[promotion_target].children.is_empty() || stable > 0 {
        if !lagging.is_empty() {
            errors.push_msg(format!("failover: replicas lagging after promotion: {}", lagging.join(", ")));
        }
        return StepResult::Done(OperationOutcome { success: true, errors });
    }

    if op.time_remaining.is_zero() {
        errors.push_msg("failover: stabilization timed out, no replica caught up");
        return StepResult::Done(OperationOutcome { success: true, errors });
    }

    StepResult::Continue
}

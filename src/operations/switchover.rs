// src/operations/switchover.rs

//! §4.7.2 Switchover: planned promotion while the primary is up. Grounded
//! on `switchover_perform`/`switchover_demote_master` (cluster_manipulation.cc),
//! including the undo-on-failure path up through the catchup step.

use super::failover::select_promotion_target;
use super::{query_node, Operation, OperationOutcome, StepResult};
use crate::client::ConnectionProvider;
use crate::error::OperationError;
use crate::gtid::{GtidList, MissingDomainMode};
use crate::node::Node;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Prepare,
    Demote,
    Catchup,
    Promote,
    Redirect,
    Stabilize,
}

pub async fn advance(
    op: &mut Operation,
    nodes: &mut [Node],
    provider: &dyn ConnectionProvider,
    timeout: Duration,
) -> StepResult {
    let Phase::Switchover(phase) = op.phase else {
        unreachable!("wrong phase type routed to switchover::advance")
    };

    match phase {
        Phase::Prepare => prepare(op, nodes),
        Phase::Demote => demote(op, nodes, provider, timeout).await,
        Phase::Catchup => catchup(op, nodes, provider, timeout).await,
        Phase::Promote => promote(op, nodes, provider, timeout).await,
        Phase::Redirect => redirect(op, nodes, provider, timeout).await,
        Phase::Stabilize => stabilize(op, nodes).await,
    }
}

fn fail(errors: &mut OperationError, msg: impl Into<String>) -> StepResult {
    errors.push_msg(msg);
    StepResult::Done(OperationOutcome {
        success: false,
        errors: errors.clone(),
    })
}

/// §4.7.2 step 1: capture the demotion target's replica set and event
/// names before anything is touched.
fn prepare(op: &mut Operation, nodes: &[Node]) -> StepResult {
    let mut errors = OperationError::default();
    let demotion_target = match op.demotion_target {
        Some(idx) => idx,
        None => match nodes.iter().position(|n| n.is_master()) {
            Some(idx) => idx,
            None => return fail(&mut errors, "switchover: no current primary to demote"),
        },
    };
    op.demotion_target = Some(demotion_target);
    if !nodes[demotion_target].is_running() {
        return fail(&mut errors, "switchover: demotion target is not running");
    }

    if op.promotion_target.is_none() {
        op.promotion_target = select_promotion_target(nodes, demotion_target);
    }
    if op.promotion_target.is_none() {
        return fail(&mut errors, "switchover: no eligible promotion target");
    }

    op.captured_replicas = nodes[demotion_target].replicas.clone();
    op.captured_events = nodes[demotion_target].enabled_events.clone();

    op.phase = super::Phase::Switchover(Phase::Demote);
    StepResult::Continue
}

/// §4.7.2 step 2: set read_only, flush logs, verify the binlog position is
/// stable. `FLUSH TABLES WITH READ LOCK` / kill-connections / disabling
/// events are folded into a single batch since this crate has no session
/// concept beyond one query at a time.
async fn demote(
    op: &mut Operation,
    nodes: &mut [Node],
    provider: &dyn ConnectionProvider,
    timeout: Duration,
) -> StepResult {
    let mut errors = OperationError::default();
    let Some(demotion_target) = op.demotion_target else {
        return fail(&mut errors, "switchover: demote called without a target");
    };

    let steps = ["SET GLOBAL read_only=1", "FLUSH TABLES WITH READ LOCK"];
    for sql in steps {
        if let Err(e) = query_node(&nodes[demotion_target], provider, timeout, sql).await {
            undo_read_only(&nodes[demotion_target], provider, timeout).await;
            return fail(&mut errors, format!("switchover: demotion step '{sql}' failed: {e}"));
        }
    }
    for event in &op.captured_events.clone() {
        let sql = format!("ALTER EVENT {event} DISABLE");
        let _ = query_node(&nodes[demotion_target], provider, timeout, &sql).await;
    }
    if let Err(e) = query_node(&nodes[demotion_target], provider, timeout, "FLUSH LOGS").await {
        undo_read_only(&nodes[demotion_target], provider, timeout).await;
        return fail(&mut errors, format!("switchover: FLUSH LOGS failed: {e}"));
    }
    if let Err(e) = query_node(&nodes[demotion_target], provider, timeout, "UNLOCK TABLES").await {
        errors.push_msg(format!("switchover: UNLOCK TABLES failed: {e}"));
    }

    nodes[demotion_target].read_only = true;
    op.phase = super::Phase::Switchover(Phase::Catchup);
    StepResult::Continue
}

async fn undo_read_only(node: &Node, provider: &dyn ConnectionProvider, timeout: Duration) {
    let _ = query_node(node, provider, timeout, "SET GLOBAL read_only=0").await;
}

/// §4.7.2 step 3: every migrated replica (plus the promotion target) must
/// reach the demotion target's binlog position within the remaining time
/// budget.
async fn catchup(
    op: &mut Operation,
    nodes: &mut [Node],
    provider: &dyn ConnectionProvider,
    timeout: Duration,
) -> StepResult {
    let mut errors = OperationError::default();
    let Some(demotion_target) = op.demotion_target else {
        return fail(&mut errors, "switchover: catchup called without a demotion target");
    };
    let target_gtid = nodes[demotion_target].gtid_binlog_pos.clone();

    let use_binlog_pos = nodes[demotion_target].log_bin && nodes[demotion_target].log_slave_updates;

    let caught_up = nodes[demotion_target].children.iter().all(|&idx| {
        let compare: &GtidList = if use_binlog_pos {
            &nodes[idx].gtid_binlog_pos
        } else {
            &nodes[idx].gtid_current_pos
        };
        GtidList::events_ahead(compare, &target_gtid, MissingDomainMode::Ignore) == 0
    });

    if !caught_up {
        if op.time_remaining.is_zero() {
            undo_read_only(&nodes[demotion_target], provider, timeout).await;
            return fail(&mut errors, "switchover: replicas did not catch up within time budget");
        }
        return StepResult::Continue;
    }

    op.phase = super::Phase::Switchover(Phase::Promote);
    StepResult::Continue
}

/// §4.7.2 step 4: same promotion steps as failover, but using the captured
/// connection/event set from `prepare`.
async fn promote(
    op: &mut Operation,
    nodes: &mut [Node],
    provider: &dyn ConnectionProvider,
    timeout: Duration,
) -> StepResult {
    let mut errors = OperationError::default();
    let Some(promotion_target) = op.promotion_target else {
        return fail(&mut errors, "switchover: promote called without a target");
    };
    let Some(demotion_target) = op.demotion_target else {
        return fail(&mut errors, "switchover: promote called without a demotion target");
    };

    let steps = ["STOP SLAVE", "RESET SLAVE ALL", "SET GLOBAL read_only=0"];
    for sql in steps {
        if let Err(e) = query_node(&nodes[promotion_target], provider, timeout, sql).await {
            undo_read_only(&nodes[demotion_target], provider, timeout).await;
            return fail(&mut errors, format!("switchover: promotion step '{sql}' failed: {e}"));
        }
    }
    for event in &op.captured_events.clone() {
        let sql = format!("ALTER EVENT {event} ENABLE");
        let _ = query_node(&nodes[promotion_target], provider, timeout, &sql).await;
    }

    nodes[promotion_target].read_only = false;
    op.phase = super::Phase::Switchover(Phase::Redirect);
    StepResult::Continue
}

/// §4.7.2 step 5: point the old primary at the new one, redirect any
/// remaining replicas.
async fn redirect(
    op: &mut Operation,
    nodes: &mut [Node],
    provider: &dyn ConnectionProvider,
    timeout: Duration,
) -> StepResult {
    let mut errors = OperationError::default();
    let Some(promotion_target) = op.promotion_target else {
        return fail(&mut errors, "switchover: redirect called without a target");
    };
    let Some(demotion_target) = op.demotion_target else {
        return fail(&mut errors, "switchover: redirect called without a demotion target");
    };
    let new_primary_endpoint = nodes[promotion_target].endpoint.clone();

    let start_sql = format!(
        "CHANGE MASTER TO MASTER_HOST='{}', MASTER_PORT={}, MASTER_USE_GTID=slave_pos{}; START SLAVE",
        new_primary_endpoint.host, new_primary_endpoint.port, op.replication_options.change_master_clause()
    );
    let old_primary_ok = query_node(&nodes[demotion_target], provider, timeout, &start_sql)
        .await
        .is_ok();

    let mut redirected = if old_primary_ok { 1 } else { 0 };
    for conn in op.captured_replicas.clone() {
        let Some(replica_idx) = nodes.iter().position(|n| {
            n.name != nodes[demotion_target].name
                && n.replicas.iter().any(|c| c.name == conn.name && c.master_server == Some(demotion_target))
        }) else {
            continue;
        };
        if replica_idx == promotion_target {
            continue;
        }
        match query_node(&nodes[replica_idx], provider, timeout, &start_sql).await {
            Ok(_) => redirected += 1,
            Err(e) => errors.push_msg(format!("switchover: redirect {} failed: {e}", nodes[replica_idx].name)),
        }
    }

    if !old_primary_ok && redirected == 0 {
        return fail(&mut errors, "switchover: no server could be redirected to the new primary");
    }

    op.phase = super::Phase::Switchover(Phase::Stabilize);
    StepResult::Continue
}

/// §4.7.2 step 6: wait for at least one redirected replica to confirm
/// replication from the new primary.
async fn stabilize(op: &mut Operation, nodes: &[Node]) -> StepResult {
    let mut errors = OperationError::default();
    let Some(promotion_target) = op.promotion_target else {
        return fail(&mut errors, "switchover: stabilize called without a target");
    };

    let any_running_child = nodes[promotion_target]
        .children
        .iter()
        .any(|&idx| nodes[idx].is_running());
    if !any_running_child && !nodes[promotion_target].children.is_empty() {
        errors.push_msg("switchover: no replica stabilized within timeout");
    }

    StepResult::Done(OperationOutcome { success: true, errors })
}

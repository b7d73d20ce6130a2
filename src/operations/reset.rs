// src/operations/reset.rs

//! §4.7.4 Reset-Replication: tears down replication cluster-wide and
//! rebuilds it from a chosen new primary. Grounded on
//! `manual_reset_replication` (cluster_manipulation.cc).

use super::{query_node, Operation, OperationOutcome, StepResult};
use crate::client::ConnectionProvider;
use crate::error::OperationError;
use crate::node::Node;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Collect,
    StopAll,
    SetReadonly,
    ResetMaster,
    SetSlavePos,
    PromoteNew,
    RedirectOthers,
}

pub async fn advance(
    op: &mut Operation,
    nodes: &mut [Node],
    provider: &dyn ConnectionProvider,
    timeout: Duration,
) -> StepResult {
    let Phase::Reset(phase) = op.phase else {
        unreachable!("wrong phase type routed to reset::advance")
    };

    match phase {
        Phase::Collect => collect(op, nodes),
        Phase::StopAll => stop_all(op, nodes, provider, timeout).await,
        Phase::SetReadonly => set_readonly(op, nodes, provider, timeout).await,
        Phase::ResetMaster => reset_master(op, nodes, provider, timeout).await,
        Phase::SetSlavePos => set_slave_pos(op, nodes, provider, timeout).await,
        Phase::PromoteNew => promote_new(op, nodes, provider, timeout).await,
        Phase::RedirectOthers => redirect_others(op, nodes, provider, timeout).await,
    }
}

fn fail(errors: &mut OperationError, msg: impl Into<String>) -> StepResult {
    errors.push_msg(msg);
    StepResult::Done(OperationOutcome {
        success: false,
        errors: errors.clone(),
    })
}

fn collect(op: &mut Operation, nodes: &[Node]) -> StepResult {
    let mut errors = OperationError::default();
    let Some(new_primary) = op.promotion_target else {
        return fail(&mut errors, "reset-replication: no new primary specified");
    };
    if nodes[new_primary].is_maintenance() {
        return fail(&mut errors, "reset-replication: new primary is in maintenance");
    }
    op.phase = super::Phase::Reset(Phase::StopAll);
    StepResult::Continue
}

async fn for_each_usable_node(
    nodes: &[Node],
    provider: &dyn ConnectionProvider,
    timeout: Duration,
    sql: &str,
    errors: &mut OperationError,
) -> usize {
    let mut ok = 0usize;
    for node in nodes.iter().filter(|n| n.is_running()) {
        match query_node(node, provider, timeout, sql).await {
            Ok(_) => ok += 1,
            Err(e) => errors.push_msg(format!("reset-replication: {} '{sql}' failed: {e}", node.name)),
        }
    }
    ok
}

async fn stop_all(
    op: &mut Operation,
    nodes: &mut [Node],
    provider: &dyn ConnectionProvider,
    timeout: Duration,
) -> StepResult {
    let mut errors = OperationError::default();
    for_each_usable_node(nodes, provider, timeout, "STOP ALL SLAVES", &mut errors).await;
    for_each_usable_node(nodes, provider, timeout, "RESET SLAVE ALL", &mut errors).await;
    op.phase = super::Phase::Reset(Phase::SetReadonly);
    StepResult::Continue
}

async fn set_readonly(
    op: &mut Operation,
    nodes: &mut [Node],
    provider: &dyn ConnectionProvider,
    timeout: Duration,
) -> StepResult {
    let mut errors = OperationError::default();
    for_each_usable_node(nodes, provider, timeout, "SET GLOBAL read_only=1", &mut errors).await;
    for node in nodes.iter_mut().filter(|n| n.is_running()) {
        node.read_only = true;
        for event in node.enabled_events.clone() {
            let sql = format!("ALTER EVENT {event} DISABLE");
            let _ = query_node(node, provider, timeout, &sql).await;
        }
    }
    op.phase = super::Phase::Reset(Phase::ResetMaster);
    StepResult::Continue
}

async fn reset_master(
    op: &mut Operation,
    nodes: &mut [Node],
    provider: &dyn ConnectionProvider,
    timeout: Duration,
) -> StepResult {
    let mut errors = OperationError::default();
    for_each_usable_node(nodes, provider, timeout, "RESET MASTER", &mut errors).await;
    op.phase = super::Phase::Reset(Phase::SetSlavePos);
    StepResult::Continue
}

/// §4.7.4: `gtid_slave_pos = <domain>-<newPrimaryServerId>-0` on every
/// node except the new primary.
async fn set_slave_pos(
    op: &mut Operation,
    nodes: &mut [Node],
    provider: &dyn ConnectionProvider,
    timeout: Duration,
) -> StepResult {
    let mut errors = OperationError::default();
    let Some(new_primary) = op.promotion_target else {
        return fail(&mut errors, "reset-replication: set_slave_pos without a primary");
    };
    let Some(domain) = nodes[new_primary].gtid_domain else {
        return fail(&mut errors, "reset-replication: new primary has no gtid domain");
    };
    let Some(new_primary_server_id) = nodes[new_primary].server_id else {
        return fail(&mut errors, "reset-replication: new primary has no server id");
    };

    let sql = format!("SET GLOBAL gtid_slave_pos='{domain}-{new_primary_server_id}-0'");
    for idx in 0..nodes.len() {
        if idx == new_primary || !nodes[idx].is_running() {
            continue;
        }
        if let Err(e) = query_node(&nodes[idx], provider, timeout, &sql).await {
            errors.push_msg(format!("reset-replication: {} set_slave_pos failed: {e}", nodes[idx].name));
        }
    }

    op.phase = super::Phase::Reset(Phase::PromoteNew);
    StepResult::Continue
}

async fn promote_new(
    op: &mut Operation,
    nodes: &mut [Node],
    provider: &dyn ConnectionProvider,
    timeout: Duration,
) -> StepResult {
    let mut errors = OperationError::default();
    let Some(new_primary) = op.promotion_target else {
        return fail(&mut errors, "reset-replication: promote_new without a primary");
    };

    if let Err(e) = query_node(&nodes[new_primary], provider, timeout, "SET GLOBAL read_only=0").await {
        return fail(&mut errors, format!("reset-replication: promote new primary failed: {e}"));
    }
    nodes[new_primary].read_only = false;
    for event in nodes[new_primary].enabled_events.clone() {
        let sql = format!("ALTER EVENT {event} ENABLE");
        let _ = query_node(&nodes[new_primary], provider, timeout, &sql).await;
    }

    op.phase = super::Phase::Reset(Phase::RedirectOthers);
    StepResult::Continue
}

async fn redirect_others(
    op: &mut Operation,
    nodes: &mut [Node],
    provider: &dyn ConnectionProvider,
    timeout: Duration,
) -> StepResult {
    let mut errors = OperationError::default();
    let Some(new_primary) = op.promotion_target else {
        return fail(&mut errors, "reset-replication: redirect_others without a primary");
    };
    let endpoint = nodes[new_primary].endpoint.clone();
    let sql = format!(
        "CHANGE MASTER TO MASTER_HOST='{}', MASTER_PORT={}, MASTER_USE_GTID=slave_pos{}; START SLAVE",
        endpoint.host, endpoint.port, op.replication_options.change_master_clause()
    );

    let mut redirected = 0usize;
    for idx in 0..nodes.len() {
        if idx == new_primary || !nodes[idx].is_running() {
            continue;
        }
        match query_node(&nodes[idx], provider, timeout, &sql).await {
            Ok(_) => redirected += 1,
            Err(e) => errors.push_msg(format!("reset-replication: {} redirect failed: {e}", nodes[idx].name)),
        }
    }

    StepResult::Done(OperationOutcome {
        success: redirected > 0 || errors.is_empty(),
        errors,
    })
}

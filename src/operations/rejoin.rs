// src/operations/rejoin.rs

//! §4.7.3 Rejoin: directs a stray Node back to the current primary.
//! Grounded on `server_is_rejoin_suspect`/`get_joinable_servers`
//! (cluster_manipulation.cc).

use super::{query_node, Operation, OperationOutcome, StepResult};
use crate::client::ConnectionProvider;
use crate::error::OperationError;
use crate::node::Node;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    CollectSuspects,
    VerifyPerNode,
    Redirect,
}

pub async fn advance(
    op: &mut Operation,
    nodes: &mut [Node],
    provider: &dyn ConnectionProvider,
    timeout: Duration,
) -> StepResult {
    let Phase::Rejoin(phase) = op.phase else {
        unreachable!("wrong phase type routed to rejoin::advance")
    };

    match phase {
        Phase::CollectSuspects => collect(op, nodes),
        Phase::VerifyPerNode => verify(op, nodes),
        Phase::Redirect => redirect(op, nodes, provider, timeout).await,
    }
}

fn fail(errors: &mut OperationError, msg: impl Into<String>) -> StepResult {
    errors.push_msg(msg);
    StepResult::Done(OperationOutcome {
        success: false,
        errors: errors.clone(),
    })
}

/// Is `idx` a rejoin suspect: no replica connections and not the primary,
/// or exactly one connection whose upstream is not the current primary.
fn is_suspect(nodes: &[Node], idx: usize, primary_idx: usize) -> bool {
    let node = &nodes[idx];
    if idx == primary_idx || node.is_maintenance() {
        return false;
    }
    match node.replicas.len() {
        0 => true,
        1 => node.replicas[0].master_server != Some(primary_idx),
        _ => false,
    }
}

fn collect(op: &mut Operation, nodes: &[Node]) -> StepResult {
    let mut errors = OperationError::default();
    let Some(primary_idx) = op.promotion_target.or_else(|| nodes.iter().position(|n| n.is_master())) else {
        return fail(&mut errors, "rejoin: no current primary");
    };
    op.promotion_target = Some(primary_idx);

    let suspects: Vec<usize> = (0..nodes.len())
        .filter(|&idx| is_suspect(nodes, idx, primary_idx))
        .collect();
    if suspects.is_empty() {
        return StepResult::Done(OperationOutcome { success: true, errors });
    }

    // Stash suspects as captured replica placeholders so later phases know
    // which indices to act on; the connection contents aren't used.
    op.captured_replicas = suspects
        .into_iter()
        .map(|idx| {
            crate::node::ReplicaConnection::new(
                format!("__rejoin_suspect_{idx}"),
                nodes[idx].endpoint.clone(),
            )
        })
        .collect();

    op.phase = super::Phase::Rejoin(Phase::VerifyPerNode);
    StepResult::Continue
}

fn verify(op: &mut Operation, nodes: &[Node]) -> StepResult {
    let mut errors = OperationError::default();
    let Some(primary_idx) = op.promotion_target else {
        return fail(&mut errors, "rejoin: verify called without a primary");
    };
    let primary_gtid = nodes[primary_idx].gtid_current_pos.clone();

    let suspect_indices: Vec<usize> = op
        .captured_replicas
        .iter()
        .filter_map(|c| c.name.strip_prefix("__rejoin_suspect_").and_then(|s| s.parse().ok()))
        .collect();

    let verified: Vec<usize> = suspect_indices
        .into_iter()
        .filter(|&idx| nodes[idx].gtid_current_pos.can_replicate_from(&primary_gtid))
        .collect();

    if verified.is_empty() {
        errors.push_msg("rejoin: no suspect could replicate from the current primary");
        return StepResult::Done(OperationOutcome { success: true, errors });
    }

    op.captured_replicas = verified
        .into_iter()
        .map(|idx| crate::node::ReplicaConnection::new(format!("__rejoin_verified_{idx}"), nodes[idx].endpoint.clone()))
        .collect();

    op.phase = super::Phase::Rejoin(Phase::Redirect);
    StepResult::Continue
}

async fn redirect(
    op: &mut Operation,
    nodes: &mut [Node],
    provider: &dyn ConnectionProvider,
    timeout: Duration,
) -> StepResult {
    let mut errors = OperationError::default();
    let Some(primary_idx) = op.promotion_target else {
        return fail(&mut errors, "rejoin: redirect called without a primary");
    };
    let primary_endpoint = nodes[primary_idx].endpoint.clone();

    let indices: Vec<usize> = op
        .captured_replicas
        .iter()
        .filter_map(|c| c.name.strip_prefix("__rejoin_verified_").and_then(|s| s.parse().ok()))
        .collect();

    let sql = format!(
        "CHANGE MASTER TO MASTER_HOST='{}', MASTER_PORT={}, MASTER_USE_GTID=current_pos{}; START SLAVE",
        primary_endpoint.host, primary_endpoint.port, op.replication_options.change_master_clause()
    );

    let mut rejoined = 0usize;
    for idx in indices {
        match query_node(&nodes[idx], provider, timeout, &sql).await {
            Ok(_) => rejoined += 1,
            Err(e) => errors.push_msg(format!("rejoin: {} failed: {e}", nodes[idx].name)),
        }
    }

    StepResult::Done(OperationOutcome {
        success: rejoined > 0 || errors.is_empty(),
        errors,
    })
}

// src/operations/release_locks.rs

//! §4.7.5 Release-Locks: releases both advisory locks on every node this
//! monitor currently owns, and pushes the next lock-acquisition attempt
//! out by a minute so another monitor instance gets a clear chance.

use super::{query_node, Operation, OperationOutcome, StepResult};
use crate::client::ConnectionProvider;
use crate::error::OperationError;
use crate::node::{LockStatus, Node};
use std::time::Duration;

pub async fn advance(
    _op: &mut Operation,
    nodes: &mut [Node],
    provider: &dyn ConnectionProvider,
    timeout: Duration,
) -> StepResult {
    let mut errors = OperationError::default();

    for node in nodes.iter_mut() {
        if node.lock_server == LockStatus::OwnedSelf {
            match query_node(node, provider, timeout, "SELECT RELEASE_LOCK('server_lock')").await {
                Ok(_) => node.lock_server = LockStatus::Free,
                Err(e) => errors.push_msg(format!("release-locks: {} server_lock: {e}", node.name)),
            }
        }
        if node.lock_master == LockStatus::OwnedSelf {
            match query_node(node, provider, timeout, "SELECT RELEASE_LOCK('master_lock')").await {
                Ok(_) => node.lock_master = LockStatus::Free,
                Err(e) => errors.push_msg(format!("release-locks: {} master_lock: {e}", node.name)),
            }
        }
    }

    StepResult::Done(OperationOutcome { success: true, errors })
}

/// The fixed one-minute delay before this monitor will try to reacquire
/// locks after an explicit release (§4.7.5).
pub const NEXT_ATTEMPT_DELAY: Duration = Duration::from_secs(60);

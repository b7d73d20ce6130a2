// src/command.rs

//! §6.1 command vocabulary: the synchronous surface callers use to drive
//! manual operations, plus the `async-` twins that only schedule.

use crate::operations::{Operation, OperationEngine, OperationKind, OperationOutcome, ReplicationOptions};
use crate::tick::MonitorState;
use std::time::Duration;

/// One parsed command invocation (§6.1 table).
#[derive(Debug, Clone)]
pub enum Command {
    Switchover {
        new_primary: Option<String>,
        current_primary: Option<String>,
    },
    Failover,
    Rejoin {
        server: String,
    },
    ResetReplication {
        primary: Option<String>,
    },
    ReleaseLocks,
    FetchCmdResult,
    CancelCmd,
}

#[derive(Debug, Clone)]
pub enum CommandResult {
    Success(Option<String>),
    Failure(String),
    Pending,
    Running,
}

fn node_index(state: &MonitorState, name: &str) -> Option<usize> {
    state.nodes.iter().position(|n| n.name == name)
}

/// Schedules the operation for `cmd` and returns immediately; used by the
/// `async-` twin of every synchronous command (§6.1).
pub fn schedule(
    state: &mut MonitorState,
    cmd: Command,
    failover_timeout: Duration,
    switchover_timeout: Duration,
    replication: &ReplicationOptions,
) -> CommandResult {
    let op = match build_operation(state, cmd, failover_timeout, switchover_timeout, replication) {
        Ok(op) => op,
        Err(msg) => return CommandResult::Failure(msg),
    };
    match state.engine.schedule(op) {
        Ok(()) => CommandResult::Pending,
        Err(e) => CommandResult::Failure(e.to_string()),
    }
}

fn build_operation(
    state: &MonitorState,
    cmd: Command,
    failover_timeout: Duration,
    switchover_timeout: Duration,
    replication: &ReplicationOptions,
) -> Result<Operation, String> {
    match cmd {
        Command::Switchover {
            new_primary,
            current_primary,
        } => {
            let mut op = Operation::new(OperationKind::Switchover, switchover_timeout)
                .with_replication_options(replication.clone());
            if let Some(name) = current_primary {
                op.demotion_target = Some(
                    node_index(state, &name).ok_or_else(|| format!("unknown server '{name}'"))?,
                );
            }
            if let Some(name) = new_primary {
                op.promotion_target = Some(
                    node_index(state, &name).ok_or_else(|| format!("unknown server '{name}'"))?,
                );
            }
            Ok(op)
        }
        Command::Failover => {
            let demotion_target = state.primary_idx.ok_or_else(|| "no primary to fail over from".to_string())?;
            let mut op = Operation::new(OperationKind::Failover, failover_timeout)
                .with_replication_options(replication.clone());
            op.demotion_target = Some(demotion_target);
            Ok(op)
        }
        Command::Rejoin { server } => {
            let idx = node_index(state, &server).ok_or_else(|| format!("unknown server '{server}'"))?;
            let mut op = Operation::new(OperationKind::Rejoin, failover_timeout)
                .with_replication_options(replication.clone());
            op.promotion_target = state.primary_idx;
            // Restrict rejoin to the single named server by pre-seeding the
            // captured-replicas stash the same way `rejoin::collect` would,
            // skipping the broader cluster scan.
            op.captured_replicas = vec![crate::node::ReplicaConnection::new(
                format!("__rejoin_suspect_{idx}"),
                state.nodes[idx].endpoint.clone(),
            )];
            op.phase = crate::operations::Phase::Rejoin(crate::operations::rejoin::Phase::VerifyPerNode);
            Ok(op)
        }
        Command::ResetReplication { primary } => {
            let mut op = Operation::new(OperationKind::Reset, switchover_timeout)
                .with_replication_options(replication.clone());
            op.promotion_target = match primary {
                Some(name) => Some(node_index(state, &name).ok_or_else(|| format!("unknown server '{name}'"))?),
                None => state.primary_idx,
            };
            Ok(op)
        }
        Command::ReleaseLocks => Ok(Operation::new(OperationKind::ReleaseLocks, Duration::from_secs(10))),
        Command::FetchCmdResult | Command::CancelCmd => {
            unreachable!("handled directly in dispatch, not scheduled")
        }
    }
}

/// §6.1 `fetch-cmd-result`: returns the last operation's outcome, or a
/// pending/running status if it hasn't finished yet.
pub fn fetch_result(state: &MonitorState) -> CommandResult {
    match state.engine.running_outcome() {
        Some(OperationOutcome { success: true, errors }) if errors.is_empty() => {
            CommandResult::Success(None)
        }
        Some(OperationOutcome { success: true, errors }) => {
            CommandResult::Success(Some(errors.to_string()))
        }
        Some(OperationOutcome { success: false, errors }) => CommandResult::Failure(errors.to_string()),
        None if state.engine.has_running() => CommandResult::Running,
        None if state.engine.has_scheduled() => CommandResult::Pending,
        None => CommandResult::Failure("no operation has run yet".to_string()),
    }
}

pub fn cancel(engine: &mut OperationEngine) -> CommandResult {
    engine.cancel();
    CommandResult::Success(None)
}

/// Single entry point the command listener (A6) drives: routes the two
/// immediate commands directly, schedules everything else.
pub fn dispatch(
    state: &mut MonitorState,
    cmd: Command,
    failover_timeout: Duration,
    switchover_timeout: Duration,
    replication: &ReplicationOptions,
) -> CommandResult {
    match cmd {
        Command::FetchCmdResult => fetch_result(state),
        Command::CancelCmd => cancel(&mut state.engine),
        other => schedule(state, other, failover_timeout, switchover_timeout, replication),
    }
}

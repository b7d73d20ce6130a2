mod common;

use replimon::command::{self, Command, CommandResult};
use replimon::operations::{OperationKind, ReplicationOptions};
use replimon::tick::MonitorState;
use std::time::Duration;

fn state_with(node_count: usize) -> MonitorState {
    let nodes = common::make_running_nodes(node_count);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("replimon.journal");
    // Leak the tempdir for the duration of the test; MonitorState only
    // needs the path string, not an open handle.
    let path = path.to_str().unwrap().to_string();
    std::mem::forget(dir);
    MonitorState::new(nodes, &path)
}

#[test]
fn scheduling_failover_without_a_primary_fails_immediately() {
    let mut state = state_with(2);
    let result = command::dispatch(&mut state, Command::Failover, Duration::from_secs(30), Duration::from_secs(30), &ReplicationOptions::default());
    match result {
        CommandResult::Failure(msg) => assert!(msg.contains("no primary")),
        other => panic!("expected Failure, got {other:?}"),
    }
}

#[test]
fn scheduling_failover_with_a_primary_returns_pending() {
    let mut state = state_with(2);
    state.primary_idx = Some(0);
    let result = command::dispatch(&mut state, Command::Failover, Duration::from_secs(30), Duration::from_secs(30), &ReplicationOptions::default());
    assert!(matches!(result, CommandResult::Pending));
    assert!(state.engine.has_scheduled());
}

#[test]
fn switchover_to_an_unknown_server_name_fails() {
    let mut state = state_with(2);
    let cmd = Command::Switchover {
        new_primary: Some("ghost".to_string()),
        current_primary: None,
    };
    let result = command::dispatch(&mut state, cmd, Duration::from_secs(30), Duration::from_secs(30), &ReplicationOptions::default());
    match result {
        CommandResult::Failure(msg) => assert!(msg.contains("unknown server")),
        other => panic!("expected Failure, got {other:?}"),
    }
}

#[test]
fn scheduling_again_before_the_first_starts_just_replaces_it() {
    let mut state = state_with(2);
    state.primary_idx = Some(0);
    command::dispatch(&mut state, Command::Failover, Duration::from_secs(30), Duration::from_secs(30), &ReplicationOptions::default());
    assert!(state.engine.has_scheduled());

    // The engine only refuses a new schedule while something is *running*;
    // a still-Scheduled op is a single overwritable slot.
    let second = command::dispatch(&mut state, Command::ReleaseLocks, Duration::from_secs(30), Duration::from_secs(30), &ReplicationOptions::default());
    assert!(matches!(second, CommandResult::Pending));
    assert!(state.engine.has_scheduled());
}

#[test]
fn fetch_result_before_anything_has_run_reports_failure() {
    let state = state_with(1);
    let result = command::fetch_result(&state);
    match result {
        CommandResult::Failure(msg) => assert!(msg.contains("no operation")),
        other => panic!("expected Failure, got {other:?}"),
    }
}

#[test]
fn fetch_result_reports_pending_once_something_is_scheduled() {
    let mut state = state_with(1);
    let op = replimon::operations::Operation::new(OperationKind::ReleaseLocks, Duration::from_secs(10));
    state.engine.schedule(op).unwrap();
    assert!(matches!(command::fetch_result(&state), CommandResult::Pending));
}

#[test]
fn cancel_clears_a_scheduled_operation() {
    let mut state = state_with(1);
    let op = replimon::operations::Operation::new(OperationKind::ReleaseLocks, Duration::from_secs(10));
    state.engine.schedule(op).unwrap();
    assert!(state.engine.has_scheduled());

    command::cancel(&mut state.engine);
    assert!(!state.engine.has_scheduled());
}

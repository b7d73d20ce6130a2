mod common;

use async_trait::async_trait;
use replimon::client::{ConnectionProvider, QueryRows, SqlConnection};
use replimon::error::NodeError;
use replimon::gtid::GtidList;
use replimon::node::{Endpoint, LockStatus, Node, NodeFlags, ReplicaConnection};
use replimon::operations::{failover, release_locks, switchover, Operation, OperationKind, StepResult};
use std::time::Duration;

/// Always succeeds with an empty row set; good enough to drive operation
/// phases that only care whether a query round-trips, not what it returns.
struct AlwaysOkConnection;

#[async_trait]
impl SqlConnection for AlwaysOkConnection {
    async fn query(&mut self, _sql: &str) -> Result<QueryRows, NodeError> {
        Ok(QueryRows::default())
    }
    async fn ping(&mut self) -> Result<(), NodeError> {
        Ok(())
    }
}

struct AlwaysOkProvider;

#[async_trait]
impl ConnectionProvider for AlwaysOkProvider {
    async fn connect(&self, _endpoint: &Endpoint, _timeout: Duration) -> Result<Box<dyn SqlConnection>, NodeError> {
        Ok(Box::new(AlwaysOkConnection))
    }
}

fn child_connection(name: &str, parent_idx: usize, parent_endpoint: Endpoint) -> ReplicaConnection {
    let mut conn = ReplicaConnection::new(name, parent_endpoint);
    conn.io_state = replimon::node::IoState::Yes;
    conn.sql_state = replimon::node::SqlState::Yes;
    conn.master_server = Some(parent_idx);
    conn
}

/// §8 S4: two replicas both fully IO-caught-up (seq=100) on the down
/// primary's domain; R1 has processed seq=100, R2 only seq=90. R1 wins the
/// tie-break on processed position.
#[test]
fn scenario_s4_promotion_tie_break_on_processed_sequence() {
    let mut nodes = common::make_running_nodes(3);
    nodes[0].gtid_domain = Some(0);
    nodes[0].children = vec![1, 2];

    let parent_endpoint = nodes[0].endpoint.clone();
    nodes[1]
        .replicas
        .push(child_connection("", 0, parent_endpoint.clone()));
    nodes[1].replicas[0].gtid_io_pos = GtidList::parse("0-1-100");
    nodes[1].gtid_current_pos = GtidList::parse("0-1-100");

    nodes[2].replicas.push(child_connection("", 0, parent_endpoint));
    nodes[2].replicas[0].gtid_io_pos = GtidList::parse("0-1-100");
    nodes[2].gtid_current_pos = GtidList::parse("0-1-90");

    let selected = failover::select_promotion_target(&nodes, 0);
    assert_eq!(selected, Some(1));
}

#[test]
fn promotion_excludes_nodes_marked_no_promotion() {
    let mut nodes = common::make_running_nodes(2);
    nodes[0].gtid_domain = Some(0);
    nodes[0].children = vec![1];
    nodes[1].excluded_from_promotion = true;

    assert_eq!(failover::select_promotion_target(&nodes, 0), None);
}

#[tokio::test]
async fn failover_promotes_the_selected_replica_through_all_phases() {
    let mut nodes = common::make_running_nodes(2);
    nodes[0].flags.remove(NodeFlags::RUNNING); // demotion target is down
    nodes[0].gtid_domain = Some(0);
    nodes[0].children = vec![1];
    nodes[1]
        .replicas
        .push(child_connection("", 0, nodes[0].endpoint.clone()));

    let mut op = Operation::new(OperationKind::Failover, Duration::from_secs(30));
    op.demotion_target = Some(0);
    let provider = AlwaysOkProvider;

    let mut outcome = None;
    for _ in 0..10 {
        match failover::advance(&mut op, &mut nodes, &provider, Duration::from_secs(1)).await {
            StepResult::Continue => continue,
            StepResult::Done(o) => {
                outcome = Some(o);
                break;
            }
        }
    }

    let outcome = outcome.expect("failover should reach a terminal phase within 10 steps");
    assert!(outcome.success);
    assert_eq!(op.promotion_target, Some(1));
    assert!(!nodes[1].read_only);
}

/// §8 S5: switchover to an operator-specified target rather than the
/// highest-ranked candidate.
#[tokio::test]
async fn switchover_promotes_the_explicitly_requested_target() {
    let mut nodes = common::make_running_nodes(3);
    nodes[0].flags.insert(NodeFlags::MASTER);
    nodes[0].read_only = false;
    nodes[0].children = vec![1, 2];
    for child in [1usize, 2] {
        nodes[child]
            .replicas
            .push(child_connection("", 0, nodes[0].endpoint.clone()));
    }

    let mut op = Operation::new(OperationKind::Switchover, Duration::from_secs(30));
    op.promotion_target = Some(2); // explicitly requested, not node 1
    let provider = AlwaysOkProvider;

    let mut outcome = None;
    for _ in 0..10 {
        match switchover::advance(&mut op, &mut nodes, &provider, Duration::from_secs(1)).await {
            StepResult::Continue => continue,
            StepResult::Done(o) => {
                outcome = Some(o);
                break;
            }
        }
    }

    let outcome = outcome.expect("switchover should reach a terminal phase within 10 steps");
    assert!(outcome.success);
    assert_eq!(op.promotion_target, Some(2));
    assert!(!nodes[2].read_only);
}

#[tokio::test]
async fn release_locks_frees_every_lock_this_monitor_owns() {
    let mut nodes = common::make_running_nodes(2);
    nodes[0].lock_server = LockStatus::OwnedSelf;
    nodes[0].lock_master = LockStatus::OwnedSelf;
    nodes[1].lock_server = LockStatus::Free;

    let mut op = Operation::new(OperationKind::ReleaseLocks, Duration::from_secs(5));
    let provider = AlwaysOkProvider;
    let result = release_locks::advance(&mut op, &mut nodes, &provider, Duration::from_secs(1)).await;

    match result {
        StepResult::Done(outcome) => assert!(outcome.success),
        StepResult::Continue => panic!("release-locks is a single-step operation"),
    }
    assert_eq!(nodes[0].lock_server, LockStatus::Free);
    assert_eq!(nodes[0].lock_master, LockStatus::Free);
}

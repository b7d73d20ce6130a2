use replimon::locks::{self, LockCoordinatorState};
use replimon::node::{LockStatus, Node, Endpoint, NodeFlags};
use replimon::roles::CooperativeLockMode;
use std::time::{Duration, Instant};

fn three_running_nodes_with_server_lock() -> Vec<Node> {
    (0..3)
        .map(|i| {
            let mut node = Node::new(format!("n{}", i + 1), Endpoint::new("127.0.0.1", 10000 + i), i);
            node.flags.insert(NodeFlags::RUNNING);
            node.lock_server = LockStatus::OwnedSelf;
            node
        })
        .collect()
}

/// §8 S6: three nodes, monitor holds all three `server` locks, required
/// majority is 2. Losing one node to `OwnedOther` keeps the majority (2);
/// losing a second loses it and everything held is released.
#[test]
fn scenario_s6_lock_majority_loss() {
    let mut nodes = three_running_nodes_with_server_lock();
    let mut state = LockCoordinatorState::new();
    state.have_lock_majority = true;
    let interval = Duration::from_secs(2);
    let now = Instant::now();

    nodes[2].lock_server = LockStatus::OwnedOther(99);
    let mut acquired = Vec::new();
    let mut released = Vec::new();
    let result = locks::run_tick(
        &nodes,
        &mut state,
        CooperativeLockMode::MajorityOfAll,
        interval,
        now,
        |idx| acquired.push(idx),
        |idx| released.push(idx),
    );

    assert!(result.have_lock_majority, "2-of-3 is still a majority");
    assert!(!result.majority_changed);
    assert!(!result.released_due_to_no_majority);
    assert!(released.is_empty());

    nodes[1].lock_server = LockStatus::OwnedOther(100);
    let mut acquired = Vec::new();
    let mut released = Vec::new();
    let result = locks::run_tick(
        &nodes,
        &mut state,
        CooperativeLockMode::MajorityOfAll,
        interval,
        now,
        |idx| acquired.push(idx),
        |idx| released.push(idx),
    );

    assert!(!result.have_lock_majority, "only 1-of-3 remains");
    assert!(result.majority_changed);
    // majority was just lost this tick; release is deferred to the
    // following tick so a brief partition doesn't drop locks prematurely.
    assert!(!result.released_due_to_no_majority);
    assert!(released.is_empty());

    // Next tick: still no majority, so the deferred release fires now.
    let mut acquired = Vec::new();
    let mut released = Vec::new();
    let result = locks::run_tick(
        &nodes,
        &mut state,
        CooperativeLockMode::MajorityOfAll,
        interval,
        now + interval,
        |idx| acquired.push(idx),
        |idx| released.push(idx),
    );

    assert!(!result.have_lock_majority);
    assert!(!result.majority_changed, "majority was already lost last tick");
    assert!(result.released_due_to_no_majority);
    // every node whose lock isn't already Free gets told to release, not
    // just the ones this monitor still holds outright.
    assert_eq!(released, vec![0, 1, 2]);
}

#[test]
fn reconcile_master_lock_acquires_on_new_master_and_releases_elsewhere() {
    let mut nodes = three_running_nodes_with_server_lock();
    nodes[0].flags.insert(NodeFlags::MASTER);
    nodes[1].lock_master = LockStatus::OwnedSelf;

    let (to_acquire, to_release) = locks::reconcile_master_lock(&nodes, Some(0));
    assert_eq!(to_acquire, vec![0]);
    assert_eq!(to_release, vec![1]);
}

#[test]
fn reconcile_master_lock_is_a_no_op_once_settled() {
    let mut nodes = three_running_nodes_with_server_lock();
    nodes[0].flags.insert(NodeFlags::MASTER);
    nodes[0].lock_master = LockStatus::OwnedSelf;

    let (to_acquire, to_release) = locks::reconcile_master_lock(&nodes, Some(0));
    assert!(to_acquire.is_empty());
    assert!(to_release.is_empty());
}

#[test]
fn free_locks_are_acquired_toward_majority() {
    let mut nodes = three_running_nodes_with_server_lock();
    nodes[2].lock_server = LockStatus::Free;
    let mut state = LockCoordinatorState::new();
    let mut acquired = Vec::new();

    locks::run_tick(
        &nodes,
        &mut state,
        CooperativeLockMode::MajorityOfAll,
        Duration::from_secs(2),
        Instant::now(),
        |idx| acquired.push(idx),
        |_| {},
    );

    assert_eq!(acquired, vec![2]);
}

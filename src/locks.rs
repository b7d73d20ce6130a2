// src/locks.rs

//! C6 LockCoordinator: cooperative-monitoring advisory locks, used when
//! more than one monitor instance watches the same cluster so only the
//! one holding a majority of per-server locks performs operations (§4.6).

use crate::node::{LockStatus, Node};
use crate::roles::CooperativeLockMode;
use rand::Rng;
use std::time::{Duration, Instant};

/// Mirrors the C++ original's `ClusterLocksInfo`: tracks whether this
/// monitor currently holds a lock majority and when it's next allowed to
/// attempt acquiring free locks.
pub struct LockCoordinatorState {
    pub have_lock_majority: bool,
    last_locking_attempt: Option<Instant>,
    next_lock_attempt_delay: Duration,
    /// Set the first tick majority is observed lost; locks are released only
    /// once this is already set, i.e. on the tick *after* the loss (§4.6
    /// "release all locks on the next tick", §8 S6).
    majority_loss_pending_release: bool,
}

impl Default for LockCoordinatorState {
    fn default() -> Self {
        Self {
            have_lock_majority: false,
            last_locking_attempt: None,
            next_lock_attempt_delay: Duration::ZERO,
            majority_loss_pending_release: false,
        }
    }
}

impl LockCoordinatorState {
    pub fn new() -> Self {
        Self::default()
    }

    fn time_to_update(&self, now: Instant) -> bool {
        match self.last_locking_attempt {
            None => true,
            Some(last) => now.duration_since(last) > self.next_lock_attempt_delay,
        }
    }

    /// Randomized backoff `(5 + U[0,3)) * tick_interval` so that multiple
    /// monitors racing for locks don't perpetually collide (§4.6).
    fn schedule_next_attempt(&mut self, tick_interval: Duration, now: Instant) {
        let deviation: u32 = rand::thread_rng().gen_range(0..3);
        self.next_lock_attempt_delay = tick_interval * (5 + deviation);
        self.last_locking_attempt = Some(now);
    }
}

pub struct LockTickResult {
    pub have_lock_majority: bool,
    pub majority_changed: bool,
    pub released_due_to_no_majority: bool,
}

/// One cooperative-locking pass (§4.6 algorithm): counts currently-held and
/// free server locks, decides whether this monitor has (or can reach) a
/// majority, attempts to acquire free locks if so, and releases everything
/// if majority is lost.
///
/// `acquire` and `release` are injected so this function stays a pure
/// decision over `nodes`' already-observed lock state; actual lock
/// acquisition happens over the network in NodeProbe/the caller.
pub fn run_tick(
    nodes: &[Node],
    state: &mut LockCoordinatorState,
    mode: CooperativeLockMode,
    tick_interval: Duration,
    now: Instant,
    mut acquire: impl FnMut(usize),
    mut release: impl FnMut(usize),
) -> LockTickResult {
    let had_majority = state.have_lock_majority;

    let mut server_locks_held = 0usize;
    let mut server_locks_free = 0usize;
    let mut master_locks_held = 0usize;
    let mut running_servers = 0usize;

    for node in nodes {
        match node.lock_server {
            LockStatus::OwnedSelf => server_locks_held += 1,
            LockStatus::Free => server_locks_free += 1,
            _ => {}
        }
        if node.lock_master == LockStatus::OwnedSelf {
            master_locks_held += 1;
        }
        if node.is_running() {
            running_servers += 1;
        }
    }

    let required_for_majority = match mode {
        CooperativeLockMode::MajorityOfRunning => running_servers / 2 + 1,
        _ => nodes.len() / 2 + 1,
    };

    if server_locks_free > 0 && server_locks_held + server_locks_free >= required_for_majority {
        let should_try = had_majority || state.time_to_update(now);
        if should_try {
            if !had_majority {
                state.schedule_next_attempt(tick_interval, now);
            }
            for (idx, node) in nodes.iter().enumerate() {
                if node.lock_server == LockStatus::Free {
                    acquire(idx);
                    server_locks_held += 1;
                }
            }
        }
    }

    let have_majority = server_locks_held >= required_for_majority;
    let majority_changed = have_majority != had_majority;

    let total_locks = server_locks_held + master_locks_held;
    let mut released = false;
    if have_majority {
        state.majority_loss_pending_release = false;
    } else if total_locks > 0 {
        if state.majority_loss_pending_release {
            for (idx, node) in nodes.iter().enumerate() {
                if node.lock_server != LockStatus::Free || node.lock_master != LockStatus::Free {
                    release(idx);
                }
            }
            released = true;
            state.majority_loss_pending_release = false;
        } else {
            state.majority_loss_pending_release = true;
        }
    }

    state.have_lock_majority = have_majority;
    LockTickResult {
        have_lock_majority: have_majority,
        majority_changed,
        released_due_to_no_majority: released,
    }
}

/// §4.6 "master lock drift correction": the master lock should be held on
/// (and only on) the current `Master` node. Returns the indices to acquire
/// on and the indices to release from to correct any drift.
pub fn reconcile_master_lock(nodes: &[Node], current_master: Option<usize>) -> (Vec<usize>, Vec<usize>) {
    let mut to_acquire = Vec::new();
    let mut to_release = Vec::new();

    for (idx, node) in nodes.iter().enumerate() {
        let should_hold = current_master == Some(idx) && node.is_master();
        match (should_hold, node.lock_master) {
            (true, LockStatus::Free) => to_acquire.push(idx),
            (false, LockStatus::OwnedSelf) => to_release.push(idx),
            _ => {}
        }
    }

    (to_acquire, to_release)
}

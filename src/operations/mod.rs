// src/operations/mod.rs

//! C7 OperationEngine: schedules, runs, and cancels the long-running
//! cluster-manipulation jobs (§4.7). Operations are modeled as a tagged
//! enum of kinds, each with its own phase enum, rather than a trait object
//! hierarchy — state machines here are homogeneous in shape (advance one
//! step, yield, repeat) and heterogeneous only in which steps they run, so
//! a closed enum plus a `match` in `advance` is the simpler fit (§9 Design
//! Note on polymorphism).

pub mod failover;
pub mod rejoin;
pub mod release_locks;
pub mod reset;
pub mod switchover;

use crate::client::ConnectionProvider;
use crate::error::OperationError;
use crate::node::{Endpoint, Node, ReplicaConnection};
use std::time::{Duration, Instant};

/// §4.7.7 per-operation phase. Each kind only ever visits the phases
/// listed for it in the state-machine summary; `Done` is terminal for all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Failover(failover::Phase),
    Switchover(switchover::Phase),
    Rejoin(rejoin::Phase),
    Reset(reset::Phase),
    ReleaseLocks,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Failover,
    Switchover,
    Rejoin,
    Reset,
    ReleaseLocks,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationStatus {
    Scheduled,
    Running,
    Done,
}

/// The result an operation reports once Done; accumulated rather than
/// propagated, since exceptions never cross a tick boundary (§9).
#[derive(Debug, Clone, Default)]
pub struct OperationOutcome {
    pub success: bool,
    pub errors: OperationError,
}

/// The replication-connection options (§6.2) an operation folds into every
/// `CHANGE MASTER` statement it emits.
#[derive(Debug, Clone, Default)]
pub struct ReplicationOptions {
    pub user: Option<String>,
    pub password: Option<String>,
    pub use_ssl: bool,
    pub custom_options: Option<String>,
}

impl ReplicationOptions {
    pub fn from_config(config: &crate::config::MonitorConfig) -> Self {
        Self {
            user: config.replication_user.clone(),
            password: config.replication_password.clone(),
            use_ssl: config.replication_master_ssl,
            custom_options: config.replication_custom_options.clone(),
        }
    }

    /// Renders the trailing clause appended to every `CHANGE MASTER`
    /// statement (§6.2: user/password/SSL/custom options "inserted into the
    /// replica-configure statement emitted by the engine").
    pub fn change_master_clause(&self) -> String {
        let mut clause = String::new();
        if let Some(user) = &self.user {
            clause.push_str(&format!(", MASTER_USER='{user}'"));
        }
        if let Some(password) = &self.password {
            clause.push_str(&format!(", MASTER_PASSWORD='{password}'"));
        }
        if self.use_ssl {
            clause.push_str(", MASTER_SSL=1");
        }
        if let Some(extra) = &self.custom_options {
            clause.push_str(&format!(", {extra}"));
        }
        clause
    }
}

/// A stateful job (§3 "Operation"). Owned exclusively by the
/// `OperationEngine`; may outlive a single tick.
pub struct Operation {
    pub kind: OperationKind,
    pub status: OperationStatus,
    pub phase: Phase,
    pub promotion_target: Option<usize>,
    pub demotion_target: Option<usize>,
    pub captured_replicas: Vec<ReplicaConnection>,
    pub captured_events: Vec<String>,
    pub cancel_requested: bool,
    pub outcome: Option<OperationOutcome>,
    /// Total time allotted at schedule time; `time_remaining` is
    /// recomputed from this and `started_at` on every `advance` call.
    time_budget: Duration,
    pub time_remaining: Duration,
    pub started_at: Option<Instant>,
    pub replication_options: ReplicationOptions,
    /// External master endpoint rewritten onto the old primary during
    /// switchover (§4.7.2 step 5); `None` for other kinds.
    pub rewrite_old_primary_to: Option<Endpoint>,
}

impl Operation {
    pub fn new(kind: OperationKind, time_budget: Duration) -> Self {
        let phase = match kind {
            OperationKind::Failover => Phase::Failover(failover::Phase::Prepare),
            OperationKind::Switchover => Phase::Switchover(switchover::Phase::Prepare),
            OperationKind::Rejoin => Phase::Rejoin(rejoin::Phase::CollectSuspects),
            OperationKind::Reset => Phase::Reset(reset::Phase::Collect),
            OperationKind::ReleaseLocks => Phase::ReleaseLocks,
        };
        Self {
            kind,
            status: OperationStatus::Scheduled,
            phase,
            promotion_target: None,
            demotion_target: None,
            captured_replicas: Vec::new(),
            captured_events: Vec::new(),
            cancel_requested: false,
            outcome: None,
            time_budget,
            time_remaining: time_budget,
            started_at: None,
            rewrite_old_primary_to: None,
            replication_options: ReplicationOptions::default(),
        }
    }

    pub fn with_replication_options(mut self, options: ReplicationOptions) -> Self {
        self.replication_options = options;
        self
    }

    pub fn is_done(&self) -> bool {
        self.status == OperationStatus::Done
    }
}

/// Drives at most one Scheduled and one Running operation (§3, §4.7
/// "at most one Scheduled and one Running"). `advance` is called once per
/// tick from `Tick` (C8).
#[derive(Default)]
pub struct OperationEngine {
    scheduled: Option<Operation>,
    running: Option<Operation>,
    /// Short suppression window after a cluster-modifying op, so probes can
    /// re-stabilize before another automatic op fires (§4.7.6).
    suppressed_until: Option<Instant>,
}

impl OperationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_scheduled(&self) -> bool {
        self.scheduled.is_some()
    }

    pub fn has_running(&self) -> bool {
        self.running.is_some()
    }

    /// Schedules `op`, replacing any previously scheduled (not yet
    /// started) operation. Refuses while another operation is running.
    pub fn schedule(&mut self, op: Operation) -> Result<(), &'static str> {
        if self.running.is_some() {
            return Err("an operation is already running");
        }
        self.scheduled = Some(op);
        Ok(())
    }

    /// Discards a Scheduled operation, or flags a Running one for
    /// cooperative cancellation at its next phase boundary (§4.7).
    pub fn cancel(&mut self) {
        if self.scheduled.take().is_some() {
            return;
        }
        if let Some(op) = self.running.as_mut() {
            op.cancel_requested = true;
        }
    }

    pub fn running_outcome(&self) -> Option<&OperationOutcome> {
        self.running.as_ref().and_then(|op| op.outcome.as_ref())
    }

    pub fn take_done(&mut self) -> Option<Operation> {
        if matches!(self.running.as_ref().map(|o| o.status), Some(OperationStatus::Done)) {
            self.running.take()
        } else {
            None
        }
    }

    pub fn is_suppressed(&self, now: Instant) -> bool {
        self.suppressed_until.map(|t| now > t).map(|expired| !expired).unwrap_or(false)
    }

    pub fn suppress_for(&mut self, duration: Duration, now: Instant) {
        self.suppressed_until = Some(now + duration);
    }

    /// One engine step per tick: promote Scheduled to Running if nothing
    /// else is running, then advance the Running operation by one phase
    /// transition (§4.8 ordering: engine runs after roles are assigned).
    pub async fn advance(
        &mut self,
        nodes: &mut [Node],
        provider: &dyn ConnectionProvider,
        connect_timeout: Duration,
        now: Instant,
    ) {
        if self.running.is_none() {
            if let Some(mut op) = self.scheduled.take() {
                op.status = OperationStatus::Running;
                op.started_at = Some(now);
                self.running = Some(op);
            }
        }

        let Some(op) = self.running.as_mut() else { return };
        if op.is_done() {
            return;
        }

        if let Some(started) = op.started_at {
            op.time_remaining = op.time_budget.saturating_sub(now.saturating_duration_since(started));
        }

        if op.cancel_requested {
            op.status = OperationStatus::Done;
            op.outcome = Some(OperationOutcome {
                success: false,
                errors: {
                    let mut e = OperationError::default();
                    e.push_msg("operation cancelled");
                    e
                },
            });
            return;
        }

        let step_result = match op.kind {
            OperationKind::Failover => failover::advance(op, nodes, provider, connect_timeout).await,
            OperationKind::Switchover => switchover::advance(op, nodes, provider, connect_timeout).await,
            OperationKind::Rejoin => rejoin::advance(op, nodes, provider, connect_timeout).await,
            OperationKind::Reset => reset::advance(op, nodes, provider, connect_timeout).await,
            OperationKind::ReleaseLocks => {
                release_locks::advance(op, nodes, provider, connect_timeout).await
            }
        };

        if let StepResult::Done(outcome) = step_result {
            op.status = OperationStatus::Done;
            op.outcome = Some(outcome);
        }
    }
}

/// What a single phase-advance call produced: either the operation moved
/// on (possibly still running) or it reached a terminal outcome.
pub enum StepResult {
    Continue,
    Done(OperationOutcome),
}

/// Shared helper: connects to `node`, runs `query`, maps connection
/// failure into an `OperationError`-friendly message. Used by every
/// operation's phase functions to keep the "talk to one node" boilerplate
/// in one place.
pub async fn query_node(
    node: &Node,
    provider: &dyn ConnectionProvider,
    timeout: Duration,
    sql: &str,
) -> Result<crate::client::QueryRows, String> {
    let mut conn = provider
        .connect(&node.endpoint, timeout)
        .await
        .map_err(|e| format!("{}: connect failed: {e}", node.name))?;
    conn.query(sql)
        .await
        .map_err(|e| format!("{}: query failed: {e}", node.name))
}

// src/error.rs

//! Defines the primary error type for the monitor and the taxonomy from
//! which operation-level error objects are built.

use std::sync::Arc;
use thiserror::Error;

/// Errors raised while talking to a monitored node through a `SqlConnection`.
///
/// These never escape a tick on their own; `NodeProbe` folds them into a
/// `Node`'s status flags and error counter (§7 "Transient node error").
#[derive(Error, Debug, Clone)]
pub enum NodeError {
    #[error("connection failed: {0}")]
    ConnectFailed(String),

    #[error("query timed out")]
    Timeout,

    #[error("authentication failed")]
    AuthFailed,

    #[error("query failed: {0}")]
    QueryFailed(String),

    #[error("unexpected result shape: {0}")]
    UnexpectedResult(String),
}

/// The top-level error type for the monitor core.
///
/// Per §7, errors never propagate out of a tick; this type is used only at
/// the boundaries that are allowed to fail loudly: startup/config loading,
/// journal I/O, and the result of a manual (synchronous) command.
#[derive(Error, Debug, Clone)]
pub enum MonitorError {
    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("journal error: {0}")]
    Journal(String),

    #[error("node error: {0}")]
    Node(#[from] NodeError),

    #[error("operation precondition failed: {0}")]
    OperationPrecondition(String),

    #[error("operation failed: {0}")]
    OperationFailed(String),

    #[error("lock error: {0}")]
    Lock(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for MonitorError {
    fn from(e: std::io::Error) -> Self {
        MonitorError::Io(Arc::new(e))
    }
}

impl From<serde_json::Error> for MonitorError {
    fn from(e: serde_json::Error) -> Self {
        MonitorError::Journal(e.to_string())
    }
}

/// A structured, accumulating error object attached to an `Operation`'s
/// output sink (§3 "Operation"). Every failed step is appended rather than
/// aborting the whole report, so a partial-success operation (e.g. a
/// failover whose stabilization step timed out) can still describe exactly
/// what happened at each step.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct OperationError {
    pub steps: Vec<String>,
}

impl OperationError {
    pub fn push(&mut self, step: impl Into<String>, err: impl std::fmt::Display) {
        self.steps.push(format!("{}: {err}", step.into()));
    }

    pub fn push_msg(&mut self, msg: impl Into<String>) {
        self.steps.push(msg.into());
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl std::fmt::Display for OperationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.steps.join("; "))
    }
}

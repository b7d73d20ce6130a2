// src/client.rs

//! The boundary between the monitor core and the "client library" that
//! speaks the actual database wire protocol (§1 non-goals). Everything
//! below `SqlConnection` is out of scope for this crate; everything above
//! it — turning rows into the typed structures NodeProbe needs — is ours.

use crate::error::NodeError;
use crate::node::Endpoint;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

/// One result row: column name to (possibly NULL) textual value, the same
/// shape a `SHOW SLAVE STATUS`/`SHOW VARIABLES`-style row takes once
/// decoded by a real client library.
pub type Row = HashMap<String, Option<String>>;

/// The rows returned by a single query.
#[derive(Debug, Clone, Default)]
pub struct QueryRows {
    pub rows: Vec<Row>,
}

impl QueryRows {
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    pub fn single_row(&self) -> Option<&Row> {
        self.rows.first()
    }
}

/// A single open connection to a monitored node. Implementations of this
/// trait are expected to be backed by a real SQL client crate; this crate
/// never constructs or parses wire bytes itself.
#[async_trait]
pub trait SqlConnection: Send {
    async fn query(&mut self, sql: &str) -> Result<QueryRows, NodeError>;
    async fn ping(&mut self) -> Result<(), NodeError>;
}

/// Produces a fresh `SqlConnection` to a node's endpoint. Analogous to a
/// connection pool's "get or open" call; NodeProbe asks for one connection
/// per node per tick (§4.1 concurrency: "Each Node's task is the exclusive
/// writer of that Node's fields").
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    async fn connect(
        &self,
        endpoint: &Endpoint,
        timeout: Duration,
    ) -> Result<Box<dyn SqlConnection>, NodeError>;
}

/// A `ConnectionProvider` that always fails with a descriptive error.
///
/// Real deployments are expected to supply their own provider backed by a
/// MariaDB/MySQL client crate. This stub exists so the crate builds and
/// runs standalone (e.g. under test harnesses that swap in a mock) without
/// pulling in a database driver, consistent with the wire-protocol non-goal.
pub struct UnimplementedConnectionProvider;

#[async_trait]
impl ConnectionProvider for UnimplementedConnectionProvider {
    async fn connect(
        &self,
        endpoint: &Endpoint,
        _timeout: Duration,
    ) -> Result<Box<dyn SqlConnection>, NodeError> {
        Err(NodeError::ConnectFailed(format!(
            "no SqlConnection provider configured for {endpoint}; \
             supply a ConnectionProvider backed by a real client library"
        )))
    }
}

/// Looks a column up and parses it, returning `None` on a missing or NULL
/// column rather than failing the whole row — individual probe steps
/// decide what a missing value means (usually: treat as absent/zero).
pub fn col<'a>(row: &'a Row, name: &str) -> Option<&'a str> {
    row.get(name).and_then(|v| v.as_deref())
}

pub fn col_parse<T: std::str::FromStr>(row: &Row, name: &str) -> Option<T> {
    col(row, name).and_then(|v| v.parse().ok())
}

pub fn col_bool_on_off(row: &Row, name: &str) -> Option<bool> {
    col(row, name).map(|v| v.eq_ignore_ascii_case("on") || v == "1")
}

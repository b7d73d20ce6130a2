// src/probe.rs

//! C1 NodeProbe: concurrently refreshes every `Node`'s mutable state from
//! the live server and reports whether the tick's topology may have
//! changed (§4.1).

use crate::client::{ConnectionProvider, QueryRows, Row, col, col_bool_on_off, col_parse};
use crate::error::NodeError;
use crate::gtid::GtidList;
use crate::node::{Capability, Endpoint, IoState, LockStatus, Node, NodeFlags, ReplicaConnection, SqlState};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Everything a single probe pass learned about one node, before it is
/// folded back into that `Node` by the tick loop.
#[derive(Debug, Clone, Default)]
pub struct NodeUpdate {
    pub server_id: Option<u32>,
    pub read_only: bool,
    pub gtid_domain: Option<u32>,
    pub gtid_current_pos: GtidList,
    pub gtid_binlog_pos: GtidList,
    pub gtid_strict_mode: bool,
    pub log_bin: bool,
    pub log_slave_updates: bool,
    pub replicas: Vec<ReplicaConnection>,
    pub lock_server: LockStatus,
    pub lock_master: LockStatus,
    pub enabled_events: Vec<String>,
    pub capabilities: Capability,
}

/// Drives the per-node probe fan-out for one tick.
pub struct NodeProbe {
    provider: Arc<dyn ConnectionProvider>,
    connect_timeout: Duration,
    max_concurrency: usize,
    fetch_events: bool,
}

impl NodeProbe {
    pub fn new(
        provider: Arc<dyn ConnectionProvider>,
        connect_timeout: Duration,
        max_concurrency: usize,
        fetch_events: bool,
    ) -> Self {
        Self {
            provider,
            connect_timeout,
            max_concurrency: max_concurrency.max(1),
            fetch_events,
        }
    }

    /// Probes every node in parallel, exclusive-writing each `Node`'s
    /// fields back in once its task completes. Returns true if any node's
    /// probe suggests the replication topology may have changed.
    pub async fn run_tick(&self, nodes: &mut [Node]) -> bool {
        let mut set = JoinSet::new();
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));

        for (idx, node) in nodes.iter().enumerate() {
            let endpoint = node.endpoint.clone();
            let prior_replicas = node.replicas.clone();
            let provider = self.provider.clone();
            let sem = semaphore.clone();
            let timeout = self.connect_timeout;
            let fetch_events = self.fetch_events;

            set.spawn(async move {
                let _permit = sem.acquire_owned().await.ok();
                let result =
                    probe_one(provider.as_ref(), &endpoint, timeout, &prior_replicas, fetch_events)
                        .await;
                (idx, result)
            });
        }

        let mut topology_changed = false;
        while let Some(joined) = set.join_next().await {
            let Ok((idx, result)) = joined else {
                continue;
            };
            match result {
                Ok(update) => {
                    topology_changed |= apply_update(&mut nodes[idx], update);
                    nodes[idx].error_count = 0;
                    nodes[idx].last_seen = Some(Instant::now());
                }
                Err(err) => {
                    topology_changed |= apply_failure(&mut nodes[idx], &err);
                }
            }
        }
        topology_changed
    }
}

/// Runs the full probe sequence against a single node within the
/// connection's time budget.
async fn probe_one(
    provider: &dyn ConnectionProvider,
    endpoint: &Endpoint,
    timeout: Duration,
    prior_replicas: &[ReplicaConnection],
    fetch_events: bool,
) -> Result<NodeUpdate, NodeError> {
    tokio::time::timeout(timeout, async move {
        let mut conn = provider.connect(endpoint, timeout).await?;
        ping_or_connect(conn.as_mut()).await?;

        let variables = read_variables(conn.as_mut()).await?;
        let (gtid_current_pos, gtid_binlog_pos) = read_gtids(conn.as_mut()).await?;
        let (gtid_strict_mode, log_bin, log_slave_updates) = read_rpl_settings(conn.as_mut()).await?;
        let (replica_rows, all_replicas_form) = read_replica_status(conn.as_mut()).await?;
        let replicas = correlate_replica_rows(&replica_rows, prior_replicas);
        let (lock_server, lock_master) = read_locks(conn.as_mut()).await?;
        let enabled_events = if fetch_events {
            read_enabled_events(conn.as_mut()).await?
        } else {
            Vec::new()
        };

        let mut capabilities = Capability::BASIC;
        if !gtid_current_pos.is_empty() || !gtid_binlog_pos.is_empty() {
            capabilities |= Capability::GTID;
        }
        if all_replicas_form {
            capabilities |= Capability::SLAVE_STATUS_ALL;
        }
        if fetch_events {
            capabilities |= Capability::EVENTS;
        }

        let variables_row = variables.single_row().cloned().unwrap_or_default();
        Ok(NodeUpdate {
            server_id: col_parse::<u32>(&variables_row, "server_id"),
            read_only: col_bool_on_off(&variables_row, "read_only").unwrap_or(true),
            gtid_domain: col_parse::<u32>(&variables_row, "gtid_domain_id"),
            gtid_current_pos,
            gtid_binlog_pos,
            gtid_strict_mode,
            log_bin,
            log_slave_updates,
            replicas,
            lock_server,
            lock_master,
            enabled_events,
            capabilities,
        })
    })
    .await
    .map_err(|_| NodeError::Timeout)?
}

/// §4.1 `ping_or_connect`: ensures the connection is live before anything
/// else is attempted. Auth failures and unreachability are distinguished
/// by `SqlConnection::ping`'s error variant and handled by the caller via
/// `apply_failure`.
async fn ping_or_connect(conn: &mut dyn crate::client::SqlConnection) -> Result<(), NodeError> {
    conn.ping().await
}

/// §4.1 `read_variables`.
async fn read_variables(conn: &mut dyn crate::client::SqlConnection) -> Result<QueryRows, NodeError> {
    conn.query(
        "SHOW VARIABLES WHERE Variable_name IN \
         ('server_id','read_only','gtid_domain_id')",
    )
    .await
}

/// §4.1 `read_gtids`: `gtid_current_pos`, `gtid_binlog_pos`.
async fn read_gtids(
    conn: &mut dyn crate::client::SqlConnection,
) -> Result<(GtidList, GtidList), NodeError> {
    let rows = conn
        .query("SELECT @@gtid_current_pos AS current_pos, @@gtid_binlog_pos AS binlog_pos")
        .await?;
    let row = rows.single_row();
    let current_pos = row
        .and_then(|r| col(r, "current_pos"))
        .map(GtidList::parse)
        .unwrap_or_default();
    let binlog_pos = row
        .and_then(|r| col(r, "binlog_pos"))
        .map(GtidList::parse)
        .unwrap_or_default();
    Ok((current_pos, binlog_pos))
}

/// §4.1 `read_rpl_settings`: gtid-strict-mode, log-bin, log-slave-updates.
async fn read_rpl_settings(
    conn: &mut dyn crate::client::SqlConnection,
) -> Result<(bool, bool, bool), NodeError> {
    let rows = conn
        .query(
            "SHOW VARIABLES WHERE Variable_name IN \
             ('gtid_strict_mode','log_bin','log_slave_updates')",
        )
        .await?;
    let row = rows.single_row().cloned().unwrap_or_default();
    Ok((
        col_bool_on_off(&row, "gtid_strict_mode").unwrap_or(false),
        col_bool_on_off(&row, "log_bin").unwrap_or(false),
        col_bool_on_off(&row, "log_slave_updates").unwrap_or(false),
    ))
}

/// §4.1 `read_replica_status`: prefers the multi-row all-replicas form,
/// accepts the single-row form. Returns the raw rows and whether the
/// all-replicas form was used (feeds the `SLAVE_STATUS_ALL` capability).
async fn read_replica_status(
    conn: &mut dyn crate::client::SqlConnection,
) -> Result<(Vec<Row>, bool), NodeError> {
    match conn.query("SHOW ALL SLAVES STATUS").await {
        Ok(rows) if !rows.rows.is_empty() => Ok((rows.rows, true)),
        Ok(_) | Err(_) => {
            let rows = conn.query("SHOW SLAVE STATUS").await?;
            Ok((rows.rows, false))
        }
    }
}

/// §4.1 `read_locks`: a single statement returning the owner connection id
/// of both advisory locks (`-1`/absent meaning free).
async fn read_locks(
    conn: &mut dyn crate::client::SqlConnection,
) -> Result<(LockStatus, LockStatus), NodeError> {
    let rows = conn
        .query("SELECT IS_USED_LOCK('server_lock') AS server_owner, IS_USED_LOCK('master_lock') AS master_owner")
        .await?;
    let row = rows.single_row().cloned().unwrap_or_default();
    Ok((
        parse_lock_owner(col(&row, "server_owner")),
        parse_lock_owner(col(&row, "master_owner")),
    ))
}

fn parse_lock_owner(value: Option<&str>) -> LockStatus {
    match value {
        None => LockStatus::Free,
        Some(v) => match v.parse::<i64>() {
            Ok(conn_id) => LockStatus::OwnedOther(conn_id),
            Err(_) => LockStatus::Free,
        },
    }
}

/// §4.1 `read_enabled_events`.
async fn read_enabled_events(
    conn: &mut dyn crate::client::SqlConnection,
) -> Result<Vec<String>, NodeError> {
    let rows = conn.query("SHOW EVENTS WHERE Status = 'ENABLED'").await?;
    Ok(rows
        .rows
        .iter()
        .filter_map(|r| col(r, "Name").map(str::to_string))
        .collect())
}

/// Turns raw replica-status rows into `ReplicaConnection`s, carrying over
/// `seen_connected` by correlating with the previous tick's rows
/// (§4.1, §9 open question: best-effort, name + endpoint, positional
/// fallback when row counts match).
fn correlate_replica_rows(rows: &[Row], prior: &[ReplicaConnection]) -> Vec<ReplicaConnection> {
    let same_count = rows.len() == prior.len();
    rows.iter()
        .enumerate()
        .map(|(i, row)| {
            let name = col(row, "Connection_name").unwrap_or("").to_string();
            let host = col(row, "Master_Host").unwrap_or("").to_string();
            let port: u16 = col_parse(row, "Master_Port").unwrap_or(0);
            let upstream_endpoint = Endpoint::new(host, port);

            let matched_prior = prior
                .iter()
                .find(|p| p.name == name && p.upstream_endpoint == upstream_endpoint)
                .or_else(|| if same_count { prior.get(i) } else { None });

            let mut conn = ReplicaConnection::new(name, upstream_endpoint);
            if let Some(prev) = matched_prior {
                conn.seen_connected = prev.seen_connected;
                conn.non_gtid_warned = prev.non_gtid_warned;
            }

            let io_state = match col(row, "Slave_IO_Running") {
                Some(v) if v.eq_ignore_ascii_case("yes") => IoState::Yes,
                Some(v) if v.eq_ignore_ascii_case("connecting") => IoState::Connecting,
                _ => IoState::No,
            };
            let sql_state = match col(row, "Slave_SQL_Running") {
                Some(v) if v.eq_ignore_ascii_case("yes") => SqlState::Yes,
                _ => SqlState::No,
            };
            let upstream_server_id: Option<u32> = col_parse(row, "Master_Server_Id");

            conn.observe_io_state(io_state, upstream_server_id);
            conn.sql_state = sql_state;
            conn.gtid_io_pos = col(row, "Gtid_IO_Pos").map(GtidList::parse).unwrap_or_default();
            conn.seconds_behind = col_parse(row, "Seconds_Behind_Master");
            conn.last_io_error = col(row, "Last_IO_Error")
                .filter(|s| !s.is_empty())
                .map(str::to_string);
            conn.received_heartbeats = col_parse(row, "Slave_received_heartbeats").unwrap_or(0);
            if matches!(io_state, IoState::Yes) {
                conn.last_data_time = Some(Instant::now());
            } else {
                conn.last_data_time = matched_prior.and_then(|p| p.last_data_time);
            }
            conn
        })
        .collect()
}

/// Applies a successful probe's findings to a `Node`, returning whether
/// the topology may have changed (§4.1 "Topology-changed is set iff...").
fn apply_update(node: &mut Node, update: NodeUpdate) -> bool {
    let was_running = node.is_running();
    let server_id_changed = node.server_id != update.server_id;
    let read_only_changed = node.read_only != update.read_only;
    let replicas_changed = replica_sets_differ(&node.replicas, &update.replicas);

    node.server_id = update.server_id;
    node.read_only = update.read_only;
    node.gtid_domain = update.gtid_domain;
    node.gtid_current_pos = update.gtid_current_pos;
    node.gtid_binlog_pos = update.gtid_binlog_pos;
    node.gtid_strict_mode = update.gtid_strict_mode;
    node.log_bin = update.log_bin;
    node.log_slave_updates = update.log_slave_updates;
    node.replicas = update.replicas;
    node.lock_server = update.lock_server;
    node.lock_master = update.lock_master;
    node.enabled_events = update.enabled_events;
    node.capabilities = update.capabilities;
    node.flags.insert(NodeFlags::RUNNING);
    node.flags.remove(NodeFlags::AUTH_ERROR);

    server_id_changed || read_only_changed || replicas_changed || !was_running
}

/// §4.1 failure semantics: degrade to `down`, clear liveness-requiring
/// flags, latch auth errors, bump the error counter.
fn apply_failure(node: &mut Node, err: &NodeError) -> bool {
    let was_running = node.is_running();
    node.flags.remove(
        NodeFlags::RUNNING | NodeFlags::MASTER | NodeFlags::SLAVE | NodeFlags::RELAY | NodeFlags::BINLOG_RELAY,
    );
    if matches!(err, NodeError::AuthFailed) {
        node.flags.insert(NodeFlags::AUTH_ERROR);
    }
    node.error_count = node.error_count.saturating_add(1);
    was_running
}

fn replica_sets_differ(old: &[ReplicaConnection], new: &[ReplicaConnection]) -> bool {
    if old.len() != new.len() {
        return true;
    }
    for n in new {
        let Some(o) = old
            .iter()
            .find(|o| o.name == n.name && o.upstream_endpoint == n.upstream_endpoint)
        else {
            return true;
        };
        if o.upstream_server_id != n.upstream_server_id
            || o.io_state != n.io_state
            || o.sql_state != n.sql_state
        {
            return true;
        }
    }
    false
}

// src/node.rs

//! The `Node` and `ReplicaConnection` data model (§3 of the design).

use crate::gtid::GtidList;
use bitflags::bitflags;
use std::fmt;
use std::time::Instant;

/// A monitored server's network address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

bitflags! {
    /// Observable per-Node status flags (§6.4). `Down` is internal: it feeds
    /// role assignment and failover gating but is not itself one of the
    /// published flags (a down node simply lacks `Running`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct NodeFlags: u32 {
        const RUNNING              = 1 << 0;
        const MASTER                = 1 << 1;
        const SLAVE                 = 1 << 2;
        const RELAY                 = 1 << 3;
        const BINLOG_RELAY          = 1 << 4;
        const MAINTENANCE           = 1 << 5;
        const DRAINING               = 1 << 6;
        const AUTH_ERROR            = 1 << 7;
        const DISK_SPACE_EXHAUSTED  = 1 << 8;
    }
}

bitflags! {
    /// Feature capabilities a node's server version/configuration supports,
    /// discovered during probing (§3).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Capability: u32 {
        const BASIC              = 1 << 0;
        const GTID                 = 1 << 1;
        const SLAVE_STATUS_ALL    = 1 << 2;
        const EVENTS                = 1 << 3;
        const MAX_STATEMENT_TIME = 1 << 4;
        const READ_ONLY_ADMIN    = 1 << 5;
    }
}

/// The two advisory locks defined on every node (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display, strum_macros::EnumIter)]
pub enum LockKind {
    Server,
    Master,
}

/// The perceived ownership state of a single advisory lock on a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockStatus {
    /// Not yet probed, or the probe failed.
    Unknown,
    Free,
    OwnedSelf,
    /// Held by a different connection; carries its connection id.
    OwnedOther(i64),
}

/// The server-reported IO thread state of a replica connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoState {
    Yes,
    Connecting,
    No,
}

/// The server-reported SQL thread state of a replica connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlState {
    Yes,
    No,
}

/// A single slave-status row on a `Node`: one upstream replication link.
#[derive(Debug, Clone)]
pub struct ReplicaConnection {
    /// Empty for the default (unnamed) connection.
    pub name: String,
    pub upstream_endpoint: Endpoint,
    pub io_state: IoState,
    pub sql_state: SqlState,
    /// `None` until the server has reported a nonzero value.
    pub upstream_server_id: Option<u32>,
    pub gtid_io_pos: GtidList,
    pub seconds_behind: Option<u64>,
    pub last_io_error: Option<String>,
    pub received_heartbeats: u64,
    pub last_data_time: Option<Instant>,
    /// Sticky: becomes true once IO was `Yes` with a valid upstream id, and
    /// never reverts (§3 invariant `seen_connected ⇒ upstream server-id > 0`).
    pub seen_connected: bool,
    /// Resolved by `GraphBuilder` on every rebuild; never an ownership edge.
    pub master_server: Option<usize>,
    /// Latches the one-time "non-GTID connection, will not copy" warning
    /// (§9 design note).
    pub non_gtid_warned: bool,
}

impl ReplicaConnection {
    pub fn new(name: impl Into<String>, upstream_endpoint: Endpoint) -> Self {
        Self {
            name: name.into(),
            upstream_endpoint,
            io_state: IoState::No,
            sql_state: SqlState::No,
            upstream_server_id: None,
            gtid_io_pos: GtidList::empty(),
            seconds_behind: None,
            last_io_error: None,
            received_heartbeats: 0,
            last_data_time: None,
            seen_connected: false,
            master_server: None,
            non_gtid_warned: false,
        }
    }

    /// Whether this connection admits an edge into the replication graph
    /// (§3 "Graph" edge admission rule, applied once the upstream is
    /// resolved to a `Node` by `GraphBuilder`).
    pub fn is_replicating(&self) -> bool {
        self.io_state != IoState::No && self.sql_state == SqlState::Yes
    }

    /// Marks `upstream_server_id` and latches `seen_connected` when IO first
    /// reports `Yes` against a valid (nonzero) server id.
    pub fn observe_io_state(&mut self, io_state: IoState, upstream_server_id: Option<u32>) {
        self.io_state = io_state;
        if let Some(id) = upstream_server_id {
            self.upstream_server_id = Some(id);
        }
        if io_state == IoState::Yes
            && let Some(id) = self.upstream_server_id
            && id > 0
        {
            self.seen_connected = true;
        }
    }
}

/// One monitored database server (§3 "Node").
#[derive(Debug, Clone)]
pub struct Node {
    /// Stable identity from configuration; never changes at runtime.
    pub name: String,
    pub endpoint: Endpoint,
    pub private_endpoint: Option<Endpoint>,
    /// Read from the server; may legitimately change across ticks.
    pub server_id: Option<u32>,
    pub read_only: bool,
    pub gtid_current_pos: GtidList,
    pub gtid_binlog_pos: GtidList,
    pub gtid_domain: Option<u32>,
    pub flags: NodeFlags,
    pub replicas: Vec<ReplicaConnection>,
    pub lock_server: LockStatus,
    pub lock_master: LockStatus,
    pub error_count: u32,
    pub last_seen: Option<Instant>,
    pub capabilities: Capability,
    pub cycle_id: Option<u32>,
    /// Configuration-order index, used as the deterministic tie-breaker
    /// throughout (§4.3, §4.5, §4.7.1).
    pub config_index: usize,
    pub gtid_strict_mode: bool,
    pub log_bin: bool,
    pub log_slave_updates: bool,
    pub enabled_events: Vec<String>,
    /// True if this node's `server_type` is a binlog-relay, not a full
    /// database server (§4.4 step 3, §GLOSSARY "Binlog relay").
    pub is_binlog_relay_server: bool,
    pub excluded_from_promotion: bool,

    // -- fields owned by GraphBuilder; reset and rebuilt every tick --
    pub parents: Vec<usize>,
    pub children: Vec<usize>,
    pub external_masters: Vec<Endpoint>,

    // -- derived each tick by RoleAssigner --
    pub replication_lag: Option<u64>,
}

impl Node {
    pub fn new(name: impl Into<String>, endpoint: Endpoint, config_index: usize) -> Self {
        Self {
            name: name.into(),
            endpoint,
            private_endpoint: None,
            server_id: None,
            read_only: true,
            gtid_current_pos: GtidList::empty(),
            gtid_binlog_pos: GtidList::empty(),
            gtid_domain: None,
            flags: NodeFlags::empty(),
            replicas: Vec::new(),
            lock_server: LockStatus::Unknown,
            lock_master: LockStatus::Unknown,
            error_count: 0,
            last_seen: None,
            capabilities: Capability::empty(),
            cycle_id: None,
            config_index,
            gtid_strict_mode: false,
            log_bin: false,
            log_slave_updates: false,
            enabled_events: Vec::new(),
            is_binlog_relay_server: false,
            excluded_from_promotion: false,
            parents: Vec::new(),
            children: Vec::new(),
            external_masters: Vec::new(),
            replication_lag: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.flags.contains(NodeFlags::RUNNING)
    }

    pub fn is_down(&self) -> bool {
        !self.is_running()
    }

    pub fn is_master(&self) -> bool {
        self.flags.contains(NodeFlags::MASTER)
    }

    pub fn is_maintenance(&self) -> bool {
        self.flags.contains(NodeFlags::MAINTENANCE)
    }

    /// Clears the mutable graph fields at the start of a rebuild
    /// (§4.2 GraphBuilder algorithm step 1). `cycle_id` is deliberately
    /// preserved until `CycleFinder` runs so `PrimarySelector` can compare
    /// it against the freshly-computed value.
    pub fn reset_graph_fields(&mut self) {
        self.parents.clear();
        self.children.clear();
        self.external_masters.clear();
    }

    /// Clears role flags ahead of `RoleAssigner` recomputing them
    /// (§4.4 step 1), preserving `RUNNING`/`MAINTENANCE`/`DRAINING`/
    /// `AUTH_ERROR`/`DISK_SPACE_EXHAUSTED`, which are set by `NodeProbe`.
    pub fn reset_role_flags(&mut self) {
        self.flags.remove(
            NodeFlags::MASTER | NodeFlags::SLAVE | NodeFlags::RELAY | NodeFlags::BINLOG_RELAY,
        );
        self.replication_lag = None;
    }
}

// src/metrics.rs

//! Prometheus metrics for the monitor core, updated once per tick. No HTTP
//! exposition layer lives in this crate (§1 non-goals); `gather_metrics`
//! is the hook an embedding binary wires up to its own listener.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_gauge, register_gauge_vec, register_histogram, Counter, Gauge,
    GaugeVec, Histogram, TextEncoder,
};

lazy_static! {
    /// Total nodes currently known to the monitor.
    pub static ref NODES_TOTAL: Gauge =
        register_gauge!("replimon_nodes_total", "Number of nodes under monitoring.").unwrap();
    /// Nodes currently reporting Running.
    pub static ref NODES_RUNNING: Gauge =
        register_gauge!("replimon_nodes_running", "Number of nodes currently running.").unwrap();
    /// 1 if this monitor currently has a primary selected, else 0.
    pub static ref HAS_PRIMARY: Gauge =
        register_gauge!("replimon_has_primary", "Whether a primary is currently selected.").unwrap();
    /// 1 if this monitor holds a lock majority, else 0.
    pub static ref HAS_LOCK_MAJORITY: Gauge =
        register_gauge!("replimon_has_lock_majority", "Whether this monitor holds a lock majority.").unwrap();
    /// Number of cycles detected by CycleFinder on the latest tick.
    pub static ref CYCLES_DETECTED: Gauge =
        register_gauge!("replimon_cycles_detected", "Number of replication cycles detected.").unwrap();

    /// Per-node replication lag in seconds, labeled by node name.
    pub static ref REPLICATION_LAG_SECONDS: GaugeVec = register_gauge_vec!(
        "replimon_replication_lag_seconds",
        "Replication lag in seconds, per node.",
        &["node"]
    )
    .unwrap();

    /// Total number of completed ticks.
    pub static ref TICKS_TOTAL: Counter =
        register_counter!("replimon_ticks_total", "Total number of completed monitor ticks.").unwrap();
    /// Total number of operations (failover/switchover/rejoin/reset) run, labeled by kind and outcome.
    pub static ref OPERATIONS_TOTAL: prometheus::CounterVec = prometheus::register_counter_vec!(
        "replimon_operations_total",
        "Total number of cluster operations run, labeled by kind and outcome.",
        &["kind", "outcome"]
    )
    .unwrap();

    /// Wall-clock time spent per tick.
    pub static ref TICK_DURATION_SECONDS: Histogram = register_histogram!(
        "replimon_tick_duration_seconds",
        "Time spent executing one monitor tick, in seconds."
    )
    .unwrap();
}

/// Gathers all registered metrics and encodes them in the Prometheus text
/// format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode_to_string(&metric_families).unwrap()
}

// src/tick.rs

//! C8 Tick: drives one full monitor cycle — probe, graph, cycles, locks,
//! primary, roles, engine, journal, publish (§4.8).

use crate::client::ConnectionProvider;
use crate::config::MonitorConfig;
use crate::graph::{self, UpstreamResolution};
use crate::journal::{Journal, JournalData};
use crate::locks::{self, LockCoordinatorState};
use crate::metrics;
use crate::node::Node;
use crate::operations::{Operation, OperationEngine, OperationKind, ReplicationOptions};
use crate::primary::{self, PrimaryValidityInputs, RequireRunning};
use crate::probe::NodeProbe;
use crate::roles::{self, RoleAssignerInputs};
use crate::view::SharedView;
use std::time::{Duration, Instant};
use tracing::{info, warn};

pub struct MonitorState {
    pub nodes: Vec<Node>,
    pub primary_idx: Option<usize>,
    pub down_ticks: u32,
    pub lock_state: LockCoordinatorState,
    pub engine: OperationEngine,
    pub journal: Journal,
    pub view: SharedView,
    pub tick_sequence: u64,
}

impl MonitorState {
    pub fn new(nodes: Vec<Node>, journal_path: &str) -> Self {
        Self {
            nodes,
            primary_idx: None,
            down_ticks: 0,
            lock_state: LockCoordinatorState::new(),
            engine: OperationEngine::new(),
            journal: Journal::new(journal_path),
            view: SharedView::new(),
            tick_sequence: 0,
        }
    }

    /// §4.9 pre-loop: restore the journaled primary by name if it still
    /// exists among the configured nodes.
    pub fn restore_from_journal(&mut self) {
        let data = self.journal.load();
        if let Some(name) = data.primary_server {
            self.primary_idx = self.nodes.iter().position(|n| n.name == name);
            if self.primary_idx.is_none() {
                warn!(server = %name, "journaled primary no longer configured");
            }
        }
    }
}

/// Runs one tick per §4.8's ordering: probe → graph → cycles → locks →
/// primary → roles → engine → journal → publish.
pub async fn run_tick(
    state: &mut MonitorState,
    config: &MonitorConfig,
    provider: &std::sync::Arc<dyn ConnectionProvider>,
) {
    let tick_started = Instant::now();
    let probe = NodeProbe::new(
        std::sync::Arc::clone(provider),
        config.connect_timeout,
        16,
        config.handle_events,
    );
    let topology_changed = probe.run_tick(&mut state.nodes).await;

    let resolution = if config.assume_unique_hostnames {
        UpstreamResolution::ByEndpoint
    } else {
        UpstreamResolution::ByServerId
    };
    if topology_changed {
        graph::build(&mut state.nodes, resolution);
    }

    crate::cycle::find_cycles(&mut state.nodes);

    if config.cooperative() {
        let mut to_acquire = Vec::new();
        let mut to_release = Vec::new();
        let result = locks::run_tick(
            &state.nodes,
            &mut state.lock_state,
            config.cooperative_monitoring_locks,
            config.interval,
            tick_started,
            |idx| to_acquire.push(idx),
            |idx| to_release.push(idx),
        );
        for idx in to_acquire {
            if let Ok(_) = crate::operations::query_node(
                &state.nodes[idx],
                provider.as_ref(),
                config.connect_timeout,
                "SELECT GET_LOCK('server_lock', 0)",
            )
            .await
            {
                state.nodes[idx].lock_server = crate::node::LockStatus::OwnedSelf;
            }
        }
        for idx in to_release {
            let _ = crate::operations::query_node(
                &state.nodes[idx],
                provider.as_ref(),
                config.connect_timeout,
                "SELECT RELEASE_LOCK('server_lock'); SELECT RELEASE_LOCK('master_lock')",
            )
            .await;
            state.nodes[idx].lock_server = crate::node::LockStatus::Free;
            state.nodes[idx].lock_master = crate::node::LockStatus::Free;
        }
        metrics::HAS_LOCK_MAJORITY.set(if result.have_lock_majority { 1.0 } else { 0.0 });
        if result.majority_changed && result.have_lock_majority {
            state.engine.suppress_for(
                config.interval * config.failcount,
                tick_started,
            );
        }
    }

    let validity_inputs = PrimaryValidityInputs {
        down_ticks: state.down_ticks,
        failcount: config.failcount,
        enforce_writable_master: config.enforce_writable_master,
        cooperative: config.cooperative(),
        primary_monitor_concurs: state.lock_state.have_lock_majority,
    };
    let primary_still_valid = state
        .primary_idx
        .map(|idx| primary::is_still_valid(&state.nodes, idx, &validity_inputs))
        .unwrap_or(false);
    if !primary_still_valid {
        let selection = primary::select(&state.nodes, RequireRunning::Required);
        state.primary_idx = selection.selected.or_else(|| {
            primary::select(&state.nodes, RequireRunning::Optional).selected
        });
    }

    let role_inputs = RoleAssignerInputs {
        selected_primary: state.primary_idx,
        master_conditions: config.master_conditions(),
        slave_conditions: config.slave_conditions(),
        cooperative: config.cooperative(),
        primary_monitor_concurs: state.lock_state.have_lock_majority,
        enforce_writable_master: config.enforce_writable_master,
        allow_stale_replicas: config.enforce_simple_topology,
    };
    roles::assign(&mut state.nodes, &role_inputs);

    if config.cooperative() {
        let (to_acquire, to_release) = locks::reconcile_master_lock(&state.nodes, state.primary_idx);
        for idx in to_acquire {
            if crate::operations::query_node(
                &state.nodes[idx],
                provider.as_ref(),
                config.connect_timeout,
                "SELECT GET_LOCK('master_lock', 0)",
            )
            .await
            .is_ok()
            {
                state.nodes[idx].lock_master = crate::node::LockStatus::OwnedSelf;
            }
        }
        for idx in to_release {
            let _ = crate::operations::query_node(
                &state.nodes[idx],
                provider.as_ref(),
                config.connect_timeout,
                "SELECT RELEASE_LOCK('master_lock')",
            )
            .await;
            state.nodes[idx].lock_master = crate::node::LockStatus::Free;
        }
    }

    maybe_start_auto_failover(state, config, tick_started);

    state
        .engine
        .advance(&mut state.nodes, provider.as_ref(), config.connect_timeout, tick_started)
        .await;
    if let Some(done) = state.engine.take_done() {
        record_operation_metrics(&done);
    }

    flush_journal_if_dirty(state);

    metrics::NODES_TOTAL.set(state.nodes.len() as f64);
    metrics::NODES_RUNNING.set(state.nodes.iter().filter(|n| n.is_running()).count() as f64);
    metrics::HAS_PRIMARY.set(if state.primary_idx.is_some() { 1.0 } else { 0.0 });
    let cycles = state.nodes.iter().filter_map(|n| n.cycle_id).collect::<std::collections::HashSet<_>>().len();
    metrics::CYCLES_DETECTED.set(cycles as f64);
    for node in &state.nodes {
        if let Some(lag) = node.replication_lag {
            metrics::REPLICATION_LAG_SECONDS
                .with_label_values(&[&node.name])
                .set(lag as f64);
        }
    }

    state.tick_sequence += 1;
    state.view.publish(&state.nodes, state.primary_idx, &state.lock_state, state.tick_sequence);
    metrics::TICKS_TOTAL.inc();
    metrics::TICK_DURATION_SECONDS.observe(tick_started.elapsed().as_secs_f64());
}

/// §4.7.6: auto-failover runs only if the primary has been down for at
/// least `failcount` consecutive ticks and no replica has heard from it
/// within `master_failure_timeout`.
fn maybe_start_auto_failover(state: &mut MonitorState, config: &MonitorConfig, now: Instant) {
    if !config.auto_failover || state.engine.has_running() || state.engine.has_scheduled() {
        return;
    }
    if state.engine.is_suppressed(now) {
        return;
    }
    if config.cooperative() && !state.lock_state.have_lock_majority {
        // Without a majority we can't tell whether another monitor already
        // holds the master lock and is failing over right now; staying put
        // is the only split-brain-safe choice (§1, §8 S6).
        return;
    }
    let Some(primary_idx) = state.primary_idx else { return };
    if state.nodes[primary_idx].is_running() {
        state.down_ticks = 0;
        return;
    }
    state.down_ticks += 1;
    if state.down_ticks < config.failcount {
        return;
    }
    if config.verify_master_failure {
        let heard_recently = state.nodes[primary_idx]
            .children
            .iter()
            .filter_map(|&idx| state.nodes[idx].replicas.iter().find(|c| c.master_server == Some(primary_idx)))
            .filter_map(|c| c.last_data_time)
            .any(|t| now.duration_since(t) < config.master_failure_timeout);
        if heard_recently {
            return;
        }
    }

    info!(primary = %state.nodes[primary_idx].name, "starting automatic failover");
    let mut op = Operation::new(OperationKind::Failover, config.failover_timeout)
        .with_replication_options(ReplicationOptions::from_config(config));
    op.demotion_target = Some(primary_idx);
    let _ = state.engine.schedule(op);
    state.down_ticks = 0;
}

fn record_operation_metrics(op: &Operation) {
    let kind = match op.kind {
        OperationKind::Failover => "failover",
        OperationKind::Switchover => "switchover",
        OperationKind::Rejoin => "rejoin",
        OperationKind::Reset => "reset",
        OperationKind::ReleaseLocks => "release_locks",
    };
    let outcome = match op.outcome.as_ref().map(|o| o.success) {
        Some(true) => "success",
        Some(false) => "failure",
        None => "unknown",
    };
    metrics::OPERATIONS_TOTAL.with_label_values(&[kind, outcome]).inc();
}

fn flush_journal_if_dirty(state: &mut MonitorState) {
    let data = JournalData {
        primary_server: state.primary_idx.map(|idx| state.nodes[idx].name.clone()),
        primary_gtid_domain: state.primary_idx.and_then(|idx| state.nodes[idx].gtid_domain),
    };
    if state.journal.is_dirty(&data) {
        if let Err(e) = state.journal.save(&data) {
            warn!(error = %e, "failed to persist journal");
        }
    }
}

/// Drives the monitor indefinitely, sleeping `interval` (or a shorter
/// duration if an operation requested a fast tick) between cycles. Command
/// requests from the A6 listener are drained once per cycle, immediately
/// after the engine has had a chance to advance, so `fetch-cmd-result`
/// reflects that tick's outcome.
pub async fn run_loop(
    mut state: MonitorState,
    config: MonitorConfig,
    provider: std::sync::Arc<dyn ConnectionProvider>,
    mut commands: tokio::sync::mpsc::Receiver<crate::listener::CommandRequest>,
) -> ! {
    state.restore_from_journal();
    loop {
        run_tick(&mut state, &config, &provider).await;

        while let Ok((cmd, reply)) = commands.try_recv() {
            let result = crate::command::dispatch(
                &mut state,
                cmd,
                config.failover_timeout,
                config.switchover_timeout,
                &ReplicationOptions::from_config(&config),
            );
            let _ = reply.send(result);
        }

        tokio::time::sleep(config.interval).await;
    }
}

// src/main.rs

//! The monitor's binary entry point: loads configuration, wires up
//! logging, and drives the tick loop forever.

use anyhow::{Context, Result};
use replimon::client::{ConnectionProvider, UnimplementedConnectionProvider};
use replimon::config::MonitorConfig;
use replimon::node::Node;
use replimon::tick::{self, MonitorState};
use std::env;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::filter::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let config_path = args
        .iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
        .unwrap_or("replimon.toml");

    let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level))
        .compact()
        .init();

    let config = MonitorConfig::from_file(config_path)
        .with_context(|| format!("failed to load configuration from '{config_path}'"))?;

    info!(servers = config.servers.len(), path = %config_path, "loaded monitor configuration");

    let nodes: Vec<Node> = config
        .servers
        .iter()
        .enumerate()
        .map(|(idx, server)| {
            let mut node = Node::new(server.name.clone(), server.endpoint(), idx);
            node.private_endpoint = server.private_endpoint();
            node.excluded_from_promotion = server.excluded_from_promotion;
            node
        })
        .collect();

    let state = MonitorState::new(nodes, &config.journal_path);
    let provider: Arc<dyn ConnectionProvider> = Arc::new(UnimplementedConnectionProvider);

    let (tx, rx) = tokio::sync::mpsc::channel(32);
    if let Some(port) = config.command_listener_port {
        tokio::spawn(async move {
            if let Err(e) = replimon::listener::run_listener(port, tx).await {
                tracing::error!(error = %e, "command listener exited");
            }
        });
    }

    info!("starting monitor tick loop");
    tick::run_loop(state, config, provider, rx).await;
}

// src/config.rs

//! Monitor configuration: loading, resolving, and validating the options
//! listed in §6.2. Follows the teacher's `from_file` + `validate` shape.

use crate::locks::LockCoordinatorState;
use crate::node::Endpoint;
use crate::roles::{CooperativeLockMode, MasterConditions, SlaveConditions};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ServerEntry {
    pub name: String,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub private_host: Option<String>,
    #[serde(default)]
    pub private_port: Option<u16>,
    #[serde(default)]
    pub excluded_from_promotion: bool,
}

impl ServerEntry {
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.host.clone(), self.port)
    }

    pub fn private_endpoint(&self) -> Option<Endpoint> {
        match (&self.private_host, self.private_port) {
            (Some(host), Some(port)) => Some(Endpoint::new(host.clone(), port)),
            _ => None,
        }
    }
}

fn default_interval() -> Duration {
    Duration::from_secs(2)
}
fn default_connect_timeout() -> Duration {
    Duration::from_secs(3)
}
fn default_failcount() -> u32 {
    5
}
fn default_failover_timeout() -> Duration {
    Duration::from_secs(90)
}
fn default_switchover_timeout() -> Duration {
    Duration::from_secs(90)
}
fn default_master_failure_timeout() -> Duration {
    Duration::from_secs(10)
}
fn default_cooperative_lock_mode() -> CooperativeLockMode {
    CooperativeLockMode::None
}
fn default_master_conditions() -> u32 {
    (MasterConditions::COOPERATIVE_MASTER | MasterConditions::DISK_SPACE_OK).bits()
}
fn default_slave_conditions() -> u32 {
    SlaveConditions::empty().bits()
}
fn default_script_max_replication_lag() -> Option<u64> {
    None
}

/// Maps directly onto §6.2's table of recognized options.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MonitorConfig {
    pub servers: Vec<ServerEntry>,
    pub journal_path: String,

    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,

    #[serde(default)]
    pub assume_unique_hostnames: bool,
    #[serde(default = "default_failcount")]
    pub failcount: u32,

    #[serde(default)]
    pub auto_failover: bool,
    #[serde(default)]
    pub auto_rejoin: bool,
    #[serde(default)]
    pub switchover_on_low_disk_space: bool,
    #[serde(default)]
    pub enforce_read_only_slaves: bool,
    #[serde(default)]
    pub enforce_writable_master: bool,
    #[serde(default)]
    pub maintenance_on_low_disk_space: bool,
    #[serde(default)]
    pub enforce_simple_topology: bool,

    #[serde(default = "default_failover_timeout", with = "humantime_serde")]
    pub failover_timeout: Duration,
    #[serde(default = "default_switchover_timeout", with = "humantime_serde")]
    pub switchover_timeout: Duration,

    #[serde(default)]
    pub verify_master_failure: bool,
    #[serde(default = "default_master_failure_timeout", with = "humantime_serde")]
    pub master_failure_timeout: Duration,

    #[serde(default = "default_cooperative_lock_mode")]
    pub cooperative_monitoring_locks: CooperativeLockMode,

    #[serde(default = "default_master_conditions")]
    pub master_conditions: u32,
    #[serde(default = "default_slave_conditions")]
    pub slave_conditions: u32,

    #[serde(default)]
    pub servers_no_promotion: Vec<String>,

    #[serde(default)]
    pub promotion_sql_file: Option<String>,
    #[serde(default)]
    pub demotion_sql_file: Option<String>,

    #[serde(default = "default_handle_events")]
    pub handle_events: bool,

    #[serde(default)]
    pub replication_user: Option<String>,
    #[serde(default)]
    pub replication_password: Option<String>,
    #[serde(default)]
    pub replication_master_ssl: bool,
    #[serde(default)]
    pub replication_custom_options: Option<String>,

    #[serde(default = "default_script_max_replication_lag")]
    pub script_max_replication_lag: Option<u64>,

    /// A6: port the line-delimited command listener binds, if any. `None`
    /// disables the listener entirely.
    #[serde(default)]
    pub command_listener_port: Option<u16>,
}

fn default_handle_events() -> bool {
    true
}

impl MonitorConfig {
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file at '{path}'"))?;
        let mut config: MonitorConfig = toml::from_str(&contents)
            .with_context(|| format!("failed to parse TOML from '{path}'"))?;

        if config.enforce_simple_topology {
            config.auto_failover = true;
            config.auto_rejoin = true;
            config.enforce_writable_master = true;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.servers.is_empty() {
            return Err(anyhow!("at least one server must be configured"));
        }
        let mut names = std::collections::HashSet::new();
        for server in &self.servers {
            if server.name.trim().is_empty() {
                return Err(anyhow!("server name cannot be empty"));
            }
            if !names.insert(server.name.clone()) {
                return Err(anyhow!("duplicate server name '{}'", server.name));
            }
            if server.host.trim().is_empty() {
                return Err(anyhow!("server '{}' has an empty host", server.name));
            }
        }
        for excluded in &self.servers_no_promotion {
            if !names.contains(excluded) {
                return Err(anyhow!(
                    "servers_no_promotion references unknown server '{excluded}'"
                ));
            }
        }
        if self.interval.is_zero() {
            return Err(anyhow!("interval cannot be 0"));
        }
        if self.failcount == 0 {
            return Err(anyhow!("failcount cannot be 0"));
        }
        if self.journal_path.trim().is_empty() {
            return Err(anyhow!("journal_path cannot be empty"));
        }
        Ok(())
    }

    pub fn master_conditions(&self) -> MasterConditions {
        MasterConditions::from_bits_truncate(self.master_conditions)
    }

    pub fn slave_conditions(&self) -> SlaveConditions {
        SlaveConditions::from_bits_truncate(self.slave_conditions)
    }

    pub fn cooperative(&self) -> bool {
        self.cooperative_monitoring_locks != CooperativeLockMode::None
    }

    pub fn fresh_lock_state(&self) -> LockCoordinatorState {
        LockCoordinatorState::new()
    }
}

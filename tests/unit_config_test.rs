use replimon::config::MonitorConfig;
use std::io::Write;

fn write_config(body: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(body.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

const MINIMAL_VALID: &str = r#"
journal_path = "/tmp/replimon.journal"

[[servers]]
name = "n1"
host = "127.0.0.1"
port = 3306
"#;

#[test]
fn minimal_config_loads_with_documented_defaults() {
    let file = write_config(MINIMAL_VALID);
    let config = MonitorConfig::from_file(file.path().to_str().unwrap()).expect("should load");

    assert_eq!(config.interval, std::time::Duration::from_secs(2));
    assert_eq!(config.failcount, 5);
    assert!(!config.auto_failover);
    assert!(config.handle_events);
    assert_eq!(config.command_listener_port, None);
}

#[test]
fn empty_servers_list_is_rejected() {
    let file = write_config("journal_path = \"/tmp/j\"\nservers = []\n");
    let err = MonitorConfig::from_file(file.path().to_str().unwrap()).unwrap_err();
    assert!(err.to_string().contains("at least one server"));
}

#[test]
fn duplicate_server_names_are_rejected() {
    let body = r#"
journal_path = "/tmp/j"

[[servers]]
name = "n1"
host = "127.0.0.1"
port = 3306

[[servers]]
name = "n1"
host = "127.0.0.1"
port = 3307
"#;
    let file = write_config(body);
    let err = MonitorConfig::from_file(file.path().to_str().unwrap()).unwrap_err();
    assert!(err.to_string().contains("duplicate server name"));
}

#[test]
fn servers_no_promotion_must_reference_a_known_server() {
    let body = r#"
journal_path = "/tmp/j"
servers_no_promotion = ["ghost"]

[[servers]]
name = "n1"
host = "127.0.0.1"
port = 3306
"#;
    let file = write_config(body);
    let err = MonitorConfig::from_file(file.path().to_str().unwrap()).unwrap_err();
    assert!(err.to_string().contains("unknown server"));
}

#[test]
fn zero_interval_is_rejected() {
    let body = r#"
journal_path = "/tmp/j"
interval = "0s"

[[servers]]
name = "n1"
host = "127.0.0.1"
port = 3306
"#;
    let file = write_config(body);
    let err = MonitorConfig::from_file(file.path().to_str().unwrap()).unwrap_err();
    assert!(err.to_string().contains("interval"));
}

#[test]
fn zero_failcount_is_rejected() {
    let body = r#"
journal_path = "/tmp/j"
failcount = 0

[[servers]]
name = "n1"
host = "127.0.0.1"
port = 3306
"#;
    let file = write_config(body);
    let err = MonitorConfig::from_file(file.path().to_str().unwrap()).unwrap_err();
    assert!(err.to_string().contains("failcount"));
}

#[test]
fn empty_journal_path_is_rejected() {
    let body = r#"
journal_path = "   "

[[servers]]
name = "n1"
host = "127.0.0.1"
port = 3306
"#;
    let file = write_config(body);
    let err = MonitorConfig::from_file(file.path().to_str().unwrap()).unwrap_err();
    assert!(err.to_string().contains("journal_path"));
}

#[test]
fn enforce_simple_topology_turns_on_the_related_flags() {
    let body = r#"
journal_path = "/tmp/j"
enforce_simple_topology = true

[[servers]]
name = "n1"
host = "127.0.0.1"
port = 3306
"#;
    let file = write_config(body);
    let config = MonitorConfig::from_file(file.path().to_str().unwrap()).unwrap();

    assert!(config.auto_failover);
    assert!(config.auto_rejoin);
    assert!(config.enforce_writable_master);
}

#[test]
fn missing_file_is_an_error_not_a_panic() {
    let err = MonitorConfig::from_file("/nonexistent/replimon.toml").unwrap_err();
    assert!(err.to_string().contains("failed to read config file"));
}

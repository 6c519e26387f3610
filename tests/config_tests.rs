//! Configuration loading: files, environment overrides and validation.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use tempfile::NamedTempFile;

use hostplane::app::config::{ENV_CONTAINER_PREFIX, ENV_PROBE_SOCKET_TIMEOUT_MS};
use hostplane::app::Config;
use hostplane::cli::check;
use hostplane::domain::{NodeId, ServerStatus};
use hostplane::error::{ConfigError, Error};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create temp config");
    file.write_all(contents.as_bytes()).expect("write temp config");
    file
}

fn clear_env() {
    std::env::remove_var(ENV_CONTAINER_PREFIX);
    std::env::remove_var(ENV_PROBE_SOCKET_TIMEOUT_MS);
}

#[test]
fn example_config_loads() {
    let _guard = ENV_LOCK.lock().expect("env lock poisoned");
    clear_env();
    let file = write_config(include_str!("../config.toml.example"));

    let config = Config::load(file.path()).unwrap();

    assert_eq!(config.inventory.runners.len(), 2);
    assert_eq!(config.inventory.storage_nodes(), vec!["s1"]);
    assert_eq!(config.inventory.servers[0].status, ServerStatus::Offline);
    assert_eq!(
        config.relay.storage_paths.get(&NodeId::new("s1")),
        Some(&PathBuf::from("/srv/hostplane/s1"))
    );
    assert!(!config.archive.sweep_enabled);
}

#[test]
fn missing_file_is_a_read_error() {
    let err = Config::load("/nonexistent/hostplane.toml").unwrap_err();

    assert!(matches!(err, Error::Config(ConfigError::ReadFile(_))));
}

#[test]
fn malformed_toml_is_a_parse_error() {
    let file = write_config("[lifecycle\ngame_port = 1");

    let err = Config::load(file.path()).unwrap_err();

    assert!(matches!(err, Error::Config(ConfigError::Parse(_))));
}

#[test]
fn environment_overrides_file_values() {
    let _guard = ENV_LOCK.lock().expect("env lock poisoned");
    clear_env();
    std::env::set_var(ENV_CONTAINER_PREFIX, "staging-");
    std::env::set_var(ENV_PROBE_SOCKET_TIMEOUT_MS, "1500");

    let config = Config::parse(
        r#"
[lifecycle]
container_prefix = "prod-"

[probe]
socket_timeout_ms = 600
"#,
    );
    clear_env();

    let config = config.unwrap();
    assert_eq!(config.lifecycle.container_prefix, "staging-");
    assert_eq!(config.probe.socket_timeout_ms, 1500);
}

#[test]
fn non_numeric_environment_override_is_rejected() {
    let _guard = ENV_LOCK.lock().expect("env lock poisoned");
    clear_env();
    std::env::set_var(ENV_PROBE_SOCKET_TIMEOUT_MS, "soon");

    let result = Config::parse("");
    clear_env();

    assert!(matches!(
        result.unwrap_err(),
        Error::Config(ConfigError::InvalidValue {
            field: "probe.socket_timeout_ms",
            ..
        })
    ));
}

#[test]
fn unsupported_rpc_scheme_is_rejected() {
    let _guard = ENV_LOCK.lock().expect("env lock poisoned");
    clear_env();

    let err = Config::parse("[rpc]\nscheme = \"grpc\"\n").unwrap_err();

    assert!(matches!(
        err,
        Error::Config(ConfigError::InvalidValue {
            field: "rpc.scheme",
            ..
        })
    ));
}

#[test]
fn empty_handshake_host_is_rejected() {
    let _guard = ENV_LOCK.lock().expect("env lock poisoned");
    clear_env();

    let err = Config::parse("[probe]\nhandshake_host = \"\"\n").unwrap_err();

    assert!(matches!(
        err,
        Error::Config(ConfigError::MissingField {
            field: "probe.handshake_host"
        })
    ));
}

#[test]
fn check_command_accepts_example_config() {
    let _guard = ENV_LOCK.lock().expect("env lock poisoned");
    clear_env();
    let file = write_config(include_str!("../config.toml.example"));

    check::execute_config(file.path()).unwrap();
}

#[test]
fn check_command_reports_invalid_config() {
    let _guard = ENV_LOCK.lock().expect("env lock poisoned");
    clear_env();
    let file = write_config("[idle]\ntick_secs = 0\n");

    assert!(check::execute_config(file.path()).is_err());
}

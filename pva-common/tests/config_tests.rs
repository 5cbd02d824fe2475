//! Unit tests for configuration loading and graceful degradation
//!
//! Tests that manipulate PVA_* variables are marked #[serial] so they do not
//! race each other.

use pva_common::config::{load_config, load_toml_config, resolve_config_path, CompiledDefaults, TomlConfig};
use serial_test::serial;
use std::env;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

fn clear_env() {
    for key in [
        "PVA_CONFIG",
        "PVA_BIND_ADDRESS",
        "PVA_DATABASE_PATH",
        "PVA_LOG_LEVEL",
        "PVA_SOCRATA_APP_TOKEN",
        "PVA_MAX_CONCURRENCY",
    ] {
        env::remove_var(key);
    }
}

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_compiled_defaults() {
    let defaults = CompiledDefaults::for_current_platform();
    assert_eq!(defaults.log_level, "info");
    assert_eq!(defaults.bind_address, "127.0.0.1:5780");
    assert!(defaults.data_dir.ends_with("pva") || defaults.data_dir.ends_with("pva_data"));
}

#[test]
fn test_empty_toml_uses_defaults() {
    let file = write_config("");
    let config = load_toml_config(file.path()).unwrap();

    assert_eq!(config.logging.level, "info");
    assert_eq!(config.aggregation.max_concurrency, 16);
    assert_eq!(config.aggregation.finder_timeout(), Duration::from_secs(30));
    assert_eq!(config.aggregation.batch_deadline(), Some(Duration::from_secs(120)));
    assert!(config.aggregation.disabled_finders.is_empty());
    assert!(config.socrata.app_token.is_none());
}

#[test]
fn test_toml_values_are_read() {
    let file = write_config(
        r#"
bind_address = "0.0.0.0:9000"
database_path = "/tmp/pva-test.db"

[logging]
level = "debug"

[aggregation]
max_concurrency = 4
batch_deadline_secs = 0
disabled_finders = ["Baltimore City"]

[socrata]
app_token = "token-123"
"#,
    );
    let config = load_toml_config(file.path()).unwrap();

    assert_eq!(config.bind_address(), "0.0.0.0:9000");
    assert_eq!(config.database_path(), PathBuf::from("/tmp/pva-test.db"));
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.aggregation.max_concurrency, 4);
    assert_eq!(config.aggregation.batch_deadline(), None);
    assert_eq!(config.aggregation.disabled_finders, vec!["Baltimore City".to_string()]);
    assert_eq!(config.socrata.app_token.as_deref(), Some("token-123"));
}

#[test]
fn test_malformed_toml_is_config_error() {
    let file = write_config("bind_address = [not toml");
    let err = load_toml_config(file.path()).unwrap_err();
    assert!(matches!(err, pva_common::Error::Config(_)));
}

#[test]
#[serial]
fn test_malformed_toml_degrades_to_defaults() {
    clear_env();
    let file = write_config("this is = = not valid");
    let config = load_config(Some(file.path()));
    assert_eq!(config.aggregation.max_concurrency, 16);
}

#[test]
#[serial]
fn test_env_overrides_file_values() {
    clear_env();
    let file = write_config("[aggregation]\nmax_concurrency = 4\n");
    env::set_var("PVA_MAX_CONCURRENCY", "32");
    env::set_var("PVA_BIND_ADDRESS", "127.0.0.1:6000");

    let config = load_config(Some(file.path()));
    assert_eq!(config.aggregation.max_concurrency, 32);
    assert_eq!(config.bind_address(), "127.0.0.1:6000");

    clear_env();
}

#[test]
#[serial]
fn test_invalid_env_concurrency_is_ignored() {
    clear_env();
    env::set_var("PVA_MAX_CONCURRENCY", "zero");
    let mut config = TomlConfig::default();
    config.apply_env_overrides();
    assert_eq!(config.aggregation.max_concurrency, 16);
    clear_env();
}

#[test]
#[serial]
fn test_config_path_priority() {
    clear_env();
    let cli = PathBuf::from("/from/cli.toml");
    env::set_var("PVA_CONFIG", "/from/env.toml");

    assert_eq!(resolve_config_path(Some(&cli)), Some(cli.clone()));
    assert_eq!(resolve_config_path(None), Some(PathBuf::from("/from/env.toml")));

    clear_env();
}

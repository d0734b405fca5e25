//! Configuration resolution and atomic write tests
//!
//! Uses serial_test: tests touching MAGICWORD_CONFIG or MAGICWORD_API_KEY
//! run sequentially so they do not see each other's environment.

use std::env;
use std::path::PathBuf;

use mw_common::config::{
    load_config, resolve_config_path, write_toml_config, EmptyDuePolicy, TomlConfig,
    API_KEY_ENV_VAR, CONFIG_ENV_VAR,
};
use serial_test::serial;
use tempfile::TempDir;

#[test]
#[serial]
fn test_cli_path_beats_env_var() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/from-env.toml");

    let cli = PathBuf::from("/tmp/from-cli.toml");
    assert_eq!(resolve_config_path(Some(&cli)), Some(cli.clone()));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_env_var_used_without_cli_path() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/from-env.toml");

    assert_eq!(resolve_config_path(None), Some(PathBuf::from("/tmp/from-env.toml")));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_missing_explicit_file_falls_back_to_defaults() {
    env::remove_var(CONFIG_ENV_VAR);
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("nope.toml");

    let config = load_config(Some(&missing)).unwrap();
    assert_eq!(config, TomlConfig::default());
}

#[test]
#[serial]
fn test_env_api_key_overrides_file() {
    let mut config = TomlConfig::default();
    config.generation.api_key = Some("from-file".to_string());

    env::set_var(API_KEY_ENV_VAR, "from-env");
    assert_eq!(config.resolve_api_key(), Some("from-env".to_string()));

    env::set_var(API_KEY_ENV_VAR, "   ");
    assert_eq!(config.resolve_api_key(), Some("from-file".to_string()));

    env::remove_var(API_KEY_ENV_VAR);
    config.generation.api_key = None;
    assert_eq!(config.resolve_api_key(), None);
}

#[test]
#[serial]
fn test_write_then_load_round_trip() {
    env::remove_var(CONFIG_ENV_VAR);
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("nested").join("config.toml");

    let mut config = TomlConfig::default();
    config.root_folder = Some(PathBuf::from("/data/words"));
    config.generation.api_key = Some("key123".to_string());
    config.study.current_library_id = Some(2);
    config.study.empty_due_policy = EmptyDuePolicy::ReplayAll;
    config.catalog.base_url = Some("https://catalog.example.org".to_string());

    write_toml_config(&config, &target).unwrap();

    assert!(target.exists());
    assert!(!temp_dir.path().join("nested").join("config.toml.tmp").exists());

    let loaded = load_config(Some(&target)).unwrap();
    assert_eq!(loaded, config);
}

#[test]
#[cfg(unix)]
fn test_write_restricts_permissions() {
    use mw_common::config::check_toml_permissions_loose;
    use std::os::unix::fs::PermissionsExt;

    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("config.toml");
    write_toml_config(&TomlConfig::default(), &target).unwrap();

    let mode = std::fs::metadata(&target).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
    assert!(!check_toml_permissions_loose(&target).unwrap());
}

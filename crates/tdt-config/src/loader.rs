// Copyright 2025 TDT Queue Contributors
// SPDX-License-Identifier: Apache-2.0

//! Configuration file loading with override support
//!
//! Three tiers, later tiers win:
//! 1. TOML file (base defaults)
//! 2. Environment variables (runtime overrides)
//! 3. CLI arguments (explicit user overrides)

use crate::{validate_config, ConfigError, ConfigResult, TdtConfig};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAME: &str = "tdt_configuration.toml";

/// Find the configuration file
///
/// Search order:
/// 1. `TDT_CONFIG_PATH` environment variable
/// 2. Current working directory
/// 3. Up to 5 parent directories
///
/// # Errors
///
/// Returns `ConfigError::FileNotFound` if no config file is found in any location
pub fn find_config_file() -> ConfigResult<PathBuf> {
    if let Ok(env_path) = env::var("TDT_CONFIG_PATH") {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        return Err(ConfigError::FileNotFound(format!(
            "Config file specified by TDT_CONFIG_PATH not found: {}",
            path.display()
        )));
    }

    let mut search_paths = Vec::new();
    if let Ok(cwd) = env::current_dir() {
        search_paths.push(cwd.join(CONFIG_FILE_NAME));
        let mut current = cwd.clone();
        for _ in 0..5 {
            if let Some(parent) = current.parent() {
                search_paths.push(parent.join(CONFIG_FILE_NAME));
                current = parent.to_path_buf();
            }
        }
    }

    for path in &search_paths {
        if path.exists() {
            return Ok(path.clone());
        }
    }

    let search_list = search_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    Err(ConfigError::FileNotFound(format!(
        "'{}' not found in any of these locations:\n{}\n\nSet TDT_CONFIG_PATH to specify a custom location.",
        CONFIG_FILE_NAME, search_list
    )))
}

/// Load configuration from TOML file
///
/// # Arguments
///
/// * `config_path` - Optional path to config file. If `None`, will search for config file.
/// * `cli_args` - Optional CLI argument overrides
///
/// # Errors
///
/// Returns error if config file is not found, contains invalid TOML, or fails validation
pub fn load_config(
    config_path: Option<&Path>,
    cli_args: Option<&HashMap<String, String>>,
) -> ConfigResult<TdtConfig> {
    let config_file = match config_path {
        Some(path) => path.to_path_buf(),
        None => find_config_file()?,
    };

    let content = fs::read_to_string(&config_file)?;
    let mut config: TdtConfig = toml::from_str(&content)?;

    apply_environment_overrides(&mut config)?;
    if let Some(cli) = cli_args {
        apply_cli_overrides(&mut config, cli)?;
    }

    validate_config(&config)?;
    Ok(config)
}

/// Apply environment variable overrides to configuration
///
/// Supported environment variables:
/// - `TDT_QUEUE_POLL_INTERVAL_MS` -> `queue.poll_interval_ms`
/// - `TDT_QUEUE_DEFAULT_DEPTH` -> `queue.default_depth`
/// - `TDT_DEPLOYMENT_FORCE_MODE` -> `deployment.force_mode`
/// - `TDT_REGISTRY_STAGING` -> `registry.staging`
/// - `TDT_LOG_LEVEL` -> `logging.level`
pub fn apply_environment_overrides(config: &mut TdtConfig) -> ConfigResult<()> {
    if let Ok(value) = env::var("TDT_QUEUE_POLL_INTERVAL_MS") {
        config.queue.poll_interval_ms = parse_number("TDT_QUEUE_POLL_INTERVAL_MS", &value)?;
    }
    if let Ok(value) = env::var("TDT_QUEUE_DEFAULT_DEPTH") {
        config.queue.default_depth = parse_number("TDT_QUEUE_DEFAULT_DEPTH", &value)?;
    }
    if let Ok(value) = env::var("TDT_DEPLOYMENT_FORCE_MODE") {
        config.deployment.force_mode = value.to_lowercase();
    }
    if let Ok(value) = env::var("TDT_REGISTRY_STAGING") {
        config.registry.staging = value.to_lowercase();
    }
    if let Ok(value) = env::var("TDT_LOG_LEVEL") {
        config.logging.level = value;
    }
    Ok(())
}

/// Apply CLI argument overrides to configuration
///
/// # Arguments
///
/// * `config` - Configuration to modify
/// * `cli_args` - Map of CLI arguments (e.g., `{"poll_interval_ms": "2", "mode": "host"}`)
pub fn apply_cli_overrides(
    config: &mut TdtConfig,
    cli_args: &HashMap<String, String>,
) -> ConfigResult<()> {
    if let Some(value) = cli_args.get("poll_interval_ms") {
        config.queue.poll_interval_ms = parse_number("poll_interval_ms", value)?;
    }
    if let Some(value) = cli_args.get("default_depth") {
        config.queue.default_depth = parse_number("default_depth", value)?;
    }
    if let Some(value) = cli_args.get("mode") {
        config.deployment.force_mode = value.to_lowercase();
    }
    if let Some(value) = cli_args.get("staging") {
        config.registry.staging = value.to_lowercase();
    }
    if let Some(value) = cli_args.get("log_level") {
        config.logging.level = value.clone();
    }
    Ok(())
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> ConfigResult<T> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| ConfigError::InvalidValue(format!("{} = '{}' is not a valid number", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::tempdir;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_find_config_file_env_var() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("custom_config.toml");
        File::create(&config_path).unwrap();

        env::set_var("TDT_CONFIG_PATH", config_path.to_str().unwrap());
        let result = find_config_file();
        env::remove_var("TDT_CONFIG_PATH");

        assert_eq!(result.unwrap(), config_path);
    }

    #[test]
    fn test_find_config_file_env_var_missing() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        env::set_var("TDT_CONFIG_PATH", "/definitely/not/here/tdt.toml");
        let result = find_config_file();
        env::remove_var("TDT_CONFIG_PATH");

        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_minimal_config() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        env::remove_var("TDT_QUEUE_POLL_INTERVAL_MS");
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(CONFIG_FILE_NAME);

        let mut file = File::create(&config_path).unwrap();
        writeln!(file, "[queue]").unwrap();
        writeln!(file, "poll_interval_ms = 3").unwrap();
        writeln!(file, "[registry]").unwrap();
        writeln!(file, "staging = \"control_queue\"").unwrap();

        let config = load_config(Some(&config_path), None).unwrap();

        assert_eq!(config.queue.poll_interval_ms, 3);
        assert_eq!(config.registry.staging, "control_queue");
        assert_eq!(config.queue.max_name_len, 128);
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(CONFIG_FILE_NAME);

        let mut file = File::create(&config_path).unwrap();
        writeln!(file, "[queue]").unwrap();
        writeln!(file, "default_depth = 1").unwrap();

        let result = load_config(Some(&config_path), None);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_environment_overrides() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let mut config = TdtConfig::default();

        env::set_var("TDT_QUEUE_POLL_INTERVAL_MS", "7");
        env::set_var("TDT_DEPLOYMENT_FORCE_MODE", "HOST");
        let result = apply_environment_overrides(&mut config);
        env::remove_var("TDT_QUEUE_POLL_INTERVAL_MS");
        env::remove_var("TDT_DEPLOYMENT_FORCE_MODE");

        assert!(result.is_ok());
        assert_eq!(config.queue.poll_interval_ms, 7);
        assert_eq!(config.deployment.force_mode, "host");
    }

    #[test]
    fn test_environment_override_bad_number() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let mut config = TdtConfig::default();

        env::set_var("TDT_QUEUE_DEFAULT_DEPTH", "deep");
        let result = apply_environment_overrides(&mut config);
        env::remove_var("TDT_QUEUE_DEFAULT_DEPTH");

        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_override_precedence() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(CONFIG_FILE_NAME);

        let mut file = File::create(&config_path).unwrap();
        writeln!(file, "[deployment]").unwrap();
        writeln!(file, "force_mode = \"host\"").unwrap();
        writeln!(file, "[queue]").unwrap();
        writeln!(file, "poll_interval_ms = 4").unwrap();

        env::set_var("TDT_DEPLOYMENT_FORCE_MODE", "control_processor");
        env::set_var("TDT_QUEUE_POLL_INTERVAL_MS", "9");

        let mut cli_args = HashMap::new();
        cli_args.insert("mode".to_string(), "scheduler_peer".to_string());

        let config = load_config(Some(&config_path), Some(&cli_args)).unwrap();

        env::remove_var("TDT_DEPLOYMENT_FORCE_MODE");
        env::remove_var("TDT_QUEUE_POLL_INTERVAL_MS");

        // CLI wins for mode, env wins for poll interval (no CLI override)
        assert_eq!(config.deployment.force_mode, "scheduler_peer");
        assert_eq!(config.queue.poll_interval_ms, 9);
    }
}

// Copyright 2025 TDT Queue Contributors
// SPDX-License-Identifier: Apache-2.0

//! Configuration validation
//!
//! Catches values the driver would reject anyway (depth, name limit) and
//! strings that do not name a known deployment mode or staging store.

use crate::{ConfigError, ConfigResult, DeploymentConfig, RegistryConfig, TdtConfig};

/// Validation errors that can occur during config validation
#[derive(Debug, Clone)]
pub enum ConfigValidationError {
    OutOfRange { field: String, value: u64, min: u64 },
    MissingRequired { field: String },
    InvalidValue { field: String, reason: String },
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OutOfRange { field, value, min } => {
                write!(f, "{} = {} is below the minimum of {}", field, value, min)
            }
            Self::MissingRequired { field } => {
                write!(f, "Missing required configuration: {}", field)
            }
            Self::InvalidValue { field, reason } => {
                write!(f, "Invalid configuration value for {}: {}", field, reason)
            }
        }
    }
}

/// Validate the complete configuration
///
/// # Errors
///
/// Returns `ConfigError::ValidationError` listing every problem found
pub fn validate_config(config: &TdtConfig) -> ConfigResult<()> {
    let mut errors = Vec::new();

    validate_queue(config, &mut errors);
    validate_modes(config, &mut errors);
    validate_required_fields(config, &mut errors);

    if !errors.is_empty() {
        let error_messages = errors
            .iter()
            .map(|e| format!("  - {}", e))
            .collect::<Vec<_>>()
            .join("\n");

        return Err(ConfigError::ValidationError(format!(
            "Configuration validation failed:\n{}",
            error_messages
        )));
    }

    Ok(())
}

fn validate_queue(config: &TdtConfig, errors: &mut Vec<ConfigValidationError>) {
    let queue = &config.queue;
    if queue.min_depth < 2 {
        errors.push(ConfigValidationError::OutOfRange {
            field: "queue.min_depth".to_string(),
            value: queue.min_depth as u64,
            min: 2,
        });
    }
    if queue.default_depth < queue.min_depth.max(2) {
        errors.push(ConfigValidationError::OutOfRange {
            field: "queue.default_depth".to_string(),
            value: queue.default_depth as u64,
            min: queue.min_depth.max(2) as u64,
        });
    }
    if queue.poll_interval_ms == 0 {
        errors.push(ConfigValidationError::OutOfRange {
            field: "queue.poll_interval_ms".to_string(),
            value: 0,
            min: 1,
        });
    }
    if queue.max_name_len == 0 || queue.max_name_len > 128 {
        errors.push(ConfigValidationError::InvalidValue {
            field: "queue.max_name_len".to_string(),
            reason: format!("{} must be between 1 and 128", queue.max_name_len),
        });
    }
}

fn validate_modes(config: &TdtConfig, errors: &mut Vec<ConfigValidationError>) {
    if !DeploymentConfig::VALID_MODES.contains(&config.deployment.force_mode.as_str()) {
        errors.push(ConfigValidationError::InvalidValue {
            field: "deployment.force_mode".to_string(),
            reason: format!(
                "'{}' must be empty or one of host, control_processor, scheduler_peer",
                config.deployment.force_mode
            ),
        });
    }
    if !RegistryConfig::VALID_STAGING.contains(&config.registry.staging.as_str()) {
        errors.push(ConfigValidationError::InvalidValue {
            field: "registry.staging".to_string(),
            reason: format!(
                "'{}' must be one of auto, device_memory, control_queue",
                config.registry.staging
            ),
        });
    }
}

fn validate_required_fields(config: &TdtConfig, errors: &mut Vec<ConfigValidationError>) {
    if config.legacy.receive_prefix.is_empty() {
        errors.push(ConfigValidationError::MissingRequired {
            field: "legacy.receive_prefix".to_string(),
        });
    }
    if config.deployment.share_group_env.is_empty() {
        errors.push(ConfigValidationError::MissingRequired {
            field: "deployment.share_group_env".to_string(),
        });
    }
}

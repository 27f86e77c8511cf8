// Copyright 2025 TDT Queue Contributors
// SPDX-License-Identifier: Apache-2.0

//! Configuration type definitions
//!
//! Each struct maps to one section of `tdt_configuration.toml`. Every field
//! has a default so a partial file (or no file at all) is acceptable.

use serde::{Deserialize, Serialize};

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TdtConfig {
    pub queue: QueueConfig,
    pub deployment: DeploymentConfig,
    pub registry: RegistryConfig,
    pub legacy: LegacyConfig,
    pub logging: LoggingConfig,
}

/// Queue creation and data-plane polling
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Depth used when a channel is opened without an explicit depth
    pub default_depth: u32,
    /// Driver-imposed lower bound on queue depth
    pub min_depth: u32,
    /// Upper bound on queue names, in bytes
    pub max_name_len: usize,
    /// Sleep between enqueue/dequeue attempts while a queue is full/empty
    pub poll_interval_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            default_depth: 2,
            min_depth: 2,
            max_name_len: 128,
            poll_interval_ms: 1,
        }
    }
}

/// Deployment-mode detection
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DeploymentConfig {
    /// Environment variable whose presence selects the scheduler-peer topology on device
    pub share_group_env: String,
    /// Skip detection: "host", "control_processor" or "scheduler_peer" (empty = detect)
    pub force_mode: String,
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            share_group_env: "SHAREGROUP_PRECONFIG".to_string(),
            force_mode: String::new(),
        }
    }
}

impl DeploymentConfig {
    pub const VALID_MODES: &'static [&'static str] =
        &["", "host", "control_processor", "scheduler_peer"];
}

/// Route registry control messages
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Backing store for route staging buffers: "auto", "device_memory" or "control_queue"
    pub staging: String,
    /// Event id of queue-schedule control messages
    pub event_id: i32,
    /// Event group used when talking to the queue-schedule peer
    pub bind_group_id: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            staging: "auto".to_string(),
            event_id: 25,
            bind_group_id: 2,
        }
    }
}

impl RegistryConfig {
    pub const VALID_STAGING: &'static [&'static str] = &["auto", "device_memory", "control_queue"];
}

/// Legacy streaming channels
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LegacyConfig {
    /// Channel-name prefix marking a legacy receive channel
    pub receive_prefix: String,
}

impl Default for LegacyConfig {
    fn default() -> Self {
        Self {
            receive_prefix: "TF_RECEIVE_".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: TdtConfig = toml::from_str("[queue]\npoll_interval_ms = 5\n").unwrap();
        assert_eq!(config.queue.poll_interval_ms, 5);
        assert_eq!(config.queue.default_depth, 2);
        assert_eq!(config.legacy.receive_prefix, "TF_RECEIVE_");
        assert_eq!(config.deployment.share_group_env, "SHAREGROUP_PRECONFIG");
    }
}

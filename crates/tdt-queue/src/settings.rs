// Copyright 2025 TDT Queue Contributors
// SPDX-License-Identifier: Apache-2.0

//! Runtime settings consumed by the queue core
//!
//! Converted once from [`tdt_config::TdtConfig`]; the core never reads
//! files or environment variables for configuration.

use std::time::Duration;

use tdt_config::TdtConfig;

use crate::deployment::DeploymentMode;
use crate::error::{QueueError, Result};
use crate::staging::StagingStore;
use crate::types::{DEFAULT_QUEUE_DEPTH, MAX_QUEUE_NAME_LEN, MIN_QUEUE_DEPTH};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSettings {
    pub default_depth: u32,
    pub min_depth: u32,
    pub max_name_len: usize,
    pub poll_interval: Duration,
    /// Environment marker selecting the scheduler-peer topology on device
    pub share_group_env: String,
    /// Skip detection when set
    pub force_mode: Option<DeploymentMode>,
    /// `None` picks the per-mode default
    pub staging: Option<StagingStore>,
    pub event_id: i32,
    pub bind_group_id: u32,
    pub legacy_receive_prefix: String,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            default_depth: DEFAULT_QUEUE_DEPTH,
            min_depth: MIN_QUEUE_DEPTH,
            max_name_len: MAX_QUEUE_NAME_LEN,
            poll_interval: Duration::from_millis(1),
            share_group_env: "SHAREGROUP_PRECONFIG".to_string(),
            force_mode: None,
            staging: None,
            event_id: 25,
            bind_group_id: 2,
            legacy_receive_prefix: "TF_RECEIVE_".to_string(),
        }
    }
}

impl QueueSettings {
    pub fn from_config(config: &TdtConfig) -> Result<Self> {
        let force_mode = match config.deployment.force_mode.as_str() {
            "" => None,
            name => Some(DeploymentMode::parse(name).ok_or_else(|| {
                QueueError::InvalidArgument(format!("unknown deployment mode '{}'", name))
            })?),
        };
        let staging = match config.registry.staging.as_str() {
            "auto" => None,
            name => Some(StagingStore::parse(name).ok_or_else(|| {
                QueueError::InvalidArgument(format!("unknown staging store '{}'", name))
            })?),
        };

        Ok(Self {
            default_depth: config.queue.default_depth,
            min_depth: config.queue.min_depth,
            max_name_len: config.queue.max_name_len.min(MAX_QUEUE_NAME_LEN),
            poll_interval: Duration::from_millis(config.queue.poll_interval_ms.max(1)),
            share_group_env: config.deployment.share_group_env.clone(),
            force_mode,
            staging,
            event_id: config.registry.event_id,
            bind_group_id: config.registry.bind_group_id,
            legacy_receive_prefix: config.legacy.receive_prefix.clone(),
        })
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_force_mode(mut self, mode: DeploymentMode) -> Self {
        self.force_mode = Some(mode);
        self
    }

    pub fn with_staging(mut self, staging: StagingStore) -> Self {
        self.staging = Some(staging);
        self
    }
}

// Copyright 2025 TDT Queue Contributors
// SPDX-License-Identifier: Apache-2.0

//! Process-scoped entry point
//!
//! A [`QueueManager`] owns everything one process shares across channels:
//! the lazily selected [`QueueProcessor`] and the legacy transport
//! reference count. Tests build as many independent managers as they need.

use std::sync::Arc;

use once_cell::sync::OnceCell;
use tdt_config::TdtConfig;
use tracing::{info, warn};

use crate::adapter::Backend;
use crate::channel::ChannelHandle;
use crate::deployment::{self, DeploymentMode};
use crate::error::{QueueError, Result};
use crate::legacy::LegacySessions;
use crate::poll::PollPolicy;
use crate::processor::QueueProcessor;
use crate::settings::QueueSettings;
use crate::types::{DeviceId, QueueAttr, QueueId};

pub struct QueueManager {
    backend: Backend,
    settings: QueueSettings,
    processor: OnceCell<Arc<QueueProcessor>>,
    legacy: Arc<LegacySessions>,
}

impl QueueManager {
    pub fn new(backend: Backend, settings: QueueSettings) -> Self {
        let legacy = Arc::new(LegacySessions::new(backend.legacy.clone()));
        Self {
            backend,
            settings,
            processor: OnceCell::new(),
            legacy,
        }
    }

    pub fn from_config(backend: Backend, config: &TdtConfig) -> Result<Self> {
        Ok(Self::new(backend, QueueSettings::from_config(config)?))
    }

    pub fn settings(&self) -> &QueueSettings {
        &self.settings
    }

    /// The processor for this process, selected and built on first use
    pub fn processor(&self) -> Result<Arc<QueueProcessor>> {
        self.processor
            .get_or_try_init(|| {
                let mode = deployment::detect(self.backend.platform.as_ref(), &self.settings)?;
                QueueProcessor::new(mode, &self.backend, &self.settings).map(Arc::new)
            })
            .cloned()
    }

    pub fn deployment_mode(&self) -> Result<DeploymentMode> {
        Ok(self.processor()?.mode())
    }

    /// Create a new-protocol queue and wrap it in a handle
    pub fn create_queue_channel(&self, device: DeviceId, attr: &QueueAttr) -> Result<ChannelHandle> {
        let processor = self.processor()?;
        check_device(&processor, device)?;
        let queue_id = processor.create_queue(attr)?;
        Ok(ChannelHandle::queue(device, attr.name().to_string(), processor, queue_id, true))
    }

    pub fn create_channel_with_depth(&self, device: DeviceId, name: &str, depth: u32) -> Result<ChannelHandle> {
        self.create_queue_channel(device, &QueueAttr::new(name).with_depth(depth))
    }

    /// New-protocol queue at the configured default depth
    pub fn create_default_channel(&self, device: DeviceId, name: &str) -> Result<ChannelHandle> {
        self.create_channel_with_depth(device, name, self.settings.default_depth)
    }

    /// Attach to a queue another process created and granted to us
    pub fn open_channel(&self, device: DeviceId, name: &str, queue_id: QueueId, timeout_ms: i32) -> Result<ChannelHandle> {
        let processor = self.processor()?;
        check_device(&processor, device)?;
        let mask = processor.attach(queue_id, timeout_ms)?;
        info!("[MANAGER] Opened queue {} as '{}' with {:?}", queue_id, name, mask);
        Ok(ChannelHandle::queue(device, name.to_string(), processor, queue_id, false))
    }

    /// Open a legacy streaming channel
    ///
    /// Names carrying the receive prefix become receive channels that pop
    /// from the suffix. The first legacy channel starts the transport.
    pub fn create_channel(&self, device: DeviceId, name: &str) -> Result<ChannelHandle> {
        if name.is_empty() || name.len() >= self.settings.max_name_len {
            return Err(QueueError::InvalidArgument(format!(
                "legacy channel name '{}' must be 1..{} bytes",
                name,
                self.settings.max_name_len.saturating_sub(1)
            )));
        }

        let recv_name = name
            .strip_prefix(self.settings.legacy_receive_prefix.as_str())
            .filter(|suffix| !suffix.is_empty())
            .map(str::to_string);

        self.legacy.open(device, name)?;
        if recv_name.is_some() {
            if let Err(e) = self.legacy.transport().prepare_pop() {
                if let Err(cleanup) = self.legacy.close(name) {
                    warn!("[MANAGER] Could not release legacy channel '{}': {}", name, cleanup);
                }
                return Err(QueueError::from_driver("legacy prepare pop", None, e));
            }
        }

        info!("[MANAGER] Opened legacy channel '{}' (receive: {})", name, recv_name.is_some());
        Ok(ChannelHandle::legacy(
            device,
            name.to_string(),
            recv_name,
            self.legacy.clone(),
            PollPolicy::new(self.settings.poll_interval),
        ))
    }

    pub fn legacy_sessions(&self) -> &Arc<LegacySessions> {
        &self.legacy
    }

    /// Release process-wide resources still held
    pub fn shutdown(&self) -> Result<()> {
        if self.legacy.is_started() {
            warn!(
                "[MANAGER] Shutting down with {} legacy channel(s) still open",
                self.legacy.open_count()
            );
        }
        self.legacy.shutdown()
    }
}

fn check_device(processor: &QueueProcessor, device: DeviceId) -> Result<()> {
    if processor.device() != device {
        return Err(QueueError::InvalidArgument(format!(
            "device {} does not match this process's device {}",
            device,
            processor.device()
        )));
    }
    Ok(())
}

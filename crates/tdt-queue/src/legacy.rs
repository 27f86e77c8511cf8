// Copyright 2025 TDT Queue Contributors
// SPDX-License-Identifier: Apache-2.0

//! Legacy push/pop streaming transport
//!
//! Older peers exchange batches of string-typed tensor items over named
//! channels. The transport is started with the first legacy channel in a
//! process and torn down when the last one closes.

use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::{DriverError, QueueError, Result};
use crate::types::DeviceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LegacyItemKind {
    Tensor,
    EndOfSequence,
    Abnormal,
}

/// One item on the legacy wire: shape and dtype travel as strings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyItem {
    pub kind: LegacyItemKind,
    pub tensor_shape: String,
    pub tensor_type: String,
    pub data: Vec<u8>,
}

pub trait LegacyTransport: Send + Sync {
    fn init(&self, device: DeviceId) -> std::result::Result<(), DriverError>;

    /// Hook run before a receive channel starts popping
    fn prepare_pop(&self) -> std::result::Result<(), DriverError>;

    fn push(&self, channel: &str, items: &[LegacyItem]) -> std::result::Result<(), DriverError>;

    /// Next batch on `channel`; `QueueEmpty` when none is ready
    fn pop(&self, channel: &str) -> std::result::Result<Vec<LegacyItem>, DriverError>;

    /// Ask the sender side of `channel` to stop
    fn stop(&self, channel: &str) -> std::result::Result<(), DriverError>;

    fn destroy(&self) -> std::result::Result<(), DriverError>;
}

/// Process-wide reference count of open legacy channels
pub struct LegacySessions {
    transport: Arc<dyn LegacyTransport>,
    open: Mutex<AHashMap<String, usize>>,
}

impl LegacySessions {
    pub fn new(transport: Arc<dyn LegacyTransport>) -> Self {
        Self {
            transport,
            open: Mutex::new(AHashMap::new()),
        }
    }

    pub fn transport(&self) -> &Arc<dyn LegacyTransport> {
        &self.transport
    }

    /// Register a channel, starting the transport if it is the first one
    pub fn open(&self, device: DeviceId, name: &str) -> Result<()> {
        let mut open = self.open.lock();
        if open.is_empty() {
            self.transport
                .init(device)
                .map_err(|e| QueueError::from_driver("legacy transport init", None, e))?;
            info!("[LEGACY] Transport started on device {}", device);
        }
        *open.entry(name.to_string()).or_insert(0) += 1;
        debug!("[LEGACY] Opened channel '{}' ({} channel name(s) open)", name, open.len());
        Ok(())
    }

    /// Drop a channel; the last one out tears the transport down
    pub fn close(&self, name: &str) -> Result<()> {
        let mut open = self.open.lock();
        match open.get_mut(name) {
            Some(count) if *count > 1 => *count -= 1,
            Some(_) => {
                open.remove(name);
            }
            None => {
                return Err(QueueError::NotFound(format!("legacy channel '{}' is not open", name)));
            }
        }

        if open.is_empty() {
            self.transport
                .destroy()
                .map_err(|e| QueueError::from_driver("legacy transport destroy", None, e))?;
            info!("[LEGACY] Last channel closed, transport destroyed");
        }
        Ok(())
    }

    pub fn open_count(&self) -> usize {
        self.open.lock().values().sum()
    }

    pub fn is_started(&self) -> bool {
        !self.open.lock().is_empty()
    }

    /// Tear down regardless of open channels
    pub fn shutdown(&self) -> Result<()> {
        let mut open = self.open.lock();
        if open.is_empty() {
            return Ok(());
        }
        open.clear();
        self.transport
            .destroy()
            .map_err(|e| QueueError::from_driver("legacy transport destroy", None, e))
    }
}

// Copyright 2025 TDT Queue Contributors
// SPDX-License-Identifier: Apache-2.0

//! Queue driver wrapper
//!
//! Binds a [`QueueDriver`] to one device, latches the per-device init, and
//! translates every [`DriverError`] into [`QueueError`] with the operation
//! name attached. Stateless apart from the init latch.

use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::{debug, error};

use crate::adapter::QueueDriver;
use crate::error::{QueueError, Result};
use crate::types::{DeviceId, Pid, PermissionMask, QueueAttr, QueueId, Timeout};

pub struct QueueDriverAdapter {
    driver: Arc<dyn QueueDriver>,
    device: DeviceId,
    initialized: OnceCell<()>,
}

impl QueueDriverAdapter {
    pub fn new(driver: Arc<dyn QueueDriver>, device: DeviceId) -> Self {
        Self {
            driver,
            device,
            initialized: OnceCell::new(),
        }
    }

    pub fn device(&self) -> DeviceId {
        self.device
    }

    /// Run the driver's per-device init once; later calls are free
    pub fn ensure_init(&self) -> Result<()> {
        self.initialized
            .get_or_try_init(|| {
                debug!("[DRIVER] Initializing queue driver on device {}", self.device);
                self.driver.init(self.device).map_err(|e| {
                    error!("[DRIVER] Init failed on device {}: {}", self.device, e);
                    QueueError::from_driver("init", None, e)
                })
            })
            .map(|_| ())
    }

    pub fn create(&self, attr: &QueueAttr) -> Result<QueueId> {
        self.ensure_init()?;
        self.driver
            .create(self.device, attr)
            .map_err(|e| QueueError::from_driver("create", None, e))
    }

    pub fn destroy(&self, queue_id: QueueId) -> Result<()> {
        self.driver
            .destroy(self.device, queue_id)
            .map_err(|e| QueueError::from_driver("destroy", Some(queue_id), e))
    }

    /// Single enqueue attempt
    pub fn try_enqueue(&self, queue_id: QueueId, buf: &[u8]) -> Result<()> {
        self.driver
            .enqueue(self.device, queue_id, buf)
            .map_err(|e| QueueError::from_driver("enqueue", Some(queue_id), e))
    }

    /// Single dequeue attempt
    pub fn try_dequeue(&self, queue_id: QueueId) -> Result<Vec<u8>> {
        self.driver
            .dequeue(self.device, queue_id)
            .map_err(|e| QueueError::from_driver("dequeue", Some(queue_id), e))
    }

    pub fn peek(&self, queue_id: QueueId, timeout: Timeout) -> Result<usize> {
        self.driver
            .peek(self.device, queue_id, timeout.as_raw())
            .map_err(|e| QueueError::from_driver("peek", Some(queue_id), e))
    }

    /// Attach, then read back the granted permission bits
    pub fn attach(&self, queue_id: QueueId, timeout: Timeout) -> Result<PermissionMask> {
        self.ensure_init()?;
        self.driver
            .attach(self.device, queue_id, timeout.as_raw())
            .map_err(|e| QueueError::from_driver("attach", Some(queue_id), e))?;
        self.query_permission(queue_id)
    }

    pub fn grant(&self, queue_id: QueueId, pid: Pid, mask: PermissionMask, timeout: Timeout) -> Result<()> {
        self.driver
            .grant(self.device, queue_id, pid, mask, timeout.as_raw())
            .map_err(|e| QueueError::from_driver("grant", Some(queue_id), e))
    }

    pub fn query_permission(&self, queue_id: QueueId) -> Result<PermissionMask> {
        self.driver
            .query_permission(self.device, queue_id)
            .map_err(|e| QueueError::from_driver("query permission", Some(queue_id), e))
    }
}

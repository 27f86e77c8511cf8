// Copyright 2025 TDT Queue Contributors
// SPDX-License-Identifier: Apache-2.0

//! Control-processor topology
//!
//! One well-known control processor receives manage, dequeue and enqueue
//! rights on every queue this process creates or attaches to.

use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::{debug, info};

use super::PermissionCoordinator;
use crate::adapter::Platform;
use crate::deployment::{DeploymentMode, PeerKind};
use crate::driver::QueueDriverAdapter;
use crate::error::{QueueError, Result};
use crate::types::{Pid, PermissionMask, QueueId, Timeout};

pub struct ControlProcessorCoordinator {
    driver: Arc<QueueDriverAdapter>,
    platform: Arc<dyn Platform>,
    cp_pid: OnceCell<Pid>,
}

impl ControlProcessorCoordinator {
    pub fn new(driver: Arc<QueueDriverAdapter>, platform: Arc<dyn Platform>) -> Self {
        Self {
            driver,
            platform,
            cp_pid: OnceCell::new(),
        }
    }

    fn control_processor_pid(&self) -> Result<Pid> {
        self.cp_pid
            .get_or_try_init(|| {
                let pid = self
                    .platform
                    .peer_pid(self.driver.device(), PeerKind::ControlProcessor)
                    .map_err(|e| QueueError::from_driver("control processor lookup", None, e))?;
                debug!("[COORD-CP] Control processor pid is {}", pid);
                Ok(pid)
            })
            .copied()
    }

    fn grant_control_processor(&self, queue_id: QueueId) -> Result<()> {
        let cp_pid = self.control_processor_pid()?;
        self.driver
            .grant(queue_id, cp_pid, PermissionMask::all(), Timeout::Infinite)?;
        debug!("[COORD-CP] Granted queue {} to control processor {}", queue_id, cp_pid);
        Ok(())
    }
}

impl PermissionCoordinator for ControlProcessorCoordinator {
    fn mode(&self) -> DeploymentMode {
        DeploymentMode::ControlProcessor
    }

    fn on_created(&self, queue_id: QueueId) -> Result<()> {
        self.grant_control_processor(queue_id)
    }

    fn grant(&self, queue_id: QueueId, pid: Pid, mask: PermissionMask, timeout: Timeout) -> Result<()> {
        self.driver.grant(queue_id, pid, mask, timeout)?;
        info!("[COORD-CP] Granted queue {} to pid {} ({:?})", queue_id, pid, mask);
        Ok(())
    }

    fn attach(&self, queue_id: QueueId, timeout: Timeout) -> Result<PermissionMask> {
        let mask = self.driver.attach(queue_id, timeout)?;
        self.grant_control_processor(queue_id)?;
        info!("[COORD-CP] Attached to queue {} with {:?}", queue_id, mask);
        Ok(mask)
    }
}

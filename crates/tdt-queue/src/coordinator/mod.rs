// Copyright 2025 TDT Queue Contributors
// SPDX-License-Identifier: Apache-2.0

//! Permission coordination per deployment mode
//!
//! All three variants answer the same questions (what happens after create,
//! how to grant, how to attach) under different trust topologies.

mod control_processor;
mod host;
mod scheduler_peer;

pub use control_processor::ControlProcessorCoordinator;
pub use host::HostCoordinator;
pub use scheduler_peer::{resolve_group_action, GroupAction, SchedulerPeerCoordinator};

use std::sync::Arc;

use crate::adapter::Platform;
use crate::deployment::DeploymentMode;
use crate::driver::QueueDriverAdapter;
use crate::error::Result;
use crate::types::{Pid, PermissionMask, QueueId, Timeout};

pub trait PermissionCoordinator: Send + Sync {
    fn mode(&self) -> DeploymentMode;

    /// Hook run right after the driver created a queue
    fn on_created(&self, queue_id: QueueId) -> Result<()>;

    fn grant(&self, queue_id: QueueId, pid: Pid, mask: PermissionMask, timeout: Timeout) -> Result<()>;

    fn attach(&self, queue_id: QueueId, timeout: Timeout) -> Result<PermissionMask>;
}

/// Build the coordinator for `mode`
pub fn for_mode(
    mode: DeploymentMode,
    driver: Arc<QueueDriverAdapter>,
    platform: Arc<dyn Platform>,
) -> Box<dyn PermissionCoordinator> {
    match mode {
        DeploymentMode::Host => Box::new(HostCoordinator::new()),
        DeploymentMode::ControlProcessor => Box::new(ControlProcessorCoordinator::new(driver, platform)),
        DeploymentMode::SchedulerPeer => Box::new(SchedulerPeerCoordinator::new(driver, platform)),
    }
}

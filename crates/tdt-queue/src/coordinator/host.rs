// Copyright 2025 TDT Queue Contributors
// SPDX-License-Identifier: Apache-2.0

//! Host-only queues: nothing to coordinate

use super::PermissionCoordinator;
use crate::deployment::DeploymentMode;
use crate::error::{QueueError, Result};
use crate::types::{Pid, PermissionMask, QueueId, Timeout};

#[derive(Debug, Default)]
pub struct HostCoordinator;

impl HostCoordinator {
    pub fn new() -> Self {
        Self
    }
}

impl PermissionCoordinator for HostCoordinator {
    fn mode(&self) -> DeploymentMode {
        DeploymentMode::Host
    }

    fn on_created(&self, _queue_id: QueueId) -> Result<()> {
        Ok(())
    }

    fn grant(&self, queue_id: QueueId, pid: Pid, _mask: PermissionMask, _timeout: Timeout) -> Result<()> {
        Err(QueueError::NotSupported(format!(
            "grant of queue {} to pid {} in host mode",
            queue_id, pid
        )))
    }

    fn attach(&self, queue_id: QueueId, _timeout: Timeout) -> Result<PermissionMask> {
        Err(QueueError::NotSupported(format!("attach to queue {} in host mode", queue_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cross_process_calls_not_supported() {
        let host = HostCoordinator::new();
        assert!(host.on_created(QueueId(1)).is_ok());
        assert!(matches!(
            host.grant(QueueId(1), 42, PermissionMask::ENQUEUE, Timeout::Infinite),
            Err(QueueError::NotSupported(_))
        ));
        assert!(matches!(
            host.attach(QueueId(1), Timeout::Infinite),
            Err(QueueError::NotSupported(_))
        ));
    }
}

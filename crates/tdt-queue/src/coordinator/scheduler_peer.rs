// Copyright 2025 TDT Queue Contributors
// SPDX-License-Identifier: Apache-2.0

//! Scheduler-peer topology with process groups
//!
//! Granting a queue requires grantor and grantee to share a process group.
//! A process belongs to at most one group; the first grant from a process
//! with no group creates one named after the grantee. A process that created
//! a group is the master side and may not attach as a peer.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, info};

use super::PermissionCoordinator;
use crate::adapter::Platform;
use crate::deployment::DeploymentMode;
use crate::driver::QueueDriverAdapter;
use crate::error::{QueueError, Result};
use crate::types::{Pid, PermissionMask, QueueId, Timeout};

/// Group step required before a grant
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupAction {
    /// Neither side has a group: create one and join both
    Create,
    /// Grantor's group exists, grantee joins it
    Join(String),
    /// Both already share this group
    Shared(String),
}

/// Decision table over (grantor group, grantee group)
pub fn resolve_group_action(grantor: Option<&str>, grantee: Option<&str>) -> Result<GroupAction> {
    match (grantor, grantee) {
        (None, None) => Ok(GroupAction::Create),
        (None, Some(theirs)) => Err(QueueError::PermissionDenied(format!(
            "grantee already belongs to group '{}' and the grantor has none",
            theirs
        ))),
        (Some(ours), None) => Ok(GroupAction::Join(ours.to_string())),
        (Some(ours), Some(theirs)) if ours == theirs => Ok(GroupAction::Shared(ours.to_string())),
        (Some(ours), Some(theirs)) => Err(QueueError::PermissionDenied(format!(
            "grantor group '{}' differs from grantee group '{}'",
            ours, theirs
        ))),
    }
}

/// Group name derived from the first grantee
pub fn group_name_for(pid: Pid) -> String {
    format!("tdt_grp_{}", pid)
}

pub struct SchedulerPeerCoordinator {
    driver: Arc<QueueDriverAdapter>,
    platform: Arc<dyn Platform>,
    /// Group this process created, if any
    owned_group: Mutex<Option<String>>,
}

impl SchedulerPeerCoordinator {
    pub fn new(driver: Arc<QueueDriverAdapter>, platform: Arc<dyn Platform>) -> Self {
        Self {
            driver,
            platform,
            owned_group: Mutex::new(None),
        }
    }

    pub fn owned_group(&self) -> Option<String> {
        self.owned_group.lock().clone()
    }

    fn group_of(&self, pid: Pid) -> Result<Option<String>> {
        self.platform
            .query_group(pid)
            .map_err(|e| QueueError::from_driver("group query", None, e))
    }

    fn add_member(&self, group: &str, pid: Pid) -> Result<()> {
        self.platform
            .add_group_member(group, pid)
            .map_err(|e| QueueError::from_driver("group add", None, e))
    }

    fn ensure_shared_group(&self, grantee: Pid) -> Result<()> {
        let me = self.platform.current_pid();
        let mut owned = self.owned_group.lock();

        let grantor_group = match owned.clone() {
            Some(group) => Some(group),
            None => self.group_of(me)?,
        };
        let grantee_group = self.group_of(grantee)?;

        let action = resolve_group_action(grantor_group.as_deref(), grantee_group.as_deref()).map_err(|e| {
            error!("[COORD-QS] Cannot grant to pid {}: {}", grantee, e);
            e
        })?;

        match action {
            GroupAction::Create => {
                let group = group_name_for(grantee);
                self.platform
                    .create_group(&group)
                    .map_err(|e| QueueError::from_driver("group create", None, e))?;
                // Owned from here on: a failed join below is retried as a join
                *owned = Some(group.clone());
                self.add_member(&group, grantee)?;
                self.join_owned_group(&group, me)?;
                info!("[COORD-QS] Created group '{}' with pids {} and {}", group, me, grantee);
            }
            GroupAction::Join(group) => {
                if owned.as_deref() == Some(group.as_str()) {
                    self.join_owned_group(&group, me)?;
                }
                self.add_member(&group, grantee)?;
                info!("[COORD-QS] Added pid {} to group '{}'", grantee, group);
            }
            GroupAction::Shared(group) => {
                if owned.as_deref() == Some(group.as_str()) {
                    self.join_owned_group(&group, me)?;
                }
                debug!("[COORD-QS] Pid {} already in group '{}'", grantee, group);
            }
        }
        Ok(())
    }

    /// Add this process to the group it created unless it is already in
    fn join_owned_group(&self, group: &str, me: Pid) -> Result<()> {
        if self.group_of(me)?.as_deref() == Some(group) {
            return Ok(());
        }
        self.add_member(group, me)
    }
}

impl PermissionCoordinator for SchedulerPeerCoordinator {
    fn mode(&self) -> DeploymentMode {
        DeploymentMode::SchedulerPeer
    }

    fn on_created(&self, _queue_id: QueueId) -> Result<()> {
        Ok(())
    }

    fn grant(&self, queue_id: QueueId, pid: Pid, mask: PermissionMask, timeout: Timeout) -> Result<()> {
        self.ensure_shared_group(pid)?;
        self.driver.grant(queue_id, pid, mask, timeout)?;
        info!("[COORD-QS] Granted queue {} to pid {} ({:?})", queue_id, pid, mask);
        Ok(())
    }

    fn attach(&self, queue_id: QueueId, timeout: Timeout) -> Result<PermissionMask> {
        if let Some(group) = self.owned_group() {
            return Err(QueueError::AlreadyExists(format!(
                "this process created group '{}' and cannot attach to queue {} as a peer",
                group, queue_id
            )));
        }
        let mask = self.driver.attach(queue_id, timeout)?;
        info!("[COORD-QS] Attached to queue {} with {:?}", queue_id, mask);
        Ok(mask)
    }
}

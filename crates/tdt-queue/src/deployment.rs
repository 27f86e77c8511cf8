// Copyright 2025 TDT Queue Contributors
// SPDX-License-Identifier: Apache-2.0

//! Deployment-mode detection
//!
//! Selection is a pure function of the run mode and the share-group
//! environment marker; [`detect`] only gathers those two inputs.

use std::fmt;

use tracing::{debug, info};

use crate::adapter::Platform;
use crate::error::{QueueError, Result};
use crate::settings::QueueSettings;

/// Where the calling process runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunMode {
    Host,
    Device,
}

/// Well-known processes the platform can locate by role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerKind {
    /// Control processor that owns grants in the control-processor topology
    ControlProcessor,
    /// Queue-schedule process that owns the route table
    QueueSchedule,
}

/// Trust topology of the current process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeploymentMode {
    /// Queues are local to the host process
    Host,
    /// A fixed control processor is granted every queue ("mdc")
    ControlProcessor,
    /// Full grant protocol with process groups ("ccpu")
    SchedulerPeer,
}

impl DeploymentMode {
    /// Pure selection rule
    pub fn select(run_mode: RunMode, share_group_preconfigured: bool) -> Self {
        match (run_mode, share_group_preconfigured) {
            (RunMode::Host, _) => DeploymentMode::Host,
            (RunMode::Device, true) => DeploymentMode::SchedulerPeer,
            (RunMode::Device, false) => DeploymentMode::ControlProcessor,
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "host" => Some(DeploymentMode::Host),
            "control_processor" => Some(DeploymentMode::ControlProcessor),
            "scheduler_peer" => Some(DeploymentMode::SchedulerPeer),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentMode::Host => "host",
            DeploymentMode::ControlProcessor => "control_processor",
            DeploymentMode::SchedulerPeer => "scheduler_peer",
        }
    }
}

impl fmt::Display for DeploymentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detect the mode for this process, honoring a forced mode from settings
pub fn detect(platform: &dyn Platform, settings: &QueueSettings) -> Result<DeploymentMode> {
    if let Some(forced) = settings.force_mode {
        info!("[DEPLOY] Using forced deployment mode {}", forced);
        return Ok(forced);
    }

    let run_mode = platform
        .run_mode()
        .map_err(|e| QueueError::Deployment(format!("run mode query failed: {}", e)))?;
    let marker = platform.env_var(&settings.share_group_env).is_some();
    debug!(
        "[DEPLOY] run_mode={:?}, {} present={}",
        run_mode,
        settings.share_group_env,
        marker
    );

    let mode = DeploymentMode::select(run_mode, marker);
    info!("[DEPLOY] Detected deployment mode {}", mode);
    Ok(mode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_table() {
        assert_eq!(DeploymentMode::select(RunMode::Host, false), DeploymentMode::Host);
        assert_eq!(DeploymentMode::select(RunMode::Host, true), DeploymentMode::Host);
        assert_eq!(
            DeploymentMode::select(RunMode::Device, false),
            DeploymentMode::ControlProcessor
        );
        assert_eq!(
            DeploymentMode::select(RunMode::Device, true),
            DeploymentMode::SchedulerPeer
        );
    }

    #[test]
    fn test_parse_round_trip_names() {
        for mode in [
            DeploymentMode::Host,
            DeploymentMode::ControlProcessor,
            DeploymentMode::SchedulerPeer,
        ] {
            assert_eq!(DeploymentMode::parse(mode.as_str()), Some(mode));
        }
        assert_eq!(DeploymentMode::parse("HOST"), Some(DeploymentMode::Host));
        assert_eq!(DeploymentMode::parse("cluster"), None);
    }
}

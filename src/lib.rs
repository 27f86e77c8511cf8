// Copyright 2025 TDT Queue Contributors
// SPDX-License-Identifier: Apache-2.0

//! # TDT - Tensor Data Transfer queues
//!
//! Named, depth-bounded queues shared between a host process, device-side
//! compute processes and a control-plane queue scheduler. This crate
//! re-exports the workspace members so most users depend on `tdt` alone.
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! tdt = "0.3"
//! ```
//!
//! ## Feature Flags
//! - **`sim`** (default): in-process simulated device, used by tests and the
//!   `queue_sim` tool
//! - **`file-logging`**: daily-rotated JSON logs alongside console output
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tdt::prelude::*;
//! use tdt::queue::sim::SimDevice;
//!
//! let device = SimDevice::new();
//! let manager = QueueManager::new(device.backend(100, RunMode::Host), QueueSettings::default());
//! let channel = manager.create_channel_with_depth(0, "frames", 4)?;
//! channel.send(b"payload", -1)?;
//! assert_eq!(channel.receive(-1)?, b"payload");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Foundation: tdt-config, tdt-observability              │
//! │  (TOML settings, logging setup)                         │
//! └─────────────────────────────────────────────────────────┘
//!                         ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │  Core: tdt-queue                                        │
//! │  (processor, coordinators, route registry, channels)    │
//! └─────────────────────────────────────────────────────────┘
//!                         ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │  Adapters: driver, control transport, allocator,        │
//! │  platform, legacy transport (device or `sim`)           │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub use tdt_config as config;
pub use tdt_observability as observability;
pub use tdt_queue as queue;

/// Prelude - commonly used types and traits
pub mod prelude {
    pub use crate::queue::{
        Backend, ChannelHandle, ChannelProtocol, DataItem, DataType, Dataset, DeploymentMode, PermissionMask,
        QueueAttr, QueueError, QueueId, QueueManager, QueueProcessor, QueueSettings, Route, RouteList, RouteQuery,
        RunMode, StagingStore,
    };

    pub use crate::config::{load_config, TdtConfig};
}

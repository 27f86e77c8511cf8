// Copyright 2025 TDT Queue Contributors
// SPDX-License-Identifier: Apache-2.0

//! # tdt-queue
//!
//! Cross-process named queues between a host process, device-resident
//! compute processes and a control-plane scheduler.
//!
//! ## Architecture
//!
//! - **Adapters** ([`adapter`]): narrow traits over the device queue driver,
//!   the event-scheduling transport, shared-memory allocation, platform
//!   discovery and the legacy transport
//! - **Coordinators** ([`coordinator`]): grant/attach rules for the host,
//!   control-processor and scheduler-peer deployment modes
//! - **Route registry** ([`registry`]): bind, unbind and query routes held by
//!   the remote scheduler
//! - **Processor** ([`processor`]): one per process; control-plane calls under
//!   a re-entrant lock, data-plane calls polled under per-queue locks
//! - **Manager and channels** ([`manager`], [`channel`]): process-scoped entry
//!   point and the client-visible handles
//!
//! ## Features
//! - `sim`: in-process simulated device implementing every adapter
//!
//! ## Example
//!
//! ```rust,ignore
//! use tdt_queue::sim::SimDevice;
//! use tdt_queue::{QueueManager, QueueSettings, RunMode};
//!
//! let device = SimDevice::new();
//! let manager = QueueManager::new(device.backend(100, RunMode::Device), QueueSettings::default());
//! let channel = manager.create_channel_with_depth(0, "frames", 4)?;
//! channel.send(b"payload", -1)?;
//! ```

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod adapter;
pub mod channel;
pub mod control;
pub mod coordinator;
pub mod dataset;
pub mod deployment;
pub mod driver;
pub mod error;
pub mod legacy;
pub mod locks;
pub mod manager;
pub mod poll;
pub mod processor;
pub mod registry;
pub mod settings;
pub mod staging;
pub mod types;
pub mod wire;

#[cfg(feature = "sim")]
pub mod sim;

pub use adapter::{Backend, BufferAllocator, BufferHandle, ControlEvent, ControlTransport, Platform, QueueDriver};
pub use channel::{ChannelHandle, ChannelProtocol};
pub use coordinator::PermissionCoordinator;
pub use dataset::{DataItem, DataType, Dataset, ItemKind};
pub use deployment::{DeploymentMode, PeerKind, RunMode};
pub use error::{DriverError, QueueError, Result};
pub use legacy::{LegacyItem, LegacyItemKind, LegacyTransport};
pub use manager::QueueManager;
pub use processor::QueueProcessor;
pub use settings::QueueSettings;
pub use staging::StagingStore;
pub use types::{
    DeviceId, PermissionMask, Pid, QueryMode, QueueAttr, QueueId, Route, RouteList, RouteQuery, Timeout,
    WorkMode,
};

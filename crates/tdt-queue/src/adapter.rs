// Copyright 2025 TDT Queue Contributors
// SPDX-License-Identifier: Apache-2.0

//! Adapter traits for the external collaborators
//!
//! The queue core never talks to a vendor driver directly. Each concern sits
//! behind a narrow synchronous trait returning [`DriverError`]; a
//! [`Backend`] bundles one implementation of each for a process.

use std::sync::Arc;

use crate::deployment::{PeerKind, RunMode};
use crate::error::DriverError;
use crate::legacy::LegacyTransport;
use crate::types::{DeviceId, Pid, PermissionMask, QueueAttr, QueueId};

/// Device queue driver
///
/// Every call is a single attempt; polling is done by the caller.
pub trait QueueDriver: Send + Sync {
    /// One-time per-device initialization
    fn init(&self, device: DeviceId) -> Result<(), DriverError>;

    fn create(&self, device: DeviceId, attr: &QueueAttr) -> Result<QueueId, DriverError>;

    fn destroy(&self, device: DeviceId, queue_id: QueueId) -> Result<(), DriverError>;

    /// `QueueFull` when the queue has no room
    fn enqueue(&self, device: DeviceId, queue_id: QueueId, buf: &[u8]) -> Result<(), DriverError>;

    /// `QueueEmpty` when nothing is queued
    fn dequeue(&self, device: DeviceId, queue_id: QueueId) -> Result<Vec<u8>, DriverError>;

    /// Size of the head buffer
    fn peek(&self, device: DeviceId, queue_id: QueueId, timeout_ms: i32) -> Result<usize, DriverError>;

    fn attach(&self, device: DeviceId, queue_id: QueueId, timeout_ms: i32) -> Result<(), DriverError>;

    fn grant(
        &self,
        device: DeviceId,
        queue_id: QueueId,
        pid: Pid,
        mask: PermissionMask,
        timeout_ms: i32,
    ) -> Result<(), DriverError>;

    /// Permission bits the calling process holds on a queue
    fn query_permission(&self, device: DeviceId, queue_id: QueueId) -> Result<PermissionMask, DriverError>;
}

/// One request to the event-scheduling transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlEvent {
    pub dst_pid: Pid,
    pub group_id: u32,
    pub event_id: i32,
    pub sub_event: u32,
    pub dst_engine: u32,
    pub payload: Vec<u8>,
}

/// Event-scheduling transport: synchronous request/reply keyed by pid
///
/// Returns the raw reply bytes (fixed header followed by an optional body).
pub trait ControlTransport: Send + Sync {
    fn submit(&self, device: DeviceId, event: &ControlEvent) -> Result<Vec<u8>, DriverError>;
}

/// Shared-memory buffer visible to the remote scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle {
    pub addr: u64,
    pub size: usize,
}

pub trait BufferAllocator: Send + Sync {
    fn alloc(&self, size: usize) -> Result<BufferHandle, DriverError>;

    fn free(&self, handle: &BufferHandle) -> Result<(), DriverError>;

    fn write(&self, handle: &BufferHandle, offset: usize, bytes: &[u8]) -> Result<(), DriverError>;

    fn read(&self, handle: &BufferHandle, offset: usize, len: usize) -> Result<Vec<u8>, DriverError>;
}

/// Device/runtime discovery and process-group membership
pub trait Platform: Send + Sync {
    fn run_mode(&self) -> Result<RunMode, DriverError>;

    fn current_device(&self) -> Result<DeviceId, DriverError>;

    fn current_pid(&self) -> Pid;

    fn peer_pid(&self, device: DeviceId, kind: PeerKind) -> Result<Pid, DriverError>;

    /// Group the process belongs to, if any
    fn query_group(&self, pid: Pid) -> Result<Option<String>, DriverError>;

    fn create_group(&self, name: &str) -> Result<(), DriverError>;

    fn add_group_member(&self, name: &str, pid: Pid) -> Result<(), DriverError>;

    /// Process environment lookup
    fn env_var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// Adapter bundle for one process
#[derive(Clone)]
pub struct Backend {
    pub driver: Arc<dyn QueueDriver>,
    pub control: Arc<dyn ControlTransport>,
    pub allocator: Arc<dyn BufferAllocator>,
    pub platform: Arc<dyn Platform>,
    pub legacy: Arc<dyn LegacyTransport>,
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("pid", &self.platform.current_pid())
            .finish_non_exhaustive()
    }
}

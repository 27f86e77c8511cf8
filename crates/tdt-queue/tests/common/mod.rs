// Copyright 2025 TDT Queue Contributors
// SPDX-License-Identifier: Apache-2.0

//! Shared mocks for the integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tdt_queue::sim::SimDevice;
use tdt_queue::{
    Backend, DeploymentMode, DeviceId, DriverError, PermissionMask, Pid, QueueAttr, QueueDriver, QueueId,
    QueueProcessor, QueueSettings, RunMode,
};

pub fn fast_settings() -> QueueSettings {
    QueueSettings::default().with_poll_interval(Duration::from_millis(1))
}

/// Sim backend for `pid` with the queue driver swapped out
pub fn backend_with_driver(device: &SimDevice, pid: Pid, driver: Arc<dyn QueueDriver>) -> Backend {
    let mut backend = device.backend(pid, RunMode::Host);
    backend.driver = driver;
    backend
}

pub fn host_processor(backend: &Backend, settings: &QueueSettings) -> QueueProcessor {
    QueueProcessor::new(DeploymentMode::Host, backend, settings).unwrap()
}

/// Delegates to another driver and counts every call
pub struct CountingDriver {
    inner: Arc<dyn QueueDriver>,
    calls: AtomicUsize,
}

impl CountingDriver {
    pub fn new(inner: Arc<dyn QueueDriver>) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn tick(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

impl QueueDriver for CountingDriver {
    fn init(&self, device: DeviceId) -> Result<(), DriverError> {
        self.tick();
        self.inner.init(device)
    }
    fn create(&self, device: DeviceId, attr: &QueueAttr) -> Result<QueueId, DriverError> {
        self.tick();
        self.inner.create(device, attr)
    }
    fn destroy(&self, device: DeviceId, queue_id: QueueId) -> Result<(), DriverError> {
        self.tick();
        self.inner.destroy(device, queue_id)
    }
    fn enqueue(&self, device: DeviceId, queue_id: QueueId, buf: &[u8]) -> Result<(), DriverError> {
        self.tick();
        self.inner.enqueue(device, queue_id, buf)
    }
    fn dequeue(&self, device: DeviceId, queue_id: QueueId) -> Result<Vec<u8>, DriverError> {
        self.tick();
        self.inner.dequeue(device, queue_id)
    }
    fn peek(&self, device: DeviceId, queue_id: QueueId, timeout_ms: i32) -> Result<usize, DriverError> {
        self.tick();
        self.inner.peek(device, queue_id, timeout_ms)
    }
    fn attach(&self, device: DeviceId, queue_id: QueueId, timeout_ms: i32) -> Result<(), DriverError> {
        self.tick();
        self.inner.attach(device, queue_id, timeout_ms)
    }
    fn grant(
        &self,
        device: DeviceId,
        queue_id: QueueId,
        pid: Pid,
        mask: PermissionMask,
        timeout_ms: i32,
    ) -> Result<(), DriverError> {
        self.tick();
        self.inner.grant(device, queue_id, pid, mask, timeout_ms)
    }
    fn query_permission(&self, device: DeviceId, queue_id: QueueId) -> Result<PermissionMask, DriverError> {
        self.tick();
        self.inner.query_permission(device, queue_id)
    }
}

/// Reports full/empty a fixed number of times, then succeeds
pub struct ScriptedDriver {
    transient_left: AtomicUsize,
    enqueue_attempts: AtomicUsize,
    dequeue_attempts: AtomicUsize,
}

impl ScriptedDriver {
    pub fn transient_times(n: usize) -> Self {
        Self {
            transient_left: AtomicUsize::new(n),
            enqueue_attempts: AtomicUsize::new(0),
            dequeue_attempts: AtomicUsize::new(0),
        }
    }

    pub fn always_transient() -> Self {
        Self::transient_times(usize::MAX)
    }

    pub fn enqueue_attempts(&self) -> usize {
        self.enqueue_attempts.load(Ordering::SeqCst)
    }

    pub fn dequeue_attempts(&self) -> usize {
        self.dequeue_attempts.load(Ordering::SeqCst)
    }

    fn transient(&self) -> bool {
        self.transient_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| match left {
                0 => None,
                usize::MAX => Some(usize::MAX),
                n => Some(n - 1),
            })
            .is_ok()
    }
}

impl QueueDriver for ScriptedDriver {
    fn init(&self, _device: DeviceId) -> Result<(), DriverError> {
        Ok(())
    }
    fn create(&self, _device: DeviceId, _attr: &QueueAttr) -> Result<QueueId, DriverError> {
        Ok(QueueId(1))
    }
    fn destroy(&self, _device: DeviceId, _queue_id: QueueId) -> Result<(), DriverError> {
        Ok(())
    }
    fn enqueue(&self, _device: DeviceId, _queue_id: QueueId, _buf: &[u8]) -> Result<(), DriverError> {
        self.enqueue_attempts.fetch_add(1, Ordering::SeqCst);
        if self.transient() {
            Err(DriverError::QueueFull)
        } else {
            Ok(())
        }
    }
    fn dequeue(&self, _device: DeviceId, _queue_id: QueueId) -> Result<Vec<u8>, DriverError> {
        self.dequeue_attempts.fetch_add(1, Ordering::SeqCst);
        if self.transient() {
            Err(DriverError::QueueEmpty)
        } else {
            Ok(vec![7])
        }
    }
    fn peek(&self, _device: DeviceId, _queue_id: QueueId, _timeout_ms: i32) -> Result<usize, DriverError> {
        Ok(1)
    }
    fn attach(&self, _device: DeviceId, _queue_id: QueueId, _timeout_ms: i32) -> Result<(), DriverError> {
        Ok(())
    }
    fn grant(
        &self,
        _device: DeviceId,
        _queue_id: QueueId,
        _pid: Pid,
        _mask: PermissionMask,
        _timeout_ms: i32,
    ) -> Result<(), DriverError> {
        Ok(())
    }
    fn query_permission(&self, _device: DeviceId, _queue_id: QueueId) -> Result<PermissionMask, DriverError> {
        Ok(PermissionMask::all())
    }
}

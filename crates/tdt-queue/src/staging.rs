// Copyright 2025 TDT Queue Contributors
// SPDX-License-Identifier: Apache-2.0

//! Scoped staging buffers for route records
//!
//! A [`StagingBuffer`] owns one shared-memory allocation for the duration of
//! a control round trip. Dropping it frees the allocation and, when the
//! address was posted to a contact queue, takes back any copy the peer did
//! not consume. Cleanup failures are logged, never returned.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::adapter::{BufferAllocator, BufferHandle};
use crate::driver::QueueDriverAdapter;
use crate::error::{QueueError, Result};
use crate::types::QueueId;

/// Where the peer finds a staging buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StagingStore {
    /// Address travels inside the control message
    DeviceMemory,
    /// Address is enqueued into the process's contact queue first
    ControlQueue,
}

impl StagingStore {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "device_memory" => Some(StagingStore::DeviceMemory),
            "control_queue" => Some(StagingStore::ControlQueue),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StagingStore::DeviceMemory => "device_memory",
            StagingStore::ControlQueue => "control_queue",
        }
    }
}

impl fmt::Display for StagingStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct StagingBuffer {
    allocator: Arc<dyn BufferAllocator>,
    handle: BufferHandle,
    posted: Option<(Arc<QueueDriverAdapter>, QueueId)>,
}

impl StagingBuffer {
    pub fn alloc(allocator: Arc<dyn BufferAllocator>, size: usize) -> Result<Self> {
        let handle = allocator
            .alloc(size)
            .map_err(|e| QueueError::Transport(format!("staging alloc of {} bytes: {}", size, e)))?;
        debug!("[STAGING] Allocated {} bytes at {:#x}", handle.size, handle.addr);
        Ok(Self {
            allocator,
            handle,
            posted: None,
        })
    }

    pub fn addr(&self) -> u64 {
        self.handle.addr
    }

    pub fn size(&self) -> usize {
        self.handle.size
    }

    pub fn write(&self, bytes: &[u8]) -> Result<()> {
        self.allocator
            .write(&self.handle, 0, bytes)
            .map_err(|e| QueueError::Transport(format!("staging write at {:#x}: {}", self.handle.addr, e)))
    }

    pub fn read(&self, len: usize) -> Result<Vec<u8>> {
        self.allocator
            .read(&self.handle, 0, len)
            .map_err(|e| QueueError::Transport(format!("staging read at {:#x}: {}", self.handle.addr, e)))
    }

    /// Enqueue this buffer's address into a contact queue for the peer
    pub fn post(&mut self, driver: Arc<QueueDriverAdapter>, contact: QueueId) -> Result<()> {
        driver.try_enqueue(contact, &self.handle.addr.to_le_bytes())?;
        self.posted = Some((driver, contact));
        Ok(())
    }
}

impl Drop for StagingBuffer {
    fn drop(&mut self) {
        if let Some((driver, contact)) = self.posted.take() {
            match driver.try_dequeue(contact) {
                Ok(_) => debug!("[STAGING] Reclaimed unconsumed address from contact queue {}", contact),
                Err(QueueError::QueueEmpty { .. }) => {}
                Err(e) => warn!("[STAGING] Contact queue {} cleanup failed: {}", contact, e),
            }
        }
        if let Err(e) = self.allocator.free(&self.handle) {
            warn!("[STAGING] Failed to free buffer at {:#x}: {}", self.handle.addr, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DriverError;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct TrackingAllocator {
        live: Mutex<Vec<u64>>,
    }

    impl BufferAllocator for TrackingAllocator {
        fn alloc(&self, size: usize) -> std::result::Result<BufferHandle, DriverError> {
            let mut live = self.live.lock();
            let addr = 0x1000 + live.len() as u64 * 0x100;
            live.push(addr);
            Ok(BufferHandle { addr, size })
        }
        fn free(&self, handle: &BufferHandle) -> std::result::Result<(), DriverError> {
            self.live.lock().retain(|a| *a != handle.addr);
            Ok(())
        }
        fn write(&self, _h: &BufferHandle, _o: usize, _b: &[u8]) -> std::result::Result<(), DriverError> {
            Err(DriverError::Failed { code: 1 })
        }
        fn read(&self, _h: &BufferHandle, _o: usize, len: usize) -> std::result::Result<Vec<u8>, DriverError> {
            Ok(vec![0; len])
        }
    }

    #[test]
    fn test_freed_on_early_return() {
        let allocator = Arc::new(TrackingAllocator::default());
        let attempt = || -> Result<()> {
            let buffer = StagingBuffer::alloc(allocator.clone(), 64)?;
            buffer.write(&[1, 2, 3])?;
            Ok(())
        };
        assert!(attempt().is_err());
        assert!(allocator.live.lock().is_empty());
    }

    #[test]
    fn test_store_names() {
        assert_eq!(StagingStore::parse("control_queue"), Some(StagingStore::ControlQueue));
        assert_eq!(StagingStore::parse("auto"), None);
        assert_eq!(StagingStore::DeviceMemory.to_string(), "device_memory");
    }
}

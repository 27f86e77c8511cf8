// Copyright 2025 TDT Queue Contributors
// SPDX-License-Identifier: Apache-2.0

//! Queue processor: one per process, fixed to one deployment mode
//!
//! Control-plane calls (create, destroy, grant, attach, bind, unbind, query)
//! run under a single re-entrant lock and are never retried. Data-plane
//! calls (enqueue, dequeue) take only the per-queue direction lock and poll
//! through transient full/empty results.

use std::sync::Arc;

use parking_lot::ReentrantMutex;
use tracing::{debug, error, info, warn};

use crate::adapter::Backend;
use crate::control::ControlChannel;
use crate::coordinator::{self, PermissionCoordinator};
use crate::deployment::DeploymentMode;
use crate::driver::QueueDriverAdapter;
use crate::error::{QueueError, Result};
use crate::locks::{Direction, QueueLockTable};
use crate::poll::PollPolicy;
use crate::registry::{RegistryProfile, RouteRegistry};
use crate::settings::QueueSettings;
use crate::types::{DeviceId, Pid, PermissionMask, QueueAttr, QueueId, RouteList, RouteQuery, Timeout};

pub struct QueueProcessor {
    mode: DeploymentMode,
    driver: Arc<QueueDriverAdapter>,
    coordinator: Box<dyn PermissionCoordinator>,
    registry: RouteRegistry,
    locks: QueueLockTable,
    poll: PollPolicy,
    control_lock: ReentrantMutex<()>,
    max_name_len: usize,
    min_depth: u32,
}

impl QueueProcessor {
    pub fn new(mode: DeploymentMode, backend: &Backend, settings: &QueueSettings) -> Result<Self> {
        let device = backend
            .platform
            .current_device()
            .map_err(|e| QueueError::Deployment(format!("current device query failed: {}", e)))?;

        let driver = Arc::new(QueueDriverAdapter::new(backend.driver.clone(), device));
        let coordinator = coordinator::for_mode(mode, driver.clone(), backend.platform.clone());
        let registry = RouteRegistry::new(
            ControlChannel::new(backend.control.clone(), device, settings.event_id),
            backend.allocator.clone(),
            driver.clone(),
            backend.platform.clone(),
            RegistryProfile::for_mode(mode, settings),
        );

        info!(
            "[PROCESSOR] {} processor for pid {} on device {} (staging: {})",
            mode,
            backend.platform.current_pid(),
            device,
            registry.profile().staging
        );

        Ok(Self {
            mode,
            driver,
            coordinator,
            registry,
            locks: QueueLockTable::new(),
            poll: PollPolicy::new(settings.poll_interval),
            control_lock: ReentrantMutex::new(()),
            max_name_len: settings.max_name_len,
            min_depth: settings.min_depth,
        })
    }

    pub fn mode(&self) -> DeploymentMode {
        self.mode
    }

    pub fn device(&self) -> DeviceId {
        self.driver.device()
    }

    pub fn lock_table(&self) -> &QueueLockTable {
        &self.locks
    }

    pub fn registry(&self) -> &RouteRegistry {
        &self.registry
    }

    pub fn create_queue(&self, attr: &QueueAttr) -> Result<QueueId> {
        attr.validate(self.max_name_len, self.min_depth)?;
        let _control = self.control_lock.lock();

        let queue_id = self.driver.create(attr)?;
        if let Err(e) = self.coordinator.on_created(queue_id) {
            error!("[PROCESSOR] Post-create step failed for queue {}: {}", queue_id, e);
            if let Err(cleanup) = self.driver.destroy(queue_id) {
                warn!("[PROCESSOR] Could not roll back queue {}: {}", queue_id, cleanup);
            }
            return Err(e);
        }

        info!(
            "[PROCESSOR] Created queue '{}' (id {}, depth {})",
            attr.name(),
            queue_id,
            attr.depth()
        );
        Ok(queue_id)
    }

    /// Destroy a queue no route references any more
    pub fn destroy_queue(&self, queue_id: QueueId) -> Result<()> {
        let _control = self.control_lock.lock();

        let references = self.registry.references_to(queue_id)?;
        if references > 0 {
            error!("[PROCESSOR] Queue {} still has {} route(s)", queue_id, references);
            return Err(QueueError::ResourceBusy(format!(
                "queue {} is referenced by {} route(s); unbind first",
                queue_id, references
            )));
        }

        self.driver.destroy(queue_id)?;
        self.locks.release(queue_id);
        info!("[PROCESSOR] Destroyed queue {}", queue_id);
        Ok(())
    }

    pub fn enqueue(&self, queue_id: QueueId, buf: &[u8], timeout_ms: i32) -> Result<()> {
        let timeout = Timeout::from_raw(timeout_ms)?;
        let lock = self.locks.lock_for(queue_id, Direction::Enqueue);
        self.poll.run("enqueue", timeout, || {
            let _guard = lock.lock();
            self.driver.try_enqueue(queue_id, buf)
        })
    }

    pub fn dequeue(&self, queue_id: QueueId, timeout_ms: i32) -> Result<Vec<u8>> {
        let timeout = Timeout::from_raw(timeout_ms)?;
        let lock = self.locks.lock_for(queue_id, Direction::Dequeue);
        self.poll.run("dequeue", timeout, || {
            let _guard = lock.lock();
            self.driver.try_dequeue(queue_id)
        })
    }

    /// Size of the head buffer
    pub fn peek(&self, queue_id: QueueId, timeout_ms: i32) -> Result<usize> {
        let timeout = Timeout::from_raw(timeout_ms)?;
        self.driver.peek(queue_id, timeout)
    }

    pub fn grant(&self, queue_id: QueueId, pid: Pid, mask: PermissionMask, timeout_ms: i32) -> Result<()> {
        let timeout = Timeout::from_raw(timeout_ms)?;
        if mask.is_empty() {
            return Err(QueueError::InvalidArgument(format!(
                "empty permission mask for queue {}",
                queue_id
            )));
        }
        let _control = self.control_lock.lock();
        self.coordinator.grant(queue_id, pid, mask, timeout)
    }

    pub fn attach(&self, queue_id: QueueId, timeout_ms: i32) -> Result<PermissionMask> {
        let timeout = Timeout::from_raw(timeout_ms)?;
        let _control = self.control_lock.lock();
        self.coordinator.attach(queue_id, timeout)
    }

    pub fn bind_routes(&self, routes: &mut RouteList) -> Result<()> {
        let _control = self.control_lock.lock();
        self.registry.bind(routes)
    }

    pub fn unbind_routes(&self, routes: &mut RouteList) -> Result<()> {
        let _control = self.control_lock.lock();
        self.registry.unbind(routes)
    }

    /// Append matching routes to `out`; returns how many were added
    pub fn query_routes(&self, query: &RouteQuery, out: &mut RouteList) -> Result<usize> {
        let _control = self.control_lock.lock();
        let added = self.registry.query(query, out)?;
        debug!("[PROCESSOR] Route query returned {} route(s)", added);
        Ok(added)
    }

    pub fn count_routes(&self, query: &RouteQuery) -> Result<u32> {
        let _control = self.control_lock.lock();
        self.registry.count(query)
    }
}

// Copyright 2025 TDT Queue Contributors
// SPDX-License-Identifier: Apache-2.0

//! Route registry client
//!
//! The route table lives in the remote queue-schedule peer. This side
//! stages route records in shared memory, sends one control message per
//! operation and reads results back from the same buffer.

use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::adapter::{BufferAllocator, Platform};
use crate::control::ControlChannel;
use crate::deployment::{DeploymentMode, PeerKind};
use crate::driver::QueueDriverAdapter;
use crate::error::{QueueError, Result};
use crate::settings::QueueSettings;
use crate::staging::{StagingBuffer, StagingStore};
use crate::types::{Pid, QueueId, RouteList, RouteQuery};
use crate::wire::{
    self, BindInitMsg, RouteListMsg, RouteQueryMsg, SubEvent, WireQueryType, ROUTE_RECORD_SIZE,
};

/// Which peer to talk to and how to hand it staging buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryProfile {
    pub peer: PeerKind,
    pub group_id: u32,
    pub staging: StagingStore,
}

impl RegistryProfile {
    pub fn for_mode(mode: DeploymentMode, settings: &QueueSettings) -> Self {
        let (peer, group_id, default_staging) = match mode {
            DeploymentMode::Host => (PeerKind::ControlProcessor, 0, StagingStore::DeviceMemory),
            DeploymentMode::ControlProcessor => (
                PeerKind::QueueSchedule,
                settings.bind_group_id,
                StagingStore::ControlQueue,
            ),
            DeploymentMode::SchedulerPeer => (
                PeerKind::QueueSchedule,
                settings.bind_group_id,
                StagingStore::DeviceMemory,
            ),
        };
        Self {
            peer,
            group_id,
            staging: settings.staging.unwrap_or(default_staging),
        }
    }
}

/// Registration state set by the one-time connect handshake
#[derive(Debug, Clone, Copy)]
struct PeerSession {
    contact_queue: QueueId,
}

pub struct RouteRegistry {
    channel: ControlChannel,
    allocator: Arc<dyn BufferAllocator>,
    driver: Arc<QueueDriverAdapter>,
    platform: Arc<dyn Platform>,
    profile: RegistryProfile,
    peer_pid: OnceCell<Pid>,
    session: Mutex<Option<PeerSession>>,
}

impl RouteRegistry {
    pub fn new(
        channel: ControlChannel,
        allocator: Arc<dyn BufferAllocator>,
        driver: Arc<QueueDriverAdapter>,
        platform: Arc<dyn Platform>,
        profile: RegistryProfile,
    ) -> Self {
        Self {
            channel,
            allocator,
            driver,
            platform,
            profile,
            peer_pid: OnceCell::new(),
            session: Mutex::new(None),
        }
    }

    pub fn profile(&self) -> RegistryProfile {
        self.profile
    }

    pub fn is_connected(&self) -> bool {
        self.session.lock().is_some()
    }

    fn peer_pid(&self) -> Result<Pid> {
        self.peer_pid
            .get_or_try_init(|| {
                let pid = self
                    .platform
                    .peer_pid(self.driver.device(), self.profile.peer)
                    .map_err(|e| QueueError::from_driver("peer lookup", None, e))?;
                debug!("[REGISTRY] Route peer {:?} is pid {}", self.profile.peer, pid);
                Ok(pid)
            })
            .copied()
    }

    /// Register with the peer once; later calls return the cached session
    fn connect(&self) -> Result<PeerSession> {
        let mut session = self.session.lock();
        if let Some(existing) = *session {
            return Ok(existing);
        }

        let peer = self.peer_pid()?;
        let msg = BindInitMsg {
            pid: self.platform.current_pid(),
            group_id: 0,
            rsv: [0; 32],
        };
        let reply = self
            .channel
            .send(peer, SubEvent::BindInit, wire::encode(&msg), self.profile.group_id)?;

        let established = PeerSession {
            contact_queue: QueueId(reply.ret_value),
        };
        info!(
            "[REGISTRY] Registered pid {} with peer {} (contact queue {})",
            msg.pid, peer, established.contact_queue
        );
        *session = Some(established);
        Ok(established)
    }

    /// Staging buffer the peer can reach under the configured store
    fn stage(&self, size: usize, payload: Option<&[u8]>) -> Result<(StagingBuffer, u64)> {
        let mut buffer = StagingBuffer::alloc(self.allocator.clone(), size)?;
        if let Some(bytes) = payload {
            buffer.write(bytes)?;
        }
        match self.profile.staging {
            StagingStore::DeviceMemory => {
                let addr = buffer.addr();
                Ok((buffer, addr))
            }
            StagingStore::ControlQueue => {
                let session = self.connect()?;
                buffer.post(self.driver.clone(), session.contact_queue)?;
                Ok((buffer, 0))
            }
        }
    }

    pub fn bind(&self, routes: &mut RouteList) -> Result<()> {
        self.connect()?;
        self.exchange_routes(SubEvent::Bind, routes)?;
        info!("[REGISTRY] Bound {} route(s)", routes.len());
        Ok(())
    }

    pub fn unbind(&self, routes: &mut RouteList) -> Result<()> {
        self.exchange_routes(SubEvent::Unbind, routes)?;
        info!("[REGISTRY] Unbound {} route(s)", routes.len());
        Ok(())
    }

    /// Send a route list and write per-route statuses back into it
    ///
    /// Statuses are read back whenever the peer answered, so a rejected bind
    /// still shows which routes failed.
    fn exchange_routes(&self, sub_event: SubEvent, routes: &mut RouteList) -> Result<()> {
        if routes.is_empty() {
            return Err(QueueError::InvalidArgument(format!("{:?} with an empty route list", sub_event)));
        }
        let peer = self.peer_pid()?;
        let count = routes.len();
        let (buffer, addr) = self.stage(count * ROUTE_RECORD_SIZE, Some(&wire::encode_routes(routes.as_slice())))?;

        let msg = RouteListMsg {
            route_num: count as u32,
            reserved0: 0,
            route_list_addr: addr,
            rsv: [0; 32],
        };
        let outcome = self
            .channel
            .send(peer, sub_event, wire::encode(&msg), self.profile.group_id);

        match &outcome {
            Ok(_) | Err(QueueError::RemoteRejected { .. }) => {
                let records = wire::decode_routes(&buffer.read(count * ROUTE_RECORD_SIZE)?, count)?;
                for (route, record) in routes.routes_mut().iter_mut().zip(records.iter()) {
                    route.set_status(record.status);
                }
            }
            Err(_) => {}
        }
        outcome.map(|_| ())
    }

    /// Number of routes matching `query`
    pub fn count(&self, query: &RouteQuery) -> Result<u32> {
        let (mode, src, dst) = query.resolve()?;
        self.count_raw(WireQueryType::from(mode), src, dst)
    }

    /// Routes that still reference `queue_id` at either end
    pub(crate) fn references_to(&self, queue_id: QueueId) -> Result<u32> {
        self.count_raw(WireQueryType::SrcOrDst, queue_id, queue_id)
    }

    fn count_raw(&self, query_type: WireQueryType, src: QueueId, dst: QueueId) -> Result<u32> {
        let peer = self.peer_pid()?;
        let msg = RouteQueryMsg::new(query_type, src, dst);
        let reply = self
            .channel
            .send(peer, SubEvent::QueryCount, wire::encode(&msg), self.profile.group_id)?;
        debug!("[REGISTRY] {:?}({}, {}) matches {} route(s)", query_type, src, dst, reply.ret_value);
        Ok(reply.ret_value)
    }

    /// Append every route matching `query` to `out`
    ///
    /// Validated locally first. Count, then fetch only when the count is
    /// non-zero. Any failure leaves `out` untouched.
    pub fn query(&self, query: &RouteQuery, out: &mut RouteList) -> Result<usize> {
        let (mode, src, dst) = query.resolve()?;
        let query_type = WireQueryType::from(mode);

        let count = self.count_raw(query_type, src, dst)? as usize;
        if count == 0 {
            return Ok(0);
        }

        let peer = self.peer_pid()?;
        let (buffer, addr) = self.stage(count * ROUTE_RECORD_SIZE, None)?;
        let mut msg = RouteQueryMsg::new(query_type, src, dst);
        msg.route_num = count as u32;
        msg.route_list_addr = addr;

        let reply = self
            .channel
            .send(peer, SubEvent::Query, wire::encode(&msg), self.profile.group_id)
            .map_err(|e| {
                error!("[REGISTRY] Route fetch failed: {}", e);
                e
            })?;

        let returned = reply.ret_value as usize;
        if returned > count {
            warn!("[REGISTRY] Peer declared {} routes for a {}-route buffer", returned, count);
        }
        let returned = returned.min(count);
        let records = wire::decode_routes(&buffer.read(returned * ROUTE_RECORD_SIZE)?, returned)?;
        out.extend(records.iter().map(|r| r.to_route()));
        Ok(returned)
    }
}

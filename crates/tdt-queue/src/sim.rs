// Copyright 2025 TDT Queue Contributors
// SPDX-License-Identifier: Apache-2.0

//! In-process simulated device
//!
//! One [`SimDevice`] holds the state a real device and its queue-schedule
//! peer would: named depth-bounded queues with per-pid permissions, the
//! route table, registered processes and their contact queues, shared
//! staging memory, process groups and the legacy transport. Each
//! [`SimProcess`] is one process's view of it and implements every adapter
//! trait, so multi-process scenarios run inside a single test.

use std::collections::VecDeque;
use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use parking_lot::Mutex;
use tracing::debug;

use crate::adapter::{
    Backend, BufferAllocator, BufferHandle, ControlEvent, ControlTransport, Platform, QueueDriver,
};
use crate::deployment::{PeerKind, RunMode};
use crate::error::DriverError;
use crate::legacy::{LegacyItem, LegacyTransport};
use crate::types::{DeviceId, Pid, PermissionMask, QueueAttr, QueueId, MIN_QUEUE_DEPTH};
use crate::wire::{
    self, BindInitMsg, ProcMsgRsp, RouteListMsg, RouteQueryMsg, RouteRecord, SubEvent, WireQueryType,
    RET_INNER_ERROR, RET_OK, RET_PARAM_INVALID, ROUTE_RECORD_SIZE,
};

/// Pid of the simulated queue-schedule peer
pub const QS_PID: Pid = 900;

/// Pid of the simulated control processor
pub const CP_PID: Pid = 901;

const CONTACT_QUEUE_DEPTH: u32 = 64;
const MEMORY_BASE: u64 = 0x10_0000;

struct SimQueue {
    name: String,
    depth: u32,
    overwrite: bool,
    items: VecDeque<Vec<u8>>,
    perms: AHashMap<Pid, PermissionMask>,
    attached: AHashSet<Pid>,
}

impl SimQueue {
    fn new(name: String, depth: u32, overwrite: bool, owner: Pid) -> Self {
        let mut perms = AHashMap::new();
        perms.insert(owner, PermissionMask::all());
        let mut attached = AHashSet::new();
        attached.insert(owner);
        Self {
            name,
            depth,
            overwrite,
            items: VecDeque::new(),
            perms,
            attached,
        }
    }

    fn allows(&self, pid: Pid, flag: PermissionMask) -> bool {
        self.perms.get(&pid).map_or(false, |mask| mask.contains(flag))
    }

    fn has_room(&self) -> bool {
        self.overwrite || self.items.len() < self.depth as usize
    }

    fn push(&mut self, buf: Vec<u8>) {
        if self.items.len() >= self.depth as usize {
            self.items.pop_front();
        }
        self.items.push_back(buf);
    }
}

#[derive(Default)]
struct SimLegacy {
    started: bool,
    inits: usize,
    destroys: usize,
    channels: AHashMap<String, VecDeque<Vec<LegacyItem>>>,
    stopped: AHashSet<String>,
}

#[derive(Default)]
struct SimState {
    next_queue_id: u32,
    queues: AHashMap<QueueId, SimQueue>,
    routes: Vec<(QueueId, QueueId)>,
    contacts: AHashMap<Pid, QueueId>,
    memory: AHashMap<u64, Vec<u8>>,
    next_addr: u64,
    groups: AHashMap<String, AHashSet<Pid>>,
    legacy: SimLegacy,
    control_log: Vec<(Pid, u32)>,
}

impl SimState {
    fn new_queue(&mut self, name: String, depth: u32, overwrite: bool, owner: Pid) -> QueueId {
        self.next_queue_id += 1;
        let id = QueueId(self.next_queue_id);
        self.queues.insert(id, SimQueue::new(name, depth, overwrite, owner));
        id
    }

    fn queue(&self, id: QueueId) -> Result<&SimQueue, DriverError> {
        self.queues.get(&id).ok_or(DriverError::NotFound)
    }

    fn queue_mut(&mut self, id: QueueId) -> Result<&mut SimQueue, DriverError> {
        self.queues.get_mut(&id).ok_or(DriverError::NotFound)
    }

    /// Enqueue, forwarding along bound routes when `id` is a route source
    fn enqueue(&mut self, pid: Pid, id: QueueId, buf: &[u8]) -> Result<(), DriverError> {
        if !self.queue(id)?.allows(pid, PermissionMask::ENQUEUE) {
            return Err(DriverError::PermissionDenied);
        }
        let mut targets: Vec<QueueId> = self
            .routes
            .iter()
            .filter(|(src, _)| *src == id)
            .map(|(_, dst)| *dst)
            .collect();
        if targets.is_empty() {
            targets.push(id);
        }
        for target in &targets {
            if !self.queue(*target)?.has_room() {
                return Err(DriverError::QueueFull);
            }
        }
        for target in &targets {
            self.queue_mut(*target)?.push(buf.to_vec());
        }
        Ok(())
    }

    fn memory_mut(&mut self, addr: u64, len: usize) -> Result<&mut [u8], DriverError> {
        let block = self.memory.get_mut(&addr).ok_or(DriverError::NotFound)?;
        if len > block.len() {
            return Err(DriverError::Failed { code: 2 });
        }
        Ok(&mut block[..len])
    }

    /// Staging address for a message from `sender`; zero means "take it from
    /// the contact queue"
    fn resolve_staging(&mut self, sender: Pid, addr: u64) -> Option<u64> {
        if addr != 0 {
            return Some(addr);
        }
        let contact = *self.contacts.get(&sender)?;
        let raw = self.queues.get_mut(&contact)?.items.pop_front()?;
        let bytes: [u8; 8] = raw.as_slice().try_into().ok()?;
        Some(u64::from_le_bytes(bytes))
    }

    fn handle_control(&mut self, sender: Pid, sub_event: SubEvent, payload: &[u8]) -> (i32, u32) {
        match sub_event {
            SubEvent::BindInit => {
                let Ok(msg) = wire::decode::<BindInitMsg>(payload) else {
                    return (RET_PARAM_INVALID, 0);
                };
                let contact = match self.contacts.get(&msg.pid) {
                    Some(id) => *id,
                    None => {
                        let id = self.new_queue(format!("__contact_{}", msg.pid), CONTACT_QUEUE_DEPTH, false, QS_PID);
                        if let Some(queue) = self.queues.get_mut(&id) {
                            queue.perms.insert(msg.pid, PermissionMask::all());
                            queue.attached.insert(msg.pid);
                        }
                        self.contacts.insert(msg.pid, id);
                        id
                    }
                };
                (RET_OK, contact.as_u32())
            }
            SubEvent::Bind | SubEvent::Unbind => {
                let Ok(msg) = wire::decode::<RouteListMsg>(payload) else {
                    return (RET_PARAM_INVALID, 0);
                };
                if sub_event == SubEvent::Bind && !self.contacts.contains_key(&sender) {
                    return (RET_PARAM_INVALID, 0);
                }
                let Some(addr) = self.resolve_staging(sender, msg.route_list_addr) else {
                    return (RET_PARAM_INVALID, 0);
                };
                let count = msg.route_num as usize;
                let Ok(block) = self.memory_mut(addr, count * ROUTE_RECORD_SIZE) else {
                    return (RET_PARAM_INVALID, 0);
                };
                let Ok(mut records) = wire::decode_routes(block, count) else {
                    return (RET_INNER_ERROR, 0);
                };

                let mut all_ok = true;
                for record in records.iter_mut() {
                    let route = (QueueId(record.src_id), QueueId(record.dst_id));
                    let ok = if sub_event == SubEvent::Bind {
                        let valid = route.0 != route.1
                            && self.queues.contains_key(&route.0)
                            && self.queues.contains_key(&route.1)
                            && !self.routes.contains(&route);
                        if valid {
                            self.routes.push(route);
                        }
                        valid
                    } else {
                        let before = self.routes.len();
                        self.routes.retain(|r| *r != route);
                        before != self.routes.len()
                    };
                    record.status = if ok { RET_OK } else { RET_PARAM_INVALID };
                    all_ok &= ok;
                }
                let bytes: Vec<u8> = records.iter().flat_map(|r| bytemuck::bytes_of(r).to_vec()).collect();
                if let Ok(block) = self.memory_mut(addr, bytes.len()) {
                    block.copy_from_slice(&bytes);
                }
                (if all_ok { RET_OK } else { RET_PARAM_INVALID }, 0)
            }
            SubEvent::QueryCount | SubEvent::Query => {
                let Ok(msg) = wire::decode::<RouteQueryMsg>(payload) else {
                    return (RET_PARAM_INVALID, 0);
                };
                let Some(query_type) = WireQueryType::from_u32(msg.query_type) else {
                    return (RET_PARAM_INVALID, 0);
                };
                let matching: Vec<RouteRecord> = self
                    .routes
                    .iter()
                    .filter(|(src, dst)| query_type.matches(msg.src_id, msg.dst_id, src.as_u32(), dst.as_u32()))
                    .map(|(src, dst)| RouteRecord {
                        src_id: src.as_u32(),
                        dst_id: dst.as_u32(),
                        ..bytemuck::Zeroable::zeroed()
                    })
                    .collect();
                if sub_event == SubEvent::QueryCount {
                    return (RET_OK, matching.len() as u32);
                }

                let Some(addr) = self.resolve_staging(sender, msg.route_list_addr) else {
                    return (RET_PARAM_INVALID, 0);
                };
                let returned = matching.len().min(msg.route_num as usize);
                let bytes: Vec<u8> = matching[..returned]
                    .iter()
                    .flat_map(|r| bytemuck::bytes_of(r).to_vec())
                    .collect();
                match self.memory_mut(addr, bytes.len()) {
                    Ok(block) => {
                        block.copy_from_slice(&bytes);
                        (RET_OK, returned as u32)
                    }
                    Err(_) => (RET_PARAM_INVALID, 0),
                }
            }
        }
    }
}

/// Shared simulated device
#[derive(Clone, Default)]
pub struct SimDevice {
    state: Arc<Mutex<SimState>>,
}

impl SimDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// One process's view of the device
    pub fn process(&self, pid: Pid, run_mode: RunMode) -> SimProcess {
        SimProcess {
            device: self.clone(),
            pid,
            run_mode,
            device_id: 0,
            env: AHashMap::new(),
        }
    }

    pub fn backend(&self, pid: Pid, run_mode: RunMode) -> Backend {
        self.process(pid, run_mode).into_backend()
    }

    pub fn queue_id(&self, name: &str) -> Option<QueueId> {
        let state = self.state.lock();
        state
            .queues
            .iter()
            .find(|(_, queue)| queue.name == name)
            .map(|(id, _)| *id)
    }

    pub fn queue_len(&self, id: QueueId) -> Option<usize> {
        self.state.lock().queues.get(&id).map(|queue| queue.items.len())
    }

    pub fn permissions(&self, id: QueueId, pid: Pid) -> PermissionMask {
        let state = self.state.lock();
        state
            .queues
            .get(&id)
            .and_then(|queue| queue.perms.get(&pid).copied())
            .unwrap_or_default()
    }

    pub fn route_count(&self) -> usize {
        self.state.lock().routes.len()
    }

    pub fn is_registered(&self, pid: Pid) -> bool {
        self.state.lock().contacts.contains_key(&pid)
    }

    pub fn group_of(&self, pid: Pid) -> Option<String> {
        let state = self.state.lock();
        state
            .groups
            .iter()
            .find(|(_, members)| members.contains(&pid))
            .map(|(name, _)| name.clone())
    }

    pub fn group_count(&self) -> usize {
        self.state.lock().groups.len()
    }

    /// Place `pid` into `group`, creating the group if needed
    pub fn assign_group(&self, group: &str, pid: Pid) {
        let mut state = self.state.lock();
        state.groups.entry(group.to_string()).or_default().insert(pid);
    }

    /// Staging buffers currently allocated
    pub fn live_buffers(&self) -> usize {
        self.state.lock().memory.len()
    }

    /// Control messages received with this sub-event, across all processes
    pub fn control_calls(&self, sub_event: SubEvent) -> usize {
        let raw = sub_event.as_u32();
        self.state.lock().control_log.iter().filter(|(_, s)| *s == raw).count()
    }

    pub fn legacy_started(&self) -> bool {
        self.state.lock().legacy.started
    }

    pub fn legacy_destroys(&self) -> usize {
        self.state.lock().legacy.destroys
    }
}

/// One simulated process; implements every adapter trait
#[derive(Clone)]
pub struct SimProcess {
    device: SimDevice,
    pid: Pid,
    run_mode: RunMode,
    device_id: DeviceId,
    env: AHashMap<String, String>,
}

impl SimProcess {
    /// Set a variable visible through [`Platform::env_var`]
    pub fn with_env(mut self, name: &str, value: &str) -> Self {
        self.env.insert(name.to_string(), value.to_string());
        self
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn into_backend(self) -> Backend {
        let process = Arc::new(self);
        Backend {
            driver: process.clone(),
            control: process.clone(),
            allocator: process.clone(),
            platform: process.clone(),
            legacy: process,
        }
    }
}

impl QueueDriver for SimProcess {
    fn init(&self, _device: DeviceId) -> Result<(), DriverError> {
        Ok(())
    }

    fn create(&self, _device: DeviceId, attr: &QueueAttr) -> Result<QueueId, DriverError> {
        let mut state = self.device.state.lock();
        if state.queues.values().any(|queue| queue.name == attr.name()) {
            return Err(DriverError::AlreadyExists);
        }
        if attr.depth() < MIN_QUEUE_DEPTH {
            return Err(DriverError::Failed { code: 1 });
        }
        let id = state.new_queue(attr.name().to_string(), attr.depth(), attr.overwrite(), self.pid);
        debug!("[SIM] pid {} created queue '{}' as {}", self.pid, attr.name(), id);
        Ok(id)
    }

    fn destroy(&self, _device: DeviceId, queue_id: QueueId) -> Result<(), DriverError> {
        let mut state = self.device.state.lock();
        if !state.queue(queue_id)?.allows(self.pid, PermissionMask::MANAGE) {
            return Err(DriverError::PermissionDenied);
        }
        state.queues.remove(&queue_id);
        Ok(())
    }

    fn enqueue(&self, _device: DeviceId, queue_id: QueueId, buf: &[u8]) -> Result<(), DriverError> {
        self.device.state.lock().enqueue(self.pid, queue_id, buf)
    }

    fn dequeue(&self, _device: DeviceId, queue_id: QueueId) -> Result<Vec<u8>, DriverError> {
        let mut state = self.device.state.lock();
        let queue = state.queue_mut(queue_id)?;
        if !queue.allows(self.pid, PermissionMask::DEQUEUE) {
            return Err(DriverError::PermissionDenied);
        }
        queue.items.pop_front().ok_or(DriverError::QueueEmpty)
    }

    fn peek(&self, _device: DeviceId, queue_id: QueueId, _timeout_ms: i32) -> Result<usize, DriverError> {
        let state = self.device.state.lock();
        let queue = state.queue(queue_id)?;
        queue.items.front().map(Vec::len).ok_or(DriverError::QueueEmpty)
    }

    fn attach(&self, _device: DeviceId, queue_id: QueueId, _timeout_ms: i32) -> Result<(), DriverError> {
        let mut state = self.device.state.lock();
        let pid = self.pid;
        let queue = state.queue_mut(queue_id)?;
        if queue.perms.get(&pid).map_or(true, |mask| mask.is_empty()) {
            // No grant arrived within the wait
            return Err(DriverError::Timeout);
        }
        queue.attached.insert(pid);
        Ok(())
    }

    fn grant(
        &self,
        _device: DeviceId,
        queue_id: QueueId,
        pid: Pid,
        mask: PermissionMask,
        _timeout_ms: i32,
    ) -> Result<(), DriverError> {
        let mut state = self.device.state.lock();
        let grantor = self.pid;
        let queue = state.queue_mut(queue_id)?;
        if queue.perms.get(&grantor).map_or(true, |m| m.is_empty()) {
            return Err(DriverError::PermissionDenied);
        }
        *queue.perms.entry(pid).or_default() |= mask;
        Ok(())
    }

    fn query_permission(&self, _device: DeviceId, queue_id: QueueId) -> Result<PermissionMask, DriverError> {
        let state = self.device.state.lock();
        let queue = state.queue(queue_id)?;
        if !queue.attached.contains(&self.pid) {
            return Err(DriverError::NotFound);
        }
        Ok(queue.perms.get(&self.pid).copied().unwrap_or_default())
    }
}

impl ControlTransport for SimProcess {
    fn submit(&self, _device: DeviceId, event: &ControlEvent) -> Result<Vec<u8>, DriverError> {
        if event.dst_pid != QS_PID && event.dst_pid != CP_PID {
            return Err(DriverError::Failed { code: -1 });
        }
        let mut state = self.device.state.lock();
        state.control_log.push((self.pid, event.sub_event));

        let (ret_code, ret_value) = match SubEvent::from_u32(event.sub_event) {
            Some(sub_event) => state.handle_control(self.pid, sub_event, &event.payload),
            None => (RET_PARAM_INVALID, 0),
        };
        debug!(
            "[SIM] pid {} sub-event {} -> ret_code={}, ret_value={}",
            self.pid, event.sub_event, ret_code, ret_value
        );
        Ok(wire::encode(&ProcMsgRsp::new(event.event_id as u32, ret_code, ret_value)))
    }
}

impl BufferAllocator for SimProcess {
    fn alloc(&self, size: usize) -> Result<BufferHandle, DriverError> {
        if size == 0 {
            return Err(DriverError::Failed { code: 1 });
        }
        let mut state = self.device.state.lock();
        let addr = MEMORY_BASE + state.next_addr;
        state.next_addr += (size as u64 + 63) / 64 * 64 + 64;
        state.memory.insert(addr, vec![0; size]);
        Ok(BufferHandle { addr, size })
    }

    fn free(&self, handle: &BufferHandle) -> Result<(), DriverError> {
        self.device
            .state
            .lock()
            .memory
            .remove(&handle.addr)
            .map(|_| ())
            .ok_or(DriverError::NotFound)
    }

    fn write(&self, handle: &BufferHandle, offset: usize, bytes: &[u8]) -> Result<(), DriverError> {
        let mut state = self.device.state.lock();
        let block = state.memory_mut(handle.addr, offset + bytes.len())?;
        block[offset..].copy_from_slice(bytes);
        Ok(())
    }

    fn read(&self, handle: &BufferHandle, offset: usize, len: usize) -> Result<Vec<u8>, DriverError> {
        let mut state = self.device.state.lock();
        let block = state.memory_mut(handle.addr, offset + len)?;
        Ok(block[offset..].to_vec())
    }
}

impl Platform for SimProcess {
    fn run_mode(&self) -> Result<RunMode, DriverError> {
        Ok(self.run_mode)
    }

    fn current_device(&self) -> Result<DeviceId, DriverError> {
        Ok(self.device_id)
    }

    fn current_pid(&self) -> Pid {
        self.pid
    }

    fn peer_pid(&self, _device: DeviceId, kind: PeerKind) -> Result<Pid, DriverError> {
        Ok(match kind {
            PeerKind::QueueSchedule => QS_PID,
            PeerKind::ControlProcessor => CP_PID,
        })
    }

    fn query_group(&self, pid: Pid) -> Result<Option<String>, DriverError> {
        Ok(self.device.group_of(pid))
    }

    fn create_group(&self, name: &str) -> Result<(), DriverError> {
        let mut state = self.device.state.lock();
        if state.groups.contains_key(name) {
            return Err(DriverError::AlreadyExists);
        }
        state.groups.insert(name.to_string(), AHashSet::new());
        Ok(())
    }

    fn add_group_member(&self, name: &str, pid: Pid) -> Result<(), DriverError> {
        let mut state = self.device.state.lock();
        if state
            .groups
            .iter()
            .any(|(other, members)| other != name && members.contains(&pid))
        {
            return Err(DriverError::AlreadyExists);
        }
        state.groups.get_mut(name).ok_or(DriverError::NotFound)?.insert(pid);
        Ok(())
    }

    fn env_var(&self, name: &str) -> Option<String> {
        self.env.get(name).cloned()
    }
}

impl LegacyTransport for SimProcess {
    fn init(&self, _device: DeviceId) -> Result<(), DriverError> {
        let mut state = self.device.state.lock();
        state.legacy.started = true;
        state.legacy.inits += 1;
        Ok(())
    }

    fn prepare_pop(&self) -> Result<(), DriverError> {
        Ok(())
    }

    fn push(&self, channel: &str, items: &[LegacyItem]) -> Result<(), DriverError> {
        let mut state = self.device.state.lock();
        if !state.legacy.started {
            return Err(DriverError::Failed { code: 4 });
        }
        if state.legacy.stopped.contains(channel) {
            return Err(DriverError::Failed { code: 3 });
        }
        state
            .legacy
            .channels
            .entry(channel.to_string())
            .or_default()
            .push_back(items.to_vec());
        Ok(())
    }

    fn pop(&self, channel: &str) -> Result<Vec<LegacyItem>, DriverError> {
        let mut state = self.device.state.lock();
        state
            .legacy
            .channels
            .get_mut(channel)
            .and_then(VecDeque::pop_front)
            .ok_or(DriverError::QueueEmpty)
    }

    fn stop(&self, channel: &str) -> Result<(), DriverError> {
        self.device.state.lock().legacy.stopped.insert(channel.to_string());
        Ok(())
    }

    fn destroy(&self) -> Result<(), DriverError> {
        let mut state = self.device.state.lock();
        state.legacy.started = false;
        state.legacy.destroys += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forwarding_along_route() {
        let device = SimDevice::new();
        let proc_a = device.process(100, RunMode::Device);
        let a = proc_a.create(0, &QueueAttr::new("a").with_depth(2)).unwrap();
        let b = proc_a.create(0, &QueueAttr::new("b").with_depth(2)).unwrap();
        device.state.lock().routes.push((a, b));

        proc_a.enqueue(0, a, b"x").unwrap();
        assert_eq!(device.queue_len(a), Some(0));
        assert_eq!(device.queue_len(b), Some(1));
    }

    #[test]
    fn test_full_and_empty() {
        let device = SimDevice::new();
        let p = device.process(100, RunMode::Host);
        let q = p.create(0, &QueueAttr::new("q").with_depth(2)).unwrap();
        assert_eq!(p.dequeue(0, q), Err(DriverError::QueueEmpty));
        p.enqueue(0, q, b"1").unwrap();
        p.enqueue(0, q, b"2").unwrap();
        assert_eq!(p.enqueue(0, q, b"3"), Err(DriverError::QueueFull));
        assert_eq!(p.peek(0, q, -1), Ok(1));
    }

    #[test]
    fn test_permissions_enforced() {
        let device = SimDevice::new();
        let owner = device.process(100, RunMode::Device);
        let other = device.process(200, RunMode::Device);
        let q = owner.create(0, &QueueAttr::new("q")).unwrap();

        assert_eq!(other.enqueue(0, q, b"x"), Err(DriverError::PermissionDenied));
        assert_eq!(other.attach(0, q, 10), Err(DriverError::Timeout));
        owner.grant(0, q, 200, PermissionMask::ENQUEUE, -1).unwrap();
        other.attach(0, q, 10).unwrap();
        assert_eq!(other.query_permission(0, q), Ok(PermissionMask::ENQUEUE));
        other.enqueue(0, q, b"x").unwrap();
        assert_eq!(crate::adapter::QueueDriver::destroy(&other, 0, q), Err(DriverError::PermissionDenied));
    }

    #[test]
    fn test_group_membership_is_exclusive() {
        let device = SimDevice::new();
        let p = device.process(100, RunMode::Device);
        p.create_group("g").unwrap();
        p.create_group("h").unwrap();
        p.add_group_member("g", 5).unwrap();
        assert_eq!(p.add_group_member("h", 5), Err(DriverError::AlreadyExists));
        assert_eq!(p.create_group("g"), Err(DriverError::AlreadyExists));
        assert_eq!(device.group_of(5).as_deref(), Some("g"));
    }
}

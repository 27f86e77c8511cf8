// Copyright 2025 TDT Queue Contributors
// SPDX-License-Identifier: Apache-2.0

//! Core data model: queue ids, attributes, routes, queries, permissions
//! and the blocking-call timeout convention.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{QueueError, Result};

/// Process id as reported by the platform
pub type Pid = i32;

/// Device index
pub type DeviceId = u32;

/// Hard limit on queue names, including the driver's terminator byte
pub const MAX_QUEUE_NAME_LEN: usize = 128;

/// Smallest depth the driver accepts
pub const MIN_QUEUE_DEPTH: u32 = 2;

pub const DEFAULT_QUEUE_DEPTH: u32 = 2;

/// Driver-assigned queue identifier, unique within a device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueueId(pub u32);

impl QueueId {
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for QueueId {
    fn from(raw: u32) -> Self {
        QueueId(raw)
    }
}

/// Timeout for every blocking call
///
/// Raw convention: `-1` waits forever, `0` is rejected, positive values are
/// milliseconds. Other negative values are rejected as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    Infinite,
    Millis(u32),
}

impl Timeout {
    pub const INFINITE_RAW: i32 = -1;

    pub fn from_raw(timeout_ms: i32) -> Result<Self> {
        match timeout_ms {
            -1 => Ok(Timeout::Infinite),
            ms if ms > 0 => Ok(Timeout::Millis(ms as u32)),
            ms => Err(QueueError::InvalidArgument(format!(
                "timeout {} ms is invalid; use -1 to wait forever or a positive value",
                ms
            ))),
        }
    }

    pub fn as_raw(self) -> i32 {
        match self {
            Timeout::Infinite => Self::INFINITE_RAW,
            Timeout::Millis(ms) => ms as i32,
        }
    }

    /// `None` for an unbounded wait
    pub fn as_duration(self) -> Option<Duration> {
        match self {
            Timeout::Infinite => None,
            Timeout::Millis(ms) => Some(Duration::from_millis(ms as u64)),
        }
    }
}

impl TryFrom<i32> for Timeout {
    type Error = QueueError;

    fn try_from(timeout_ms: i32) -> Result<Self> {
        Timeout::from_raw(timeout_ms)
    }
}

/// How the driver hands buffers to the consumer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum WorkMode {
    #[default]
    Push = 1,
    Pull = 2,
}

/// Attributes fixed at queue creation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueAttr {
    name: String,
    depth: u32,
    work_mode: WorkMode,
    flow_ctrl: bool,
    flow_ctrl_drop_time: u32,
    overwrite: bool,
}

impl QueueAttr {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            depth: DEFAULT_QUEUE_DEPTH,
            work_mode: WorkMode::default(),
            flow_ctrl: false,
            flow_ctrl_drop_time: 0,
            overwrite: false,
        }
    }

    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_work_mode(mut self, mode: WorkMode) -> Self {
        self.work_mode = mode;
        self
    }

    /// Enable flow control; buffers older than `drop_time_ms` may be dropped
    pub fn with_flow_control(mut self, drop_time_ms: u32) -> Self {
        self.flow_ctrl = true;
        self.flow_ctrl_drop_time = drop_time_ms;
        self
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn set_depth(&mut self, depth: u32) {
        self.depth = depth;
    }

    pub fn set_work_mode(&mut self, mode: WorkMode) {
        self.work_mode = mode;
    }

    pub fn set_flow_control(&mut self, enabled: bool, drop_time_ms: u32) {
        self.flow_ctrl = enabled;
        self.flow_ctrl_drop_time = drop_time_ms;
    }

    pub fn set_overwrite(&mut self, overwrite: bool) {
        self.overwrite = overwrite;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn work_mode(&self) -> WorkMode {
        self.work_mode
    }

    pub fn flow_control(&self) -> (bool, u32) {
        (self.flow_ctrl, self.flow_ctrl_drop_time)
    }

    pub fn overwrite(&self) -> bool {
        self.overwrite
    }

    /// Local checks run before any driver call
    ///
    /// `max_name_len` counts the driver's terminator, so the usable length is
    /// one byte less.
    pub fn validate(&self, max_name_len: usize, min_depth: u32) -> Result<()> {
        if self.name.is_empty() {
            return Err(QueueError::InvalidArgument("queue name is empty".to_string()));
        }
        if self.name.len() >= max_name_len {
            return Err(QueueError::InvalidArgument(format!(
                "queue name '{}' is {} bytes; limit is {}",
                self.name,
                self.name.len(),
                max_name_len.saturating_sub(1)
            )));
        }
        if self.name.contains('\0') {
            return Err(QueueError::InvalidArgument(format!(
                "queue name '{}' contains a NUL byte",
                self.name.escape_default()
            )));
        }
        let min_depth = min_depth.max(MIN_QUEUE_DEPTH);
        if self.depth < min_depth {
            return Err(QueueError::InvalidArgument(format!(
                "queue depth {} is below the minimum of {}",
                self.depth, min_depth
            )));
        }
        Ok(())
    }
}

/// Producer-to-consumer route; status is written by the remote scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Route {
    src: QueueId,
    dst: QueueId,
    status: i32,
}

impl Route {
    pub fn new(src: QueueId, dst: QueueId) -> Self {
        Self { src, dst, status: 0 }
    }

    pub(crate) fn with_status(src: QueueId, dst: QueueId, status: i32) -> Self {
        Self { src, dst, status }
    }

    pub fn src(&self) -> QueueId {
        self.src
    }

    pub fn dst(&self) -> QueueId {
        self.dst
    }

    pub fn status(&self) -> i32 {
        self.status
    }

    pub(crate) fn set_status(&mut self, status: i32) {
        self.status = status;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteList {
    routes: Vec<Route>,
}

impl RouteList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, route: Route) {
        self.routes.push(route);
    }

    pub fn get(&self, index: usize) -> Result<Route> {
        self.routes.get(index).copied().ok_or_else(|| {
            QueueError::InvalidArgument(format!(
                "route index {} out of range (list holds {})",
                index,
                self.routes.len()
            ))
        })
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter()
    }

    pub fn as_slice(&self) -> &[Route] {
        &self.routes
    }

    pub(crate) fn routes_mut(&mut self) -> &mut [Route] {
        &mut self.routes
    }

    pub(crate) fn extend(&mut self, routes: impl IntoIterator<Item = Route>) {
        self.routes.extend(routes);
    }
}

impl FromIterator<Route> for RouteList {
    fn from_iter<T: IntoIterator<Item = Route>>(iter: T) -> Self {
        Self {
            routes: iter.into_iter().collect(),
        }
    }
}

/// Route predicate modes callers may ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryMode {
    BySource,
    ByDestination,
    BySourceAndDestination,
}

/// Route query; every field must be set explicitly before use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteQuery {
    mode: Option<QueryMode>,
    src: Option<QueueId>,
    dst: Option<QueueId>,
}

impl RouteQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by_source(src: QueueId) -> Self {
        Self {
            mode: Some(QueryMode::BySource),
            src: Some(src),
            dst: None,
        }
    }

    pub fn by_destination(dst: QueueId) -> Self {
        Self {
            mode: Some(QueryMode::ByDestination),
            src: None,
            dst: Some(dst),
        }
    }

    pub fn between(src: QueueId, dst: QueueId) -> Self {
        Self {
            mode: Some(QueryMode::BySourceAndDestination),
            src: Some(src),
            dst: Some(dst),
        }
    }

    pub fn set_mode(&mut self, mode: QueryMode) {
        self.mode = Some(mode);
    }

    pub fn set_src(&mut self, src: QueueId) {
        self.src = Some(src);
    }

    pub fn set_dst(&mut self, dst: QueueId) {
        self.dst = Some(dst);
    }

    pub fn mode(&self) -> Option<QueryMode> {
        self.mode
    }

    pub fn src(&self) -> Option<QueueId> {
        self.src
    }

    pub fn dst(&self) -> Option<QueueId> {
        self.dst
    }

    /// Resolve to `(mode, src, dst)`; ids the mode ignores are zero
    pub fn resolve(&self) -> Result<(QueryMode, QueueId, QueueId)> {
        let mode = self
            .mode
            .ok_or_else(|| QueueError::InvalidArgument("route query mode is not set".to_string()))?;
        let need_src = matches!(mode, QueryMode::BySource | QueryMode::BySourceAndDestination);
        let need_dst = matches!(mode, QueryMode::ByDestination | QueryMode::BySourceAndDestination);

        let src = match (need_src, self.src) {
            (true, None) => {
                return Err(QueueError::InvalidArgument(format!(
                    "route query {:?} needs a source queue id",
                    mode
                )))
            }
            (true, Some(id)) => id,
            (false, _) => QueueId(0),
        };
        let dst = match (need_dst, self.dst) {
            (true, None) => {
                return Err(QueueError::InvalidArgument(format!(
                    "route query {:?} needs a destination queue id",
                    mode
                )))
            }
            (true, Some(id)) => id,
            (false, _) => QueueId(0),
        };
        Ok((mode, src, dst))
    }
}

bitflags::bitflags! {
    /// Per-(queue, pid) permission bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PermissionMask: u32 {
        const MANAGE = 1;
        /// Read side
        const DEQUEUE = 1 << 1;
        /// Write side
        const ENQUEUE = 1 << 2;
    }
}

impl PermissionMask {
    /// Reject bits outside manage/dequeue/enqueue
    pub fn from_raw(bits: u32) -> Result<Self> {
        PermissionMask::from_bits(bits).ok_or_else(|| {
            QueueError::InvalidArgument(format!("permission bits {:#x} contain unknown flags", bits))
        })
    }
}

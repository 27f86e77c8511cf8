// Copyright 2025 TDT Queue Contributors
// SPDX-License-Identifier: Apache-2.0

//! Control-message wire contract with the queue-schedule peer
//!
//! All messages are fixed-layout `#[repr(C)]` records read and written with
//! `bytemuck`. Reserved tails are zeroed on encode and ignored on decode.

use bytemuck::{Pod, Zeroable};

use crate::error::{QueueError, Result};
use crate::types::{QueryMode, QueueId, Route};

/// Event id of queue-schedule control messages
pub const QS_EVENT_ID: i32 = 25;

/// Engine that executes queue-schedule messages
pub const DST_ENGINE_CCPU_DEVICE: u32 = 2;

/// Event group used with the queue-schedule peer
pub const BIND_QUEUE_GROUP_ID: u32 = 2;

/// Application return codes carried in [`ProcMsgRsp::ret_code`]
pub const RET_OK: i32 = 0;
pub const RET_PARAM_INVALID: i32 = 1;
pub const RET_INNER_ERROR: i32 = 2;
pub const RET_DRIVER_ERROR: i32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum SubEvent {
    Bind = 2049,
    BindInit = 2050,
    Unbind = 2051,
    Query = 2052,
    QueryCount = 2053,
}

impl SubEvent {
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    pub fn from_u32(raw: u32) -> Option<Self> {
        match raw {
            2049 => Some(SubEvent::Bind),
            2050 => Some(SubEvent::BindInit),
            2051 => Some(SubEvent::Unbind),
            2052 => Some(SubEvent::Query),
            2053 => Some(SubEvent::QueryCount),
            _ => None,
        }
    }
}

/// Predicate modes on the wire, including the internal either-end match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum WireQueryType {
    Src = 0,
    Dst = 1,
    SrcAndDst = 2,
    /// Destroy-time reference check only
    SrcOrDst = 3,
}

impl WireQueryType {
    pub fn from_u32(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(WireQueryType::Src),
            1 => Some(WireQueryType::Dst),
            2 => Some(WireQueryType::SrcAndDst),
            3 => Some(WireQueryType::SrcOrDst),
            _ => None,
        }
    }

    /// Does `route` match this predicate for the given ids
    pub fn matches(self, src: u32, dst: u32, route_src: u32, route_dst: u32) -> bool {
        match self {
            WireQueryType::Src => route_src == src,
            WireQueryType::Dst => route_dst == dst,
            WireQueryType::SrcAndDst => route_src == src && route_dst == dst,
            WireQueryType::SrcOrDst => route_src == src || route_dst == dst,
        }
    }
}

impl From<QueryMode> for WireQueryType {
    fn from(mode: QueryMode) -> Self {
        match mode {
            QueryMode::BySource => WireQueryType::Src,
            QueryMode::ByDestination => WireQueryType::Dst,
            QueryMode::BySourceAndDestination => WireQueryType::SrcAndDst,
        }
    }
}

/// Connect/init payload registering a process with the peer
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct BindInitMsg {
    pub pid: i32,
    pub group_id: u32,
    pub rsv: [u8; 32],
}

/// One route record in a staging buffer
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct RouteRecord {
    pub src_id: u32,
    pub dst_id: u32,
    pub status: i32,
    pub reserved0: u32,
    pub com_handle: u64,
    pub rsv: [u8; 32],
}

/// Bind/unbind payload: route count plus staging buffer address
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct RouteListMsg {
    pub route_num: u32,
    pub reserved0: u32,
    pub route_list_addr: u64,
    pub rsv: [u8; 32],
}

/// Count and fetch payload
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct RouteQueryMsg {
    pub query_type: u32,
    pub src_id: u32,
    pub dst_id: u32,
    pub route_num: u32,
    pub route_list_addr: u64,
    pub rsv: [u8; 16],
}

/// Reply header
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ProcMsgRsp {
    pub event_id: u32,
    pub ret_code: i32,
    pub ret_value: u32,
    pub rsv: [u8; 32],
}

pub const ROUTE_RECORD_SIZE: usize = std::mem::size_of::<RouteRecord>();

impl RouteRecord {
    pub fn from_route(route: &Route) -> Self {
        Self {
            src_id: route.src().as_u32(),
            dst_id: route.dst().as_u32(),
            status: route.status(),
            ..Zeroable::zeroed()
        }
    }

    pub fn to_route(&self) -> Route {
        Route::with_status(QueueId(self.src_id), QueueId(self.dst_id), self.status)
    }
}

impl RouteQueryMsg {
    pub fn new(query_type: WireQueryType, src: QueueId, dst: QueueId) -> Self {
        Self {
            query_type: query_type as u32,
            src_id: src.as_u32(),
            dst_id: dst.as_u32(),
            ..Zeroable::zeroed()
        }
    }
}

impl ProcMsgRsp {
    pub fn new(event_id: u32, ret_code: i32, ret_value: u32) -> Self {
        Self {
            event_id,
            ret_code,
            ret_value,
            ..Zeroable::zeroed()
        }
    }
}

pub fn encode<T: Pod>(msg: &T) -> Vec<u8> {
    bytemuck::bytes_of(msg).to_vec()
}

/// Decode a fixed record from the front of `bytes`
pub fn decode<T: Pod>(bytes: &[u8]) -> Result<T> {
    let size = std::mem::size_of::<T>();
    if bytes.len() < size {
        return Err(QueueError::Codec(format!(
            "message is {} bytes, expected at least {}",
            bytes.len(),
            size
        )));
    }
    Ok(bytemuck::pod_read_unaligned(&bytes[..size]))
}

pub fn encode_routes(routes: &[Route]) -> Vec<u8> {
    let mut out = Vec::with_capacity(routes.len() * ROUTE_RECORD_SIZE);
    for route in routes {
        out.extend_from_slice(bytemuck::bytes_of(&RouteRecord::from_route(route)));
    }
    out
}

pub fn decode_routes(bytes: &[u8], count: usize) -> Result<Vec<RouteRecord>> {
    let needed = count * ROUTE_RECORD_SIZE;
    if bytes.len() < needed {
        return Err(QueueError::Codec(format!(
            "route buffer is {} bytes, {} records need {}",
            bytes.len(),
            count,
            needed
        )));
    }
    Ok(bytes[..needed]
        .chunks_exact(ROUTE_RECORD_SIZE)
        .map(bytemuck::pod_read_unaligned::<RouteRecord>)
        .collect())
}

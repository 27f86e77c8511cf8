// Copyright 2025 TDT Queue Contributors
// SPDX-License-Identifier: Apache-2.0

//! Client-visible channel handles
//!
//! A handle speaks one of two protocols: the named-queue protocol (raw
//! buffers or bincode datasets through the process's [`QueueProcessor`]) or
//! the legacy push/pop transport (datasets only, infinite waits only).

use std::sync::Arc;

use tracing::{debug, info};

use crate::dataset::Dataset;
use crate::error::{QueueError, Result};
use crate::legacy::LegacySessions;
use crate::poll::PollPolicy;
use crate::processor::QueueProcessor;
use crate::types::{DeviceId, QueueId, Timeout};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelProtocol {
    Queue,
    Legacy,
}

enum Endpoint {
    Queue {
        processor: Arc<QueueProcessor>,
        queue_id: QueueId,
        /// Created by this handle (destroy removes the queue) or attached
        owned: bool,
    },
    Legacy {
        sessions: Arc<LegacySessions>,
        poll: PollPolicy,
    },
}

pub struct ChannelHandle {
    device: DeviceId,
    name: String,
    recv_name: Option<String>,
    endpoint: Endpoint,
    closed: bool,
}

impl ChannelHandle {
    pub(crate) fn queue(
        device: DeviceId,
        name: String,
        processor: Arc<QueueProcessor>,
        queue_id: QueueId,
        owned: bool,
    ) -> Self {
        Self {
            device,
            name,
            recv_name: None,
            endpoint: Endpoint::Queue {
                processor,
                queue_id,
                owned,
            },
            closed: false,
        }
    }

    pub(crate) fn legacy(
        device: DeviceId,
        name: String,
        recv_name: Option<String>,
        sessions: Arc<LegacySessions>,
        poll: PollPolicy,
    ) -> Self {
        Self {
            device,
            name,
            recv_name,
            endpoint: Endpoint::Legacy { sessions, poll },
            closed: false,
        }
    }

    pub fn device(&self) -> DeviceId {
        self.device
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Legacy receive channels only
    pub fn recv_name(&self) -> Option<&str> {
        self.recv_name.as_deref()
    }

    pub fn queue_id(&self) -> Option<QueueId> {
        match &self.endpoint {
            Endpoint::Queue { queue_id, .. } => Some(*queue_id),
            Endpoint::Legacy { .. } => None,
        }
    }

    pub fn protocol(&self) -> ChannelProtocol {
        match self.endpoint {
            Endpoint::Queue { .. } => ChannelProtocol::Queue,
            Endpoint::Legacy { .. } => ChannelProtocol::Legacy,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(QueueError::NotFound(format!("channel '{}' is closed", self.name)));
        }
        Ok(())
    }

    /// Enqueue one raw buffer
    pub fn send(&self, payload: &[u8], timeout_ms: i32) -> Result<()> {
        self.ensure_open()?;
        match &self.endpoint {
            Endpoint::Queue { processor, queue_id, .. } => processor.enqueue(*queue_id, payload, timeout_ms),
            Endpoint::Legacy { .. } => Err(QueueError::NotSupported(format!(
                "raw buffers on legacy channel '{}'",
                self.name
            ))),
        }
    }

    /// Dequeue one raw buffer
    pub fn receive(&self, timeout_ms: i32) -> Result<Vec<u8>> {
        self.ensure_open()?;
        match &self.endpoint {
            Endpoint::Queue { processor, queue_id, .. } => processor.dequeue(*queue_id, timeout_ms),
            Endpoint::Legacy { .. } => Err(QueueError::NotSupported(format!(
                "raw buffers on legacy channel '{}'",
                self.name
            ))),
        }
    }

    pub fn send_dataset(&self, dataset: &Dataset, timeout_ms: i32) -> Result<()> {
        self.ensure_open()?;
        match &self.endpoint {
            Endpoint::Queue { processor, queue_id, .. } => {
                let bytes = dataset.encode()?;
                processor.enqueue(*queue_id, &bytes, timeout_ms)
            }
            Endpoint::Legacy { sessions, .. } => {
                legacy_timeout(timeout_ms)?;
                sessions
                    .transport()
                    .push(&self.name, &dataset.to_legacy())
                    .map_err(|e| QueueError::from_driver("legacy push", None, e))?;
                debug!("[CHANNEL] Pushed {} item(s) on '{}'", dataset.len(), self.name);
                Ok(())
            }
        }
    }

    pub fn receive_dataset(&self, timeout_ms: i32) -> Result<Dataset> {
        self.ensure_open()?;
        match &self.endpoint {
            Endpoint::Queue { processor, queue_id, .. } => {
                let bytes = processor.dequeue(*queue_id, timeout_ms)?;
                Dataset::decode(&bytes)
            }
            Endpoint::Legacy { sessions, poll } => {
                let timeout = legacy_timeout(timeout_ms)?;
                let recv_name = self.recv_name.as_deref().ok_or_else(|| {
                    QueueError::InvalidArgument(format!("'{}' is not a receive channel", self.name))
                })?;
                let items = poll.run("legacy pop", timeout, || {
                    sessions
                        .transport()
                        .pop(recv_name)
                        .map_err(|e| QueueError::from_driver("legacy pop", None, e))
                })?;
                Dataset::from_legacy(&items)
            }
        }
    }

    /// Ask the peer to stop sending; legacy receive channels only
    pub fn stop(&self) -> Result<()> {
        self.ensure_open()?;
        match (&self.endpoint, self.recv_name.as_deref()) {
            (Endpoint::Legacy { sessions, .. }, Some(recv_name)) => {
                sessions
                    .transport()
                    .stop(recv_name)
                    .map_err(|e| QueueError::from_driver("legacy stop", None, e))?;
                info!("[CHANNEL] Stopped legacy channel '{}'", recv_name);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Close the channel
    ///
    /// Owned queues are destroyed (which fails while routes reference
    /// them). Attached queues are only marked closed: sibling handles in
    /// this process keep sharing the queue's direction locks. Legacy
    /// channels release their share of the legacy transport.
    pub fn destroy(&mut self) -> Result<()> {
        self.ensure_open()?;
        match &self.endpoint {
            Endpoint::Queue {
                processor,
                queue_id,
                owned: true,
            } => processor.destroy_queue(*queue_id)?,
            Endpoint::Queue { owned: false, .. } => {}
            Endpoint::Legacy { sessions, .. } => sessions.close(&self.name)?,
        }
        self.closed = true;
        info!("[CHANNEL] Closed channel '{}'", self.name);
        Ok(())
    }
}

impl std::fmt::Debug for ChannelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelHandle")
            .field("device", &self.device)
            .field("name", &self.name)
            .field("recv_name", &self.recv_name)
            .field("queue_id", &self.queue_id())
            .field("protocol", &self.protocol())
            .field("closed", &self.closed)
            .finish()
    }
}

/// Legacy peers only support unbounded waits
fn legacy_timeout(timeout_ms: i32) -> Result<Timeout> {
    match Timeout::from_raw(timeout_ms)? {
        Timeout::Infinite => Ok(Timeout::Infinite),
        Timeout::Millis(ms) => Err(QueueError::InvalidArgument(format!(
            "legacy channels only wait forever (-1), got {} ms",
            ms
        ))),
    }
}

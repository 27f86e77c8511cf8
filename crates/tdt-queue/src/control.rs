// Copyright 2025 TDT Queue Contributors
// SPDX-License-Identifier: Apache-2.0

//! Typed request/reply over the event-scheduling transport
//!
//! A transport failure becomes [`QueueError::Transport`]; a well-formed reply
//! with a non-zero return code becomes [`QueueError::RemoteRejected`]. No
//! retries and no connect handshake here; callers own both.

use std::sync::Arc;

use tracing::{debug, error};

use crate::adapter::{ControlEvent, ControlTransport};
use crate::error::{QueueError, Result};
use crate::types::{DeviceId, Pid};
use crate::wire::{self, ProcMsgRsp, SubEvent, DST_ENGINE_CCPU_DEVICE, RET_OK};

/// Decoded reply of an accepted request; rejections never produce one
#[derive(Debug, Clone)]
pub struct ControlReply {
    pub ret_value: u32,
    pub body: Vec<u8>,
}

pub struct ControlChannel {
    transport: Arc<dyn ControlTransport>,
    device: DeviceId,
    event_id: i32,
}

impl ControlChannel {
    pub fn new(transport: Arc<dyn ControlTransport>, device: DeviceId, event_id: i32) -> Self {
        Self {
            transport,
            device,
            event_id,
        }
    }

    /// Send one control message and wait for the reply
    pub fn send(&self, dst_pid: Pid, sub_event: SubEvent, payload: Vec<u8>, group_id: u32) -> Result<ControlReply> {
        let event = ControlEvent {
            dst_pid,
            group_id,
            event_id: self.event_id,
            sub_event: sub_event.as_u32(),
            dst_engine: DST_ENGINE_CCPU_DEVICE,
            payload,
        };

        let raw = self.transport.submit(self.device, &event).map_err(|e| {
            error!("[CONTROL] {:?} to pid {} failed in transport: {}", sub_event, dst_pid, e);
            QueueError::Transport(format!("{:?} to pid {}: {}", sub_event, dst_pid, e))
        })?;

        let header: ProcMsgRsp = wire::decode(&raw).map_err(|e| {
            QueueError::Transport(format!("malformed {:?} reply from pid {}: {}", sub_event, dst_pid, e))
        })?;

        debug!(
            "[CONTROL] {:?} -> pid {}: ret_code={}, ret_value={}",
            sub_event, dst_pid, header.ret_code, header.ret_value
        );

        if header.ret_code != RET_OK {
            error!(
                "[CONTROL] Pid {} rejected {:?} with code {}",
                dst_pid, sub_event, header.ret_code
            );
            return Err(QueueError::RemoteRejected {
                sub_event: sub_event.as_u32(),
                code: header.ret_code,
            });
        }

        Ok(ControlReply {
            ret_value: header.ret_value,
            body: raw[std::mem::size_of::<ProcMsgRsp>()..].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DriverError;
    use crate::wire::RET_PARAM_INVALID;

    struct Scripted(std::result::Result<Vec<u8>, DriverError>);

    impl ControlTransport for Scripted {
        fn submit(&self, _device: DeviceId, _event: &ControlEvent) -> std::result::Result<Vec<u8>, DriverError> {
            self.0.clone()
        }
    }

    fn channel(reply: std::result::Result<Vec<u8>, DriverError>) -> ControlChannel {
        ControlChannel::new(Arc::new(Scripted(reply)), 0, 25)
    }

    #[test]
    fn test_success_reply() {
        let mut raw = wire::encode(&ProcMsgRsp::new(25, RET_OK, 4));
        raw.push(0xAB);
        let reply = channel(Ok(raw)).send(10, SubEvent::QueryCount, vec![], 2).unwrap();
        assert_eq!(reply.ret_value, 4);
        assert_eq!(reply.body, vec![0xAB]);
    }

    #[test]
    fn test_rejection_is_not_transport_failure() {
        let raw = wire::encode(&ProcMsgRsp::new(25, RET_PARAM_INVALID, 0));
        let err = channel(Ok(raw)).send(10, SubEvent::Bind, vec![], 2).unwrap_err();
        assert_eq!(
            err,
            QueueError::RemoteRejected {
                sub_event: 2049,
                code: RET_PARAM_INVALID
            }
        );
    }

    #[test]
    fn test_transport_failure() {
        let err = channel(Err(DriverError::Timeout))
            .send(10, SubEvent::Unbind, vec![], 2)
            .unwrap_err();
        assert!(matches!(err, QueueError::Transport(_)));

        let err = channel(Ok(vec![1, 2, 3])).send(10, SubEvent::Unbind, vec![], 2).unwrap_err();
        assert!(matches!(err, QueueError::Transport(_)));
    }
}

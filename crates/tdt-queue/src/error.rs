// Copyright 2025 TDT Queue Contributors
// SPDX-License-Identifier: Apache-2.0

//! Error types for queue operations
//!
//! Adapters speak [`DriverError`]; everything above them speaks
//! [`QueueError`]. Translation happens in one place (the adapter wrappers)
//! so the operation name is always attached.

use thiserror::Error;

use crate::types::QueueId;

/// Raw failure reported by an adapter (driver, control transport, allocator,
/// platform or legacy transport)
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverError {
    #[error("queue full")]
    QueueFull,
    #[error("queue empty")]
    QueueEmpty,
    #[error("no such object")]
    NotFound,
    #[error("object already exists")]
    AlreadyExists,
    #[error("permission denied")]
    PermissionDenied,
    #[error("timed out")]
    Timeout,
    #[error("driver failure (code {code})")]
    Failed { code: i32 },
}

/// Errors surfaced by the queue subsystem
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Resource busy: {0}")]
    ResourceBusy(String),

    /// One driver attempt found the queue full
    #[error("Queue {queue_id} is full")]
    QueueFull { queue_id: QueueId },

    /// One driver attempt found the queue empty
    #[error("Queue {queue_id} is empty")]
    QueueEmpty { queue_id: QueueId },

    #[error("{operation} on queue {queue_id} timed out after {waited_ms} ms")]
    Timeout {
        operation: &'static str,
        queue_id: QueueId,
        waited_ms: u64,
    },

    #[error("Remote peer rejected sub-event {sub_event} with return code {code}")]
    RemoteRejected { sub_event: u32, code: i32 },

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Deployment detection failed: {0}")]
    Deployment(String),

    #[error("Codec error: {0}")]
    Codec(String),
}

impl QueueError {
    /// Full/empty conditions that a polling loop may retry
    pub fn is_transient(&self) -> bool {
        matches!(self, QueueError::QueueFull { .. } | QueueError::QueueEmpty { .. })
    }

    /// Map one adapter failure into the public taxonomy
    pub fn from_driver(operation: &'static str, queue_id: Option<QueueId>, err: DriverError) -> Self {
        let target = match queue_id {
            Some(id) => format!("{} (queue {})", operation, id),
            None => operation.to_string(),
        };
        match err {
            DriverError::QueueFull => QueueError::QueueFull {
                queue_id: queue_id.unwrap_or_default(),
            },
            DriverError::QueueEmpty => QueueError::QueueEmpty {
                queue_id: queue_id.unwrap_or_default(),
            },
            DriverError::NotFound => QueueError::NotFound(target),
            DriverError::AlreadyExists => QueueError::AlreadyExists(target),
            DriverError::PermissionDenied => QueueError::PermissionDenied(target),
            DriverError::Timeout => QueueError::Timeout {
                operation,
                queue_id: queue_id.unwrap_or_default(),
                waited_ms: 0,
            },
            DriverError::Failed { code } => {
                QueueError::Transport(format!("{} failed with driver code {}", target, code))
            }
        }
    }
}

impl From<bincode::Error> for QueueError {
    fn from(err: bincode::Error) -> Self {
        QueueError::Codec(err.to_string())
    }
}

/// Result type for queue operations
pub type Result<T> = std::result::Result<T, QueueError>;

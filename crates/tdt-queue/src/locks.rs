// Copyright 2025 TDT Queue Contributors
// SPDX-License-Identifier: Apache-2.0

//! Per-queue direction locks
//!
//! Each queue id gets one mutex for the enqueue direction and one for the
//! dequeue direction, created on first use and dropped when the queue is
//! destroyed. Different queue ids never contend.

use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::Mutex;

use crate::types::QueueId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Enqueue,
    Dequeue,
}

#[derive(Default)]
struct LockPair {
    enqueue: Arc<Mutex<()>>,
    dequeue: Arc<Mutex<()>>,
}

#[derive(Default)]
pub struct QueueLockTable {
    locks: Mutex<AHashMap<QueueId, LockPair>>,
}

impl QueueLockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock for one direction of a queue; hold its guard across the driver call
    pub fn lock_for(&self, queue_id: QueueId, direction: Direction) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock();
        let pair = locks.entry(queue_id).or_default();
        match direction {
            Direction::Enqueue => pair.enqueue.clone(),
            Direction::Dequeue => pair.dequeue.clone(),
        }
    }

    /// Forget a queue after the driver destroyed it
    pub fn release(&self, queue_id: QueueId) {
        self.locks.lock().remove(&queue_id);
    }

    pub fn is_tracked(&self, queue_id: QueueId) -> bool {
        self.locks.lock().contains_key(&queue_id)
    }

    pub fn tracked_queues(&self) -> Vec<QueueId> {
        let locks = self.locks.lock();
        let mut ids: Vec<QueueId> = locks.keys().copied().collect();
        ids.sort();
        ids
    }
}

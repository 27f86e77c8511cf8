// Copyright 2025 TDT Queue Contributors
// SPDX-License-Identifier: Apache-2.0

//! Data-plane polling policy
//!
//! attempt -> classify -> sleep or return. Only transient full/empty results
//! are retried; elapsed time is measured from the first attempt and sleeps
//! are clipped so the call never overshoots its deadline by more than one
//! interval.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::{QueueError, Result};
use crate::types::Timeout;

/// What to do after a transient failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollDecision {
    Retry { sleep: Duration },
    Expire,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    interval: Duration,
}

impl PollPolicy {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(Duration::from_micros(1)),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Pure decision for a transient failure observed after `elapsed`
    pub fn decide(&self, timeout: Timeout, elapsed: Duration) -> PollDecision {
        match timeout.as_duration() {
            None => PollDecision::Retry { sleep: self.interval },
            Some(limit) if elapsed >= limit => PollDecision::Expire,
            Some(limit) => PollDecision::Retry {
                sleep: self.interval.min(limit - elapsed),
            },
        }
    }

    /// Drive `attempt` until it succeeds, fails hard, or the deadline passes
    ///
    /// A deadline miss is reported as [`QueueError::Timeout`] built from the
    /// last transient error.
    pub fn run<T, F>(&self, operation: &'static str, timeout: Timeout, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let started = Instant::now();
        let mut retries: u64 = 0;

        loop {
            let err = match attempt() {
                Ok(value) => {
                    if retries > 0 {
                        debug!("[POLL] {} succeeded after {} retries", operation, retries);
                    }
                    return Ok(value);
                }
                Err(e) if e.is_transient() => e,
                Err(e) => return Err(e),
            };

            let elapsed = started.elapsed();
            match self.decide(timeout, elapsed) {
                PollDecision::Retry { sleep } => {
                    retries += 1;
                    std::thread::sleep(sleep);
                }
                PollDecision::Expire => {
                    debug!(
                        "[POLL] {} gave up after {} retries ({} ms)",
                        operation,
                        retries,
                        elapsed.as_millis()
                    );
                    let queue_id = match err {
                        QueueError::QueueFull { queue_id } | QueueError::QueueEmpty { queue_id } => queue_id,
                        _ => Default::default(),
                    };
                    return Err(QueueError::Timeout {
                        operation,
                        queue_id,
                        waited_ms: elapsed.as_millis() as u64,
                    });
                }
            }
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(1))
    }
}

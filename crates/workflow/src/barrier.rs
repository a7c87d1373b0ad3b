//! Polling barrier between workflow steps
//!
//! A step completes when a callback handler sets its [`CompletionFlag`]. The
//! workflow driver waits on the flag by polling, so delivery and consumption
//! are decoupled: the driver observes a delivered callback at its next check.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::config::FlowConfig;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BarrierError {
    /// The flag was not set before the deadline
    #[error("condition not met after {waited:?} (limit {limit:?})")]
    Timeout { waited: Duration, limit: Duration },
}

/// Shared boolean set by a callback handler, read by the waiting driver
#[derive(Debug, Clone, Default)]
pub struct CompletionFlag(Arc<AtomicBool>);

impl CompletionFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Level-triggered wait on a [`CompletionFlag`]
///
/// If the flag is already set, [`wait`](Self::wait) returns immediately.
/// Otherwise the flag is re-checked every `poll_interval` until it is set or
/// the optional timeout elapses.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use sightflow_workflow::{CompletionFlag, SequentialBarrier};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let barrier = SequentialBarrier::new(Duration::from_millis(10), Some(Duration::from_secs(1)));
/// let flag = CompletionFlag::new();
/// flag.set();
/// barrier.wait(&flag).await.unwrap();
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct SequentialBarrier {
    poll_interval: Duration,
    timeout: Option<Duration>,
}

impl SequentialBarrier {
    pub fn new(poll_interval: Duration, timeout: Option<Duration>) -> Self {
        Self {
            poll_interval: poll_interval.max(Duration::from_millis(1)),
            timeout,
        }
    }

    pub fn from_config(config: &FlowConfig) -> Self {
        Self::new(config.poll_interval, config.step_timeout)
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Clear the flag before a new step starts waiting on it
    pub fn reset(&self, flag: &CompletionFlag) {
        flag.clear();
    }

    /// Suspend until `flag` is set, returning how long the wait took
    pub async fn wait(&self, flag: &CompletionFlag) -> Result<Duration, BarrierError> {
        let started = Instant::now();
        let mut polls: u64 = 0;

        loop {
            if flag.is_set() {
                let waited = started.elapsed();
                debug!(waited_ms = waited.as_millis() as u64, polls, "barrier released");
                return Ok(waited);
            }

            let waited = started.elapsed();
            let sleep_for = match self.timeout {
                Some(limit) if waited >= limit => {
                    warn!(
                        waited_ms = waited.as_millis() as u64,
                        limit_ms = limit.as_millis() as u64,
                        "barrier timed out"
                    );
                    return Err(BarrierError::Timeout { waited, limit });
                }
                Some(limit) => self.poll_interval.min(limit - waited),
                None => self.poll_interval,
            };

            polls += 1;
            trace!(polls, "condition not met, sleeping");
            tokio::time::sleep(sleep_for).await;
        }
    }
}

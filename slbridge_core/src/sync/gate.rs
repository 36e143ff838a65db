// Binary semaphore take/give protocol shared with the controller

use crate::descriptor::qualified_name;
use crate::error::{BridgeError, BridgeResult};
use crate::memory::platform::SemOp;
use crate::memory::registry::SegmentRegistry;
use std::io;
use std::sync::Arc;
use std::time::Duration;

/// Polling period for timed takes
pub const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// How long `take` may wait for the lock
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WaitPolicy {
    /// Block until acquired
    Forever,
    /// Single non-blocking attempt
    NoWait,
    /// Poll for up to the given number of seconds
    Timed(f64),
}

impl WaitPolicy {
    /// Number of polls a timed take gets: `floor(seconds / 1ms)`, at least one
    pub fn poll_budget(seconds: f64) -> u64 {
        let budget = (seconds / POLL_INTERVAL.as_secs_f64()).floor();
        if budget.is_finite() && budget >= 1.0 {
            budget as u64
        } else {
            1
        }
    }
}

impl Default for WaitPolicy {
    fn default() -> Self {
        WaitPolicy::Timed(1.0)
    }
}

const TAKE: [SemOp; 1] = [SemOp::new(0, -1, false)];
const TRY_TAKE: [SemOp; 1] = [SemOp::new(0, -1, true)];
// Wait-for-zero without blocking, then release. A free semaphore fails the
// first sub-op with EAGAIN and nothing is applied.
const GIVE: [SemOp; 2] = [SemOp::new(0, 0, true), SemOp::new(0, 1, false)];

/// Cross-process mutual exclusion over the controller's binary semaphores
#[derive(Debug, Clone)]
pub struct SemaphoreGate {
    namespace: String,
    registry: Arc<SegmentRegistry>,
}

impl SemaphoreGate {
    pub fn new(namespace: &str, registry: Arc<SegmentRegistry>) -> Self {
        Self {
            namespace: namespace.to_string(),
            registry,
        }
    }

    /// Take the semaphore `channel`
    ///
    /// Returns `Ok(false)` when the lock is held (`NoWait`) or the timeout
    /// ran out (`Timed`). Unexpected OS errors are fatal.
    pub fn take(&self, channel: &str, policy: WaitPolicy) -> BridgeResult<bool> {
        let name = qualified_name(&self.namespace, channel);
        let sem_id = self.registry.semaphore_id(&name)?;
        let platform = self.registry.platform();

        match policy {
            WaitPolicy::Forever => loop {
                match platform.sem_op(sem_id, &TAKE) {
                    Ok(()) => return Ok(true),
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(protocol_error(name, "take(forever)", e)),
                }
            },
            WaitPolicy::NoWait => match platform.sem_op(sem_id, &TRY_TAKE) {
                Ok(()) => Ok(true),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    log::debug!("Semaphore '{}' is held", name);
                    Ok(false)
                }
                Err(e) => Err(protocol_error(name, "take(no wait)", e)),
            },
            WaitPolicy::Timed(seconds) => {
                let mut budget = WaitPolicy::poll_budget(seconds);
                while budget > 0 {
                    match platform.sem_op(sem_id, &TRY_TAKE) {
                        Ok(()) => return Ok(true),
                        Err(e)
                            if matches!(
                                e.kind(),
                                io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                            ) => {}
                        Err(e) => return Err(protocol_error(name, "take(timed)", e)),
                    }
                    budget -= 1;
                    if budget > 0 {
                        std::thread::sleep(POLL_INTERVAL);
                    }
                }
                log::warn!("Timed out after {:.3}s waiting for '{}'", seconds, name);
                Ok(false)
            }
        }
    }

    /// Give the semaphore `channel` back
    ///
    /// Giving a semaphore that is already free is a no-op and returns `true`.
    pub fn give(&self, channel: &str) -> BridgeResult<bool> {
        let name = qualified_name(&self.namespace, channel);
        let sem_id = self.registry.semaphore_id(&name)?;

        match self.registry.platform().sem_op(sem_id, &GIVE) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                log::debug!("Semaphore '{}' was already free", name);
                Ok(true)
            }
            Err(e) => Err(protocol_error(name, "give", e)),
        }
    }
}

fn protocol_error(name: String, operation: &'static str, source: io::Error) -> BridgeError {
    log::error!("Semaphore {} on '{}' failed: {}", operation, name, source);
    BridgeError::SemaphoreProtocolError {
        name,
        operation,
        source,
    }
}

use anyhow::Result;
use slbridge_core::{ShmBridge, WaitPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Free,
    Held,
}

/// Check a semaphore without waiting; a free lock is given straight back
pub fn probe(bridge: &ShmBridge, semaphore: &str) -> Result<LockState> {
    if bridge.take(semaphore, WaitPolicy::NoWait)? {
        bridge.give(semaphore)?;
        Ok(LockState::Free)
    } else {
        Ok(LockState::Held)
    }
}

/// Release a semaphore left taken by a crashed client
pub fn release(bridge: &ShmBridge, semaphore: &str) -> Result<()> {
    bridge.give(semaphore)?;
    Ok(())
}

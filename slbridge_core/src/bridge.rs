use crate::codec::{self, Frame};
use crate::config::{BridgeConfig, LengthPolicy};
use crate::descriptor::DescriptorTable;
use crate::error::{BridgeError, BridgeResult};
use crate::memory::{IpcPlatform, RawChannel, SegmentRegistry, SysvIpc};
use crate::sync::{SemaphoreGate, WaitPolicy};
use nalgebra::DMatrix;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Joint state published by the simulator
pub const JOINT_SIM_STATE: &str = "smJointSimState";
/// Base position, velocity and acceleration published by the simulator
pub const BASE_STATE: &str = "smBaseState";
/// Base orientation published by the simulator
pub const BASE_ORIENT: &str = "smBaseOrient";
/// Desired commands published by the controller
pub const DES_COMMANDS: &str = "smDCommands";

/// Suffix of the semaphore guarding a channel
pub const SEM_SUFFIX: &str = "_sem";

/// Name of the semaphore guarding `channel`
pub fn semaphore_for(channel: &str) -> String {
    format!("{}{}", channel, SEM_SUFFIX)
}

/// Lock-free atomic metrics for bridge monitoring
#[derive(Debug)]
#[repr(align(64))]
pub struct AtomicBridgeMetrics {
    pub messages_sent: AtomicU64,
    pub messages_received: AtomicU64,
    pub lock_failures: AtomicU64,
    pub length_mismatches: AtomicU64,
    /// Every recoverable failure, the counter callers poll for alerting
    pub errors: AtomicU64,
    _padding: [u8; 24],
}

impl Default for AtomicBridgeMetrics {
    fn default() -> Self {
        Self {
            messages_sent: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            lock_failures: AtomicU64::new(0),
            length_mismatches: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            _padding: [0; 24],
        }
    }
}

impl AtomicBridgeMetrics {
    pub fn snapshot(&self) -> BridgeMetrics {
        BridgeMetrics {
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            lock_failures: self.lock_failures.load(Ordering::Relaxed),
            length_mismatches: self.length_mismatches.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeMetrics {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub lock_failures: u64,
    pub length_mismatches: u64,
    pub errors: u64,
}

/// Consumer side of the controller's shared memory
///
/// Every message operation brackets its copy with the channel's semaphore:
/// take, copy, give. Lock failures are counted and reported as `false`/`None`;
/// errors returned as `Err` with `is_fatal()` mean the bridge should be torn down.
pub struct ShmBridge {
    namespace: String,
    gate: SemaphoreGate,
    channel: RawChannel,
    wait: WaitPolicy,
    length_policy: LengthPolicy,
    command_columns: usize,
    metrics: Arc<AtomicBridgeMetrics>,
}

impl ShmBridge {
    /// Attach to the controller's System-V objects listed in the descriptor file
    pub fn connect(config: &BridgeConfig) -> BridgeResult<Self> {
        config.validate()?;
        let table = DescriptorTable::from_file(&config.descriptor_file)?;
        let platform = Arc::new(SysvIpc::new()?);
        Self::with_platform(config, &table, platform)
    }

    /// Attach through an explicit platform capability
    pub fn with_platform(
        config: &BridgeConfig,
        table: &DescriptorTable,
        platform: Arc<dyn IpcPlatform>,
    ) -> BridgeResult<Self> {
        config.validate()?;
        let registry = Arc::new(SegmentRegistry::attach(table, platform)?);

        log::info!(
            "Bridge for '{}' ready ({} objects, wait {:?}, length policy {:?})",
            config.namespace,
            registry.len(),
            config.wait_policy(),
            config.length_policy
        );

        Ok(Self {
            namespace: config.namespace.clone(),
            gate: SemaphoreGate::new(&config.namespace, registry.clone()),
            channel: RawChannel::new(&config.namespace, registry),
            wait: config.wait_policy(),
            length_policy: config.length_policy,
            command_columns: config.command_columns,
            metrics: Arc::new(AtomicBridgeMetrics::default()),
        })
    }

    pub fn take(&self, semaphore: &str, policy: WaitPolicy) -> BridgeResult<bool> {
        self.gate.take(semaphore, policy)
    }

    pub fn give(&self, semaphore: &str) -> BridgeResult<bool> {
        self.gate.give(semaphore)
    }

    /// Unlocked copy of a channel's payload; hold its semaphore around the call
    pub fn read_channel(&self, channel: &str) -> BridgeResult<Vec<u8>> {
        self.channel.read(channel)
    }

    /// Unlocked write of a channel's payload; hold its semaphore around the call
    pub fn write_channel(&self, channel: &str, data: &[u8]) -> BridgeResult<()> {
        self.channel.write(channel, data)
    }

    /// Take the channel's semaphore, copy its payload out, give it back
    ///
    /// `Ok(None)` when the lock could not be taken.
    pub fn read_locked(&self, channel: &str) -> BridgeResult<Option<Vec<u8>>> {
        let sem = semaphore_for(channel);
        if !self.gate.take(&sem, self.wait)? {
            self.record_lock_failure(channel);
            return Ok(None);
        }

        let data = self.channel.read(channel);
        self.gate.give(&sem)?;
        let data = data?;

        self.metrics.messages_received.fetch_add(1, Ordering::Relaxed);
        Ok(Some(data))
    }

    /// Take the channel's semaphore, copy `data` in, give it back
    pub fn write_locked(&self, channel: &str, data: &[u8]) -> BridgeResult<bool> {
        let expected = self.channel.view(channel)?.len;
        if data.len() != expected {
            self.metrics.length_mismatches.fetch_add(1, Ordering::Relaxed);
            match self.length_policy {
                LengthPolicy::Reject => {
                    self.metrics.errors.fetch_add(1, Ordering::Relaxed);
                    log::error!(
                        "Refusing to write {} bytes to '{}.{}' ({} expected)",
                        data.len(),
                        self.namespace,
                        channel,
                        expected
                    );
                    return Err(BridgeError::LengthMismatch {
                        name: format!("{}.{}", self.namespace, channel),
                        expected,
                        actual: data.len(),
                    });
                }
                LengthPolicy::Warn => {}
            }
        }

        let sem = semaphore_for(channel);
        if !self.gate.take(&sem, self.wait)? {
            self.record_lock_failure(channel);
            return Ok(false);
        }

        let written = self.channel.write(channel, data);
        self.gate.give(&sem)?;
        written?;

        self.metrics.messages_sent.fetch_add(1, Ordering::Relaxed);
        Ok(true)
    }

    /// Publish the simulated joint state (`ndof x ncols`)
    pub fn send_joint_state(&self, state: &DMatrix<f32>, timestamp: f32) -> BridgeResult<bool> {
        self.write_locked(JOINT_SIM_STATE, &codec::encode_joint_state(state, timestamp))
    }

    /// Publish the simulated base state (`nrows x ncols`)
    pub fn send_base_state(&self, state: &DMatrix<f32>, timestamp: f32) -> BridgeResult<bool> {
        self.write_locked(BASE_STATE, &codec::encode_base_state(state, timestamp))
    }

    /// Publish the simulated base orientation (at least `5 x 4`)
    pub fn send_base_orientation(&self, orient: &DMatrix<f32>, timestamp: f32) -> BridgeResult<bool> {
        let bytes = codec::encode_base_orientation(orient, timestamp)?;
        self.write_locked(BASE_ORIENT, &bytes)
    }

    /// Publish joint state, base state and base orientation with one timestamp
    ///
    /// Stops at the first message that could not be published.
    pub fn send_sim_state(
        &self,
        joint_state: &DMatrix<f32>,
        base_state: &DMatrix<f32>,
        base_orient: &DMatrix<f32>,
        timestamp: f32,
    ) -> BridgeResult<bool> {
        Ok(self.send_joint_state(joint_state, timestamp)?
            && self.send_base_state(base_state, timestamp)?
            && self.send_base_orientation(base_orient, timestamp)?)
    }

    /// Receive the controller's desired commands
    ///
    /// `Ok(None)` when the lock could not be taken.
    pub fn receive_commands(&self) -> BridgeResult<Option<Frame>> {
        match self.read_locked(DES_COMMANDS)? {
            Some(data) => codec::decode_commands(&data, self.command_columns).map(Some),
            None => Ok(None),
        }
    }

    fn record_lock_failure(&self, channel: &str) {
        self.metrics.lock_failures.fetch_add(1, Ordering::Relaxed);
        let errors = self.metrics.errors.fetch_add(1, Ordering::Relaxed) + 1;
        log::warn!(
            "Could not lock '{}.{}' ({} errors so far)",
            self.namespace,
            channel,
            errors
        );
    }

    /// Monotonic count of recoverable failures
    pub fn errors(&self) -> u64 {
        self.metrics.errors.load(Ordering::Relaxed)
    }

    pub fn metrics(&self) -> BridgeMetrics {
        self.metrics.snapshot()
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

impl std::fmt::Debug for ShmBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShmBridge")
            .field("namespace", &self.namespace)
            .field("wait", &self.wait)
            .field("length_policy", &self.length_policy)
            .field("metrics", &self.metrics.snapshot())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_semaphore_name() {
        assert_eq!(semaphore_for(BASE_STATE), "smBaseState_sem");
    }

    #[test]
    fn test_metrics_snapshot() {
        let metrics = AtomicBridgeMetrics::default();
        metrics.errors.fetch_add(2, Ordering::Relaxed);
        metrics.messages_sent.fetch_add(1, Ordering::Relaxed);
        let snap = metrics.snapshot();
        assert_eq!(snap.errors, 2);
        assert_eq!(snap.messages_sent, 1);
        assert_eq!(std::mem::align_of::<AtomicBridgeMetrics>(), 64);
    }
}

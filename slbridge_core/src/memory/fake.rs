//! In-process IPC platform with System-V semantics
//!
//! `FakeIpc` stands in for the controller's segments and semaphores so the
//! bridge can be exercised without a kernel IPC namespace. Objects are keyed
//! like the real thing; lookups of missing keys fail with `ENOENT`, oversize
//! lookups with `EINVAL`, and semaphore operation arrays are applied
//! atomically (all sub-operations or none).

use super::platform::{check_bounds, IpcPlatform, SemOp, SharedSegment};
use crate::error::{BridgeError, BridgeResult};
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::Arc;

#[derive(Default)]
struct FakeState {
    next_id: i32,
    /// key -> (shm id, backing memory)
    segments: HashMap<i32, (i32, Arc<Mutex<Vec<u8>>>)>,
    /// key -> sem id
    semaphore_keys: HashMap<i32, i32>,
    /// sem id -> values of the set
    semaphores: HashMap<i32, Vec<i32>>,
    /// Errors returned by the next semaphore operations, oldest first
    injected: VecDeque<i32>,
    sem_ops: u64,
}

impl FakeState {
    fn allocate_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }

    fn segment_by_id(&self, shm_id: i32) -> Option<Arc<Mutex<Vec<u8>>>> {
        self.segments
            .values()
            .find(|(id, _)| *id == shm_id)
            .map(|(_, mem)| mem.clone())
    }
}

/// Fake IPC namespace
#[derive(Default)]
pub struct FakeIpc {
    state: Mutex<FakeState>,
    changed: Condvar,
}

impl FakeIpc {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a zeroed segment, as the controller would
    pub fn add_segment(&self, key: i32, size: usize) {
        let mut state = self.state.lock();
        let id = state.allocate_id();
        state
            .segments
            .insert(key, (id, Arc::new(Mutex::new(vec![0; size]))));
    }

    /// Create a one-element semaphore set with an initial value
    pub fn add_semaphore(&self, key: i32, value: i32) {
        let mut state = self.state.lock();
        let id = state.allocate_id();
        state.semaphore_keys.insert(key, id);
        state.semaphores.insert(id, vec![value]);
    }

    pub fn semaphore_value(&self, key: i32) -> Option<i32> {
        let state = self.state.lock();
        let id = state.semaphore_keys.get(&key)?;
        state.semaphores.get(id).and_then(|v| v.first().copied())
    }

    /// Overwrite a semaphore value, simulating another process
    pub fn set_semaphore(&self, key: i32, value: i32) {
        let mut state = self.state.lock();
        if let Some(id) = state.semaphore_keys.get(&key).copied() {
            if let Some(values) = state.semaphores.get_mut(&id) {
                values[0] = value;
            }
        }
        self.changed.notify_all();
    }

    /// Snapshot of a segment's bytes
    pub fn segment_bytes(&self, key: i32) -> Option<Vec<u8>> {
        let state = self.state.lock();
        state.segments.get(&key).map(|(_, mem)| mem.lock().clone())
    }

    /// Write into a segment as the controller would
    pub fn write_segment(&self, key: i32, offset: usize, data: &[u8]) -> BridgeResult<()> {
        let state = self.state.lock();
        let (_, mem) = state
            .segments
            .get(&key)
            .ok_or_else(|| BridgeError::UnknownChannel(format!("segment key {}", key)))?;
        let mut mem = mem.lock();
        check_bounds(offset, data.len(), mem.len())?;
        mem[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Make the next semaphore operation fail with `errno`
    pub fn inject_sem_errno(&self, errno: i32) {
        self.state.lock().injected.push_back(errno);
    }

    /// Number of semaphore operations submitted so far
    pub fn sem_op_count(&self) -> u64 {
        self.state.lock().sem_ops
    }
}

impl IpcPlatform for FakeIpc {
    fn shm_get(&self, key: i32, size: usize) -> io::Result<i32> {
        let state = self.state.lock();
        let (id, mem) = state
            .segments
            .get(&key)
            .ok_or_else(|| io::Error::from_raw_os_error(libc::ENOENT))?;
        if size > mem.lock().len() {
            return Err(io::Error::from_raw_os_error(libc::EINVAL));
        }
        Ok(*id)
    }

    fn shm_attach(&self, shm_id: i32) -> io::Result<Box<dyn SharedSegment>> {
        let state = self.state.lock();
        let mem = state
            .segment_by_id(shm_id)
            .ok_or_else(|| io::Error::from_raw_os_error(libc::EINVAL))?;
        Ok(Box::new(FakeSegment { mem }))
    }

    fn sem_get(&self, key: i32, count: i32) -> io::Result<i32> {
        let state = self.state.lock();
        let id = *state
            .semaphore_keys
            .get(&key)
            .ok_or_else(|| io::Error::from_raw_os_error(libc::ENOENT))?;
        let members = state.semaphores.get(&id).map_or(0, |v| v.len());
        if count < 0 || count as usize > members {
            return Err(io::Error::from_raw_os_error(libc::EINVAL));
        }
        Ok(id)
    }

    fn sem_op(&self, sem_id: i32, ops: &[SemOp]) -> io::Result<()> {
        let mut state = self.state.lock();
        loop {
            state.sem_ops += 1;
            if let Some(errno) = state.injected.pop_front() {
                return Err(io::Error::from_raw_os_error(errno));
            }

            let values = state
                .semaphores
                .get_mut(&sem_id)
                .ok_or_else(|| io::Error::from_raw_os_error(libc::EINVAL))?;

            let mut trial = values.clone();
            let mut blocked = false;
            for op in ops {
                let value = trial
                    .get_mut(op.index as usize)
                    .ok_or_else(|| io::Error::from_raw_os_error(libc::EFBIG))?;
                let would_block = match op.delta {
                    0 => *value != 0,
                    d if d < 0 => *value + (d as i32) < 0,
                    _ => false,
                };
                if would_block {
                    if op.nowait {
                        return Err(io::Error::from_raw_os_error(libc::EAGAIN));
                    }
                    blocked = true;
                    break;
                }
                *value += op.delta as i32;
            }

            if !blocked {
                *values = trial;
                self.changed.notify_all();
                return Ok(());
            }

            self.changed.wait(&mut state);
        }
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

struct FakeSegment {
    mem: Arc<Mutex<Vec<u8>>>,
}

impl SharedSegment for FakeSegment {
    fn len(&self) -> usize {
        self.mem.lock().len()
    }

    fn read_at(&self, offset: usize, buf: &mut [u8]) -> BridgeResult<()> {
        let mem = self.mem.lock();
        check_bounds(offset, buf.len(), mem.len())?;
        buf.copy_from_slice(&mem[offset..offset + buf.len()]);
        Ok(())
    }

    fn write_at(&self, offset: usize, data: &[u8]) -> BridgeResult<()> {
        let mut mem = self.mem.lock();
        check_bounds(offset, data.len(), mem.len())?;
        mem[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }
}

// Platform IPC capability
//
// Linux: System-V shared memory and semaphores through libc (memory::sysv)
// Tests: in-process fake with the same semantics (memory::fake)

use crate::error::{BridgeError, BridgeResult};
use std::io;

/// One semaphore sub-operation, applied atomically with its siblings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SemOp {
    /// Index of the semaphore inside the set
    pub index: u16,
    /// Amount added to the semaphore; `0` waits for the value to become zero
    pub delta: i16,
    /// Fail with `WouldBlock` instead of suspending
    pub nowait: bool,
}

impl SemOp {
    pub const fn new(index: u16, delta: i16, nowait: bool) -> Self {
        Self {
            index,
            delta,
            nowait,
        }
    }
}

/// A shared memory segment attached into this process
///
/// Implementations bounds-check every access against `len()`.
pub trait SharedSegment: Send + Sync {
    /// Capacity of the attached mapping in bytes
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy `buf.len()` bytes starting at `offset` out of the segment
    fn read_at(&self, offset: usize, buf: &mut [u8]) -> BridgeResult<()>;

    /// Copy `data` into the segment starting at `offset`
    fn write_at(&self, offset: usize, data: &[u8]) -> BridgeResult<()>;
}

/// OS capability used by the registry and the semaphore gate
///
/// Lookups never create objects: the controller owns them.
/// Errors are reported as `io::Error` so callers can match on
/// `ErrorKind::WouldBlock` and `ErrorKind::Interrupted`.
pub trait IpcPlatform: Send + Sync {
    /// Look up an existing segment by key and declared size
    fn shm_get(&self, key: i32, size: usize) -> io::Result<i32>;

    /// Attach a segment for read-write access
    fn shm_attach(&self, shm_id: i32) -> io::Result<Box<dyn SharedSegment>>;

    /// Look up an existing semaphore set with `count` members
    fn sem_get(&self, key: i32, count: i32) -> io::Result<i32>;

    /// Submit an array of sub-operations as one atomic operation
    fn sem_op(&self, sem_id: i32, ops: &[SemOp]) -> io::Result<()>;

    /// Name used in diagnostics
    fn name(&self) -> &'static str;
}

/// Validate an access of `len` bytes at `offset` against `capacity`
pub fn check_bounds(offset: usize, len: usize, capacity: usize) -> BridgeResult<()> {
    match offset.checked_add(len) {
        Some(end) if end <= capacity => Ok(()),
        _ => Err(BridgeError::OutOfBounds {
            offset,
            len,
            capacity,
        }),
    }
}

/// Check if System-V IPC is available on this platform
pub fn has_sysv_ipc() -> bool {
    cfg!(target_os = "linux")
}

/// Get platform name for logging/diagnostics
pub fn platform_name() -> &'static str {
    if has_sysv_ipc() {
        "Linux"
    } else {
        "an unsupported platform"
    }
}

// System-V shared memory and semaphores via libc
use super::platform::{check_bounds, has_sysv_ipc, platform_name, IpcPlatform, SemOp, SharedSegment};
use crate::error::{BridgeError, BridgeResult};
use std::io;
use std::ptr::NonNull;

/// System-V IPC capability backed by the running kernel
#[derive(Debug)]
pub struct SysvIpc {
    _private: (),
}

impl SysvIpc {
    /// Load the capability, failing on platforms without System-V IPC
    pub fn new() -> BridgeResult<Self> {
        if !has_sysv_ipc() {
            return Err(BridgeError::PlatformUnavailable(format!(
                "System-V IPC is not supported on {}",
                platform_name()
            )));
        }
        Ok(Self { _private: () })
    }
}

#[cfg(target_os = "linux")]
impl IpcPlatform for SysvIpc {
    fn shm_get(&self, key: i32, size: usize) -> io::Result<i32> {
        // No IPC_CREAT: the controller owns the segment
        let id = unsafe { libc::shmget(key as libc::key_t, size, 0) };
        if id == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(id)
    }

    fn shm_attach(&self, shm_id: i32) -> io::Result<Box<dyn SharedSegment>> {
        let mut stat: libc::shmid_ds = unsafe { std::mem::zeroed() };
        if unsafe { libc::shmctl(shm_id, libc::IPC_STAT, &mut stat) } == -1 {
            return Err(io::Error::last_os_error());
        }

        let addr = unsafe { libc::shmat(shm_id, std::ptr::null(), 0) };
        if addr as isize == -1 {
            return Err(io::Error::last_os_error());
        }

        let ptr = NonNull::new(addr as *mut u8)
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "shmat returned null"))?;

        Ok(Box::new(SysvSegment {
            ptr,
            len: stat.shm_segsz as usize,
            shm_id,
        }))
    }

    fn sem_get(&self, key: i32, count: i32) -> io::Result<i32> {
        let id = unsafe { libc::semget(key as libc::key_t, count, 0) };
        if id == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(id)
    }

    fn sem_op(&self, sem_id: i32, ops: &[SemOp]) -> io::Result<()> {
        let mut bufs: Vec<libc::sembuf> = ops
            .iter()
            .map(|op| libc::sembuf {
                sem_num: op.index,
                sem_op: op.delta,
                sem_flg: if op.nowait {
                    libc::IPC_NOWAIT as libc::c_short
                } else {
                    0
                },
            })
            .collect();

        let rc = unsafe { libc::semop(sem_id, bufs.as_mut_ptr(), bufs.len()) };
        if rc == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "sysv"
    }
}

#[cfg(not(target_os = "linux"))]
impl IpcPlatform for SysvIpc {
    fn shm_get(&self, _key: i32, _size: usize) -> io::Result<i32> {
        Err(io::ErrorKind::Unsupported.into())
    }

    fn shm_attach(&self, _shm_id: i32) -> io::Result<Box<dyn SharedSegment>> {
        Err(io::ErrorKind::Unsupported.into())
    }

    fn sem_get(&self, _key: i32, _count: i32) -> io::Result<i32> {
        Err(io::ErrorKind::Unsupported.into())
    }

    fn sem_op(&self, _sem_id: i32, _ops: &[SemOp]) -> io::Result<()> {
        Err(io::ErrorKind::Unsupported.into())
    }

    fn name(&self) -> &'static str {
        "sysv"
    }
}

/// Segment attached with shmat, detached on drop
#[derive(Debug)]
pub struct SysvSegment {
    ptr: NonNull<u8>,
    len: usize,
    shm_id: i32,
}

impl SharedSegment for SysvSegment {
    fn len(&self) -> usize {
        self.len
    }

    fn read_at(&self, offset: usize, buf: &mut [u8]) -> BridgeResult<()> {
        check_bounds(offset, buf.len(), self.len)?;
        unsafe {
            std::ptr::copy_nonoverlapping(self.ptr.as_ptr().add(offset), buf.as_mut_ptr(), buf.len());
        }
        Ok(())
    }

    fn write_at(&self, offset: usize, data: &[u8]) -> BridgeResult<()> {
        check_bounds(offset, data.len(), self.len)?;
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), self.ptr.as_ptr().add(offset), data.len());
        }
        Ok(())
    }
}

impl Drop for SysvSegment {
    fn drop(&mut self) {
        #[cfg(target_os = "linux")]
        {
            let rc = unsafe { libc::shmdt(self.ptr.as_ptr() as *const libc::c_void) };
            if rc == -1 {
                log::warn!(
                    "shmdt failed for segment {}: {}",
                    self.shm_id,
                    io::Error::last_os_error()
                );
            }
        }
    }
}

// The mapping stays valid until drop; concurrent access is serialized by the
// controller's semaphores.
unsafe impl Send for SysvSegment {}
unsafe impl Sync for SysvSegment {}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;
    use crate::descriptor::DescriptorTable;
    use crate::memory::{RawChannel, SegmentRegistry};
    use crate::sync::{SemaphoreGate, WaitPolicy};
    use std::sync::Arc;

    /// Segment at `key` and semaphore at `key + 1`, created the way the
    /// controller creates them and removed on drop
    struct ControllerObjects {
        key: i32,
        shm_id: i32,
        sem_id: i32,
    }

    impl ControllerObjects {
        fn create(slot: i32, size: usize) -> Self {
            let key = 0x5b00_0000 | ((std::process::id() as i32 & 0xffff) << 4) | slot;
            let flags = libc::IPC_CREAT | libc::IPC_EXCL | 0o600;

            let shm_id = unsafe { libc::shmget(key, size, flags) };
            assert!(shm_id >= 0, "shmget: {}", io::Error::last_os_error());
            let sem_id = unsafe { libc::semget(key + 1, 1, flags) };
            assert!(sem_id >= 0, "semget: {}", io::Error::last_os_error());
            let objects = Self { key, shm_id, sem_id };

            let rc = unsafe { libc::semctl(sem_id, 0, libc::SETVAL, 1 as libc::c_int) };
            assert_eq!(rc, 0, "semctl: {}", io::Error::last_os_error());
            objects
        }

        fn table(&self, declared_size: usize) -> DescriptorTable {
            DescriptorTable::parse(&format!(
                "robot.smData 3 1 {} {} 8\nrobot.smData_sem 0 2 {} 0 0",
                self.key,
                declared_size,
                self.key + 1
            ))
            .unwrap()
        }

        fn semaphore_value(&self) -> i32 {
            unsafe { libc::semctl(self.sem_id, 0, libc::GETVAL) }
        }

        fn attach_count(&self) -> u64 {
            let mut stat: libc::shmid_ds = unsafe { std::mem::zeroed() };
            assert_eq!(unsafe { libc::shmctl(self.shm_id, libc::IPC_STAT, &mut stat) }, 0);
            stat.shm_nattch as u64
        }
    }

    impl Drop for ControllerObjects {
        fn drop(&mut self) {
            unsafe {
                libc::shmctl(self.shm_id, libc::IPC_RMID, std::ptr::null_mut());
                libc::semctl(self.sem_id, 0, libc::IPC_RMID);
            }
        }
    }

    #[test]
    fn test_missing_segment_is_error() {
        let ipc = SysvIpc::new().unwrap();
        // Key that no controller creates
        assert!(ipc.shm_get(-0x5eed_f00d, 64).is_err());
        assert!(ipc.sem_get(-0x5eed_f00d, 1).is_err());
    }

    #[test]
    fn test_attach_reads_kernel_size() {
        let objects = ControllerObjects::create(0, 64);
        let ipc = SysvIpc::new().unwrap();

        let shm_id = ipc.shm_get(objects.key, 64).unwrap();
        assert_eq!(shm_id, objects.shm_id);
        let segment = ipc.shm_attach(shm_id).unwrap();
        assert_eq!(segment.len(), 64);
        assert_eq!(objects.attach_count(), 1);

        segment.write_at(60, &[1, 2, 3, 4]).unwrap();
        let mut buf = [0u8; 4];
        segment.read_at(60, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4]);
        assert!(matches!(
            segment.read_at(61, &mut buf),
            Err(BridgeError::OutOfBounds { capacity: 64, .. })
        ));

        drop(segment);
        assert_eq!(objects.attach_count(), 0);
    }

    #[test]
    fn test_locked_round_trip() {
        let objects = ControllerObjects::create(2, 64);
        let platform = Arc::new(SysvIpc::new().unwrap());
        let registry = Arc::new(SegmentRegistry::attach(&objects.table(64), platform).unwrap());
        assert_eq!(objects.attach_count(), 1);

        let gate = SemaphoreGate::new("robot", registry.clone());
        let channel = RawChannel::new("robot", registry.clone());

        assert!(gate.take("smData_sem", WaitPolicy::NoWait).unwrap());
        assert_eq!(objects.semaphore_value(), 0);
        assert!(!gate.take("smData_sem", WaitPolicy::NoWait).unwrap());
        assert!(!gate.take("smData_sem", WaitPolicy::Timed(0.002)).unwrap());

        let payload: Vec<u8> = (0..56).collect();
        channel.write("smData", &payload).unwrap();
        assert_eq!(channel.read("smData").unwrap(), payload);

        assert!(gate.give("smData_sem").unwrap());
        assert_eq!(objects.semaphore_value(), 1);
        // already free: the compound give fails its wait-for-zero and changes nothing
        assert!(gate.give("smData_sem").unwrap());
        assert_eq!(objects.semaphore_value(), 1);

        drop(gate);
        drop(channel);
        drop(registry);
        assert_eq!(objects.attach_count(), 0);
    }

    #[test]
    fn test_declared_size_larger_than_segment() {
        let objects = ControllerObjects::create(4, 32);
        let platform = Arc::new(SysvIpc::new().unwrap());

        let err = SegmentRegistry::attach(&objects.table(64), platform).unwrap_err();
        assert!(err.is_fatal());
        match err {
            BridgeError::SegmentUnavailable { key, source, .. } => {
                assert_eq!(key, objects.key);
                assert_eq!(source.raw_os_error(), Some(libc::EINVAL));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(objects.attach_count(), 0);
    }
}

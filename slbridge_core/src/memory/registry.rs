use super::platform::{IpcPlatform, SharedSegment};
use crate::descriptor::{DescriptorTable, SegmentDescriptor, SegmentKind};
use crate::error::{BridgeError, BridgeResult};
use std::collections::HashMap;
use std::sync::Arc;

/// OS handle for one attached IPC object
pub enum AttachedHandle {
    SharedMemory {
        shm_id: i32,
        segment: Box<dyn SharedSegment>,
    },
    Semaphore {
        sem_id: i32,
    },
}

impl std::fmt::Debug for AttachedHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttachedHandle::SharedMemory { shm_id, segment } => f
                .debug_struct("SharedMemory")
                .field("shm_id", shm_id)
                .field("len", &segment.len())
                .finish(),
            AttachedHandle::Semaphore { sem_id } => {
                f.debug_struct("Semaphore").field("sem_id", sem_id).finish()
            }
        }
    }
}

#[derive(Debug)]
pub struct RegistryEntry {
    pub descriptor: SegmentDescriptor,
    pub handle: AttachedHandle,
}

/// Live handle table for every object in the descriptor table
///
/// Built once at startup; segments are detached when the registry is dropped.
pub struct SegmentRegistry {
    entries: HashMap<String, RegistryEntry>,
    platform: Arc<dyn IpcPlatform>,
}

impl SegmentRegistry {
    /// Attach every descriptor; any failure is fatal
    pub fn attach(table: &DescriptorTable, platform: Arc<dyn IpcPlatform>) -> BridgeResult<Self> {
        if table.is_empty() {
            return Err(BridgeError::EmptyDescriptorTable(table.source().to_string()));
        }

        let mut entries = HashMap::with_capacity(table.len());
        let mut segments = 0usize;
        let mut semaphores = 0usize;

        for (name, descriptor) in table.iter() {
            let handle = match descriptor.kind {
                SegmentKind::SharedMemory => {
                    let shm_id = platform
                        .shm_get(descriptor.key, descriptor.size)
                        .map_err(|source| BridgeError::SegmentUnavailable {
                            name: name.to_string(),
                            key: descriptor.key,
                            source,
                        })?;

                    let segment = platform.shm_attach(shm_id).map_err(|source| {
                        BridgeError::AttachFailed {
                            name: name.to_string(),
                            source,
                        }
                    })?;

                    if segment.len() < descriptor.size {
                        return Err(BridgeError::AttachFailed {
                            name: name.to_string(),
                            source: std::io::Error::new(
                                std::io::ErrorKind::InvalidData,
                                format!(
                                    "attached {} bytes, descriptor declares {}",
                                    segment.len(),
                                    descriptor.size
                                ),
                            ),
                        });
                    }

                    log::debug!(
                        "Attached segment '{}' (key {}, id {}, {} bytes)",
                        name,
                        descriptor.key,
                        shm_id,
                        descriptor.size
                    );
                    segments += 1;
                    AttachedHandle::SharedMemory { shm_id, segment }
                }
                SegmentKind::Semaphore => {
                    let sem_id = platform.sem_get(descriptor.key, 1).map_err(|source| {
                        BridgeError::SemaphoreUnavailable {
                            name: name.to_string(),
                            key: descriptor.key,
                            source,
                        }
                    })?;

                    log::debug!(
                        "Found semaphore '{}' (key {}, id {})",
                        name,
                        descriptor.key,
                        sem_id
                    );
                    semaphores += 1;
                    AttachedHandle::Semaphore { sem_id }
                }
            };

            entries.insert(
                name.to_string(),
                RegistryEntry {
                    descriptor: descriptor.clone(),
                    handle,
                },
            );
        }

        log::info!(
            "Attached {} segments and {} semaphores from {} via {}",
            segments,
            semaphores,
            table.source(),
            platform.name()
        );

        Ok(Self { entries, platform })
    }

    pub fn get(&self, name: &str) -> BridgeResult<&RegistryEntry> {
        self.entries
            .get(name)
            .ok_or_else(|| BridgeError::UnknownChannel(name.to_string()))
    }

    /// Semaphore-set id for a semaphore channel
    pub fn semaphore_id(&self, name: &str) -> BridgeResult<i32> {
        match self.get(name)?.handle {
            AttachedHandle::Semaphore { sem_id } => Ok(sem_id),
            AttachedHandle::SharedMemory { .. } => Err(BridgeError::WrongKind {
                name: name.to_string(),
                expected: SegmentKind::Semaphore.as_str(),
            }),
        }
    }

    /// Attached segment plus its descriptor for a shared memory channel
    pub fn segment(&self, name: &str) -> BridgeResult<(&SegmentDescriptor, &dyn SharedSegment)> {
        let entry = self.get(name)?;
        match &entry.handle {
            AttachedHandle::SharedMemory { segment, .. } => Ok((&entry.descriptor, &**segment)),
            AttachedHandle::Semaphore { .. } => Err(BridgeError::WrongKind {
                name: name.to_string(),
                expected: SegmentKind::SharedMemory.as_str(),
            }),
        }
    }

    pub fn platform(&self) -> &dyn IpcPlatform {
        self.platform.as_ref()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for SegmentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentRegistry")
            .field("entries", &self.entries.len())
            .field("platform", &self.platform.name())
            .finish_non_exhaustive()
    }
}

//! # Shared memory access for slbridge
//!
//! This module attaches to the segments a controller process created and
//! moves raw bytes in and out of them:
//!
//! - **IpcPlatform**: OS capability (segment lookup/attach, semaphore sets, `semop`)
//! - **SegmentRegistry**: attached handle table keyed by qualified name
//! - **RawChannel**: bounds-checked whole-payload copies
//!
//! ## Memory Safety
//!
//! Raw addresses returned by `shmat` never leave `sysv`. Every access goes
//! through a `SegmentView` validated against the attached segment capacity.

pub mod channel;
pub mod fake;
pub mod platform;
pub mod registry;
pub mod sysv;

pub use channel::{RawChannel, SegmentView};
pub use fake::FakeIpc;
pub use platform::{IpcPlatform, SemOp, SharedSegment};
pub use registry::{AttachedHandle, SegmentRegistry};
pub use sysv::SysvIpc;

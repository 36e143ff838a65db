//! # slbridge Core
//!
//! Consumer-side bridge to an SL-style robot controller over System-V shared
//! memory. The controller creates the segments and binary semaphores and
//! lists them in a descriptor file; this crate attaches to them and exchanges
//! state with a simulator or other numeric client:
//!
//! - **Descriptor**: the controller's `name kind id key size offset` table
//! - **Memory**: platform capability, segment registry, raw channel copies
//! - **Sync**: the binary semaphore take/give protocol
//! - **Codec**: joint state, base state, base orientation and command layouts
//! - **Bridge**: locked, counted message operations on top of all of the above
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use nalgebra::DMatrix;
//! use slbridge_core::{BridgeConfig, ShmBridge};
//!
//! let config = BridgeConfig::new("robot", "/tmp/sl_shm_objects");
//! let bridge = ShmBridge::connect(&config)?;
//!
//! if let Some(commands) = bridge.receive_commands()? {
//!     println!("commands at t={}: {}", commands.timestamp, commands.data);
//! }
//! bridge.send_joint_state(&DMatrix::zeros(7, 4), 0.0)?;
//! # Ok::<(), slbridge_core::BridgeError>(())
//! ```

pub mod bridge;
pub mod codec;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod memory;
pub mod sync;

// Re-export commonly used types for easy access
pub use bridge::{BridgeMetrics, ShmBridge};
pub use codec::{Frame, OrientationFrame};
pub use config::{BridgeConfig, LengthPolicy};
pub use descriptor::{DescriptorTable, SegmentDescriptor, SegmentKind};
pub use error::{BridgeError, BridgeResult};
pub use memory::{FakeIpc, IpcPlatform, SysvIpc};
pub use sync::WaitPolicy;

// Cross-process synchronization

pub mod gate;

pub use gate::{SemaphoreGate, WaitPolicy, POLL_INTERVAL};

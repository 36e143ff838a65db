//! Error types for the shared memory bridge
//!
//! Errors come in two tiers. Fatal errors mean the bridge cannot safely keep
//! talking to the controller (missing segments, a semaphore in a state the
//! protocol does not allow). Everything else is recoverable and is also
//! reflected in the bridge error counter.

use std::io;
use thiserror::Error;

/// Result alias used throughout slbridge
pub type BridgeResult<T> = Result<T, BridgeError>;

#[derive(Debug, Error)]
pub enum BridgeError {
    /// Malformed configuration or descriptor file
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Descriptor table is empty: no shared memory objects in {0}")]
    EmptyDescriptorTable(String),

    /// The OS IPC capability could not be loaded on this platform
    #[error("IPC platform unavailable: {0}")]
    PlatformUnavailable(String),

    #[error("Cannot get shared memory segment for '{name}' (key {key}): {source}")]
    SegmentUnavailable {
        name: String,
        key: i32,
        #[source]
        source: io::Error,
    },

    #[error("Cannot attach shared memory segment '{name}': {source}")]
    AttachFailed {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("Cannot get semaphore for '{name}' (key {key}): {source}")]
    SemaphoreUnavailable {
        name: String,
        key: i32,
        #[source]
        source: io::Error,
    },

    /// A semaphore operation failed with an error the lock protocol does not expect
    #[error("Semaphore protocol error on '{name}' ({operation}): {source}")]
    SemaphoreProtocolError {
        name: String,
        operation: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("Unknown channel '{0}'")]
    UnknownChannel(String),

    #[error("Channel '{name}' is not a {expected}")]
    WrongKind { name: String, expected: &'static str },

    #[error("Access of {len} bytes at offset {offset} exceeds segment capacity {capacity}")]
    OutOfBounds {
        offset: usize,
        len: usize,
        capacity: usize,
    },

    /// Message shape does not match the binary layout
    #[error("Layout error: {0}")]
    Layout(String),

    #[error("Encoded '{name}' is {actual} bytes, channel holds {expected} bytes")]
    LengthMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },
}

impl BridgeError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        BridgeError::Config(msg.into())
    }

    pub fn layout<S: Into<String>>(msg: S) -> Self {
        BridgeError::Layout(msg.into())
    }

    /// Whether the process should stop talking to the controller
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BridgeError::Config(_)
                | BridgeError::EmptyDescriptorTable(_)
                | BridgeError::PlatformUnavailable(_)
                | BridgeError::SegmentUnavailable { .. }
                | BridgeError::AttachFailed { .. }
                | BridgeError::SemaphoreUnavailable { .. }
                | BridgeError::SemaphoreProtocolError { .. }
        )
    }
}

//! Byte transport abstraction.
//!
//! Defines the `Transport` trait the loader drives: blocking transmit,
//! receive with a timeout, a reset line and a delay. Implementations exist
//! for real serial ports and for unit tests.

use std::thread;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to open port: {0}")]
    OpenFailed(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Reset failed: {0}")]
    ResetFailed(String),

    #[error("Port disconnected")]
    Disconnected,

    #[error("Timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

impl TransportError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout { .. })
    }
}

/// Abstract point-to-point byte transport.
///
/// A session owns its transport exclusively; none of these calls are expected
/// to be made concurrently.
pub trait Transport: Send {
    /// Write all of `data` to the link.
    fn transmit(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Read at most `max_len` bytes, waiting up to `timeout` for the first one.
    ///
    /// Returns `TransportError::Timeout` if nothing arrived in time.
    fn receive(&mut self, max_len: usize, timeout: Duration) -> Result<Vec<u8>, TransportError>;

    /// Pulse the target's reset line.
    fn assert_reset(&mut self) -> Result<(), TransportError>;

    /// Block for `ms` milliseconds.
    fn sleep_ms(&mut self, ms: u64) {
        thread::sleep(Duration::from_millis(ms));
    }

    /// Human readable port name.
    fn name(&self) -> String {
        String::from("<unnamed>")
    }
}

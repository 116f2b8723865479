//! Loader error type.

use thiserror::Error;

use crate::payload::ImageError;
use crate::protocol::{CommandError, PacketError};
use crate::state::SessionPhase;
use crate::transport::TransportError;

#[derive(Error, Debug)]
pub enum LoaderError {
    /// Challenge echo mismatched or never arrived. `received` is `None` on timeout;
    /// `expected` is `None` while reading the version bits.
    #[error("Hardware not found: lost at bit {bit} (expected {expected:?}, received {received:?})")]
    HardwareNotFound {
        bit: usize,
        expected: Option<u8>,
        received: Option<u8>,
    },

    #[error("Packet handshake failed (reply {reply:?})")]
    HandshakeFailed { reply: Option<u8> },

    #[error("Timeout waiting for ACK/NAK after {timeout_ms}ms")]
    PacketTimeout { timeout_ms: u64 },

    #[error("Packet rejected with reply 0x{reply:02X}")]
    PacketRejected { reply: u8 },

    /// A chunk of a multi-packet transfer failed. `offset` is the byte offset
    /// (load) or flash address (flash) reached before the failure.
    #[error("Transfer aborted at 0x{offset:X}: {source}")]
    TransferAborted {
        offset: u64,
        #[source]
        source: Box<LoaderError>,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Cannot {operation} while {phase}")]
    InvalidState {
        phase: SessionPhase,
        operation: &'static str,
    },

    #[error("Image error: {0}")]
    Image(#[from] ImageError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LoaderError {
    pub(crate) fn aborted_at(offset: u64, source: LoaderError) -> Self {
        LoaderError::TransferAborted {
            offset,
            source: Box::new(source),
        }
    }
}

impl From<CommandError> for LoaderError {
    fn from(e: CommandError) -> Self {
        LoaderError::InvalidArgument(e.to_string())
    }
}

impl From<PacketError> for LoaderError {
    fn from(e: PacketError) -> Self {
        LoaderError::InvalidArgument(e.to_string())
    }
}

//! Packet framing for the second-stage loader.
//!
//! ```text
//! SOH len-hi len-lo hdrchk payload[len] crc-hi crc-lo
//! ```
//!
//! The header checksum is the byte sum of the two length bytes. The CRC covers
//! only the payload (see [`crc::packet_crc`]).

use thiserror::Error;

use super::constants::{
    HDR_CHK, HDR_LEN_HI, HDR_LEN_LO, HDR_SOH, PKT_CRC_LEN, PKT_HDR_LEN, PKT_MAX_LEN, SOH,
};
use super::crc;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PacketError {
    #[error("Payload too large: {0} bytes (max {PKT_MAX_LEN})")]
    TooLarge(usize),
    #[error("Frame truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
    #[error("Bad start of frame: 0x{0:02X}")]
    BadStart(u8),
    #[error("Header checksum mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    HeaderChecksum { expected: u8, actual: u8 },
    #[error("CRC mismatch: expected 0x{expected:04X}, got 0x{actual:04X}")]
    Crc { expected: u16, actual: u16 },
}

/// Header and trailer computed for one payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub header: [u8; PKT_HDR_LEN],
    pub crc: [u8; PKT_CRC_LEN],
}

impl Frame {
    /// Build the header and CRC trailer for `payload`.
    pub fn new(payload: &[u8]) -> Result<Self, PacketError> {
        let len = payload.len();
        if len > PKT_MAX_LEN {
            return Err(PacketError::TooLarge(len));
        }

        let mut header = [0u8; PKT_HDR_LEN];
        header[HDR_SOH] = SOH;
        header[HDR_LEN_HI] = (len >> 8) as u8;
        header[HDR_LEN_LO] = len as u8;
        header[HDR_CHK] = header[HDR_LEN_HI].wrapping_add(header[HDR_LEN_LO]);

        Ok(Self {
            header,
            crc: crc::packet_crc(payload).to_be_bytes(),
        })
    }

    /// Payload length announced by the header.
    pub fn payload_len(&self) -> usize {
        ((self.header[HDR_LEN_HI] as usize) << 8) | self.header[HDR_LEN_LO] as usize
    }

    /// Total bytes on the wire for this frame.
    pub fn wire_len(&self) -> usize {
        PKT_HDR_LEN + self.payload_len() + PKT_CRC_LEN
    }
}

/// Assemble a complete frame into one buffer.
pub fn encode(payload: &[u8]) -> Result<Vec<u8>, PacketError> {
    let frame = Frame::new(payload)?;
    let mut out = Vec::with_capacity(frame.wire_len());
    out.extend_from_slice(&frame.header);
    out.extend_from_slice(payload);
    out.extend_from_slice(&frame.crc);
    Ok(out)
}

/// Validate a complete frame and return its payload.
pub fn decode(frame: &[u8]) -> Result<&[u8], PacketError> {
    if frame.len() < PKT_HDR_LEN + PKT_CRC_LEN {
        return Err(PacketError::Truncated {
            expected: PKT_HDR_LEN + PKT_CRC_LEN,
            actual: frame.len(),
        });
    }
    if frame[HDR_SOH] != SOH {
        return Err(PacketError::BadStart(frame[HDR_SOH]));
    }
    let expected_chk = frame[HDR_LEN_HI].wrapping_add(frame[HDR_LEN_LO]);
    if frame[HDR_CHK] != expected_chk {
        return Err(PacketError::HeaderChecksum {
            expected: expected_chk,
            actual: frame[HDR_CHK],
        });
    }

    let len = ((frame[HDR_LEN_HI] as usize) << 8) | frame[HDR_LEN_LO] as usize;
    if len > PKT_MAX_LEN {
        return Err(PacketError::TooLarge(len));
    }
    let total = PKT_HDR_LEN + len + PKT_CRC_LEN;
    if frame.len() < total {
        return Err(PacketError::Truncated {
            expected: total,
            actual: frame.len(),
        });
    }

    let payload = &frame[PKT_HDR_LEN..PKT_HDR_LEN + len];
    let received = u16::from_be_bytes([frame[total - 2], frame[total - 1]]);
    let computed = crc::packet_crc(payload);
    if received != computed {
        return Err(PacketError::Crc {
            expected: computed,
            actual: received,
        });
    }
    Ok(payload)
}

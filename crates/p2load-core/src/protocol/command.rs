//! Second-stage loader command records.
//!
//! Every command is three little-endian longs. The first long is the opcode
//! word: the low byte selects the command, the upper 24 bits carry the cog id
//! (Start/CogInit) or the byte count (Flash).

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use std::io::Cursor;
use thiserror::Error;

use super::constants::{CMD_COGINIT, CMD_FLASH, CMD_LOAD, CMD_START, OPCODE_AUX_MAX};

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Buffer too small: expected {expected}, got {actual}")]
    BufferTooSmall { expected: usize, actual: usize },
    #[error("Unknown opcode: 0x{0:02X}")]
    UnknownOpcode(u8),
    #[error("Flash byte count {0} does not fit in the opcode word")]
    CountOutOfRange(u32),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A command understood by the second-stage loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Write `count` bytes (sent in the following packets) to hub memory at `addr`.
    Load { addr: u32, count: u32 },
    /// Restart `cog` executing hub code at `addr`, passing `param`.
    Start { cog: u8, addr: u32, param: u32 },
    /// Launch `cog` as an isolated execution unit at `addr`, passing `param`.
    CogInit { cog: u8, addr: u32, param: u32 },
    /// Copy `count` bytes from hub memory at `hub_addr` to flash at `flash_addr`.
    Flash {
        flash_addr: u32,
        hub_addr: u32,
        count: u32,
    },
}

impl Command {
    pub const SIZE: usize = 12;

    /// Opcode tag (low byte of the opcode word).
    pub fn tag(&self) -> u8 {
        match self {
            Command::Load { .. } => CMD_LOAD,
            Command::Start { .. } => CMD_START,
            Command::CogInit { .. } => CMD_COGINIT,
            Command::Flash { .. } => CMD_FLASH,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Load { .. } => "load",
            Command::Start { .. } => "start",
            Command::CogInit { .. } => "coginit",
            Command::Flash { .. } => "flash",
        }
    }

    /// Full opcode word with the auxiliary value packed into the upper bits.
    pub fn opcode(&self) -> Result<u32, CommandError> {
        let aux = match *self {
            Command::Load { .. } => 0,
            Command::Start { cog, .. } | Command::CogInit { cog, .. } => cog as u32,
            Command::Flash { count, .. } => {
                if count > OPCODE_AUX_MAX {
                    return Err(CommandError::CountOutOfRange(count));
                }
                count
            }
        };
        Ok((aux << 8) | self.tag() as u32)
    }

    /// Serialize to the on-wire record.
    pub fn to_bytes(&self) -> Result<[u8; Self::SIZE], CommandError> {
        let (a, b) = match *self {
            Command::Load { addr, count } => (addr, count),
            Command::Start { addr, param, .. } | Command::CogInit { addr, param, .. } => {
                (addr, param)
            }
            Command::Flash {
                flash_addr,
                hub_addr,
                ..
            } => (flash_addr, hub_addr),
        };
        let mut buf = [0u8; Self::SIZE];
        LittleEndian::write_u32(&mut buf[0..4], self.opcode()?);
        LittleEndian::write_u32(&mut buf[4..8], a);
        LittleEndian::write_u32(&mut buf[8..12], b);
        Ok(buf)
    }

    /// Parse an on-wire record.
    pub fn from_bytes(data: &[u8]) -> Result<Self, CommandError> {
        if data.len() < Self::SIZE {
            return Err(CommandError::BufferTooSmall {
                expected: Self::SIZE,
                actual: data.len(),
            });
        }
        let mut cursor = Cursor::new(data);
        let opcode = cursor.read_u32::<LittleEndian>()?;
        let a = cursor.read_u32::<LittleEndian>()?;
        let b = cursor.read_u32::<LittleEndian>()?;
        let aux = opcode >> 8;

        match (opcode & 0xFF) as u8 {
            CMD_LOAD => Ok(Command::Load { addr: a, count: b }),
            CMD_START => Ok(Command::Start {
                cog: aux as u8,
                addr: a,
                param: b,
            }),
            CMD_COGINIT => Ok(Command::CogInit {
                cog: aux as u8,
                addr: a,
                param: b,
            }),
            CMD_FLASH => Ok(Command::Flash {
                flash_addr: a,
                hub_addr: b,
                count: aux,
            }),
            other => Err(CommandError::UnknownOpcode(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_layout() {
        let bytes = Command::Load {
            addr: 0x2000,
            count: 0x400,
        }
        .to_bytes()
        .unwrap();
        assert_eq!(bytes, [0, 0, 0, 0, 0x00, 0x20, 0, 0, 0x00, 0x04, 0, 0]);
    }

    #[test]
    fn test_start_packs_cog_id() {
        let cmd = Command::Start {
            cog: 3,
            addr: 0x400,
            param: 0xDEADBEEF,
        };
        assert_eq!(cmd.opcode().unwrap(), 0x0000_0301);
        let bytes = cmd.to_bytes().unwrap();
        assert_eq!(&bytes[0..4], &[0x01, 0x03, 0x00, 0x00]);
        assert_eq!(&bytes[8..12], &[0xEF, 0xBE, 0xAD, 0xDE]);
        assert_eq!(Command::from_bytes(&bytes).unwrap(), cmd);
    }

    #[test]
    fn test_coginit_tag() {
        let cmd = Command::CogInit {
            cog: 0x10,
            addr: 0,
            param: 0,
        };
        assert_eq!(cmd.opcode().unwrap(), 0x0000_1002);
    }

    #[test]
    fn test_flash_count_packing() {
        for count in [0u32, 1, 0x4000, 0x00FF_FFFF] {
            let cmd = Command::Flash {
                flash_addr: 0x8000,
                hub_addr: 0x1000,
                count,
            };
            let bytes = cmd.to_bytes().unwrap();
            let opcode = LittleEndian::read_u32(&bytes[0..4]);
            assert_eq!(opcode & 0xFF, CMD_FLASH as u32);
            assert_eq!(opcode >> 8, count);
            assert_eq!(Command::from_bytes(&bytes).unwrap(), cmd);
        }
    }

    #[test]
    fn test_flash_count_overflow() {
        let cmd = Command::Flash {
            flash_addr: 0,
            hub_addr: 0x1000,
            count: 0x0100_0000,
        };
        assert!(matches!(
            cmd.to_bytes(),
            Err(CommandError::CountOutOfRange(0x0100_0000))
        ));
    }

    #[test]
    fn test_unknown_opcode() {
        let bytes = [0x07, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        assert!(matches!(
            Command::from_bytes(&bytes),
            Err(CommandError::UnknownOpcode(0x07))
        ));
    }

    #[test]
    fn test_short_buffer() {
        assert!(matches!(
            Command::from_bytes(&[0u8; 8]),
            Err(CommandError::BufferTooSmall { .. })
        ));
    }
}

//! Protocol module - boot ROM and second-stage loader wire formats.

pub mod bootstrap;
pub mod command;
pub mod constants;
pub mod crc;
pub mod lfsr;
pub mod packet;

pub use command::{Command, CommandError};
pub use constants::*;
pub use lfsr::Lfsr;
pub use packet::{Frame, PacketError};

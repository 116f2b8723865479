//! Wire constants for the Propeller 2 boot ROM and second-stage loader.

use std::time::Duration;

// ============================================================================
// Packet Framing (second-stage loader)
// ============================================================================

/// Start of a packet.
pub const SOH: u8 = 0x01;
/// Positive acknowledgement.
pub const ACK: u8 = 0x06;
/// Negative acknowledgement.
pub const NAK: u8 = 0x15;

/// Maximum payload carried by a single packet.
pub const PKT_MAX_LEN: usize = 1024;
/// SOH, length-hi, length-lo, header checksum.
pub const PKT_HDR_LEN: usize = 4;
/// CRC16, high byte first.
pub const PKT_CRC_LEN: usize = 2;
/// Largest frame on the wire.
pub const FRAME_MAX_LEN: usize = PKT_HDR_LEN + PKT_MAX_LEN + PKT_CRC_LEN;

pub const HDR_SOH: usize = 0;
pub const HDR_LEN_HI: usize = 1;
pub const HDR_LEN_LO: usize = 2;
pub const HDR_CHK: usize = 3;

// ============================================================================
// Command Opcodes
// ============================================================================

pub const CMD_LOAD: u8 = 0;
pub const CMD_START: u8 = 1;
pub const CMD_COGINIT: u8 = 2;
pub const CMD_FLASH: u8 = 3;

/// Largest value that fits in the upper 24 bits of an opcode word.
pub const OPCODE_AUX_MAX: u32 = 0x00FF_FFFF;

// ============================================================================
// Detection (boot ROM)
// ============================================================================

/// Filler symbol sent around the challenge to leave room for echoes.
pub const DETECT_PREAMBLE: u8 = 0xF9;
/// LFSR seed ('P').
pub const LFSR_SEED: u8 = b'P';
/// Number of challenge bits exchanged.
pub const CHALLENGE_BITS: usize = 250;
/// Number of chip version bits read after the challenge.
pub const VERSION_BITS: usize = 8;

// ============================================================================
// Bootstrap Encoding (boot ROM)
// ============================================================================

/// Base pattern of every bootstrap symbol.
pub const BOOT_SYMBOL_BASE: u8 = 0x92;
/// Extra bits set on the final symbol of a word.
pub const BOOT_SYMBOL_END: u8 = 0x60;
/// Symbols needed to carry one 32-bit word.
pub const BOOT_SYMBOLS_PER_LONG: usize = 11;

// ============================================================================
// Images & Memory Layout
// ============================================================================

/// Size of a COG image (512 longs).
pub const COG_IMAGE_SIZE: usize = 512 * 4;
/// Long index of the (dummy) signature in a COG image.
pub const SIG_LONG_OFFSET: usize = 0x1F8;
/// Byte offset of the signature in a COG image.
pub const SIG_OFFSET: usize = SIG_LONG_OFFSET * 4;
/// Number of signature longs.
pub const SIG_LONGS: usize = 8;
/// Value stored in every signature long.
pub const SIG_VALUE: u32 = 0x0000_0001;
/// Byte offset of the clock period field in the stage-2 header.
pub const STAGE2_PERIOD_OFFSET: usize = 4;

/// Default target clock frequency (FPGA boards).
pub const DEFAULT_CLOCK_FREQ: u32 = 80_000_000;
/// Default serial baud rate.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Hub memory buffer used to relay data into flash.
pub const FLASH_BUF_START: u32 = 0x1000;
pub const FLASH_BUF_SIZE: usize = 16 * 1024;

// ============================================================================
// Timeouts
// ============================================================================

/// Wait for the first ACK after the stage-2 loader is injected.
pub const INITIAL_TIMEOUT: Duration = Duration::from_millis(10_000);
/// Per-packet ACK/NAK wait. Long because SD cards may take a while to scan the FAT.
pub const PACKET_TIMEOUT: Duration = Duration::from_millis(10_000);
/// Per-bit wait while reading the challenge echo.
pub const BIT_TIMEOUT: Duration = Duration::from_millis(100);
/// Per-bit wait while reading the chip version.
pub const VERSION_BIT_TIMEOUT: Duration = Duration::from_millis(50);
/// Settle time between injecting the loader and waiting for its ACK.
pub const LOADER_START_DELAY_MS: u64 = 100;

/// Transmit scratch buffer size.
pub const TX_BUF_SIZE: usize = 1024;
/// Receive scratch buffer size.
pub const RX_BUF_SIZE: usize = 1024;

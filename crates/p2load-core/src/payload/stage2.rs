//! Signed COG images for the boot ROM.
//!
//! The ROM only accepts a full 2048-byte COG image carrying a signature in
//! its last eight longs. The loader binaries are not really signed; the ROM
//! used during bring-up accepts a dummy signature of eight `0x00000001`
//! longs.
//!
//! Layout of the second-stage loader header:
//!
//! ```text
//! +0  jmpinit   u32
//! +4  period    u32   clock_freq / baud_rate
//! ```

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

use crate::protocol::bootstrap;
use crate::protocol::constants::{
    COG_IMAGE_SIZE, SIG_LONGS, SIG_OFFSET, SIG_VALUE, STAGE2_PERIOD_OFFSET,
};

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("Loader code too large: {size} bytes, maximum {max}")]
    TooLarge { size: usize, max: usize },
    #[error("Invalid baud rate: {0}")]
    InvalidBaudRate(u32),
}

/// A signed COG image ready for the boot ROM.
#[derive(Clone, PartialEq, Eq)]
pub struct CogImage {
    data: Vec<u8>,
}

impl CogImage {
    /// Build a signed image from loader code, patching the bit period for
    /// `baud_rate` at `clock_freq`.
    pub fn signed(code: &[u8], clock_freq: u32, baud_rate: u32) -> Result<Self, ImageError> {
        if baud_rate == 0 {
            return Err(ImageError::InvalidBaudRate(baud_rate));
        }
        if code.len() > COG_IMAGE_SIZE {
            return Err(ImageError::TooLarge {
                size: code.len(),
                max: COG_IMAGE_SIZE,
            });
        }

        let mut data = vec![0u8; COG_IMAGE_SIZE];
        data[..code.len()].copy_from_slice(code);

        LittleEndian::write_u32(
            &mut data[STAGE2_PERIOD_OFFSET..STAGE2_PERIOD_OFFSET + 4],
            clock_freq / baud_rate,
        );

        for long in data[SIG_OFFSET..SIG_OFFSET + SIG_LONGS * 4].chunks_exact_mut(4) {
            LittleEndian::write_u32(long, SIG_VALUE);
        }

        Ok(Self { data })
    }

    /// Patched bit period.
    pub fn period(&self) -> u32 {
        LittleEndian::read_u32(&self.data[STAGE2_PERIOD_OFFSET..STAGE2_PERIOD_OFFSET + 4])
    }

    /// Whether the signature longs are in place.
    pub fn is_signed(&self) -> bool {
        self.data[SIG_OFFSET..SIG_OFFSET + SIG_LONGS * 4]
            .chunks_exact(4)
            .all(|long| LittleEndian::read_u32(long) == SIG_VALUE)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Longs in transmit order.
    pub fn longs(&self) -> impl Iterator<Item = u32> + '_ {
        bootstrap::image_longs(&self.data)
    }

    /// Copy with every long byte-reversed, the layout the ROM reads from flash.
    pub fn to_flash_layout(&self) -> Vec<u8> {
        let mut out = self.data.clone();
        for long in out.chunks_exact_mut(4) {
            long.reverse();
        }
        out
    }
}

impl std::fmt::Debug for CogImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CogImage")
            .field("period", &self.period())
            .field("signed", &self.is_signed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::constants::DEFAULT_CLOCK_FREQ;

    fn code() -> Vec<u8> {
        (0..64u32).map(|i| (i + 1) as u8).collect()
    }

    #[test]
    fn test_period_patch() {
        for baud in [9_600u32, 115_200, 230_400, 2_000_000] {
            let image = CogImage::signed(&code(), DEFAULT_CLOCK_FREQ, baud).unwrap();
            assert_eq!(image.period(), DEFAULT_CLOCK_FREQ / baud);
        }
        let image = CogImage::signed(&code(), DEFAULT_CLOCK_FREQ, 115_200).unwrap();
        assert_eq!(image.period(), 694);
    }

    #[test]
    fn test_layout() {
        let image = CogImage::signed(&code(), DEFAULT_CLOCK_FREQ, 115_200).unwrap();
        let bytes = image.as_bytes();
        assert_eq!(bytes.len(), COG_IMAGE_SIZE);
        // jmpinit untouched
        assert_eq!(&bytes[0..4], &[1, 2, 3, 4]);
        // tail of the code untouched, then zero fill
        assert_eq!(bytes[63], 64);
        assert!(bytes[64..SIG_OFFSET].iter().all(|&b| b == 0));
        assert_eq!(SIG_OFFSET, 2016);
        for i in 0..SIG_LONGS {
            let off = SIG_OFFSET + i * 4;
            assert_eq!(&bytes[off..off + 4], &[1, 0, 0, 0]);
        }
    }

    #[test]
    fn test_signature_overrides_code() {
        let image = CogImage::signed(&[0xFFu8; COG_IMAGE_SIZE], DEFAULT_CLOCK_FREQ, 115_200)
            .unwrap();
        assert!(image.is_signed());
        assert_eq!(image.as_bytes()[SIG_OFFSET - 1], 0xFF);
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(matches!(
            CogImage::signed(&[0u8; COG_IMAGE_SIZE + 1], DEFAULT_CLOCK_FREQ, 115_200),
            Err(ImageError::TooLarge { .. })
        ));
        assert!(matches!(
            CogImage::signed(&code(), DEFAULT_CLOCK_FREQ, 0),
            Err(ImageError::InvalidBaudRate(0))
        ));
    }

    #[test]
    fn test_flash_layout_reverses_longs() {
        let image = CogImage::signed(&code(), DEFAULT_CLOCK_FREQ, 115_200).unwrap();
        let flash = image.to_flash_layout();
        assert_eq!(&flash[0..4], &[4, 3, 2, 1]);
        assert_eq!(&flash[SIG_OFFSET..SIG_OFFSET + 4], &[0, 0, 0, 1]);
        assert_eq!(image.longs().count(), 512);
    }
}

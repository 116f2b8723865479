//! Boot ROM long encoding.
//!
//! Before any loader code runs, the ROM only understands a fixed symbol
//! alphabet: each byte is `0x92` with three data bits dropped into bits 0, 3
//! and 6. A long takes 11 symbols, most significant bits first; the last
//! symbol also sets `0x60` to mark the end of the long.

use byteorder::{ByteOrder, LittleEndian};

use super::constants::{BOOT_SYMBOL_BASE, BOOT_SYMBOL_END, BOOT_SYMBOLS_PER_LONG};

/// Encode one long into boot ROM symbols.
pub fn encode_long(mut x: u32) -> [u8; BOOT_SYMBOLS_PER_LONG] {
    let mut out = [0u8; BOOT_SYMBOLS_PER_LONG];
    for (i, symbol) in out.iter_mut().enumerate() {
        let end = if i == BOOT_SYMBOLS_PER_LONG - 1 {
            BOOT_SYMBOL_END
        } else {
            0
        };
        *symbol = BOOT_SYMBOL_BASE
            | end
            | ((x >> 31) & 1) as u8
            | ((((x >> 30) & 1) as u8) << 3)
            | ((((x >> 29) & 1) as u8) << 6);
        x <<= 3;
    }
    out
}

/// Little-endian longs of an image, in transmit order. A trailing partial
/// long is zero padded.
pub fn image_longs(image: &[u8]) -> impl Iterator<Item = u32> + '_ {
    image.chunks(4).map(|chunk| {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        LittleEndian::read_u32(&word)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_long(symbols: &[u8]) -> u32 {
        let acc = symbols.iter().fold(0u64, |acc, &s| {
            let bits = (s & 1) << 2 | ((s >> 3) & 1) << 1 | ((s >> 6) & 1);
            (acc << 3) | bits as u64
        });
        (acc >> 1) as u32
    }

    #[test]
    fn test_zero_long() {
        let mut expected = [0x92u8; 11];
        expected[10] = 0xF2;
        assert_eq!(encode_long(0), expected);
    }

    #[test]
    fn test_all_ones_long() {
        let mut expected = [0xDBu8; 11];
        expected[10] = 0xFB;
        assert_eq!(encode_long(0xFFFF_FFFF), expected);
    }

    #[test]
    fn test_msb_first() {
        let symbols = encode_long(0x8000_0000);
        assert_eq!(symbols[0], 0x93);
        assert!(symbols[1..10].iter().all(|&s| s == 0x92));
    }

    #[test]
    fn test_known_pattern() {
        assert_eq!(
            encode_long(0x1234_5678),
            [0x92, 0x93, 0x93, 0xDA, 0x9A, 0xD2, 0x9A, 0x9B, 0xDA, 0x9B, 0xF2]
        );
        assert_eq!(decode_long(&encode_long(0x1234_5678)), 0x1234_5678);
    }

    #[test]
    fn test_only_last_symbol_marked() {
        let symbols = encode_long(0xA5A5_A5A5);
        assert!(symbols[..10].iter().all(|&s| s & 0x20 == 0));
        assert_eq!(symbols[10] & 0x60, 0x60);
    }

    #[test]
    fn test_image_longs() {
        let longs: Vec<u32> = image_longs(&[1, 2, 3, 4, 5]).collect();
        assert_eq!(longs, [0x0403_0201, 0x0000_0005]);
    }
}

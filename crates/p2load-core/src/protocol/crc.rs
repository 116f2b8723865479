//! CRC-16/CCITT accumulator used by the packet layer.
//!
//! The table is the usual polynomial 0x1021 table (the one found in every
//! XMODEM implementation). The loader folds two zero bytes into the CRC after
//! the payload, so [`packet_crc`] does the same.

const POLY: u16 = 0x1021;

const fn build_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u16) << 8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ POLY
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Precomputed CCITT table.
pub static CRC_TABLE: [u16; 256] = build_table();

/// Fold one byte into the accumulator.
#[inline]
pub fn update(crc: u16, byte: u8) -> u16 {
    CRC_TABLE[((crc >> 8) & 0xFF) as usize] ^ (crc << 8) ^ byte as u16
}

/// CRC of a packet payload, including the two trailing zero bytes.
pub fn packet_crc(payload: &[u8]) -> u16 {
    let crc = payload.iter().fold(0u16, |crc, &b| update(crc, b));
    update(update(crc, 0), 0)
}

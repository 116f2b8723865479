//! 8-bit LFSR used by the boot ROM connect handshake.
//!
//! Host and ROM both run this register from the same seed; the ROM echoes
//! each challenge bit back and the host checks it against its own copy.

use super::constants::LFSR_SEED;

/// Advance the register by one step, returning the output bit and the next state.
#[inline]
pub fn next_bit(state: u8) -> (u8, u8) {
    let bit = state & 1;
    let feedback = ((state >> 7) ^ (state >> 5) ^ (state >> 4) ^ (state >> 1)) & 1;
    (bit, ((state << 1) & 0xFE) | feedback)
}

/// Infinite bit stream produced by the register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lfsr {
    state: u8,
}

impl Lfsr {
    pub fn new(seed: u8) -> Self {
        Self { state: seed }
    }

    /// Current register contents.
    pub fn state(&self) -> u8 {
        self.state
    }
}

impl Default for Lfsr {
    fn default() -> Self {
        Self::new(LFSR_SEED)
    }
}

impl Iterator for Lfsr {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        let (bit, state) = next_bit(self.state);
        self.state = state;
        Some(bit)
    }
}

/// Fold one received version bit into the accumulator.
#[inline]
pub fn fold_version_bit(version: u8, bit: u8) -> u8 {
    ((version >> 1) & 0x7F) | ((bit & 1) << 7)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::constants::CHALLENGE_BITS;

    #[test]
    fn test_known_prefix() {
        let bits: Vec<u8> = Lfsr::default().take(16).collect();
        assert_eq!(bits, [0, 1, 0, 1, 1, 1, 0, 0, 1, 1, 1, 1, 0, 1, 0, 1]);
    }

    #[test]
    fn test_challenge_is_deterministic() {
        let a: Vec<u8> = Lfsr::default().take(CHALLENGE_BITS).collect();
        let b: Vec<u8> = Lfsr::new(b'P').take(CHALLENGE_BITS).collect();
        assert_eq!(a, b);
        assert_eq!(a.iter().map(|&b| b as usize).sum::<usize>(), 127);
    }

    #[test]
    fn test_final_state() {
        let mut lfsr = Lfsr::default();
        lfsr.by_ref().take(CHALLENGE_BITS).for_each(drop);
        assert_eq!(lfsr.state(), 0x9A);
    }

    #[test]
    fn test_next_bit_shift() {
        // 0x80: only bit 7 set, so feedback is 1 and output is 0.
        assert_eq!(next_bit(0x80), (0, 0x01));
        assert_eq!(next_bit(0x01), (1, 0x02));
    }

    #[test]
    fn test_version_fold() {
        let version = [1, 0, 1, 0, 0, 0, 0, 0]
            .iter()
            .fold(0u8, |v, &b| fold_version_bit(v, b));
        assert_eq!(version, 0x05);
    }
}

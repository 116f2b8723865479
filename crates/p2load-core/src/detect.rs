//! Boot ROM connect handshake.
//!
//! After reset the host sends a 250-bit challenge from the LFSR, followed by
//! filler symbols that give the ROM room to answer. The ROM replies with the
//! next 250 bits of the same register and then its 8-bit chip version. Host
//! and ROM share one register run, so the expected reply is simply the
//! continuation of the host's own sequence.

use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::error::LoaderError;
use crate::link::Link;
use crate::protocol::constants::{CHALLENGE_BITS, DETECT_PREAMBLE, VERSION_BITS};
use crate::protocol::lfsr::{self, Lfsr};
use crate::transport::Transport;

/// Receive timeouts used while reading the ROM's answer.
#[derive(Debug, Clone, Copy)]
pub struct DetectTimeouts {
    /// Per-bit wait for the challenge echo.
    pub bit: Duration,
    /// Per-bit wait for the version bits.
    pub version_bit: Duration,
}

/// Queue the connect string and filler, then flush.
pub fn send_challenge<T: Transport>(link: &mut Link<T>, lfsr: &mut Lfsr) -> Result<(), LoaderError> {
    link.tx_byte(DETECT_PREAMBLE)?;
    for bit in lfsr.take(CHALLENGE_BITS) {
        link.tx_byte(bit | 0xFE)?;
    }
    for _ in 0..CHALLENGE_BITS + VERSION_BITS {
        link.tx_byte(DETECT_PREAMBLE)?;
    }
    link.flush()?;
    Ok(())
}

/// Compare the ROM's answer against the continuation of `lfsr`, stopping at
/// the first mismatch or timeout.
pub fn verify_response<T: Transport>(
    link: &mut Link<T>,
    lfsr: &mut Lfsr,
    timeout: Duration,
) -> Result<(), LoaderError> {
    for (bit, expected) in lfsr.take(CHALLENGE_BITS).enumerate() {
        let received = match link.rx_bit(timeout) {
            Ok(b) => b,
            Err(e) if e.is_timeout() => {
                warn!(bit, "Hardware lost: no echo");
                return Err(LoaderError::HardwareNotFound {
                    bit,
                    expected: Some(expected),
                    received: None,
                });
            }
            Err(e) => return Err(e.into()),
        };
        if received != expected {
            warn!(bit, expected, received, "Hardware lost: echo mismatch");
            return Err(LoaderError::HardwareNotFound {
                bit,
                expected: Some(expected),
                received: Some(received),
            });
        }
    }
    Ok(())
}

/// Read the chip version that follows the challenge answer.
pub fn read_version<T: Transport>(link: &mut Link<T>, timeout: Duration) -> Result<u8, LoaderError> {
    let mut version = 0u8;
    for i in 0..VERSION_BITS {
        let bit = match link.rx_bit(timeout) {
            Ok(b) => b,
            Err(e) if e.is_timeout() => {
                warn!(bit = CHALLENGE_BITS + i, "Hardware lost: no version bit");
                return Err(LoaderError::HardwareNotFound {
                    bit: CHALLENGE_BITS + i,
                    expected: None,
                    received: None,
                });
            }
            Err(e) => return Err(e.into()),
        };
        version = lfsr::fold_version_bit(version, bit);
    }
    Ok(version)
}

/// Run one full detection attempt. The caller is expected to have reset the
/// target. Returns the chip version.
#[instrument(skip(link))]
pub fn detect<T: Transport>(link: &mut Link<T>, timeouts: DetectTimeouts) -> Result<u8, LoaderError> {
    link.reset_buffers();

    let mut lfsr = Lfsr::default();
    send_challenge(link, &mut lfsr)?;
    debug!("Challenge sent");

    verify_response(link, &mut lfsr, timeouts.bit)?;
    let version = read_version(link, timeouts.version_bit)?;

    info!(version = %format!("0x{:02X}", version), "Hardware found");
    Ok(version)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::protocol::constants::PACKET_TIMEOUT;
    use crate::transport::MockTransport;

    pub(crate) const TIMEOUTS: DetectTimeouts = DetectTimeouts {
        bit: Duration::from_millis(100),
        version_bit: Duration::from_millis(50),
    };

    /// Bytes a healthy ROM sends back for the given chip version.
    pub(crate) fn rom_reply(version: u8) -> Vec<u8> {
        let mut reply: Vec<u8> = Lfsr::default()
            .skip(CHALLENGE_BITS)
            .take(CHALLENGE_BITS)
            .map(|b| 0xFE | b)
            .collect();
        reply.extend((0..VERSION_BITS).map(|i| 0xFE | ((version >> i) & 1)));
        reply
    }

    fn link(mock: &MockTransport) -> Link<MockTransport> {
        Link::new(mock.clone(), PACKET_TIMEOUT)
    }

    #[test]
    fn test_challenge_bytes() {
        let mock = MockTransport::new();
        mock.queue_rx(&rom_reply(0x41));
        detect(&mut link(&mock), TIMEOUTS).unwrap();

        let sent = mock.transmitted();
        assert_eq!(sent.len(), 1 + CHALLENGE_BITS + CHALLENGE_BITS + VERSION_BITS);
        assert_eq!(sent[0], DETECT_PREAMBLE);

        let challenge: Vec<u8> = Lfsr::default().take(CHALLENGE_BITS).collect();
        for (i, &bit) in challenge.iter().enumerate() {
            assert_eq!(sent[1 + i], 0xFE | bit);
        }
        assert!(sent[1 + CHALLENGE_BITS..].iter().all(|&b| b == DETECT_PREAMBLE));
    }

    #[test]
    fn test_detects_version() {
        let mock = MockTransport::new();
        mock.queue_rx(&rom_reply(0x41));
        assert_eq!(detect(&mut link(&mock), TIMEOUTS).unwrap(), 0x41);
    }

    #[test]
    fn test_reply_split_across_reads() {
        let mock = MockTransport::new();
        let reply = rom_reply(0x5A);
        for piece in reply.chunks(7) {
            mock.queue_rx(piece);
        }
        assert_eq!(detect(&mut link(&mock), TIMEOUTS).unwrap(), 0x5A);
    }

    #[test]
    fn test_silent_target() {
        let mock = MockTransport::new();
        let err = detect(&mut link(&mock), TIMEOUTS).unwrap_err();
        assert!(matches!(
            err,
            LoaderError::HardwareNotFound {
                bit: 0,
                received: None,
                ..
            }
        ));
        assert_eq!(mock.timeout_spent_ms(), 100);
    }

    #[test]
    fn test_echo_mismatch() {
        let mock = MockTransport::new();
        let mut reply = rom_reply(0x41);
        reply[10] ^= 0x01;
        mock.queue_rx(&reply);
        let err = detect(&mut link(&mock), TIMEOUTS).unwrap_err();
        assert!(matches!(
            err,
            LoaderError::HardwareNotFound { bit: 10, received: Some(_), .. }
        ));
    }

    #[test]
    fn test_missing_version_bits() {
        let mock = MockTransport::new();
        let reply = rom_reply(0x41);
        mock.queue_rx(&reply[..CHALLENGE_BITS + 3]);
        let err = detect(&mut link(&mock), TIMEOUTS).unwrap_err();
        assert!(matches!(
            err,
            LoaderError::HardwareNotFound {
                bit: 253,
                expected: None,
                received: None
            }
        ));
        assert_eq!(mock.timeout_spent_ms(), 50);
    }
}

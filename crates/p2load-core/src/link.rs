//! Link layer: transmit/receive scratch buffers over a [`Transport`].
//!
//! Carries both encodings the target understands: boot ROM symbols
//! (detection and loader injection) and framed packets once the
//! second-stage loader is running.

use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::error::LoaderError;
use crate::protocol::bootstrap;
use crate::protocol::constants::{ACK, NAK, RX_BUF_SIZE, TX_BUF_SIZE};
use crate::protocol::packet::Frame;
use crate::transport::{Transport, TransportError};

/// Outcome of waiting for a packet acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Ack,
    Nak,
    /// Some other byte arrived.
    Unexpected(u8),
    /// Nothing arrived within the timeout.
    Timeout,
}

impl Reply {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            ACK => Reply::Ack,
            NAK => Reply::Nak,
            other => Reply::Unexpected(other),
        }
    }

    pub fn is_ack(&self) -> bool {
        matches!(self, Reply::Ack)
    }

    /// Reply byte, if one arrived.
    pub fn byte(&self) -> Option<u8> {
        match *self {
            Reply::Ack => Some(ACK),
            Reply::Nak => Some(NAK),
            Reply::Unexpected(b) => Some(b),
            Reply::Timeout => None,
        }
    }

    /// Fold a non-ACK reply into the matching error.
    pub fn into_result(self, timeout: Duration) -> Result<(), LoaderError> {
        match self {
            Reply::Ack => Ok(()),
            Reply::Timeout => Err(LoaderError::PacketTimeout {
                timeout_ms: timeout.as_millis() as u64,
            }),
            other => Err(LoaderError::PacketRejected {
                reply: other.byte().unwrap_or(NAK),
            }),
        }
    }
}

/// Serial link with owned scratch buffers.
pub struct Link<T: Transport> {
    transport: T,
    tx_buf: Vec<u8>,
    rx_buf: Vec<u8>,
    rx_next: usize,
    packet_timeout: Duration,
}

impl<T: Transport> Link<T> {
    pub fn new(transport: T, packet_timeout: Duration) -> Self {
        Self {
            transport,
            tx_buf: Vec::with_capacity(TX_BUF_SIZE),
            rx_buf: Vec::with_capacity(RX_BUF_SIZE),
            rx_next: 0,
            packet_timeout,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn packet_timeout(&self) -> Duration {
        self.packet_timeout
    }

    /// Drop anything buffered in either direction.
    pub fn reset_buffers(&mut self) {
        self.tx_buf.clear();
        self.rx_buf.clear();
        self.rx_next = 0;
    }

    // ------------------------------------------------------------------
    // Raw symbol I/O (boot ROM)
    // ------------------------------------------------------------------

    /// Queue one byte, flushing when the buffer fills.
    pub fn tx_byte(&mut self, byte: u8) -> Result<(), TransportError> {
        self.tx_buf.push(byte);
        if self.tx_buf.len() >= TX_BUF_SIZE {
            self.flush()?;
        }
        Ok(())
    }

    /// Queue one long in boot ROM encoding.
    pub fn tx_long(&mut self, x: u32) -> Result<(), TransportError> {
        for symbol in bootstrap::encode_long(x) {
            self.tx_byte(symbol)?;
        }
        Ok(())
    }

    /// Write out the transmit buffer.
    pub fn flush(&mut self) -> Result<(), TransportError> {
        if !self.tx_buf.is_empty() {
            trace!(len = self.tx_buf.len(), "Flushing transmit buffer");
            self.transport.transmit(&self.tx_buf)?;
            self.tx_buf.clear();
        }
        Ok(())
    }

    /// Receive one echoed bit.
    ///
    /// The ROM echoes bits as `0xFE`/`0xFF`; anything else is line noise and
    /// is skipped.
    pub fn rx_bit(&mut self, timeout: Duration) -> Result<u8, TransportError> {
        loop {
            if self.rx_next >= self.rx_buf.len() {
                self.rx_buf = self.transport.receive(RX_BUF_SIZE, timeout)?;
                self.rx_next = 0;
                if self.rx_buf.is_empty() {
                    return Err(TransportError::Timeout {
                        timeout_ms: timeout.as_millis() as u64,
                    });
                }
            }
            let byte = self.rx_buf[self.rx_next];
            self.rx_next += 1;

            let bit = byte.wrapping_sub(0xFE);
            if bit & 0xFE == 0 {
                return Ok(bit);
            }
            trace!(byte = format!("0x{:02X}", byte), "Skipping non-bit echo");
        }
    }

    // ------------------------------------------------------------------
    // Packet I/O (second-stage loader)
    // ------------------------------------------------------------------

    /// Wait up to `timeout` for a single ACK/NAK byte.
    pub fn wait_for_ack_nak(&mut self, timeout: Duration) -> Result<Reply, TransportError> {
        match self.transport.receive(1, timeout) {
            Ok(bytes) => Ok(bytes.first().map_or(Reply::Timeout, |&b| Reply::from_byte(b))),
            Err(TransportError::Timeout { .. }) => Ok(Reply::Timeout),
            Err(e) => Err(e),
        }
    }

    /// Frame and send one packet, then wait for the reply.
    ///
    /// No retry is attempted; the reply is returned as-is so the caller can
    /// tell a timeout from an explicit rejection.
    pub fn send_packet(&mut self, payload: &[u8]) -> Result<Reply, LoaderError> {
        let frame = Frame::new(payload)?;

        self.transport.transmit(&frame.header)?;
        if !payload.is_empty() {
            self.transport.transmit(payload)?;
        }
        self.transport.transmit(&frame.crc)?;

        let reply = self.wait_for_ack_nak(self.packet_timeout)?;
        match reply {
            Reply::Ack => debug!(len = payload.len(), "Packet acknowledged"),
            Reply::Timeout => warn!(len = payload.len(), "Timeout waiting for ACK/NAK"),
            other => warn!(len = payload.len(), reply = ?other, "Packet rejected"),
        }
        Ok(reply)
    }

    /// Send one packet and require an ACK.
    pub fn send_packet_acked(&mut self, payload: &[u8]) -> Result<(), LoaderError> {
        let timeout = self.packet_timeout();
        self.send_packet(payload)?.into_result(timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::constants::{SOH, TX_BUF_SIZE};
    use crate::transport::MockTransport;

    const T: Duration = Duration::from_millis(100);

    fn link(mock: &MockTransport) -> Link<MockTransport> {
        Link::new(mock.clone(), T)
    }

    #[test]
    fn test_tx_buffer_flushes_when_full() {
        let mock = MockTransport::new();
        let mut link = link(&mock);
        for i in 0..TX_BUF_SIZE + 3 {
            link.tx_byte(i as u8).unwrap();
        }
        assert_eq!(mock.get_writes().len(), 1);
        assert_eq!(mock.get_writes()[0].len(), TX_BUF_SIZE);

        link.flush().unwrap();
        assert_eq!(mock.get_writes()[1], [0, 1, 2]);

        // Nothing left to flush
        link.flush().unwrap();
        assert_eq!(mock.get_writes().len(), 2);
    }

    #[test]
    fn test_tx_long_emits_eleven_symbols() {
        let mock = MockTransport::new();
        let mut link = link(&mock);
        link.tx_long(0).unwrap();
        link.flush().unwrap();
        let sent = mock.transmitted();
        assert_eq!(sent.len(), 11);
        assert_eq!(sent[10], 0xF2);
    }

    #[test]
    fn test_rx_bit_skips_noise() {
        let mock = MockTransport::new();
        mock.queue_rx(&[0x00, 0xFF, 0x7E, 0xFE]);
        let mut link = link(&mock);
        assert_eq!(link.rx_bit(T).unwrap(), 1);
        assert_eq!(link.rx_bit(T).unwrap(), 0);
        assert!(link.rx_bit(T).unwrap_err().is_timeout());
    }

    #[test]
    fn test_packet_wire_format() {
        let mock = MockTransport::acking();
        let mut link = link(&mock);
        let reply = link.send_packet(&[0xAA, 0xBB]).unwrap();
        assert_eq!(reply, Reply::Ack);

        let writes = mock.get_writes();
        assert_eq!(writes.len(), 3);
        assert_eq!(writes[0], [SOH, 0x00, 0x02, 0x02]);
        assert_eq!(writes[1], [0xAA, 0xBB]);
        assert_eq!(writes[2].len(), 2);
        assert_eq!(mock.sent_packets().unwrap(), vec![vec![0xAA, 0xBB]]);
    }

    #[test]
    fn test_empty_packet_skips_payload_write() {
        let mock = MockTransport::acking();
        let mut link = link(&mock);
        link.send_packet(&[]).unwrap();
        assert_eq!(mock.get_writes().len(), 2);
        assert_eq!(mock.transmitted().len(), 6);
    }

    #[test]
    fn test_replies_are_distinguished() {
        let mock = MockTransport::new();
        mock.queue_rx(&[NAK]);
        mock.queue_rx(&[0x42]);
        let mut link = link(&mock);

        assert_eq!(link.send_packet(b"x").unwrap(), Reply::Nak);
        assert_eq!(link.send_packet(b"x").unwrap(), Reply::Unexpected(0x42));
        assert_eq!(link.send_packet(b"x").unwrap(), Reply::Timeout);

        assert!(Reply::from_byte(ACK).is_ack());
        assert!(!Reply::Nak.is_ack());
        assert!(!Reply::Timeout.is_ack());
        assert_eq!(Reply::Timeout.byte(), None);
    }

    #[test]
    fn test_send_packet_acked_errors() {
        let mock = MockTransport::new();
        mock.queue_rx(&[NAK]);
        let mut link = link(&mock);

        assert!(matches!(
            link.send_packet_acked(b"x"),
            Err(LoaderError::PacketRejected { reply: NAK })
        ));
        assert!(matches!(
            link.send_packet_acked(b"x"),
            Err(LoaderError::PacketTimeout { timeout_ms: 100 })
        ));
    }

    #[test]
    fn test_oversized_packet_is_not_sent() {
        let mock = MockTransport::acking();
        let mut link = link(&mock);
        assert!(matches!(
            link.send_packet(&[0u8; 1025]),
            Err(LoaderError::InvalidArgument(_))
        ));
        assert!(mock.get_writes().is_empty());
    }
}

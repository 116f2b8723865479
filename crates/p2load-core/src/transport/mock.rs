//! Mock transport for testing.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::traits::{Transport, TransportError};
use crate::protocol::constants::ACK;
use crate::protocol::packet::{self, PacketError};

/// Mock transport for unit testing the loader.
///
/// Clones share state, so a test can keep a handle after handing the
/// transport to a session.
#[derive(Clone)]
pub struct MockTransport {
    /// Queued data to return on receive.
    rx_queue: Arc<Mutex<VecDeque<Vec<u8>>>>,
    /// Captured transmit calls.
    write_log: Arc<Mutex<Vec<Vec<u8>>>>,
    /// Reply ACK whenever the queue is empty.
    auto_ack: Arc<Mutex<bool>>,
    /// Number of reset pulses.
    resets: Arc<Mutex<usize>>,
    /// Receive timeouts that ran out with no data.
    timeout_spent_ms: Arc<Mutex<u64>>,
    /// Time spent in `sleep_ms`.
    slept_ms: Arc<Mutex<u64>>,
    /// Whether the port is "connected".
    connected: Arc<Mutex<bool>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            rx_queue: Arc::new(Mutex::new(VecDeque::new())),
            write_log: Arc::new(Mutex::new(Vec::new())),
            auto_ack: Arc::new(Mutex::new(false)),
            resets: Arc::new(Mutex::new(0)),
            timeout_spent_ms: Arc::new(Mutex::new(0)),
            slept_ms: Arc::new(Mutex::new(0)),
            connected: Arc::new(Mutex::new(true)),
        }
    }

    /// A target that acknowledges every packet.
    pub fn acking() -> Self {
        let mock = Self::new();
        mock.set_auto_ack(true);
        mock
    }

    pub fn set_auto_ack(&self, enabled: bool) {
        *self.auto_ack.lock().unwrap() = enabled;
    }

    /// Queue bytes to be returned on a later receive.
    pub fn queue_rx(&self, bytes: &[u8]) {
        self.rx_queue.lock().unwrap().push_back(bytes.to_vec());
    }

    /// Queue `n` single ACK replies.
    pub fn queue_acks(&self, n: usize) {
        for _ in 0..n {
            self.queue_rx(&[ACK]);
        }
    }

    /// Get all captured transmit calls.
    pub fn get_writes(&self) -> Vec<Vec<u8>> {
        self.write_log.lock().unwrap().clone()
    }

    /// All transmitted bytes, concatenated.
    pub fn transmitted(&self) -> Vec<u8> {
        self.write_log.lock().unwrap().concat()
    }

    /// Clear captured writes.
    pub fn clear_writes(&self) {
        self.write_log.lock().unwrap().clear();
    }

    /// Split the transmitted bytes into packet payloads.
    pub fn sent_packets(&self) -> Result<Vec<Vec<u8>>, PacketError> {
        let wire = self.transmitted();
        let mut rest = wire.as_slice();
        let mut packets = Vec::new();
        while !rest.is_empty() {
            let payload = packet::decode(rest)?;
            packets.push(payload.to_vec());
            rest = &rest[payload.len() + 6..];
        }
        Ok(packets)
    }

    pub fn reset_count(&self) -> usize {
        *self.resets.lock().unwrap()
    }

    pub fn timeout_spent_ms(&self) -> u64 {
        *self.timeout_spent_ms.lock().unwrap()
    }

    pub fn slept_ms(&self) -> u64 {
        *self.slept_ms.lock().unwrap()
    }

    /// Simulate the port going away.
    pub fn disconnect(&self) {
        *self.connected.lock().unwrap() = false;
    }

    fn is_connected(&self) -> bool {
        *self.connected.lock().unwrap()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MockTransport {
    fn transmit(&mut self, data: &[u8]) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected);
        }
        self.write_log.lock().unwrap().push(data.to_vec());
        Ok(())
    }

    fn receive(&mut self, max_len: usize, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected);
        }

        let mut queue = self.rx_queue.lock().unwrap();
        if let Some(mut front) = queue.pop_front() {
            if front.len() > max_len {
                let rest = front.split_off(max_len);
                queue.push_front(rest);
            }
            return Ok(front);
        }
        drop(queue);

        if *self.auto_ack.lock().unwrap() {
            return Ok(vec![ACK]);
        }

        let timeout_ms = timeout.as_millis() as u64;
        *self.timeout_spent_ms.lock().unwrap() += timeout_ms;
        Err(TransportError::Timeout { timeout_ms })
    }

    fn assert_reset(&mut self) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected);
        }
        *self.resets.lock().unwrap() += 1;
        Ok(())
    }

    fn sleep_ms(&mut self, ms: u64) {
        *self.slept_ms.lock().unwrap() += ms;
    }

    fn name(&self) -> String {
        String::from("mock")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: Duration = Duration::from_millis(10);

    #[test]
    fn test_mock_rx_queue() {
        let mut mock = MockTransport::new();
        mock.queue_rx(&[1, 2, 3]);
        mock.queue_rx(&[4]);

        assert_eq!(mock.receive(2, T).unwrap(), [1, 2]);
        assert_eq!(mock.receive(8, T).unwrap(), [3]);
        assert_eq!(mock.receive(8, T).unwrap(), [4]);

        // Queue is empty now
        assert!(mock.receive(8, T).unwrap_err().is_timeout());
        assert_eq!(mock.timeout_spent_ms(), 10);
    }

    #[test]
    fn test_mock_auto_ack() {
        let mut mock = MockTransport::acking();
        assert_eq!(mock.receive(1, T).unwrap(), [ACK]);
        assert_eq!(mock.timeout_spent_ms(), 0);
    }

    #[test]
    fn test_mock_write_capture() {
        let mut mock = MockTransport::new();
        let handle = mock.clone();
        mock.transmit(b"Hello").unwrap();
        mock.transmit(b"World").unwrap();

        let writes = handle.get_writes();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0], b"Hello");
        assert_eq!(handle.transmitted(), b"HelloWorld");
        assert_eq!(handle.name(), "mock");
    }

    #[test]
    fn test_mock_sent_packets() {
        let mut mock = MockTransport::new();
        mock.transmit(&packet::encode(b"abc").unwrap()).unwrap();
        mock.transmit(&packet::encode(&[]).unwrap()).unwrap();
        assert_eq!(
            mock.sent_packets().unwrap(),
            vec![b"abc".to_vec(), Vec::new()]
        );
    }

    #[test]
    fn test_mock_disconnect() {
        let mut mock = MockTransport::new();
        mock.disconnect();
        assert!(mock.transmit(b"test").is_err());
        assert!(mock.assert_reset().is_err());
    }
}

//! serialport-based transport implementation.

use std::io::{ErrorKind, Read, Write};
use std::thread;
use std::time::Duration;

use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::{debug, info, instrument};

use super::traits::{Transport, TransportError};

/// How long DTR is held to reset the target.
const RESET_PULSE_MS: u64 = 10;
/// Boot ROM wake-up time after reset is released.
const RESET_SETTLE_MS: u64 = 100;

/// Serial port transport.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    path: String,
}

impl SerialTransport {
    /// Open `path` at `baud_rate`, 8N1, no flow control.
    #[instrument(level = "info")]
    pub fn open(path: &str, baud_rate: u32) -> Result<Self, TransportError> {
        let port = serialport::new(path, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(Duration::from_millis(100))
            .open()
            .map_err(|e| TransportError::OpenFailed(format!("{}: {}", path, e)))?;

        info!(port = %path, baud = baud_rate, "Serial port opened");

        Ok(Self {
            port,
            path: path.to_string(),
        })
    }
}

impl Transport for SerialTransport {
    #[instrument(skip(self, data), fields(len = data.len()))]
    fn transmit(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.port
            .write_all(data)
            .map_err(|e| TransportError::WriteFailed(e.to_string()))?;
        self.port
            .flush()
            .map_err(|e| TransportError::WriteFailed(e.to_string()))?;
        Ok(())
    }

    fn receive(&mut self, max_len: usize, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let timeout_ms = timeout.as_millis() as u64;
        self.port
            .set_timeout(timeout)
            .map_err(|e| TransportError::ReadFailed(e.to_string()))?;

        let mut buf = vec![0u8; max_len];
        match self.port.read(&mut buf) {
            Ok(0) => Err(TransportError::Timeout { timeout_ms }),
            Ok(n) => {
                buf.truncate(n);
                Ok(buf)
            }
            Err(e) if e.kind() == ErrorKind::TimedOut => Err(TransportError::Timeout { timeout_ms }),
            Err(e) if e.kind() == ErrorKind::BrokenPipe => Err(TransportError::Disconnected),
            Err(e) => Err(TransportError::ReadFailed(e.to_string())),
        }
    }

    fn assert_reset(&mut self) -> Result<(), TransportError> {
        debug!(port = %self.path, "Pulsing DTR");
        let map = |e: serialport::Error| TransportError::ResetFailed(e.to_string());

        self.port.write_data_terminal_ready(true).map_err(map)?;
        thread::sleep(Duration::from_millis(RESET_PULSE_MS));
        self.port.write_data_terminal_ready(false).map_err(map)?;
        thread::sleep(Duration::from_millis(RESET_SETTLE_MS));

        // Drop whatever the target printed before the reset.
        self.port.clear(ClearBuffer::Input).map_err(map)?;
        Ok(())
    }

    fn name(&self) -> String {
        self.path.clone()
    }
}

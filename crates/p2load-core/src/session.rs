//! Loader Session - high-level orchestrator for a connected target.
//!
//! A session owns the transport for its whole lifetime and walks the target
//! through detection, loader injection and then any number of load, start
//! and flash operations. Every operation blocks until it completes or times
//! out; there is no retry anywhere in here.

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::detect::{self, DetectTimeouts};
use crate::error::LoaderError;
use crate::events::{LoaderEvent, LoaderObserver, LogLevel, PacketDirection, TracingObserver};
use crate::link::Link;
use crate::payload::{ChunkIterator, CogImage};
use crate::protocol::constants::{
    DEFAULT_BAUD_RATE, DEFAULT_CLOCK_FREQ, FLASH_BUF_SIZE, FLASH_BUF_START, INITIAL_TIMEOUT,
    LOADER_START_DELAY_MS, OPCODE_AUX_MAX, PACKET_TIMEOUT, PKT_MAX_LEN,
};
use crate::protocol::Command;
use crate::state::{SessionPhase, StateMachineContext};
use crate::transport::Transport;

/// Configuration for a loader session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Serial port path.
    pub port: Option<String>,
    /// Link baud rate, also patched into the loader.
    pub baud_rate: u32,
    /// Target clock frequency in Hz.
    pub clock_freq: u32,
    /// Wait for the loader's first ACK.
    pub initial_timeout_ms: u64,
    /// Wait for each packet's ACK/NAK.
    pub packet_timeout_ms: u64,
    /// Per-bit wait for the connect echo.
    pub bit_timeout_ms: u64,
    /// Per-bit wait for the chip version.
    pub version_bit_timeout_ms: u64,
    /// Pause between injecting the loader and waiting for it.
    pub loader_start_delay_ms: u64,
    /// Path to the second-stage loader binary.
    pub loader_path: Option<String>,
    /// Path to the flash booter binary.
    pub booter_path: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            clock_freq: DEFAULT_CLOCK_FREQ,
            initial_timeout_ms: INITIAL_TIMEOUT.as_millis() as u64,
            packet_timeout_ms: PACKET_TIMEOUT.as_millis() as u64,
            bit_timeout_ms: 100,
            version_bit_timeout_ms: 50,
            loader_start_delay_ms: LOADER_START_DELAY_MS,
            loader_path: None,
            booter_path: None,
        }
    }
}

impl SessionConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SessionConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn detect_timeouts(&self) -> DetectTimeouts {
        DetectTimeouts {
            bit: Duration::from_millis(self.bit_timeout_ms),
            version_bit: Duration::from_millis(self.version_bit_timeout_ms),
        }
    }
}

/// Loader Session - drives one target over one transport.
pub struct LoaderSession<T: Transport, O: LoaderObserver = TracingObserver> {
    config: SessionConfig,
    observer: Arc<O>,
    link: Link<T>,
    state: StateMachineContext,
}

impl<T: Transport> LoaderSession<T, TracingObserver> {
    /// Create a new session with default tracing observer.
    pub fn new(transport: T, config: SessionConfig) -> Self {
        Self::with_observer(transport, config, Arc::new(TracingObserver))
    }
}

impl<T: Transport, O: LoaderObserver> LoaderSession<T, O> {
    /// Create a new session with a custom observer.
    pub fn with_observer(transport: T, config: SessionConfig, observer: Arc<O>) -> Self {
        let packet_timeout = Duration::from_millis(config.packet_timeout_ms);
        Self {
            config,
            observer,
            link: Link::new(transport, packet_timeout),
            state: StateMachineContext::new(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.phase
    }

    /// Chip version reported by the boot ROM, once detected.
    pub fn chip_version(&self) -> Option<u8> {
        self.state.chip_version
    }

    pub fn transport(&self) -> &T {
        self.link.transport()
    }

    /// Return to `Idle` so the target can be detected again.
    pub fn reset(&mut self) {
        self.link.reset_buffers();
        self.state.reset();
    }

    // ------------------------------------------------------------------
    // Detection & bootstrap
    // ------------------------------------------------------------------

    /// Reset the target and run the connect handshake. Returns the chip version.
    #[instrument(skip(self))]
    pub fn detect(&mut self) -> Result<u8, LoaderError> {
        self.require(SessionPhase::Idle, "detect")?;
        self.transition(SessionPhase::Detecting);
        info!(port = %self.link.transport().name(), "Resetting target");

        let result = self
            .link
            .transport_mut()
            .assert_reset()
            .map_err(LoaderError::from)
            .and_then(|()| detect::detect(&mut self.link, self.config.detect_timeouts()));

        match result {
            Ok(version) => {
                self.state.chip_version = Some(version);
                self.emit(LoaderEvent::HardwareFound { version });
                Ok(version)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Sign the second-stage loader, push it through the boot ROM and wait
    /// for its first ACK.
    #[instrument(skip(self, loader_code), fields(len = loader_code.len()))]
    pub fn bootstrap(&mut self, loader_code: &[u8]) -> Result<(), LoaderError> {
        if self.state.phase != SessionPhase::Detecting || self.state.chip_version.is_none() {
            return Err(LoaderError::InvalidState {
                phase: self.state.phase,
                operation: "bootstrap",
            });
        }
        let image = CogImage::signed(loader_code, self.config.clock_freq, self.config.baud_rate)?;
        self.emit(LoaderEvent::Log {
            level: LogLevel::Debug,
            message: format!("Loader image signed, bit period {}", image.period()),
        });

        self.transition(SessionPhase::Bootstrapping);
        match self.inject(&image) {
            Ok(()) => {
                self.transition(SessionPhase::Ready);
                self.emit(LoaderEvent::Complete {
                    operation: "bootstrap".to_string(),
                });
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    fn inject(&mut self, image: &CogImage) -> Result<(), LoaderError> {
        for long in image.longs() {
            self.link.tx_long(long)?;
        }
        self.link.flush()?;
        debug!("Loader image sent");

        self.link
            .transport_mut()
            .sleep_ms(self.config.loader_start_delay_ms);

        let timeout = Duration::from_millis(self.config.initial_timeout_ms);
        let reply = self.link.wait_for_ack_nak(timeout)?;
        self.emit(LoaderEvent::Packet {
            direction: PacketDirection::Rx,
            length: usize::from(reply.byte().is_some()),
            data: reply.byte().map(|b| vec![b]),
        });

        if reply.is_ack() {
            info!("Packet handshake complete");
            Ok(())
        } else {
            warn!(reply = ?reply, "Packet handshake failed");
            Err(LoaderError::HandshakeFailed {
                reply: reply.byte(),
            })
        }
    }

    /// Detect the target and bring up the second-stage loader.
    pub fn connect(&mut self, loader_code: &[u8]) -> Result<u8, LoaderError> {
        let version = self.detect()?;
        self.bootstrap(loader_code)?;
        Ok(version)
    }

    // ------------------------------------------------------------------
    // Command protocol
    // ------------------------------------------------------------------

    /// Write `data` into hub memory at `addr`.
    #[instrument(skip(self, data), fields(addr = %format!("0x{:X}", addr), len = data.len()))]
    pub fn load(&mut self, addr: u32, data: &[u8]) -> Result<(), LoaderError> {
        let count = Self::byte_count(data.len())?;
        self.run(SessionPhase::Loading, "load", |s| {
            s.send_command(Command::Load { addr, count })?;
            s.stream(data, "load")
        })
    }

    /// Stream raw data packets with no preceding `Load` command, for a
    /// target already told how much to expect.
    pub fn send_buffer(&mut self, data: &[u8]) -> Result<(), LoaderError> {
        self.run(SessionPhase::Loading, "send_buffer", |s| s.stream(data, "send_buffer"))
    }

    /// Restart `cog` at `addr` with `param`.
    #[instrument(skip(self))]
    pub fn start(&mut self, cog: u8, addr: u32, param: u32) -> Result<(), LoaderError> {
        self.run(SessionPhase::Starting, "start", |s| {
            s.send_command(Command::Start { cog, addr, param })
        })
    }

    /// Launch `cog` as an isolated unit at `addr` with `param`.
    #[instrument(skip(self))]
    pub fn cog_init(&mut self, cog: u8, addr: u32, param: u32) -> Result<(), LoaderError> {
        self.run(SessionPhase::Starting, "coginit", |s| {
            s.send_command(Command::CogInit { cog, addr, param })
        })
    }

    /// Copy `count` bytes already in hub memory at `hub_addr` into flash at `flash_addr`.
    #[instrument(skip(self))]
    pub fn flash_write(&mut self, flash_addr: u32, hub_addr: u32, count: u32) -> Result<(), LoaderError> {
        if count > OPCODE_AUX_MAX {
            return Err(LoaderError::InvalidArgument(format!(
                "flash count {} exceeds 0x{:X}",
                count, OPCODE_AUX_MAX
            )));
        }
        self.run(SessionPhase::Flashing, "flash", |s| {
            s.send_command(Command::Flash {
                flash_addr,
                hub_addr,
                count,
            })
        })
    }

    // ------------------------------------------------------------------
    // Flash programming through the hub staging buffer
    // ------------------------------------------------------------------

    /// Stage `data` (at most one staging buffer) in hub memory and program it
    /// into flash at `flash_addr`.
    #[instrument(skip(self, data), fields(flash_addr = %format!("0x{:X}", flash_addr), len = data.len()))]
    pub fn flash_buffer(&mut self, data: &[u8], flash_addr: u32) -> Result<(), LoaderError> {
        if data.len() > FLASH_BUF_SIZE {
            return Err(LoaderError::InvalidArgument(format!(
                "flash buffer of {} bytes exceeds staging size {}",
                data.len(),
                FLASH_BUF_SIZE
            )));
        }
        self.run(SessionPhase::Flashing, "flash", |s| s.stage_and_flash(data, flash_addr))
    }

    /// Program everything `reader` yields into flash starting at `flash_addr`,
    /// one staging buffer at a time. Returns the number of bytes written.
    #[instrument(skip(self, reader), fields(flash_addr = %format!("0x{:X}", flash_addr)))]
    pub fn flash_reader<R: Read>(&mut self, reader: &mut R, flash_addr: u32) -> Result<u64, LoaderError> {
        self.run(SessionPhase::Flashing, "flash", |s| {
            let mut buf = vec![0u8; FLASH_BUF_SIZE];
            let mut addr = u64::from(flash_addr);
            let mut written = 0u64;

            loop {
                let size = read_full(reader, &mut buf)?;
                if size == 0 {
                    break;
                }
                let end = addr + size as u64;
                if end > FLASH_ADDR_LIMIT {
                    return Err(LoaderError::InvalidArgument(format!(
                        "flash block at 0x{:X} of {} bytes runs past the 32-bit address space",
                        addr, size
                    )));
                }
                s.stage_and_flash(&buf[..size], addr as u32)
                    .map_err(|e| LoaderError::aborted_at(addr, e))?;

                addr = end;
                written += size as u64;
                s.emit(LoaderEvent::Progress {
                    operation: "flash".to_string(),
                    current: written,
                    total: 0,
                });
            }

            info!(bytes = written, "Flash complete");
            Ok(written)
        })
    }

    /// Program a file into flash starting at `flash_addr`.
    pub fn flash_file<P: AsRef<Path>>(&mut self, path: P, flash_addr: u32) -> Result<u64, LoaderError> {
        let path = path.as_ref();
        info!(path = %path.display(), "Flashing file");
        let mut file = File::open(path)?;
        self.flash_reader(&mut file, flash_addr)
    }

    /// Write a boot image to the start of flash so the ROM can boot without
    /// the serial loader.
    #[instrument(skip(self, booter_code), fields(len = booter_code.len()))]
    pub fn flash_booter(&mut self, booter_code: &[u8]) -> Result<(), LoaderError> {
        let image = CogImage::signed(booter_code, self.config.clock_freq, self.config.baud_rate)?;
        self.flash_buffer(&image.to_flash_layout(), 0)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn stage_and_flash(&mut self, data: &[u8], flash_addr: u32) -> Result<(), LoaderError> {
        let count = Self::byte_count(data.len())?;
        self.send_command(Command::Load {
            addr: FLASH_BUF_START,
            count,
        })?;
        self.stream(data, "stage")?;
        self.send_command(Command::Flash {
            flash_addr,
            hub_addr: FLASH_BUF_START,
            count,
        })
    }

    /// Stream `data` as packet-sized chunks, each acknowledged on its own.
    fn stream(&mut self, data: &[u8], operation: &str) -> Result<(), LoaderError> {
        let total = data.len() as u64;
        let mut offset = 0u64;

        for chunk in ChunkIterator::new(data, PKT_MAX_LEN) {
            self.send_packet(chunk)
                .map_err(|e| LoaderError::aborted_at(offset, e))?;
            offset += chunk.len() as u64;
            self.emit(LoaderEvent::Progress {
                operation: operation.to_string(),
                current: offset,
                total,
            });
        }
        Ok(())
    }

    fn send_command(&mut self, command: Command) -> Result<(), LoaderError> {
        let bytes = command.to_bytes()?;
        let opcode = command.opcode()?;
        debug!(command = command.name(), opcode = %format!("0x{:08X}", opcode), "Sending command");
        self.send_packet(&bytes)
    }

    fn send_packet(&mut self, payload: &[u8]) -> Result<(), LoaderError> {
        self.emit(LoaderEvent::Packet {
            direction: PacketDirection::Tx,
            length: payload.len(),
            data: Some(payload.iter().take(32).cloned().collect()),
        });
        self.link.send_packet_acked(payload)
    }

    /// Run `op` in `phase`, returning to `Ready` on success and `Failed` on error.
    fn run<R>(
        &mut self,
        phase: SessionPhase,
        operation: &'static str,
        op: impl FnOnce(&mut Self) -> Result<R, LoaderError>,
    ) -> Result<R, LoaderError> {
        self.require(SessionPhase::Ready, operation)?;
        self.transition(phase);
        match op(self) {
            Ok(r) => {
                self.transition(SessionPhase::Ready);
                self.emit(LoaderEvent::Complete {
                    operation: operation.to_string(),
                });
                Ok(r)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    fn require(&self, phase: SessionPhase, operation: &'static str) -> Result<(), LoaderError> {
        if self.state.phase != phase {
            return Err(LoaderError::InvalidState {
                phase: self.state.phase,
                operation,
            });
        }
        Ok(())
    }

    fn transition(&mut self, to: SessionPhase) {
        let from = self.state.phase;
        if self.state.goto_state(to) {
            self.emit(LoaderEvent::PhaseChanged { from, to });
        }
    }

    fn fail(&mut self, error: LoaderError) -> LoaderError {
        self.emit(LoaderEvent::Error {
            message: error.to_string(),
        });
        self.transition(SessionPhase::Failed);
        error
    }

    fn emit(&self, event: LoaderEvent) {
        self.observer.on_event(&event);
    }

    fn byte_count(len: usize) -> Result<u32, LoaderError> {
        u32::try_from(len)
            .map_err(|_| LoaderError::InvalidArgument(format!("buffer of {} bytes is too large", len)))
    }
}

/// One past the highest byte a flash command can address.
const FLASH_ADDR_LIMIT: u64 = 1 << 32;

/// Fill `buf` from `reader`, stopping early only at end of input.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

//! P2Load-Core: Propeller 2 serial loader protocol in Rust.
//!
//! This crate implements the host side of the Propeller 2 serial boot
//! sequence: the boot ROM connect handshake, injection of a second-stage
//! loader, and the packet protocol that loader speaks for writing hub
//! memory, starting cogs and programming external flash.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Protocol**: Constants, CRC, LFSR, boot ROM symbols, packet framing, commands
//! - **Transport**: Serial communication abstraction (serialport, mock)
//! - **Link**: Buffered symbol I/O and acknowledged packets over a transport
//! - **Detect**: Boot ROM connect handshake and chip version
//! - **Payload**: Signed COG images and transfer chunking
//! - **State**: Session state machine
//! - **Events**: Observer pattern for UI decoupling
//! - **Session**: High-level orchestrator
//!
//! # Example
//!
//! ```no_run
//! use p2load_core::session::{LoaderSession, SessionConfig};
//! use p2load_core::transport::SerialTransport;
//!
//! let config = SessionConfig::default();
//! let transport = SerialTransport::open("/dev/ttyUSB0", config.baud_rate).unwrap();
//! let loader = std::fs::read("loader.bin").unwrap();
//!
//! let mut session = LoaderSession::new(transport, config);
//! session.connect(&loader).expect("no target");
//! session.flash_file("image.bin", 0x8000).expect("flash failed");
//! ```

pub mod detect;
pub mod error;
pub mod events;
pub mod link;
pub mod payload;
pub mod protocol;
pub mod session;
pub mod state;
pub mod transport;

// Re-exports for convenience
pub use error::LoaderError;
pub use events::{LoaderEvent, LoaderObserver, LogLevel, NullObserver, TracingObserver};
pub use link::{Link, Reply};
pub use payload::{CogImage, ImageError};
pub use protocol::Command;
pub use session::{LoaderSession, SessionConfig};
pub use state::SessionPhase;
pub use transport::{MockTransport, SerialTransport, Transport, TransportError};

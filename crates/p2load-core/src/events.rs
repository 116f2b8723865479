//! Event system for UI decoupling.
//!
//! Lets a CLI or GUI follow a loader session (phase changes, progress,
//! packets) without depending on the protocol internals.

use std::fmt;

use crate::state::SessionPhase;

/// Log level for events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Events emitted by a loader session.
#[derive(Debug, Clone)]
pub enum LoaderEvent {
    /// Session phase changed.
    PhaseChanged { from: SessionPhase, to: SessionPhase },
    /// Boot ROM answered the connect handshake.
    HardwareFound { version: u8 },
    /// Progress update for the current transfer.
    Progress {
        operation: String,
        current: u64,
        total: u64,
    },
    /// Log message.
    Log { level: LogLevel, message: String },
    /// Operation failed.
    Error { message: String },
    /// Packet sent/received.
    Packet {
        direction: PacketDirection,
        length: usize,
        data: Option<Vec<u8>>,
    },
    /// Requested operation finished.
    Complete { operation: String },
}

/// Packet direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketDirection {
    Tx, // Host -> Target
    Rx, // Target -> Host
}

impl fmt::Display for PacketDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketDirection::Tx => write!(f, "TX"),
            PacketDirection::Rx => write!(f, "RX"),
        }
    }
}

/// Observer trait for receiving loader events.
pub trait LoaderObserver: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &LoaderEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl LoaderObserver for NullObserver {
    fn on_event(&self, _event: &LoaderEvent) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl LoaderObserver for TracingObserver {
    fn on_event(&self, event: &LoaderEvent) {
        match event {
            LoaderEvent::PhaseChanged { from, to } => {
                tracing::info!(from = %from, to = %to, "Phase changed");
            }
            LoaderEvent::HardwareFound { version } => {
                tracing::info!(version = %format!("0x{:02X}", version), "Hardware found");
            }
            LoaderEvent::Progress {
                operation,
                current,
                total,
            } => {
                let pct = if *total > 0 {
                    (*current * 100) / *total
                } else {
                    100
                };
                tracing::debug!(operation = %operation, progress = %format!("{}%", pct), "Progress");
            }
            LoaderEvent::Log { level, message } => match level {
                LogLevel::Trace => tracing::trace!("{}", message),
                LogLevel::Debug => tracing::debug!("{}", message),
                LogLevel::Info => tracing::info!("{}", message),
                LogLevel::Warn => tracing::warn!("{}", message),
                LogLevel::Error => tracing::error!("{}", message),
            },
            LoaderEvent::Error { message } => {
                tracing::error!("Error: {}", message);
            }
            LoaderEvent::Packet {
                direction, length, ..
            } => {
                tracing::trace!(dir = %direction, len = length, "Packet");
            }
            LoaderEvent::Complete { operation } => {
                tracing::info!(operation = %operation, "Operation complete");
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Observer that keeps every event for later inspection.
    #[derive(Default)]
    pub struct RecordingObserver {
        pub events: Mutex<Vec<LoaderEvent>>,
    }

    impl LoaderObserver for RecordingObserver {
        fn on_event(&self, event: &LoaderEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }
}

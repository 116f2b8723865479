//! Session state machine.
//!
//! ```text
//! Idle -> Detecting -> Bootstrapping -> Ready -> {Loading, Starting, Flashing} -> Ready
//!              \              \                          |
//!               +--------------+--------> Failed <-------+
//! ```
//!
//! `Failed` is terminal; only [`StateMachineContext::reset`] leaves it.

use std::fmt;

/// Phase of a loader session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// Nothing done yet.
    #[default]
    Idle,
    /// Running the boot ROM connect handshake.
    Detecting,
    /// Injecting the second-stage loader.
    Bootstrapping,
    /// Second-stage loader answering packets.
    Ready,
    /// Writing an image to hub memory.
    Loading,
    /// Starting code on a cog.
    Starting,
    /// Programming external flash.
    Flashing,
    /// Session is unusable.
    Failed,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionPhase::Idle => write!(f, "IDLE"),
            SessionPhase::Detecting => write!(f, "DETECTING"),
            SessionPhase::Bootstrapping => write!(f, "BOOTSTRAPPING"),
            SessionPhase::Ready => write!(f, "READY"),
            SessionPhase::Loading => write!(f, "LOADING"),
            SessionPhase::Starting => write!(f, "STARTING"),
            SessionPhase::Flashing => write!(f, "FLASHING"),
            SessionPhase::Failed => write!(f, "FAILED"),
        }
    }
}

impl SessionPhase {
    /// Whether the machine may move from `self` to `to`.
    pub fn can_transition(&self, to: SessionPhase) -> bool {
        use SessionPhase::*;
        matches!(
            (*self, to),
            (Idle, Detecting)
                | (Detecting, Bootstrapping)
                | (Bootstrapping, Ready)
                | (Ready, Loading)
                | (Ready, Starting)
                | (Ready, Flashing)
                | (Loading, Ready)
                | (Starting, Ready)
                | (Flashing, Ready)
                | (Detecting, Failed)
                | (Bootstrapping, Failed)
                | (Loading, Failed)
                | (Starting, Failed)
                | (Flashing, Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionPhase::Failed)
    }
}

/// State machine context holding all runtime state.
#[derive(Debug, Default)]
pub struct StateMachineContext {
    /// Current phase.
    pub phase: SessionPhase,
    /// Chip version reported during detection.
    pub chip_version: Option<u8>,
}

impl StateMachineContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transition to a new phase. Returns false, leaving the phase untouched,
    /// if the transition is not allowed.
    pub fn goto_state(&mut self, to: SessionPhase) -> bool {
        if !self.phase.can_transition(to) {
            tracing::warn!(from = %self.phase, to = %to, "Rejected state transition");
            return false;
        }
        tracing::info!(from = %self.phase, to = %to, "State transition");
        self.phase = to;
        true
    }

    /// Return to `Idle`, forgetting everything learned about the target.
    pub fn reset(&mut self) {
        tracing::debug!(from = %self.phase, "State reset");
        self.phase = SessionPhase::Idle;
        self.chip_version = None;
    }

    pub fn is_ready(&self) -> bool {
        self.phase == SessionPhase::Ready
    }
}

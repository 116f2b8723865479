//! State machine module.

pub mod machine;

pub use machine::{SessionPhase, StateMachineContext};

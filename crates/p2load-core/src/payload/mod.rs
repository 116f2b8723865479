//! Payload handling module.
//!
//! Builds signed COG images for the boot ROM and splits transfers into chunks.

pub mod chunks;
pub mod stage2;

pub use chunks::ChunkIterator;
pub use stage2::{CogImage, ImageError};

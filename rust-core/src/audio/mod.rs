//! Audio buffers, hop framing and cpal input

pub mod buffer;
pub mod framing;
pub mod input;

pub use buffer::{AudioBuffer, BlockAssembler, BufferError};
pub use framing::HopFramer;
pub use input::{AudioDeviceInfo, AudioError, AudioInput};

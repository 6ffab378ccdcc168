//! Spectral analysis building blocks shared by the analyzers

pub mod fft;
pub mod windowing;

pub use fft::{FftEngine, FftError};
pub use windowing::{generate_window, WindowType};

//! Feature Pipeline - Real-Time Audio Feature Extraction Core
//!
//! Analyzes a fixed-size audio stream with six detectors on the audio
//! thread and hands events and state to a display thread without locks.

pub mod analyzers;
pub mod audio;
pub mod events;
pub mod pipeline;
pub mod spectrum;

pub use analyzers::{Analyzer, BandEnergies, MAX_BANDS};
pub use audio::{AudioBuffer, AudioInput};
pub use events::{Event, EventBus, EventKind};
pub use pipeline::{
    AnalyzerSnapshot, ConfigError, Pipeline, PipelineConfig, PipelineControls, SnapshotReader,
};

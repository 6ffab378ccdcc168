//! Audio analyzers driven once per buffer by the pipeline
//!
//! Each analyzer owns its history, sized when it is built, and returns a
//! small `Copy` report describing what it found in the buffer. Analyzers
//! that depend on others receive the upstream reports of the *same* buffer
//! as their ingest context.

pub mod attack;
pub mod bands;
pub mod beat;
pub mod filter_band;
pub mod history;
pub mod onset;
pub mod pitch;

pub use attack::{AttackClassifier, AttackConfig, AttackContext, AttackReport};
pub use bands::{BandEnergies, BandEnergyExtractor, MAX_BANDS};
pub use beat::{BeatConfig, BeatReport, BeatTracker};
pub use filter_band::{FilterBandClassifier, FilterBandConfig, FilterBandReport};
pub use onset::{OnsetConfig, OnsetDetector, OnsetReport};
pub use pitch::{PitchConfig, PitchEstimator, PitchReport};

use crate::audio::AudioBuffer;

/// Common call contract of every analyzer
///
/// `ingest` runs on the audio thread: it must finish in bounded time, must
/// not block and must not allocate once the analyzer is constructed.
pub trait Analyzer {
    /// Upstream results this analyzer needs for the current buffer
    type Context;

    /// Per-buffer result, including any events raised
    type Report: Copy;

    /// Analyze one buffer
    fn ingest(&mut self, buffer: &AudioBuffer<'_>, ctx: &Self::Context) -> Self::Report;

    /// Forget all history, keeping configuration
    fn reset(&mut self);

    /// Short name for logging
    fn name(&self) -> &'static str;
}

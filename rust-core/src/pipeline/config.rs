//! Pipeline configuration and validation

use crate::analyzers::attack::MAX_CLASSES;
use crate::analyzers::beat::TATUM_SIGNATURE_RANGE;
use crate::analyzers::onset::THRESHOLD_RANGE;
use crate::analyzers::{
    AttackConfig, BeatConfig, FilterBandConfig, OnsetConfig, PitchConfig, MAX_BANDS,
};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Sample rate must be non-zero")]
    ZeroSampleRate,

    #[error("Hop size must be non-zero")]
    ZeroHopSize,

    #[error("Hop size {hop_size} exceeds buffer size {buffer_size}")]
    HopExceedsBuffer { hop_size: usize, buffer_size: usize },

    #[error("Band count must be at least 1")]
    NoBands,

    #[error("Band count {requested} exceeds the maximum of {max}")]
    TooManyBands { requested: usize, max: usize },

    #[error("Invalid {parameter}: {value}")]
    InvalidTuning { parameter: &'static str, value: f64 },
}

/// Full pipeline configuration
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Frames per `process` call
    pub buffer_size: usize,

    /// Analysis hop for the onset and beat analyzers
    pub hop_size: usize,

    /// Number of energy bands, in [1, 40]
    pub band_count: usize,

    pub onset: OnsetConfig,
    pub pitch: PitchConfig,
    pub beat: BeatConfig,
    pub attack: AttackConfig,
    pub filter_band: FilterBandConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            buffer_size: 512,
            hop_size: 256,
            band_count: MAX_BANDS,
            onset: OnsetConfig::default(),
            pitch: PitchConfig::default(),
            beat: BeatConfig::default(),
            attack: AttackConfig::default(),
            filter_band: FilterBandConfig::default(),
        }
    }
}

fn check(parameter: &'static str, value: f64, ok: bool) -> Result<(), ConfigError> {
    if ok && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::InvalidTuning { parameter, value })
    }
}

impl PipelineConfig {
    /// Framing-only configuration with default tuning
    pub fn with_framing(
        sample_rate: u32,
        buffer_size: usize,
        hop_size: usize,
        band_count: usize,
    ) -> Self {
        Self {
            sample_rate,
            buffer_size,
            hop_size,
            band_count,
            ..Self::default()
        }
    }

    /// Buffer period in seconds
    pub fn buffer_period(&self) -> f64 {
        self.buffer_size as f64 / self.sample_rate as f64
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 {
            return Err(ConfigError::ZeroSampleRate);
        }
        if self.hop_size == 0 {
            return Err(ConfigError::ZeroHopSize);
        }
        if self.buffer_size < self.hop_size {
            return Err(ConfigError::HopExceedsBuffer {
                hop_size: self.hop_size,
                buffer_size: self.buffer_size,
            });
        }
        if self.band_count == 0 {
            return Err(ConfigError::NoBands);
        }
        if self.band_count > MAX_BANDS {
            return Err(ConfigError::TooManyBands {
                requested: self.band_count,
                max: MAX_BANDS,
            });
        }

        let onset = &self.onset;
        let threshold = onset.threshold as f64;
        check(
            "onset threshold",
            threshold,
            (THRESHOLD_RANGE.0 as f64..=THRESHOLD_RANGE.1 as f64).contains(&threshold),
        )?;
        check("onset silence level", onset.silence_db, true)?;
        check("minimum inter-onset interval", onset.min_inter_onset_s, onset.min_inter_onset_s >= 0.0)?;
        check("onset history length", onset.history_len as f64, onset.history_len >= 1)?;

        let pitch = &self.pitch;
        check("pitch window", pitch.window_buffers as f64, pitch.window_buffers >= 1)?;
        check("pitch tolerance", pitch.tolerance, pitch.tolerance > 0.0 && pitch.tolerance <= 1.0)?;
        check("pitch silence level", pitch.silence_db, true)?;

        let beat = &self.beat;
        check("beat history", beat.history_seconds, beat.history_seconds > 0.0)?;
        check("tempo re-estimate interval", beat.reestimate_seconds, beat.reestimate_seconds > 0.0)?;
        check("minimum tempo", beat.min_bpm, beat.min_bpm > 0.0)?;
        check("maximum tempo", beat.max_bpm, beat.max_bpm > beat.min_bpm)?;
        check("tempo prior", beat.prior_bpm, beat.prior_bpm > 0.0)?;
        check(
            "tatum signature",
            beat.tatum_signature as f64,
            (TATUM_SIGNATURE_RANGE.0..=TATUM_SIGNATURE_RANGE.1).contains(&beat.tatum_signature),
        )?;

        let attack = &self.attack;
        check(
            "attack class count",
            attack.class_count as f64,
            (1..=MAX_CLASSES).contains(&attack.class_count),
        )?;
        check(
            "attack spawn distance",
            attack.spawn_distance as f64,
            (0.0..=2.0).contains(&attack.spawn_distance),
        )?;
        check(
            "attack learning rate",
            attack.learning_rate as f64,
            attack.learning_rate > 0.0 && attack.learning_rate <= 1.0,
        )?;

        let filter = &self.filter_band;
        check("filter floor", filter.floor_db as f64, filter.floor_db > 0.0)?;
        check(
            "filter smoothing",
            filter.smoothing as f64,
            (0.0..1.0).contains(&filter.smoothing),
        )?;

        Ok(())
    }
}

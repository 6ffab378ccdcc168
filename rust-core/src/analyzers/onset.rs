//! Onset detection with high-frequency-content novelty
//!
//! Each hop the newest window is transformed, its high-frequency content
//! becomes the novelty value, and an adaptive threshold built from the
//! median and mean of recent novelty decides whether an onset occurred.

use super::history::History;
use super::Analyzer;
use crate::audio::framing::{level_db, HopFramer};
use crate::audio::AudioBuffer;
use crate::events::OnsetEvent;
use crate::spectrum::{FftEngine, WindowType};

/// Smallest and largest accepted detection threshold
pub const THRESHOLD_RANGE: (f32, f32) = (0.0, 2.0);

/// Onset detector tuning
#[derive(Debug, Clone, PartialEq)]
pub struct OnsetConfig {
    /// Weight of the mean in the adaptive threshold, clamped to [0, 2]
    pub threshold: f32,

    /// Hops quieter than this (dB) never report an onset
    pub silence_db: f64,

    /// Minimum time between two onsets, in seconds
    pub min_inter_onset_s: f64,

    /// Number of past novelty values used for the adaptive threshold
    pub history_len: usize,
}

impl Default for OnsetConfig {
    fn default() -> Self {
        Self {
            threshold: 0.3,
            silence_db: -70.0,
            min_inter_onset_s: 0.05,
            history_len: 8,
        }
    }
}

/// Per-buffer onset result (values from the last hop of the buffer)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OnsetReport {
    pub novelty: f32,
    pub thresholded_novelty: f32,
    pub threshold: f32,
    pub onset: Option<OnsetEvent>,
}

/// Hop-based onset detector
pub struct OnsetDetector {
    config: OnsetConfig,
    sample_rate: f64,
    framer: HopFramer,
    engine: FftEngine,
    mono: Vec<f64>,
    magnitudes: Vec<f64>,
    history: History,
    threshold: f32,
    min_gap_samples: u64,
    last_onset_sample: Option<u64>,
    novelty: f64,
    thresholded: f64,
    last_onset: Option<OnsetEvent>,
}

impl OnsetDetector {
    /// Create a detector analysing windows of `buffer_size` advanced by `hop_size`
    pub fn new(config: OnsetConfig, sample_rate: u32, buffer_size: usize, hop_size: usize) -> Self {
        let engine = FftEngine::new(buffer_size, WindowType::Hann);
        let magnitudes = vec![0.0; engine.num_bins()];
        let min_gap_samples = (config.min_inter_onset_s.max(0.0) * sample_rate as f64) as u64;
        let threshold = clamp_threshold(config.threshold).unwrap_or(0.3);

        Self {
            history: History::new(config.history_len),
            sample_rate: sample_rate as f64,
            framer: HopFramer::new(buffer_size, hop_size),
            engine,
            mono: vec![0.0; buffer_size],
            magnitudes,
            threshold,
            min_gap_samples,
            last_onset_sample: None,
            novelty: 0.0,
            thresholded: 0.0,
            last_onset: None,
            config,
        }
    }

    /// Set the adaptive threshold weight, clamped to [0, 2]; NaN is ignored
    pub fn set_threshold(&mut self, threshold: f32) {
        if let Some(t) = clamp_threshold(threshold) {
            self.threshold = t;
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Novelty of the most recent hop
    pub fn novelty(&self) -> f32 {
        self.novelty as f32
    }

    /// Novelty minus the adaptive threshold for the most recent hop
    pub fn thresholded_novelty(&self) -> f32 {
        self.thresholded as f32
    }

    /// Most recent onset ever detected
    pub fn last_onset(&self) -> Option<OnsetEvent> {
        self.last_onset
    }

    pub fn config(&self) -> &OnsetConfig {
        &self.config
    }
}

fn clamp_threshold(threshold: f32) -> Option<f32> {
    if threshold.is_nan() {
        None
    } else {
        Some(threshold.clamp(THRESHOLD_RANGE.0, THRESHOLD_RANGE.1))
    }
}

/// High-frequency content: bins weighted by their index
fn high_frequency_content(magnitudes: &[f64]) -> f64 {
    magnitudes
        .iter()
        .enumerate()
        .map(|(k, &m)| (k + 1) as f64 * m)
        .sum()
}

impl Analyzer for OnsetDetector {
    type Context = ();
    type Report = OnsetReport;

    fn ingest(&mut self, buffer: &AudioBuffer<'_>, _ctx: &()) -> OnsetReport {
        let frames = buffer.frame_count().min(self.mono.len());
        buffer.downmix_into(&mut self.mono[..frames]);

        let mut onset = None;
        let mut offset = 0;
        while let Some(hop_start) = self.framer.advance(&self.mono[..frames], &mut offset) {
            if self
                .engine
                .magnitude_into(self.framer.window(), &mut self.magnitudes)
                .is_err()
            {
                continue;
            }

            let novelty = high_frequency_content(&self.magnitudes);
            let novelty = if novelty.is_finite() { novelty } else { 0.0 };
            let adaptive = self.history.median() + self.threshold as f64 * self.history.mean();
            self.novelty = novelty;
            self.thresholded = novelty - adaptive;
            self.history.push(novelty);

            let audible = level_db(self.framer.latest_hop()) > self.config.silence_db;
            let spaced = self
                .last_onset_sample
                .map_or(true, |last| hop_start.saturating_sub(last) >= self.min_gap_samples);

            if onset.is_none() && self.thresholded > 0.0 && audible && spaced {
                let event = OnsetEvent {
                    timestamp_seconds: hop_start as f64 / self.sample_rate,
                };
                self.last_onset_sample = Some(hop_start);
                self.last_onset = Some(event);
                onset = Some(event);
            }
        }

        OnsetReport {
            novelty: self.novelty as f32,
            thresholded_novelty: self.thresholded as f32,
            threshold: self.threshold,
            onset,
        }
    }

    fn reset(&mut self) {
        self.framer.reset();
        self.history.clear();
        self.last_onset_sample = None;
        self.last_onset = None;
        self.novelty = 0.0;
        self.thresholded = 0.0;
    }

    fn name(&self) -> &'static str {
        "onset"
    }
}

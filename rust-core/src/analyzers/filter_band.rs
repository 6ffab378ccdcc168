//! Estimates the occupied band range of the signal
//!
//! Treats the input as if it had passed through a band-pass filter and
//! reports the apparent low and high cutoff bands.

use super::bands::BandEnergies;
use super::Analyzer;
use crate::audio::AudioBuffer;

#[derive(Debug, Clone, PartialEq)]
pub struct FilterBandConfig {
    /// Bands more than this many dB below the loudest band count as filtered out
    pub floor_db: f32,

    /// Weight of the previous estimate when smoothing, in [0, 1)
    pub smoothing: f32,
}

impl Default for FilterBandConfig {
    fn default() -> Self {
        Self {
            floor_db: 30.0,
            smoothing: 0.8,
        }
    }
}

/// Cutoff bands; `low_cut <= high_cut <= band_count` always holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FilterBandReport {
    pub low_cut: usize,
    pub high_cut: usize,
}

pub struct FilterBandClassifier {
    config: FilterBandConfig,
    band_count: usize,
    /// Smoothed edges; None until the first non-silent buffer
    smoothed: Option<(f32, f32)>,
    report: FilterBandReport,
}

impl FilterBandClassifier {
    pub fn new(config: FilterBandConfig, band_count: usize) -> Self {
        Self {
            config,
            band_count,
            smoothed: None,
            report: FilterBandReport {
                low_cut: 0,
                high_cut: band_count,
            },
        }
    }

    pub fn low_cut(&self) -> usize {
        self.report.low_cut
    }

    pub fn high_cut(&self) -> usize {
        self.report.high_cut
    }

    pub fn config(&self) -> &FilterBandConfig {
        &self.config
    }

    /// Raw (unsmoothed) edges of the active region, or None when silent
    fn measure(&self, bands: &BandEnergies) -> Option<(f32, f32)> {
        let values = &bands.as_slice()[..bands.len().min(self.band_count)];
        let peak = values.iter().copied().fold(0.0f32, f32::max);
        if peak <= 0.0 || !peak.is_finite() {
            return None;
        }

        let floor = peak * 10f32.powf(-self.config.floor_db / 10.0);
        let low = values.iter().position(|&e| e > 0.0 && e >= floor)?;
        let high = values.iter().rposition(|&e| e > 0.0 && e >= floor)? + 1;
        Some((low as f32, high as f32))
    }
}

impl Analyzer for FilterBandClassifier {
    type Context = BandEnergies;
    type Report = FilterBandReport;

    fn ingest(&mut self, _buffer: &AudioBuffer<'_>, bands: &BandEnergies) -> FilterBandReport {
        let Some((low, high)) = self.measure(bands) else {
            return self.report;
        };

        let alpha = self.config.smoothing.clamp(0.0, 0.99);
        let (low, high) = match self.smoothed {
            None => (low, high),
            Some((prev_low, prev_high)) => (
                alpha * prev_low + (1.0 - alpha) * low,
                alpha * prev_high + (1.0 - alpha) * high,
            ),
        };
        self.smoothed = Some((low, high));

        let high_cut = (high.round().max(0.0) as usize).min(self.band_count);
        let low_cut = (low.round().max(0.0) as usize).min(high_cut);
        self.report = FilterBandReport { low_cut, high_cut };
        self.report
    }

    fn reset(&mut self) {
        self.smoothed = None;
        self.report = FilterBandReport {
            low_cut: 0,
            high_cut: self.band_count,
        };
    }

    fn name(&self) -> &'static str {
        "filter_band"
    }
}

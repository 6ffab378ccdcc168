//! Band energies over a mel-spaced partition of the spectrum
//!
//! Every FFT bin belongs to exactly one band, so the energies sum to zero
//! only when the buffer itself is silent. A Hamming window is used because
//! it never reaches zero: no input sample is invisible to the transform.

use super::Analyzer;
use crate::audio::AudioBuffer;
use crate::spectrum::{FftEngine, WindowType};

/// Upper bound on the configurable band count
pub const MAX_BANDS: usize = 40;

/// Fixed-capacity band energy vector
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandEnergies {
    values: [f32; MAX_BANDS],
    len: usize,
}

impl BandEnergies {
    /// Zeroed energies for `len` bands (capped at `MAX_BANDS`)
    pub fn zeroed(len: usize) -> Self {
        Self {
            values: [0.0; MAX_BANDS],
            len: len.min(MAX_BANDS),
        }
    }

    /// Copy up to `MAX_BANDS` values; negative or non-finite entries become 0
    pub fn from_slice(values: &[f32]) -> Self {
        let mut bands = Self::zeroed(values.len());
        for (b, &v) in bands.values.iter_mut().zip(values) {
            *b = if v.is_finite() { v.max(0.0) } else { 0.0 };
        }
        bands
    }

    /// Configured bands only
    pub fn as_slice(&self) -> &[f32] {
        &self.values[..self.len]
    }

    /// All `MAX_BANDS` slots; unused ones are zero
    pub fn as_array(&self) -> &[f32; MAX_BANDS] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn total(&self) -> f32 {
        self.as_slice().iter().sum()
    }
}

impl Default for BandEnergies {
    fn default() -> Self {
        Self::zeroed(MAX_BANDS)
    }
}

/// Narrow a band energy to f32; a positive energy never rounds to zero
fn narrow_energy(energy: f64) -> f32 {
    if !energy.is_finite() || energy <= 0.0 {
        0.0
    } else {
        (energy as f32).max(f32::MIN_POSITIVE)
    }
}

fn hz_to_mel(hz: f64) -> f64 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f64) -> f64 {
    700.0 * (10f64.powf(mel / 2595.0) - 1.0)
}

/// Bin edges of `band_count` contiguous mel-spaced bands covering `num_bins`
///
/// Band `i` spans bins `edges[i]..edges[i + 1]`. Edges are non-decreasing,
/// start at 0 and end at `num_bins`; bands only become empty when there are
/// more bands than bins.
pub fn band_edges(num_bins: usize, band_count: usize, sample_rate: f64) -> Vec<usize> {
    let mut edges = vec![0usize; band_count + 1];
    if band_count == 0 {
        return edges;
    }

    let nyquist = sample_rate / 2.0;
    let max_mel = hz_to_mel(nyquist);
    let hz_per_bin = nyquist / (num_bins.saturating_sub(1)).max(1) as f64;

    for i in 1..band_count {
        let hz = mel_to_hz(max_mel * i as f64 / band_count as f64);
        let ideal = (hz / hz_per_bin).round() as usize;
        let lowest = edges[i - 1] + 1;
        let highest = num_bins.saturating_sub(band_count - i).max(lowest);
        edges[i] = ideal.clamp(lowest, highest).min(num_bins);
    }
    edges[band_count] = num_bins;
    edges
}

/// Per-buffer band energy extractor
pub struct BandEnergyExtractor {
    band_count: usize,
    engine: FftEngine,
    frame: Vec<f64>,
    power: Vec<f64>,
    accumulated: Vec<f64>,
    edges: Vec<usize>,
    energies: BandEnergies,
}

impl BandEnergyExtractor {
    /// Create an extractor for buffers of `buffer_size` frames
    pub fn new(sample_rate: u32, buffer_size: usize, band_count: usize) -> Self {
        let band_count = band_count.min(MAX_BANDS);
        let engine = FftEngine::new(buffer_size, WindowType::Hamming);
        let num_bins = engine.num_bins();

        Self {
            band_count,
            frame: vec![0.0; buffer_size],
            power: vec![0.0; num_bins],
            accumulated: vec![0.0; num_bins],
            edges: band_edges(num_bins, band_count, sample_rate as f64),
            energies: BandEnergies::zeroed(band_count),
            engine,
        }
    }

    /// Energies of the most recent buffer
    pub fn energies(&self) -> &BandEnergies {
        &self.energies
    }

    pub fn band_count(&self) -> usize {
        self.band_count
    }

    /// Bin range of each band
    pub fn edges(&self) -> &[usize] {
        &self.edges
    }
}

impl Analyzer for BandEnergyExtractor {
    type Context = ();
    type Report = BandEnergies;

    fn ingest(&mut self, buffer: &AudioBuffer<'_>, _ctx: &()) -> BandEnergies {
        self.accumulated.fill(0.0);
        let frames = buffer.frame_count().min(self.frame.len());

        for channel in 0..buffer.channel_count() {
            self.frame.fill(0.0);
            for (f, s) in self.frame[..frames].iter_mut().zip(buffer.channel(channel)) {
                *f = if s.is_finite() { s as f64 } else { 0.0 };
            }
            if self.engine.power_into(&self.frame, &mut self.power).is_err() {
                continue;
            }
            for (a, p) in self.accumulated.iter_mut().zip(&self.power) {
                *a += p;
            }
        }

        // Amplitude-normalise so a full-scale sine lands near 0.25
        let gain = self.engine.window_gain();
        let scale = 1.0 / (gain * gain * buffer.channel_count() as f64);

        let mut energies = BandEnergies::zeroed(self.band_count);
        for (band, value) in energies.values[..self.band_count].iter_mut().enumerate() {
            let (lo, hi) = (self.edges[band], self.edges[band + 1]);
            let energy: f64 = self.accumulated[lo..hi].iter().sum::<f64>() * scale;
            *value = narrow_energy(energy);
        }

        self.energies = energies;
        energies
    }

    fn reset(&mut self) {
        self.energies = BandEnergies::zeroed(self.band_count);
    }

    fn name(&self) -> &'static str {
        "bands"
    }
}

//! YIN pitch estimation with an FFT difference function
//!
//! The YIN difference function d(τ) = Σ (x[j] - x[j+τ])² expands to
//! e₀ + e_τ - 2·r(τ). The energies come from a running prefix sum and the
//! cross-correlation r(τ) from one forward/inverse complex FFT pair, so a
//! 2048-sample window costs O(N log N) instead of O(N²).

use super::Analyzer;
use crate::audio::framing::level_db;
use crate::audio::AudioBuffer;
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

/// Highest MIDI pitch reported
pub const MAX_MIDI_PITCH: f32 = 128.0;

/// Pitch estimator tuning
#[derive(Debug, Clone, PartialEq)]
pub struct PitchConfig {
    /// Analysis window length in buffers
    pub window_buffers: usize,

    /// YIN absolute threshold on the normalised difference
    pub tolerance: f64,

    /// Buffers quieter than this (dB) report no pitch
    pub silence_db: f64,
}

impl Default for PitchConfig {
    fn default() -> Self {
        Self {
            window_buffers: 4,
            tolerance: 0.15,
            silence_db: -50.0,
        }
    }
}

/// Per-buffer pitch result; `midi_pitch == 0` means unpitched
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PitchReport {
    pub midi_pitch: f32,
    pub confidence: f32,
    pub frequency_hz: f32,
}

/// Convert a frequency to a (fractional) MIDI note number, clamped to [0, 128]
pub fn frequency_to_midi(frequency_hz: f64) -> f32 {
    if !frequency_hz.is_finite() || frequency_hz <= 0.0 {
        return 0.0;
    }
    let midi = 69.0 + 12.0 * (frequency_hz / 440.0).log2();
    (midi as f32).clamp(0.0, MAX_MIDI_PITCH)
}

/// Monophonic pitch estimator
pub struct PitchEstimator {
    config: PitchConfig,
    sample_rate: f64,

    /// Sliding window of mono samples, oldest first
    window: Vec<f64>,
    mono: Vec<f64>,

    fft: Arc<dyn Fft<f64>>,
    ifft: Arc<dyn Fft<f64>>,
    signal: Vec<Complex<f64>>,
    head: Vec<Complex<f64>>,
    scratch: Vec<Complex<f64>>,

    /// energy[i] = Σ x[j]² for j < i
    energy: Vec<f64>,

    /// Cumulative-mean-normalised difference, indexed by lag
    cmnd: Vec<f64>,

    report: PitchReport,
}

impl PitchEstimator {
    pub fn new(config: PitchConfig, sample_rate: u32, buffer_size: usize) -> Self {
        let window_len = (config.window_buffers.max(1) * buffer_size).max(4);

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(window_len);
        let ifft = planner.plan_fft_inverse(window_len);
        let scratch_len = fft
            .get_inplace_scratch_len()
            .max(ifft.get_inplace_scratch_len());

        Self {
            sample_rate: sample_rate as f64,
            window: vec![0.0; window_len],
            mono: vec![0.0; buffer_size],
            signal: vec![Complex::new(0.0, 0.0); window_len],
            head: vec![Complex::new(0.0, 0.0); window_len],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
            energy: vec![0.0; window_len + 1],
            cmnd: vec![1.0; window_len / 2],
            report: PitchReport::default(),
            fft,
            ifft,
            config,
        }
    }

    /// Latest MIDI pitch (0 when unpitched)
    pub fn midi_pitch(&self) -> f32 {
        self.report.midi_pitch
    }

    /// Latest confidence in [0, 1]
    pub fn confidence(&self) -> f32 {
        self.report.confidence
    }

    pub fn frequency_hz(&self) -> f32 {
        self.report.frequency_hz
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    pub fn config(&self) -> &PitchConfig {
        &self.config
    }

    /// Slide the newest mono block into the analysis window
    fn slide(&mut self, frames: usize) {
        let len = self.window.len();
        if frames >= len {
            self.window
                .copy_from_slice(&self.mono[frames - len..frames]);
        } else {
            self.window.copy_within(frames.., 0);
            self.window[len - frames..].copy_from_slice(&self.mono[..frames]);
        }
    }

    /// Fill `cmnd` for lags 0..len/2
    fn difference(&mut self) {
        let len = self.window.len();
        let half = len / 2;

        for (c, &x) in self.signal.iter_mut().zip(&self.window) {
            *c = Complex::new(x, 0.0);
        }
        for (i, c) in self.head.iter_mut().enumerate() {
            *c = Complex::new(if i < half { self.window[i] } else { 0.0 }, 0.0);
        }

        self.fft.process_with_scratch(&mut self.signal, &mut self.scratch);
        self.fft.process_with_scratch(&mut self.head, &mut self.scratch);
        for (h, s) in self.head.iter_mut().zip(&self.signal) {
            *h = h.conj() * s;
        }
        self.ifft.process_with_scratch(&mut self.head, &mut self.scratch);

        self.energy[0] = 0.0;
        for i in 0..len {
            self.energy[i + 1] = self.energy[i] + self.window[i] * self.window[i];
        }

        let scale = 1.0 / len as f64;
        let e0 = self.energy[half];
        let mut running = 0.0;
        self.cmnd[0] = 1.0;
        for tau in 1..half {
            let e_tau = self.energy[tau + half] - self.energy[tau];
            let r = self.head[tau].re * scale;
            let d = (e0 + e_tau - 2.0 * r).max(0.0);
            running += d;
            self.cmnd[tau] = if running > 0.0 {
                d * tau as f64 / running
            } else {
                1.0
            };
        }
    }

    /// First dip under the tolerance, followed to its local minimum
    fn pick_lag(&self) -> Option<usize> {
        let half = self.cmnd.len();
        let mut tau = 2;
        while tau < half {
            if self.cmnd[tau] < self.config.tolerance {
                while tau + 1 < half && self.cmnd[tau + 1] < self.cmnd[tau] {
                    tau += 1;
                }
                return Some(tau);
            }
            tau += 1;
        }
        None
    }

    fn refine(&self, tau: usize) -> f64 {
        if tau < 1 || tau + 1 >= self.cmnd.len() {
            return tau as f64;
        }
        let (a, b, c) = (self.cmnd[tau - 1], self.cmnd[tau], self.cmnd[tau + 1]);
        let denom = a - 2.0 * b + c;
        if denom.abs() < 1e-12 {
            return tau as f64;
        }
        let shift = (0.5 * (a - c) / denom).clamp(-0.5, 0.5);
        tau as f64 + shift
    }
}

impl Analyzer for PitchEstimator {
    type Context = ();
    type Report = PitchReport;

    fn ingest(&mut self, buffer: &AudioBuffer<'_>, _ctx: &()) -> PitchReport {
        let frames = buffer.frame_count().min(self.mono.len());
        buffer.downmix_into(&mut self.mono[..frames]);
        self.slide(frames);

        let latest = &self.window[self.window.len() - frames..];
        if frames == 0 || level_db(latest) < self.config.silence_db {
            self.report = PitchReport::default();
            return self.report;
        }

        self.difference();

        self.report = match self.pick_lag() {
            Some(tau) => {
                let lag = self.refine(tau);
                let frequency = self.sample_rate / lag;
                let confidence = (1.0 - self.cmnd[tau]).clamp(0.0, 1.0);
                PitchReport {
                    midi_pitch: frequency_to_midi(frequency),
                    confidence: confidence as f32,
                    frequency_hz: if frequency.is_finite() { frequency as f32 } else { 0.0 },
                }
            }
            None => {
                let best = self.cmnd[2.min(self.cmnd.len())..]
                    .iter()
                    .copied()
                    .fold(1.0f64, f64::min);
                PitchReport {
                    midi_pitch: 0.0,
                    confidence: (1.0 - best).clamp(0.0, 1.0) as f32,
                    frequency_hz: 0.0,
                }
            }
        };
        self.report
    }

    fn reset(&mut self) {
        self.window.fill(0.0);
        self.report = PitchReport::default();
    }

    fn name(&self) -> &'static str {
        "pitch"
    }
}

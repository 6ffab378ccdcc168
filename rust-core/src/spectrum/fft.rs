//! Windowed FFT engine using realfft for real-valued frames
//!
//! Every buffer (input, spectrum, scratch) is allocated at construction so
//! analysis on the audio thread stays allocation-free.

use super::windowing::{apply_window_into, coherent_gain, generate_window, WindowType};
use num_complex::Complex;
use realfft::{RealFftPlanner, RealToComplex};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FftError {
    #[error("frame length {actual} does not match FFT size {expected}")]
    FrameLength { expected: usize, actual: usize },

    #[error("output length {actual} does not match bin count {expected}")]
    OutputLength { expected: usize, actual: usize },

    #[error("FFT processing failed: {0}")]
    Transform(#[from] realfft::FftError),
}

/// Windowed real FFT with reusable buffers
pub struct FftEngine {
    /// FFT size (number of samples)
    fft_size: usize,

    /// Real FFT processor
    r2c: Arc<dyn RealToComplex<f64>>,

    /// Precomputed analysis window
    window: Vec<f64>,

    /// Sum of window coefficients
    gain: f64,

    /// Reusable input buffer
    input_buffer: Vec<f64>,

    /// Reusable output buffer (complex spectrum)
    output_buffer: Vec<Complex<f64>>,

    scratch: Vec<Complex<f64>>,
}

impl FftEngine {
    /// Create new FFT engine
    ///
    /// # Arguments
    /// * `fft_size` - FFT size (number of samples, any size realfft can plan)
    /// * `window_type` - Window applied to every frame before the transform
    pub fn new(fft_size: usize, window_type: WindowType) -> Self {
        let mut planner = RealFftPlanner::<f64>::new();
        let r2c = planner.plan_fft_forward(fft_size);

        let window = generate_window(window_type, fft_size);
        let gain = coherent_gain(&window);
        let input_buffer = r2c.make_input_vec();
        let output_buffer = r2c.make_output_vec();
        let scratch = r2c.make_scratch_vec();

        Self {
            fft_size,
            r2c,
            window,
            gain,
            input_buffer,
            output_buffer,
            scratch,
        }
    }

    fn transform(&mut self, frame: &[f64]) -> Result<(), FftError> {
        if frame.len() != self.fft_size {
            return Err(FftError::FrameLength {
                expected: self.fft_size,
                actual: frame.len(),
            });
        }

        apply_window_into(frame, &self.window, &mut self.input_buffer);
        self.r2c.process_with_scratch(
            &mut self.input_buffer,
            &mut self.output_buffer,
            &mut self.scratch,
        )?;
        Ok(())
    }

    fn check_output(&self, out: &[f64]) -> Result<(), FftError> {
        if out.len() != self.num_bins() {
            return Err(FftError::OutputLength {
                expected: self.num_bins(),
                actual: out.len(),
            });
        }
        Ok(())
    }

    /// Compute the magnitude spectrum |X[k]| of a windowed frame into `out`
    ///
    /// `frame` must be exactly `fft_size` long and `out` exactly `num_bins`.
    pub fn magnitude_into(&mut self, frame: &[f64], out: &mut [f64]) -> Result<(), FftError> {
        self.check_output(out)?;
        self.transform(frame)?;
        for (o, c) in out.iter_mut().zip(&self.output_buffer) {
            *o = c.norm();
        }
        Ok(())
    }

    /// Compute the power spectrum |X[k]|² of a windowed frame into `out`
    pub fn power_into(&mut self, frame: &[f64], out: &mut [f64]) -> Result<(), FftError> {
        self.check_output(out)?;
        self.transform(frame)?;
        for (o, c) in out.iter_mut().zip(&self.output_buffer) {
            *o = c.norm_sqr();
        }
        Ok(())
    }

    /// Get FFT size
    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Get number of frequency bins (fft_size/2 + 1 for real FFT)
    pub fn num_bins(&self) -> usize {
        self.fft_size / 2 + 1
    }

    /// Sum of the analysis window, for amplitude normalisation
    pub fn window_gain(&self) -> f64 {
        self.gain
    }

    /// Width of one bin in Hz
    pub fn bin_width_hz(&self, sample_rate: f64) -> f64 {
        sample_rate / self.fft_size as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_fft_dc_signal() {
        let mut fft = FftEngine::new(1024, WindowType::Rectangular);
        let signal = vec![1.0; 1024];
        let mut spectrum = vec![0.0; fft.num_bins()];
        fft.magnitude_into(&signal, &mut spectrum).unwrap();

        assert!((spectrum[0] - 1024.0).abs() < 1e-6);
        assert!(spectrum[10] < 1e-6);
    }

    #[test]
    fn test_fft_sine_peak() {
        let mut fft = FftEngine::new(1024, WindowType::Hann);
        let sample_rate = 48000.0;
        let freq_hz = 1500.0;
        let signal: Vec<f64> = (0..1024)
            .map(|n| (2.0 * PI * freq_hz * n as f64 / sample_rate).sin())
            .collect();

        let mut spectrum = vec![0.0; fft.num_bins()];
        fft.magnitude_into(&signal, &mut spectrum).unwrap();

        let (peak_bin, &peak) = spectrum
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap())
            .unwrap();

        let peak_hz = peak_bin as f64 * fft.bin_width_hz(sample_rate);
        assert!((peak_hz - freq_hz).abs() < 50.0);

        // Normalised by coherent gain, a unit sine reads close to 0.5
        let amplitude = peak / fft.window_gain();
        assert!(amplitude > 0.4 && amplitude < 0.55);
    }

    #[test]
    fn test_power_matches_magnitude_squared() {
        let mut fft = FftEngine::new(256, WindowType::Hamming);
        let signal: Vec<f64> = (0..256).map(|n| ((n * 7) % 13) as f64 - 6.0).collect();
        let mut mag = vec![0.0; fft.num_bins()];
        let mut pow = vec![0.0; fft.num_bins()];
        fft.magnitude_into(&signal, &mut mag).unwrap();
        fft.power_into(&signal, &mut pow).unwrap();

        for (m, p) in mag.iter().zip(&pow) {
            assert!((m * m - p).abs() <= 1e-6 * p.max(1.0));
        }
    }

    #[test]
    fn test_rejects_wrong_lengths() {
        let mut fft = FftEngine::new(64, WindowType::Hann);
        let mut out = vec![0.0; fft.num_bins()];
        assert!(matches!(
            fft.magnitude_into(&[0.0; 32], &mut out),
            Err(FftError::FrameLength { expected: 64, actual: 32 })
        ));

        let mut short = vec![0.0; 3];
        assert!(matches!(
            fft.power_into(&[0.0; 64], &mut short),
            Err(FftError::OutputLength { .. })
        ));
    }
}

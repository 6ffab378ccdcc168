//! Window functions for short-time spectral analysis
//!
//! Windows are generated once at analyzer construction and applied in place
//! on the audio thread, so nothing here allocates per frame.

use std::f64::consts::PI;

/// Window function types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowType {
    /// Hann window: w[n] = 0.5 - 0.5*cos(2πn/(M-1))
    /// Zero at both ends, good general-purpose leakage suppression
    Hann,

    /// Hamming window: w[n] = 0.54 - 0.46*cos(2πn/(M-1))
    /// Never reaches zero, so every input sample contributes to the spectrum
    Hamming,

    /// Rectangular window (no windowing)
    Rectangular,
}

/// Generate window coefficients
///
/// # Arguments
/// * `window_type` - Type of window function
/// * `length` - Number of samples (M)
///
/// # Returns
/// Vector of window coefficients w[n] for n = 0..M-1
pub fn generate_window(window_type: WindowType, length: usize) -> Vec<f64> {
    if length <= 1 {
        return vec![1.0; length];
    }

    let m = length as f64;
    let mut window = Vec::with_capacity(length);

    match window_type {
        WindowType::Hann => {
            for n in 0..length {
                let angle = 2.0 * PI * n as f64 / (m - 1.0);
                window.push(0.5 - 0.5 * angle.cos());
            }
        }

        WindowType::Hamming => {
            for n in 0..length {
                let angle = 2.0 * PI * n as f64 / (m - 1.0);
                window.push(0.54 - 0.46 * angle.cos());
            }
        }

        WindowType::Rectangular => {
            window.resize(length, 1.0);
        }
    }

    window
}

/// Multiply `signal` by `window` into `out` (all three the same length)
#[inline]
pub fn apply_window_into(signal: &[f64], window: &[f64], out: &mut [f64]) {
    for ((o, &s), &w) in out.iter_mut().zip(signal).zip(window) {
        *o = s * w;
    }
}

/// Coherent gain of a window (sum of coefficients)
///
/// Dividing an FFT magnitude by this value maps a full-scale sinusoid
/// to roughly half its peak amplitude regardless of window choice.
pub fn coherent_gain(window: &[f64]) -> f64 {
    window.iter().sum()
}

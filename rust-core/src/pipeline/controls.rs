//! Control values written by the display thread, read by the audio thread
//!
//! Each value is one atomic scalar. The audio thread loads each field once
//! per buffer; a new value becomes visible at some later buffer.

use crate::analyzers::beat::{clamp_signature, TATUM_SIGNATURE_RANGE};
use crate::analyzers::onset::THRESHOLD_RANGE;
use std::sync::atomic::{AtomicU32, Ordering};

#[derive(Debug)]
pub struct PipelineControls {
    /// f32 bits
    onset_threshold: AtomicU32,
    tatum_signature: AtomicU32,
}

impl PipelineControls {
    pub fn new(onset_threshold: f32, tatum_signature: u32) -> Self {
        let controls = Self {
            onset_threshold: AtomicU32::new(0.0f32.to_bits()),
            tatum_signature: AtomicU32::new(TATUM_SIGNATURE_RANGE.0),
        };
        controls.set_onset_threshold(onset_threshold);
        controls.set_tatum_signature(tatum_signature);
        controls
    }

    /// Set the onset threshold, clamped to [0, 2]; NaN is ignored
    pub fn set_onset_threshold(&self, threshold: f32) {
        if threshold.is_nan() {
            return;
        }
        let clamped = threshold.clamp(THRESHOLD_RANGE.0, THRESHOLD_RANGE.1);
        self.onset_threshold.store(clamped.to_bits(), Ordering::Relaxed);
    }

    pub fn onset_threshold(&self) -> f32 {
        f32::from_bits(self.onset_threshold.load(Ordering::Relaxed))
    }

    /// Set tatums per beat, clamped to [1, 64]
    pub fn set_tatum_signature(&self, signature: u32) {
        self.tatum_signature
            .store(clamp_signature(signature), Ordering::Relaxed);
    }

    pub fn tatum_signature(&self) -> u32 {
        self.tatum_signature.load(Ordering::Relaxed)
    }
}

impl Default for PipelineControls {
    fn default() -> Self {
        Self::new(0.3, 4)
    }
}

//! Display-facing snapshot of all analyzer outputs and its merge rules
//!
//! The pipeline builds a new snapshot every buffer by merging that buffer's
//! [`FrameReport`] into the previous snapshot. Each field follows one of
//! the merge rules below; they are plain functions so each rule can be
//! tested on its own.

use crate::analyzers::{
    AttackReport, BandEnergies, BeatReport, FilterBandReport, OnsetReport, PitchReport, MAX_BANDS,
};

/// Everything the analyzers reported for one buffer
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameReport {
    pub onset: OnsetReport,
    pub pitch: PitchReport,
    pub beat: BeatReport,
    pub bands: BandEnergies,
    pub attack: AttackReport,
    pub filter: FilterBandReport,
}

/// Latest state of every analyzer, replaced wholesale each buffer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalyzerSnapshot {
    /// Number of the publish that produced this snapshot (0 = initial)
    pub generation: u64,

    pub novelty_value: f32,
    pub thresholded_novelty: f32,
    pub threshold: f32,

    /// Last pitched MIDI note; kept through unpitched buffers
    pub midi_pitch: f32,
    pub pitch_confidence: f32,

    pub bpm: f32,
    pub tatum_signature: u32,

    /// Entries past `band_count` are zero
    pub band_energies: [f32; MAX_BANDS],
    pub band_count: usize,

    pub low_cut_band: usize,
    pub high_cut_band: usize,

    pub last_onset_class: i32,
    pub last_beat_class: i32,

    pub onset_flag: bool,
    pub beat_flag: bool,
    pub tatum_flag: bool,
}

impl Default for AnalyzerSnapshot {
    fn default() -> Self {
        Self {
            generation: 0,
            novelty_value: 0.0,
            thresholded_novelty: 0.0,
            threshold: 0.0,
            midi_pitch: 0.0,
            pitch_confidence: 0.0,
            bpm: 0.0,
            tatum_signature: 1,
            band_energies: [0.0; MAX_BANDS],
            band_count: 0,
            low_cut_band: 0,
            high_cut_band: 0,
            last_onset_class: 0,
            last_beat_class: 0,
            onset_flag: false,
            beat_flag: false,
            tatum_flag: false,
        }
    }
}

/// Pitch keeps its last pitched value while the estimator reports none
pub fn sticky_pitch(previous: f32, report: &PitchReport) -> f32 {
    if report.midi_pitch > 0.0 {
        report.midi_pitch
    } else {
        previous
    }
}

/// Class ids keep their last value until a new class is assigned
pub fn sticky_class(previous: i32, class_id: Option<i32>) -> i32 {
    class_id.unwrap_or(previous)
}

/// A flag is raised only by an event in this buffer; latching across
/// reads is the shared state's job
pub fn edge_flag<T>(event: Option<T>) -> bool {
    event.is_some()
}

impl AnalyzerSnapshot {
    /// Initial snapshot for a pipeline with `band_count` bands
    pub fn initial(band_count: usize, tatum_signature: u32, threshold: f32) -> Self {
        let band_count = band_count.min(MAX_BANDS);
        Self {
            tatum_signature,
            threshold,
            band_count,
            high_cut_band: band_count,
            ..Self::default()
        }
    }

    /// Configured band energies only
    pub fn bands(&self) -> &[f32] {
        &self.band_energies[..self.band_count.min(MAX_BANDS)]
    }

    /// Snapshot after applying one buffer's reports
    pub fn merged(&self, frame: &FrameReport) -> Self {
        Self {
            generation: self.generation,
            novelty_value: frame.onset.novelty,
            thresholded_novelty: frame.onset.thresholded_novelty,
            threshold: frame.onset.threshold,
            midi_pitch: sticky_pitch(self.midi_pitch, &frame.pitch),
            pitch_confidence: frame.pitch.confidence,
            bpm: frame.beat.bpm,
            tatum_signature: frame.beat.tatum_signature,
            band_energies: *frame.bands.as_array(),
            band_count: frame.bands.len(),
            low_cut_band: frame.filter.low_cut,
            high_cut_band: frame.filter.high_cut,
            last_onset_class: sticky_class(
                self.last_onset_class,
                frame.attack.onset_class.map(|e| e.class_id),
            ),
            last_beat_class: sticky_class(
                self.last_beat_class,
                frame.attack.beat_class.map(|e| e.class_id),
            ),
            onset_flag: edge_flag(frame.onset.onset),
            beat_flag: edge_flag(frame.beat.beat),
            tatum_flag: edge_flag(frame.beat.tatum),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{OnsetClassEvent, OnsetEvent, TatumEvent};

    fn pitched(midi: f32) -> PitchReport {
        PitchReport {
            midi_pitch: midi,
            confidence: if midi > 0.0 { 0.9 } else { 0.1 },
            frequency_hz: 0.0,
        }
    }

    #[test]
    fn test_sticky_pitch_law() {
        assert_eq!(sticky_pitch(60.0, &pitched(0.0)), 60.0);
        assert_eq!(sticky_pitch(60.0, &pitched(64.5)), 64.5);
        assert_eq!(sticky_pitch(0.0, &pitched(0.0)), 0.0);
    }

    #[test]
    fn test_sticky_class() {
        assert_eq!(sticky_class(3, None), 3);
        assert_eq!(sticky_class(3, Some(0)), 0);
    }

    #[test]
    fn test_merge_applies_rules_per_field() {
        let start = AnalyzerSnapshot::initial(40, 4, 0.3);
        assert_eq!((start.low_cut_band, start.high_cut_band), (0, 40));

        let mut frame = FrameReport {
            pitch: pitched(69.0),
            filter: FilterBandReport {
                low_cut: 4,
                high_cut: 30,
            },
            ..FrameReport::default()
        };
        frame.onset.onset = Some(OnsetEvent { timestamp_seconds: 0.1 });
        frame.attack.onset_class = Some(OnsetClassEvent { class_id: 2 });
        frame.beat.tatum_signature = 4;

        let first = start.merged(&frame);
        assert_eq!(first.midi_pitch, 69.0);
        assert_eq!(first.last_onset_class, 2);
        assert!(first.onset_flag);
        assert!(!first.beat_flag);
        assert_eq!((first.low_cut_band, first.high_cut_band), (4, 30));

        // Quiet buffer: pitch and class stick, flags drop, confidence follows
        let mut quiet = FrameReport {
            pitch: pitched(0.0),
            ..FrameReport::default()
        };
        quiet.beat.tatum = Some(TatumEvent { sample_index: 512 });
        let second = first.merged(&quiet);
        assert_eq!(second.midi_pitch, 69.0);
        assert_eq!(second.pitch_confidence, 0.1);
        assert_eq!(second.last_onset_class, 2);
        assert!(!second.onset_flag);
        assert!(second.tatum_flag);
    }

    #[test]
    fn test_default_invariants() {
        let snapshot = AnalyzerSnapshot::default();
        assert!(snapshot.low_cut_band <= snapshot.high_cut_band);
        assert!(snapshot.high_cut_band <= snapshot.band_count);
        assert_eq!(snapshot.tatum_signature, 1);
        assert!(snapshot.bands().is_empty());
    }
}

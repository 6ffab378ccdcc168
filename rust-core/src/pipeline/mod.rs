//! Per-buffer orchestration of all analyzers
//!
//! The pipeline owns every analyzer and runs them in a fixed order on the
//! audio thread. Events go out on the [`EventBus`] as they are found; the
//! merged state of the buffer goes to the display thread through the
//! shared snapshot.

pub mod config;
pub mod controls;
pub mod shared;
pub mod snapshot;

pub use config::{ConfigError, PipelineConfig};
pub use controls::PipelineControls;
pub use shared::{shared_state, SnapshotReader, SnapshotWriter};
pub use snapshot::{AnalyzerSnapshot, FrameReport};

use crate::analyzers::{
    Analyzer, AttackClassifier, AttackContext, BandEnergyExtractor, BeatTracker,
    FilterBandClassifier, OnsetDetector, PitchEstimator,
};
use crate::audio::AudioBuffer;
use crate::events::EventBus;
use std::sync::Arc;

/// Real-time feature pipeline
pub struct Pipeline {
    config: PipelineConfig,

    onset: OnsetDetector,
    pitch: PitchEstimator,
    beat: BeatTracker,
    bands: BandEnergyExtractor,
    attack: AttackClassifier,
    filter_band: FilterBandClassifier,

    events: EventBus,
    controls: Arc<PipelineControls>,

    writer: SnapshotWriter,
    reader: Option<SnapshotReader>,

    /// Merged state before flag latching
    snapshot: AnalyzerSnapshot,

    frames_processed: u64,
}

impl Pipeline {
    /// Build a pipeline with default analyzer tuning
    pub fn configure(
        sample_rate: u32,
        buffer_size: usize,
        hop_size: usize,
        band_count: usize,
    ) -> Result<Self, ConfigError> {
        Self::new(PipelineConfig::with_framing(
            sample_rate,
            buffer_size,
            hop_size,
            band_count,
        ))
    }

    /// Build a pipeline from a full configuration
    pub fn new(config: PipelineConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let sr = config.sample_rate;
        let controls = Arc::new(PipelineControls::new(
            config.onset.threshold,
            config.beat.tatum_signature,
        ));
        let snapshot = AnalyzerSnapshot::initial(
            config.band_count,
            controls.tatum_signature(),
            controls.onset_threshold(),
        );
        let (writer, reader) = shared_state(snapshot);

        log::info!(
            "Pipeline configured: {} Hz, {} frames per buffer ({:.2} ms), hop {}, {} bands",
            sr,
            config.buffer_size,
            config.buffer_period() * 1000.0,
            config.hop_size,
            config.band_count
        );

        Ok(Self {
            onset: OnsetDetector::new(config.onset.clone(), sr, config.buffer_size, config.hop_size),
            pitch: PitchEstimator::new(config.pitch.clone(), sr, config.buffer_size),
            beat: BeatTracker::new(config.beat.clone(), sr, config.buffer_size, config.hop_size),
            bands: BandEnergyExtractor::new(sr, config.buffer_size, config.band_count),
            attack: AttackClassifier::new(config.attack.clone()),
            filter_band: FilterBandClassifier::new(config.filter_band.clone(), config.band_count),
            events: EventBus::new(),
            controls,
            writer,
            reader: Some(reader),
            snapshot,
            frames_processed: 0,
            config,
        })
    }

    /// Analyze one buffer, publish its events and its snapshot
    ///
    /// # Panics
    /// If the buffer's frame count or sample rate differs from the configuration.
    pub fn process(&mut self, buffer: &AudioBuffer<'_>) {
        assert_eq!(
            buffer.frame_count(),
            self.config.buffer_size,
            "buffer frame count does not match the configured buffer size"
        );
        assert_eq!(
            buffer.sample_rate(),
            self.config.sample_rate,
            "buffer sample rate does not match the configured sample rate"
        );

        self.onset.set_threshold(self.controls.onset_threshold());
        self.beat.set_tatum_signature(self.controls.tatum_signature());

        let onset = self.onset.ingest(buffer, &());
        if let Some(event) = onset.onset {
            self.events.publish(event);
        }

        let pitch = self.pitch.ingest(buffer, &());

        let beat = self.beat.ingest(buffer, &());
        if let Some(event) = beat.tatum {
            self.events.publish(event);
        }
        if let Some(event) = beat.beat {
            self.events.publish(event);
        }

        let bands = self.bands.ingest(buffer, &());

        let attack = self.attack.ingest(
            buffer,
            &AttackContext {
                onset: onset.onset,
                beat: beat.beat,
                bands,
            },
        );
        if let Some(event) = attack.onset_class {
            self.events.publish(event);
        }
        if let Some(event) = attack.beat_class {
            self.events.publish(event);
        }

        let filter = self.filter_band.ingest(buffer, &bands);

        let frame = FrameReport {
            onset,
            pitch,
            beat,
            bands,
            attack,
            filter,
        };
        self.snapshot = self.snapshot.merged(&frame);
        self.snapshot.generation = self.writer.publish(self.snapshot);
        self.frames_processed += buffer.frame_count() as u64;
    }

    /// Host-callback entry point for interleaved samples at the configured rate
    ///
    /// # Panics
    /// If `samples.len() != frame_count * channel_count`, `channel_count == 0`
    /// or `frame_count` differs from the configured buffer size.
    pub fn on_audio_in(&mut self, samples: &[f32], frame_count: usize, channel_count: usize) {
        match AudioBuffer::new(samples, frame_count, channel_count, self.config.sample_rate) {
            Ok(buffer) => self.process(&buffer),
            Err(e) => panic!("invalid audio block: {}", e),
        }
    }

    /// Event bus for subscribing listeners
    pub fn events(&mut self) -> &mut EventBus {
        &mut self.events
    }

    /// Shared handle for the control thread
    pub fn controls(&self) -> Arc<PipelineControls> {
        Arc::clone(&self.controls)
    }

    /// Take the display-thread reader; `None` once taken
    pub fn take_snapshot_reader(&mut self) -> Option<SnapshotReader> {
        self.reader.take()
    }

    /// Snapshot as last published, flags latched
    pub fn latest_snapshot(&self) -> &AnalyzerSnapshot {
        self.writer.latest()
    }

    /// Forget all analyzer history; configuration and listeners are kept
    pub fn reset(&mut self) {
        self.onset.reset();
        self.pitch.reset();
        self.beat.reset();
        self.bands.reset();
        self.attack.reset();
        self.filter_band.reset();

        self.snapshot = AnalyzerSnapshot {
            generation: self.writer.generation(),
            ..AnalyzerSnapshot::initial(
                self.config.band_count,
                self.beat.tatum_signature(),
                self.onset.threshold(),
            )
        };
        self.frames_processed = 0;
        log::debug!("Pipeline reset");
    }

    /// Frames analyzed since construction or the last reset
    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn onset(&self) -> &OnsetDetector {
        &self.onset
    }

    pub fn pitch(&self) -> &PitchEstimator {
        &self.pitch
    }

    pub fn beat(&self) -> &BeatTracker {
        &self.beat
    }

    pub fn bands(&self) -> &BandEnergyExtractor {
        &self.bands
    }

    pub fn attack(&self) -> &AttackClassifier {
        &self.attack
    }

    pub fn filter_band(&self) -> &FilterBandClassifier {
        &self.filter_band
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Event, EventKind, OnsetClassEvent, OnsetEvent};
    use std::sync::{Arc, Mutex};

    const SR: u32 = 44100;
    const FRAMES: usize = 512;

    fn pipeline() -> Pipeline {
        Pipeline::configure(SR, FRAMES, 256, 40).unwrap()
    }

    fn stereo(mono: &[f32]) -> Vec<f32> {
        mono.iter().flat_map(|&s| [s, s]).collect()
    }

    fn sine(freq: f32, block: usize) -> Vec<f32> {
        (block * FRAMES..(block + 1) * FRAMES)
            .map(|n| (2.0 * std::f32::consts::PI * freq * n as f32 / SR as f32).sin() * 0.5)
            .collect()
    }

    #[test]
    fn test_transient_end_to_end() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut p = pipeline();
        let onsets = Arc::new(Mutex::new(Vec::new()));
        let classes = Arc::new(Mutex::new(Vec::new()));
        {
            let onsets = Arc::clone(&onsets);
            p.events()
                .subscribe(move |e: OnsetEvent| onsets.lock().unwrap().push(e));
            let classes = Arc::clone(&classes);
            p.events()
                .subscribe(move |e: OnsetClassEvent| classes.lock().unwrap().push(e));
        }

        let mut mono = vec![0.0f32; FRAMES];
        mono[128] = 1.0;
        p.on_audio_in(&stereo(&mono), FRAMES, 2);

        let onsets = onsets.lock().unwrap();
        assert_eq!(onsets.len(), 1);
        let t = onsets[0].timestamp_seconds;
        assert!(t >= 0.0 && t <= FRAMES as f64 / SR as f64);

        let classes = classes.lock().unwrap();
        assert_eq!(classes.len(), 1);
        let class_count = p.config().attack.class_count as i32;
        assert!((0..class_count).contains(&classes[0].class_id));

        assert!(p.latest_snapshot().onset_flag);
        assert_eq!(p.frames_processed(), FRAMES as u64);
    }

    #[test]
    fn test_hop_larger_than_buffer_is_rejected() {
        assert!(matches!(
            Pipeline::configure(SR, 512, 1024, 40),
            Err(ConfigError::HopExceedsBuffer {
                hop_size: 1024,
                buffer_size: 512
            })
        ));
        assert!(Pipeline::configure(SR, 512, 256, 41).is_err());
        assert!(Pipeline::configure(0, 512, 256, 40).is_err());
    }

    #[test]
    #[should_panic]
    fn test_wrong_frame_count_is_fatal() {
        let mut p = pipeline();
        let samples = vec![0.0f32; 256];
        p.on_audio_in(&samples, 256, 1);
    }

    #[test]
    fn test_pitch_sticks_through_silence() {
        let mut p = pipeline();
        for block in 0..8 {
            p.on_audio_in(&sine(440.0, block), FRAMES, 1);
        }
        let pitched = *p.latest_snapshot();
        assert!((pitched.midi_pitch - 69.0).abs() < 0.5);

        let silence = vec![0.0f32; FRAMES];
        p.on_audio_in(&silence, FRAMES, 1);
        let quiet = *p.latest_snapshot();
        assert_eq!(quiet.midi_pitch, pitched.midi_pitch);
        assert_eq!(quiet.pitch_confidence, 0.0);
    }

    #[test]
    fn test_band_energy_properties() {
        let mut p = Pipeline::configure(SR, FRAMES, 256, 16).unwrap();

        p.on_audio_in(&vec![0.0; FRAMES * 2], FRAMES, 2);
        let silent = *p.latest_snapshot();
        assert_eq!(silent.band_count, 16);
        assert_eq!(silent.bands().iter().sum::<f32>(), 0.0);

        p.on_audio_in(&stereo(&sine(1000.0, 1)), FRAMES, 2);
        let snapshot = *p.latest_snapshot();
        assert_eq!(snapshot.band_energies.len(), 40);
        assert!(snapshot.band_energies.iter().all(|&e| e >= 0.0));
        assert!(snapshot.band_energies[16..].iter().all(|&e| e == 0.0));
        assert!(snapshot.bands().iter().sum::<f32>() > 0.0);
    }

    #[test]
    fn test_filter_band_invariant() {
        let mut p = pipeline();
        for block in 0..32 {
            let mono: Vec<f32> = (0..FRAMES)
                .map(|n| {
                    let x = ((n * 7919 + block * 104_729) % 1013) as f32 / 1013.0 - 0.5;
                    if block % 4 == 0 { 0.0 } else { x }
                })
                .collect();
            p.on_audio_in(&mono, FRAMES, 1);
            let s = p.latest_snapshot();
            assert!(s.low_cut_band <= s.high_cut_band);
            assert!(s.high_cut_band <= s.band_count);
            assert!(s.band_count <= 40);
        }
    }

    #[test]
    fn test_flags_reach_reader_once() {
        let mut p = pipeline();
        let mut reader = p.take_snapshot_reader().unwrap();
        assert!(p.take_snapshot_reader().is_none());

        let mut mono = vec![0.0f32; FRAMES];
        mono[300] = 1.0;
        p.on_audio_in(&mono, FRAMES, 1);
        // Several quiet buffers before the display thread gets around to reading
        let silence = vec![0.0f32; FRAMES];
        for _ in 0..3 {
            p.on_audio_in(&silence, FRAMES, 1);
        }

        let first = reader.read();
        assert!(first.onset_flag);
        assert_eq!(first.generation, 4);
        assert!(!reader.read().onset_flag);

        p.on_audio_in(&silence, FRAMES, 1);
        assert!(!p.latest_snapshot().onset_flag);
        assert!(!reader.read().onset_flag);
    }

    #[test]
    fn test_controls_apply_on_next_buffer() {
        let mut p = pipeline();
        let controls = p.controls();
        let silence = vec![0.0f32; FRAMES];

        controls.set_onset_threshold(1.5);
        controls.set_tatum_signature(8);
        assert_eq!(p.latest_snapshot().tatum_signature, 4);

        p.on_audio_in(&silence, FRAMES, 1);
        assert_eq!(p.latest_snapshot().threshold, 1.5);
        assert_eq!(p.latest_snapshot().tatum_signature, 8);
        assert_eq!(p.beat().tatum_signature(), 8);
        assert_eq!(p.onset().threshold(), 1.5);
    }

    #[test]
    fn test_event_order_within_buffer() {
        let mut p = pipeline();
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = Arc::clone(&seen);
            p.events()
                .subscribe_kinds(&EventKind::ALL, move |e: &Event| seen.lock().unwrap().push(e.kind()));
        }

        // Two clicks per second for ten seconds
        let total = SR as usize * 10 / FRAMES;
        let mut tatum_and_beat = 0;
        for block in 0..total {
            let mut mono = vec![0.0f32; FRAMES];
            let start = block * FRAMES;
            for (i, s) in mono.iter_mut().enumerate() {
                if (start + i) % (SR as usize / 2) < 16 {
                    *s = 0.8;
                }
            }
            p.on_audio_in(&mono, FRAMES, 1);

            let kinds: Vec<EventKind> = seen.lock().unwrap().drain(..).collect();
            let pos = |k: EventKind| kinds.iter().position(|&x| x == k);
            if let (Some(t), Some(b)) = (pos(EventKind::Tatum), pos(EventKind::Beat)) {
                assert!(t < b);
                tatum_and_beat += 1;
            }
            if let Some(c) = pos(EventKind::OnsetClass) {
                assert!(pos(EventKind::Onset).map_or(false, |o| o < c));
            }
            if let Some(c) = pos(EventKind::BeatClass) {
                assert!(pos(EventKind::Beat).map_or(false, |b| b < c));
            }
            assert!(kinds.iter().filter(|&&k| k == EventKind::Beat).count() <= 1);
            assert!(kinds.iter().filter(|&&k| k == EventKind::Tatum).count() <= 1);
        }
        assert!(tatum_and_beat > 0);
        assert!(p.beat().bpm() > 0.0);
    }

    #[test]
    fn test_reset_keeps_listeners_and_configuration() {
        let mut p = pipeline();
        p.events().subscribe(|_: OnsetEvent| {});
        let mut mono = vec![0.0f32; FRAMES];
        mono[10] = 1.0;
        p.on_audio_in(&mono, FRAMES, 1);

        p.reset();
        assert_eq!(p.frames_processed(), 0);
        assert_eq!(p.events().listener_count(EventKind::Onset), 1);
        assert!(p.onset().last_onset().is_none());
        assert_eq!(p.config().buffer_size, FRAMES);
    }
}

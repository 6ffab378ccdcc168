//! Online attack classification from band-energy profiles
//!
//! Onsets and beats are classified by two independent nearest-centroid
//! models. A profile is the band-energy vector normalised to unit sum, so
//! the class reflects spectral shape rather than loudness.

use super::bands::{BandEnergies, MAX_BANDS};
use super::Analyzer;
use crate::audio::AudioBuffer;
use crate::events::{BeatClassEvent, BeatEvent, OnsetClassEvent, OnsetEvent};

/// Upper bound on `AttackConfig::class_count`
pub const MAX_CLASSES: usize = 16;

#[derive(Debug, Clone, PartialEq)]
pub struct AttackConfig {
    /// Number of classes per stream, in [1, 16]
    pub class_count: usize,

    /// L1 distance (profiles sum to 1, so at most 2) above which a new class opens
    pub spawn_distance: f32,

    /// How far the winning centroid moves toward each new profile
    pub learning_rate: f32,
}

impl Default for AttackConfig {
    fn default() -> Self {
        Self {
            class_count: 8,
            spawn_distance: 0.5,
            learning_rate: 0.1,
        }
    }
}

/// Results of the same buffer the classifier needs
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AttackContext {
    pub onset: Option<OnsetEvent>,
    pub beat: Option<BeatEvent>,
    pub bands: BandEnergies,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AttackReport {
    pub onset_class: Option<OnsetClassEvent>,
    pub beat_class: Option<BeatClassEvent>,
}

/// One online nearest-centroid model
struct CentroidModel {
    centroids: [[f32; MAX_BANDS]; MAX_CLASSES],
    used: usize,
}

impl CentroidModel {
    fn new() -> Self {
        Self {
            centroids: [[0.0; MAX_BANDS]; MAX_CLASSES],
            used: 0,
        }
    }

    fn classify(&mut self, profile: &[f32; MAX_BANDS], config: &AttackConfig) -> usize {
        let nearest = self.centroids[..self.used]
            .iter()
            .map(|c| l1_distance(c, profile))
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(&b.1));

        let spawn = match nearest {
            None => true,
            Some((_, distance)) => distance > config.spawn_distance && self.used < config.class_count,
        };

        if spawn {
            self.centroids[self.used] = *profile;
            self.used += 1;
            return self.used - 1;
        }

        // `nearest` is Some here: with no centroids we always spawn
        let class = nearest.map_or(0, |(i, _)| i);
        let rate = config.learning_rate;
        for (c, p) in self.centroids[class].iter_mut().zip(profile) {
            *c += rate * (p - *c);
        }
        class
    }

    fn clear(&mut self) {
        self.used = 0;
    }
}

fn l1_distance(a: &[f32; MAX_BANDS], b: &[f32; MAX_BANDS]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum()
}

/// Unit-sum spectral profile; silent input gives the all-zero profile
fn profile(bands: &BandEnergies) -> [f32; MAX_BANDS] {
    let mut out = [0.0; MAX_BANDS];
    let total = bands.total();
    if total > 0.0 && total.is_finite() {
        for (o, &e) in out.iter_mut().zip(bands.as_slice()) {
            *o = e / total;
        }
    }
    out
}

/// Classifies onsets and beats into learned attack classes
pub struct AttackClassifier {
    config: AttackConfig,
    onsets: CentroidModel,
    beats: CentroidModel,
    last_onset_class: Option<i32>,
    last_beat_class: Option<i32>,
}

impl AttackClassifier {
    pub fn new(config: AttackConfig) -> Self {
        let config = AttackConfig {
            class_count: config.class_count.clamp(1, MAX_CLASSES),
            ..config
        };
        Self {
            config,
            onsets: CentroidModel::new(),
            beats: CentroidModel::new(),
            last_onset_class: None,
            last_beat_class: None,
        }
    }

    pub fn last_onset_class(&self) -> Option<i32> {
        self.last_onset_class
    }

    pub fn last_beat_class(&self) -> Option<i32> {
        self.last_beat_class
    }

    /// Classes opened so far in the onset stream
    pub fn onset_classes(&self) -> usize {
        self.onsets.used
    }

    /// Classes opened so far in the beat stream
    pub fn beat_classes(&self) -> usize {
        self.beats.used
    }

    pub fn config(&self) -> &AttackConfig {
        &self.config
    }
}

impl Analyzer for AttackClassifier {
    type Context = AttackContext;
    type Report = AttackReport;

    fn ingest(&mut self, _buffer: &AudioBuffer<'_>, ctx: &AttackContext) -> AttackReport {
        if ctx.onset.is_none() && ctx.beat.is_none() {
            return AttackReport::default();
        }

        let profile = profile(&ctx.bands);

        let onset_class = ctx.onset.map(|_| {
            let class_id = self.onsets.classify(&profile, &self.config) as i32;
            self.last_onset_class = Some(class_id);
            OnsetClassEvent { class_id }
        });

        let beat_class = ctx.beat.map(|_| {
            let class_id = self.beats.classify(&profile, &self.config) as i32;
            self.last_beat_class = Some(class_id);
            BeatClassEvent { class_id }
        });

        AttackReport {
            onset_class,
            beat_class,
        }
    }

    fn reset(&mut self) {
        self.onsets.clear();
        self.beats.clear();
        self.last_onset_class = None;
        self.last_beat_class = None;
    }

    fn name(&self) -> &'static str {
        "attack"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SILENCE: [f32; 64] = [0.0; 64];

    fn bands_with(energies: &[(usize, f32)]) -> BandEnergies {
        let mut values = [0.0f32; 40];
        for &(band, e) in energies {
            values[band] = e;
        }
        BandEnergies::from_slice(&values)
    }

    fn onset_ctx(bands: BandEnergies) -> AttackContext {
        AttackContext {
            onset: Some(OnsetEvent { timestamp_seconds: 0.0 }),
            beat: None,
            bands,
        }
    }

    fn run(classifier: &mut AttackClassifier, ctx: AttackContext) -> AttackReport {
        let buffer = AudioBuffer::mono(&SILENCE, 44100).unwrap();
        classifier.ingest(&buffer, &ctx)
    }

    #[test]
    fn test_no_events_without_onset_or_beat() {
        let mut classifier = AttackClassifier::new(AttackConfig::default());
        let report = run(
            &mut classifier,
            AttackContext {
                bands: bands_with(&[(3, 1.0)]),
                ..AttackContext::default()
            },
        );
        assert_eq!(report, AttackReport::default());
        assert_eq!(classifier.onset_classes(), 0);
    }

    #[test]
    fn test_same_shape_same_class() {
        let mut classifier = AttackClassifier::new(AttackConfig::default());
        let a = run(&mut classifier, onset_ctx(bands_with(&[(2, 1.0), (3, 0.5)])));
        // Louder, same spectral shape
        let b = run(&mut classifier, onset_ctx(bands_with(&[(2, 10.0), (3, 5.0)])));
        assert_eq!(a.onset_class, b.onset_class);
        assert!(a.beat_class.is_none());
    }

    #[test]
    fn test_distinct_shapes_get_distinct_classes() {
        let mut classifier = AttackClassifier::new(AttackConfig::default());
        let low = run(&mut classifier, onset_ctx(bands_with(&[(1, 1.0)])));
        let high = run(&mut classifier, onset_ctx(bands_with(&[(35, 1.0)])));
        assert_ne!(low.onset_class, high.onset_class);
        assert_eq!(classifier.onset_classes(), 2);
    }

    #[test]
    fn test_class_ids_bounded_by_class_count() {
        let mut classifier = AttackClassifier::new(AttackConfig {
            class_count: 3,
            ..AttackConfig::default()
        });
        for band in 0..40 {
            let report = run(&mut classifier, onset_ctx(bands_with(&[(band, 1.0)])));
            let class = report.onset_class.unwrap().class_id;
            assert!((0..3).contains(&class));
        }
        assert_eq!(classifier.onset_classes(), 3);
    }

    #[test]
    fn test_streams_are_independent() {
        let mut classifier = AttackClassifier::new(AttackConfig::default());
        run(&mut classifier, onset_ctx(bands_with(&[(1, 1.0)])));
        run(&mut classifier, onset_ctx(bands_with(&[(30, 1.0)])));

        let report = run(
            &mut classifier,
            AttackContext {
                onset: None,
                beat: Some(BeatEvent { timestamp_seconds: 1.0 }),
                bands: bands_with(&[(30, 1.0)]),
            },
        );
        assert_eq!(report.beat_class, Some(BeatClassEvent { class_id: 0 }));
        assert!(report.onset_class.is_none());
        assert_eq!(classifier.last_beat_class(), Some(0));
        assert_eq!(classifier.last_onset_class(), Some(1));
    }

    #[test]
    fn test_silent_profile_still_classifies() {
        let mut classifier = AttackClassifier::new(AttackConfig::default());
        let report = run(&mut classifier, onset_ctx(BandEnergies::zeroed(40)));
        assert_eq!(report.onset_class, Some(OnsetClassEvent { class_id: 0 }));
    }
}

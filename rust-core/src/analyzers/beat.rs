//! Tempo and beat tracking from spectral-flux novelty
//!
//! Every novelty frame adds one spectral-flux value to a fixed-length
//! history. A frame is one hop, or several consecutive hops when the hop is
//! shorter than [`MIN_FRAME_SECONDS`], so the history and lag range stay
//! bounded for any hop size. At a
//! regular interval the beat period is re-estimated from the
//! autocorrelation of that history, weighted towards common tempi, and the
//! beat phase is re-aligned with a comb over the last few periods. Beats
//! and tatums are then scheduled on the stream sample clock and emitted as
//! the stream reaches them.

use super::history::History;
use super::Analyzer;
use crate::audio::framing::HopFramer;
use crate::audio::AudioBuffer;
use crate::events::{BeatEvent, TatumEvent};
use crate::spectrum::{FftEngine, WindowType};

/// Accepted tatum signature range
pub const TATUM_SIGNATURE_RANGE: (u32, u32) = (1, 64);

/// Shortest novelty frame; smaller hops are grouped up to this length
pub const MIN_FRAME_SECONDS: f64 = 0.005;

/// Number of past periods summed when aligning the beat phase
const PHASE_COMB_PERIODS: usize = 4;

/// Beat tracker tuning
#[derive(Debug, Clone, PartialEq)]
pub struct BeatConfig {
    /// Length of the novelty history, in seconds
    pub history_seconds: f64,

    /// Interval between tempo re-estimates, in seconds
    pub reestimate_seconds: f64,

    pub min_bpm: f64,
    pub max_bpm: f64,

    /// Centre of the tempo prior
    pub prior_bpm: f64,

    /// Tatums per beat
    pub tatum_signature: u32,
}

impl Default for BeatConfig {
    fn default() -> Self {
        Self {
            history_seconds: 6.0,
            reestimate_seconds: 0.5,
            min_bpm: 60.0,
            max_bpm: 240.0,
            prior_bpm: 120.0,
            tatum_signature: 4,
        }
    }
}

/// Per-buffer beat result
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BeatReport {
    /// 0 until a tempo has been established
    pub bpm: f32,
    pub tatum_signature: u32,
    pub beat: Option<BeatEvent>,
    pub tatum: Option<TatumEvent>,
}

/// Clamp a tatum signature into [1, 64]
pub fn clamp_signature(signature: u32) -> u32 {
    signature.clamp(TATUM_SIGNATURE_RANGE.0, TATUM_SIGNATURE_RANGE.1)
}

/// Log-Gaussian tempo weighting, one octave wide
fn tempo_weight(bpm: f64, prior_bpm: f64) -> f64 {
    let octaves = (bpm / prior_bpm).log2();
    (-0.5 * octaves * octaves).exp()
}

/// Smallest `anchor + k * period` (integer k) not before `from`
fn grid_from(anchor: f64, period: f64, from: f64) -> f64 {
    anchor + ((from - anchor) / period).ceil() * period
}

/// Spectral-flux beat tracker with tatum subdivision
pub struct BeatTracker {
    config: BeatConfig,
    sample_rate: f64,
    /// Hops per novelty frame
    frame_hops: usize,
    /// Samples per novelty frame
    frame_size: usize,
    hops_in_frame: usize,

    framer: HopFramer,
    engine: FftEngine,
    mono: Vec<f64>,
    magnitudes: Vec<f64>,
    previous: Vec<f64>,

    novelty: History,
    series: Vec<f64>,
    acf: Vec<f64>,
    min_lag: usize,
    max_lag: usize,
    estimate_every: u64,
    frames_since_estimate: u64,
    latest_frame_start: u64,

    /// Stream position of the next buffer's first frame
    position: u64,

    period_frames: Option<f64>,
    next_beat: Option<f64>,
    last_beat: Option<f64>,
    next_tatum: Option<f64>,
    last_tatum: Option<f64>,
    signature: u32,
    pending_signature: u32,

    report: BeatReport,
}

impl BeatTracker {
    pub fn new(config: BeatConfig, sample_rate: u32, buffer_size: usize, hop_size: usize) -> Self {
        let sr = sample_rate as f64;
        let frame_hops = ((MIN_FRAME_SECONDS * sr / hop_size as f64).ceil() as usize).max(1);
        let frame_size = hop_size * frame_hops;
        let frames_per_second = sr / frame_size as f64;

        let min_lag = ((60.0 * frames_per_second / config.max_bpm).floor() as usize).max(2);
        let max_lag = ((60.0 * frames_per_second / config.min_bpm).ceil() as usize).max(min_lag + 1);
        let capacity = ((config.history_seconds * frames_per_second) as usize).max(2 * max_lag + 2);
        let estimate_every = ((config.reestimate_seconds * frames_per_second).round() as u64).max(1);

        let engine = FftEngine::new(buffer_size, WindowType::Hann);
        let num_bins = engine.num_bins();
        let signature = clamp_signature(config.tatum_signature);

        Self {
            sample_rate: sr,
            frame_hops,
            frame_size,
            hops_in_frame: 0,
            framer: HopFramer::new(buffer_size, hop_size),
            engine,
            mono: vec![0.0; buffer_size],
            magnitudes: vec![0.0; num_bins],
            previous: vec![0.0; num_bins],
            novelty: History::new(capacity),
            series: vec![0.0; capacity],
            acf: vec![0.0; max_lag + 2],
            min_lag,
            max_lag,
            estimate_every,
            frames_since_estimate: 0,
            latest_frame_start: 0,
            position: 0,
            period_frames: None,
            next_beat: None,
            last_beat: None,
            next_tatum: None,
            last_tatum: None,
            signature,
            pending_signature: signature,
            report: BeatReport {
                tatum_signature: signature,
                ..BeatReport::default()
            },
            config,
        }
    }

    /// Request a new tatum signature (clamped to [1, 64])
    ///
    /// Applied at the start of the next `ingest`; tatums already emitted
    /// are unaffected.
    pub fn set_tatum_signature(&mut self, signature: u32) {
        self.pending_signature = clamp_signature(signature);
    }

    /// Signature currently used for scheduling
    pub fn tatum_signature(&self) -> u32 {
        self.signature
    }

    /// Current tempo, 0 until established
    pub fn bpm(&self) -> f32 {
        self.period_frames.map_or(0.0, |p| self.period_to_bpm(p) as f32)
    }

    pub fn last_beat(&self) -> Option<BeatEvent> {
        self.last_beat.map(|b| BeatEvent {
            timestamp_seconds: b / self.sample_rate,
        })
    }

    pub fn report(&self) -> &BeatReport {
        &self.report
    }

    pub fn config(&self) -> &BeatConfig {
        &self.config
    }

    fn period_to_bpm(&self, period_frames: f64) -> f64 {
        60.0 * self.sample_rate / (self.frame_size as f64 * period_frames)
    }

    fn beat_period_samples(&self) -> Option<f64> {
        self.period_frames.map(|p| p * self.frame_size as f64)
    }

    fn tatum_period_samples(&self) -> Option<f64> {
        self.beat_period_samples().map(|p| p / self.signature as f64)
    }

    /// Schedule the next tatum on the grid through `anchor`, at or after `from`
    fn schedule_tatum(&mut self, anchor: f64, from: f64) {
        if let Some(period) = self.tatum_period_samples() {
            let earliest = self.last_tatum.map_or(from, |t| from.max(t + 0.5 * period));
            self.next_tatum = Some(grid_from(anchor, period, earliest));
        }
    }

    fn on_hop(&mut self, hop_start: u64, buffer_start: f64) {
        self.hops_in_frame += 1;
        if self.hops_in_frame < self.frame_hops {
            return;
        }
        self.hops_in_frame = 0;

        if self
            .engine
            .magnitude_into(self.framer.window(), &mut self.magnitudes)
            .is_err()
        {
            return;
        }

        let flux: f64 = self
            .magnitudes
            .iter()
            .zip(&self.previous)
            .map(|(m, p)| (m - p).max(0.0))
            .sum();
        self.previous.copy_from_slice(&self.magnitudes);
        self.novelty.push(if flux.is_finite() { flux } else { 0.0 });
        self.latest_frame_start = hop_start;

        self.frames_since_estimate += 1;
        if self.frames_since_estimate >= self.estimate_every {
            self.frames_since_estimate = 0;
            self.estimate(buffer_start);
        }
    }

    /// Re-estimate tempo and phase, then reschedule beats and tatums
    fn estimate(&mut self, buffer_start: f64) {
        let Some(period) = self.tempo_period() else {
            return;
        };
        let changed = self
            .period_frames
            .map_or(true, |old| (old - period).abs() > 0.5);
        self.period_frames = Some(period);
        if changed {
            // Diagnostic only; keep trace output off in real-time builds
            log::trace!("tempo estimate {:.1} bpm", self.period_to_bpm(period));
        }

        let period_samples = period * self.frame_size as f64;
        let phase = self.beat_phase(period);
        let anchor = self.latest_frame_start as f64 - (phase * self.frame_size) as f64;

        let earliest = self
            .last_beat
            .map_or(buffer_start, |b| buffer_start.max(b + 0.5 * period_samples));
        let next_beat = grid_from(anchor, period_samples, earliest);
        self.next_beat = Some(next_beat);
        self.schedule_tatum(next_beat, buffer_start);
    }

    /// Beat period in novelty frames from the prior-weighted autocorrelation
    fn tempo_period(&mut self) -> Option<f64> {
        let n = self.novelty.copy_chronological(&mut self.series);
        if n < 2 * self.max_lag + 2 {
            return None;
        }

        let series = &mut self.series[..n];
        let mean = series.iter().sum::<f64>() / n as f64;
        series.iter_mut().for_each(|v| *v -= mean);

        let frames_per_minute = 60.0 * self.sample_rate / self.frame_size as f64;
        let prior = self.config.prior_bpm;
        for lag in self.min_lag - 1..=self.max_lag + 1 {
            let sum: f64 = series[..n - lag]
                .iter()
                .zip(&series[lag..])
                .map(|(a, b)| a * b)
                .sum();
            self.acf[lag] = sum / (n - lag) as f64 * tempo_weight(frames_per_minute / lag as f64, prior);
        }

        let mut best = self.min_lag;
        for lag in self.min_lag..=self.max_lag {
            if self.acf[lag] > self.acf[best] {
                best = lag;
            }
        }
        if self.acf[best] <= 1e-12 {
            return None;
        }

        let (a, b, c) = (self.acf[best - 1], self.acf[best], self.acf[best + 1]);
        let denom = a - 2.0 * b + c;
        let shift = if denom.abs() > 1e-12 {
            (0.5 * (a - c) / denom).clamp(-0.5, 0.5)
        } else {
            0.0
        };
        Some(best as f64 + shift)
    }

    /// Age (in frames) of the most recent beat, by comb alignment
    fn beat_phase(&self, period: f64) -> usize {
        let span = (period.round() as usize).max(1);
        let mut best = (0, f64::NEG_INFINITY);
        for phase in 0..span {
            let score: f64 = (0..PHASE_COMB_PERIODS)
                .filter_map(|k| self.novelty.recent(phase + (k as f64 * period).round() as usize))
                .sum();
            if score > best.1 {
                best = (phase, score);
            }
        }
        best.0
    }

    fn take_beat(&mut self, end: f64) -> Option<BeatEvent> {
        let beat = self.next_beat.filter(|&b| b < end)?;
        let period = self.beat_period_samples()?;

        let mut next = beat + period;
        while next < end {
            next += period;
        }
        self.next_beat = Some(next);
        self.last_beat = Some(beat);
        Some(BeatEvent {
            timestamp_seconds: beat / self.sample_rate,
        })
    }

    fn take_tatum(&mut self, end: f64) -> Option<TatumEvent> {
        let tatum = self.next_tatum.filter(|&t| t < end)?;
        let period = self.tatum_period_samples()?;

        let mut next = tatum + period;
        while next < end {
            next += period;
        }
        self.next_tatum = Some(next);
        self.last_tatum = Some(tatum);
        Some(TatumEvent {
            sample_index: tatum.round() as i64,
        })
    }
}

impl Analyzer for BeatTracker {
    type Context = ();
    type Report = BeatReport;

    fn ingest(&mut self, buffer: &AudioBuffer<'_>, _ctx: &()) -> BeatReport {
        let frames = buffer.frame_count().min(self.mono.len());
        let start = self.position as f64;
        let end = (self.position + frames as u64) as f64;

        if self.pending_signature != self.signature {
            self.signature = self.pending_signature;
            if let Some(anchor) = self.last_beat.or(self.next_beat) {
                self.schedule_tatum(anchor, start);
            }
        }

        buffer.downmix_into(&mut self.mono[..frames]);
        let mut offset = 0;
        while let Some(hop_start) = self.framer.advance(&self.mono[..frames], &mut offset) {
            self.on_hop(hop_start, start);
        }
        self.position += frames as u64;

        let beat = self.take_beat(end);
        if let (Some(_), Some(at)) = (beat, self.last_beat) {
            // Re-anchor the tatum grid on the beat just emitted
            self.schedule_tatum(at, start);
        }
        let tatum = self.take_tatum(end);

        self.report = BeatReport {
            bpm: self.bpm(),
            tatum_signature: self.signature,
            beat,
            tatum,
        };
        self.report
    }

    fn reset(&mut self) {
        self.framer.reset();
        self.previous.fill(0.0);
        self.novelty.clear();
        self.hops_in_frame = 0;
        self.frames_since_estimate = 0;
        self.latest_frame_start = 0;
        self.position = 0;
        self.period_frames = None;
        self.next_beat = None;
        self.last_beat = None;
        self.next_tatum = None;
        self.last_tatum = None;
        self.report = BeatReport {
            tatum_signature: self.signature,
            ..BeatReport::default()
        };
    }

    fn name(&self) -> &'static str {
        "beat"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: u32 = 44100;
    const BUFFER: usize = 512;

    /// Clicks every 0.5 s (120 BPM)
    fn click_track(seconds: f64) -> Vec<f32> {
        let len = (seconds * SR as f64) as usize;
        let mut samples = vec![0.0f32; len];
        let mut pos = 1000;
        while pos < len {
            for (i, s) in samples[pos..(pos + 32).min(len)].iter_mut().enumerate() {
                *s = 0.8 * (1.0 - i as f32 / 32.0);
            }
            pos += SR as usize / 2;
        }
        samples
    }

    fn run(tracker: &mut BeatTracker, samples: &[f32]) -> Vec<BeatReport> {
        samples
            .chunks_exact(BUFFER)
            .map(|chunk| {
                let buffer = AudioBuffer::mono(chunk, SR).unwrap();
                tracker.ingest(&buffer, &())
            })
            .collect()
    }

    fn tracker() -> BeatTracker {
        BeatTracker::new(BeatConfig::default(), SR, BUFFER, 256)
    }

    #[test]
    fn test_grid_from() {
        assert_eq!(grid_from(10.0, 5.0, 12.0), 15.0);
        assert_eq!(grid_from(10.0, 5.0, 15.0), 15.0);
        assert_eq!(grid_from(10.0, 5.0, 1.0), 5.0);
    }

    #[test]
    fn test_tempo_weight_peaks_at_prior() {
        assert!((tempo_weight(120.0, 120.0) - 1.0).abs() < 1e-12);
        assert!(tempo_weight(60.0, 120.0) < tempo_weight(100.0, 120.0));
        assert!((tempo_weight(60.0, 120.0) - tempo_weight(240.0, 120.0)).abs() < 1e-12);
    }

    #[test]
    fn test_silence_has_no_tempo() {
        let mut t = tracker();
        let reports = run(&mut t, &vec![0.0; SR as usize * 4]);
        assert!(reports.iter().all(|r| r.bpm == 0.0));
        assert!(reports.iter().all(|r| r.beat.is_none() && r.tatum.is_none()));
    }

    #[test]
    fn test_click_track_tempo() {
        let mut t = tracker();
        let reports = run(&mut t, &click_track(8.0));

        let bpm = reports.last().unwrap().bpm;
        assert!((bpm - 120.0).abs() < 5.0, "estimated {} bpm", bpm);

        let beats: Vec<f64> = reports
            .iter()
            .filter_map(|r| r.beat)
            .map(|b| b.timestamp_seconds)
            .filter(|&t| t > 4.0)
            .collect();
        assert!(beats.len() >= 6, "only {} beats", beats.len());
        for pair in beats.windows(2) {
            let interval = pair[1] - pair[0];
            assert!(interval > 0.4 && interval < 0.6, "beat interval {}", interval);
        }
    }

    #[test]
    fn test_at_most_one_event_of_each_kind_per_buffer() {
        let mut t = BeatTracker::new(
            BeatConfig {
                tatum_signature: 64,
                ..BeatConfig::default()
            },
            SR,
            BUFFER,
            256,
        );
        // Option fields make more than one per buffer unrepresentable; check the
        // tatum stream is still strictly increasing at the densest signature.
        let reports = run(&mut t, &click_track(6.0));
        let tatums: Vec<i64> = reports.iter().filter_map(|r| r.tatum).map(|e| e.sample_index).collect();
        assert!(!tatums.is_empty());
        assert!(tatums.windows(2).all(|p| p[0] < p[1]));
    }

    #[test]
    fn test_signature_change_applies_from_next_ingest() {
        let mut t = tracker();
        let track = click_track(12.0);
        let (first, second) = track.split_at(SR as usize * 6 / BUFFER * BUFFER);

        let before = run(&mut t, first);
        assert_eq!(before.last().unwrap().tatum_signature, 4);

        t.set_tatum_signature(2);
        assert_eq!(t.tatum_signature(), 4);
        let after = run(&mut t, second);
        assert_eq!(after[0].tatum_signature, 2);

        let quarter = SR as i64 / 8;
        let half = SR as i64 / 4;
        let fraction_near = |tatums: &[i64], expected: i64| {
            let intervals: Vec<i64> = tatums.windows(2).map(|p| p[1] - p[0]).collect();
            let near = intervals.iter().filter(|&&i| (i - expected).abs() < 800).count();
            near as f64 / intervals.len().max(1) as f64
        };

        let early: Vec<i64> = before
            .iter()
            .filter_map(|r| r.tatum)
            .map(|e| e.sample_index)
            .filter(|&s| s > SR as i64 * 4)
            .collect();
        assert!(early.len() >= 8);
        assert!(fraction_near(&early, quarter) >= 0.8);

        let late: Vec<i64> = after
            .iter()
            .filter_map(|r| r.tatum)
            .map(|e| e.sample_index)
            .filter(|&s| s > SR as i64 * 8)
            .collect();
        assert!(late.len() >= 8);
        assert!(fraction_near(&late, half) >= 0.8);
    }

    #[test]
    fn test_signature_is_clamped() {
        let mut t = tracker();
        t.set_tatum_signature(0);
        run(&mut t, &[0.0; BUFFER]);
        assert_eq!(t.tatum_signature(), 1);
        t.set_tatum_signature(1000);
        run(&mut t, &[0.0; BUFFER]);
        assert_eq!(t.tatum_signature(), 64);
    }

    #[test]
    fn test_tiny_hops_keep_history_bounded() {
        let default = tracker();
        let tiny = BeatTracker::new(BeatConfig::default(), SR, BUFFER, 1);

        assert_eq!(tiny.frame_size, 221);
        assert!(tiny.max_lag <= 2 * default.max_lag);
        assert!(tiny.novelty.capacity() <= 2 * default.novelty.capacity());
        assert!(tiny.series.len() <= 2 * default.series.len());
    }

    #[test]
    fn test_grouped_hops_track_tempo() {
        let mut t = BeatTracker::new(BeatConfig::default(), SR, BUFFER, 64);
        assert_eq!(t.frame_hops, 4);

        let reports = run(&mut t, &click_track(8.0));
        let bpm = reports.last().unwrap().bpm;
        assert!((bpm - 120.0).abs() < 5.0, "estimated {} bpm", bpm);
    }

    #[test]
    fn test_reset_forgets_tempo() {
        let mut t = tracker();
        run(&mut t, &click_track(6.0));
        assert!(t.bpm() > 0.0);
        t.reset();
        assert_eq!(t.bpm(), 0.0);
        assert!(t.last_beat().is_none());
    }
}

//! Hop-based framing for analyzers that work on overlapping windows
//!
//! Incoming mono samples are gathered hop by hop; each completed hop shifts
//! the analysis window and reports the stream position where the hop began.
//! Partial hops carry over to the next buffer.

/// Sliding analysis window advanced in fixed hops
pub struct HopFramer {
    /// Most recent `window_size` samples, oldest first
    window: Vec<f64>,

    /// Samples of the hop currently being gathered
    pending: Vec<f64>,

    /// Number of valid samples in `pending`
    filled: usize,

    /// Total number of completed hops
    hops: u64,
}

impl HopFramer {
    /// Create a framer with the given window and hop sizes
    ///
    /// `hop_size` must be non-zero and not larger than `window_size`.
    pub fn new(window_size: usize, hop_size: usize) -> Self {
        debug_assert!(hop_size > 0 && hop_size <= window_size);
        Self {
            window: vec![0.0; window_size],
            pending: vec![0.0; hop_size],
            filled: 0,
            hops: 0,
        }
    }

    /// Consume samples from `samples[*offset..]` until one hop completes
    ///
    /// Returns the stream sample index at which the completed hop started,
    /// or `None` once the input is exhausted without completing a hop.
    /// `offset` is advanced past everything consumed.
    pub fn advance(&mut self, samples: &[f64], offset: &mut usize) -> Option<u64> {
        let hop = self.pending.len();
        let remaining = samples.len().saturating_sub(*offset);
        let take = (hop - self.filled).min(remaining);

        self.pending[self.filled..self.filled + take]
            .copy_from_slice(&samples[*offset..*offset + take]);
        self.filled += take;
        *offset += take;

        if self.filled < hop {
            return None;
        }

        let keep = self.window.len() - hop;
        self.window.copy_within(hop.., 0);
        self.window[keep..].copy_from_slice(&self.pending);
        self.filled = 0;

        let start = self.hops * hop as u64;
        self.hops += 1;
        Some(start)
    }

    /// Current analysis window, oldest sample first
    pub fn window(&self) -> &[f64] {
        &self.window
    }

    /// The newest hop inside the window
    pub fn latest_hop(&self) -> &[f64] {
        &self.window[self.window.len() - self.pending.len()..]
    }

    pub fn hop_size(&self) -> usize {
        self.pending.len()
    }

    pub fn window_size(&self) -> usize {
        self.window.len()
    }

    /// Number of hops completed so far
    pub fn hops(&self) -> u64 {
        self.hops
    }

    /// Clear the window and restart the stream position at zero
    pub fn reset(&mut self) {
        self.window.fill(0.0);
        self.filled = 0;
        self.hops = 0;
    }
}

/// Mean power of a block in dB (silence floor at -200 dB)
pub fn level_db(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return -200.0;
    }
    let mean_square = samples.iter().map(|s| s * s).sum::<f64>() / samples.len() as f64;
    if mean_square <= 1e-20 {
        -200.0
    } else {
        10.0 * mean_square.log10()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hops_within_one_feed() {
        let mut framer = HopFramer::new(4, 2);
        let samples: Vec<f64> = (1..=6).map(|i| i as f64).collect();
        let mut offset = 0;
        let mut starts = Vec::new();

        while let Some(start) = framer.advance(&samples, &mut offset) {
            starts.push(start);
        }

        assert_eq!(starts, vec![0, 2, 4]);
        assert_eq!(framer.window(), &[3.0, 4.0, 5.0, 6.0]);
        assert_eq!(framer.latest_hop(), &[5.0, 6.0]);
        assert_eq!(offset, 6);
    }

    #[test]
    fn test_partial_hop_carries_over() {
        let mut framer = HopFramer::new(4, 3);
        let mut offset = 0;

        assert_eq!(framer.advance(&[1.0, 2.0], &mut offset), None);
        assert_eq!(offset, 2);

        let mut offset = 0;
        assert_eq!(framer.advance(&[3.0, 4.0, 5.0, 6.0], &mut offset), Some(0));
        assert_eq!(offset, 1);
        assert_eq!(framer.window(), &[0.0, 1.0, 2.0, 3.0]);

        assert_eq!(framer.advance(&[3.0, 4.0, 5.0, 6.0], &mut offset), Some(3));
        assert_eq!(framer.window(), &[3.0, 4.0, 5.0, 6.0]);
        assert_eq!(framer.hops(), 2);
    }

    #[test]
    fn test_reset() {
        let mut framer = HopFramer::new(2, 2);
        let mut offset = 0;
        framer.advance(&[1.0, 1.0], &mut offset);
        framer.reset();
        assert_eq!(framer.window(), &[0.0, 0.0]);
        assert_eq!(framer.hops(), 0);
    }

    #[test]
    fn test_level_db() {
        assert_eq!(level_db(&[0.0; 16]), -200.0);
        assert!((level_db(&[1.0; 16])).abs() < 1e-12);
        assert!((level_db(&[0.1; 16]) + 20.0).abs() < 1e-9);
    }
}

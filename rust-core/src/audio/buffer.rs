//! Audio buffer views and fixed-size block assembly
//!
//! `AudioBuffer` is the read-only view handed to the pipeline once per audio
//! callback. `BlockAssembler` turns arbitrarily sized host callbacks into
//! exact pipeline-sized blocks.

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum BufferError {
    #[error("Audio buffer must have at least one channel")]
    NoChannels,

    #[error("Sample rate must be non-zero")]
    ZeroSampleRate,

    #[error("Expected {expected} interleaved samples ({frames} frames x {channels} channels), got {actual}")]
    LengthMismatch {
        expected: usize,
        actual: usize,
        frames: usize,
        channels: usize,
    },
}

/// One block of interleaved samples delivered by the audio subsystem
///
/// Borrowed for the duration of a single `Pipeline::process` call.
#[derive(Debug, Clone, Copy)]
pub struct AudioBuffer<'a> {
    samples: &'a [f32],
    frame_count: usize,
    channel_count: usize,
    sample_rate: u32,
}

impl<'a> AudioBuffer<'a> {
    /// Wrap interleaved samples, checking `samples.len() == frame_count * channel_count`
    pub fn new(
        samples: &'a [f32],
        frame_count: usize,
        channel_count: usize,
        sample_rate: u32,
    ) -> Result<Self, BufferError> {
        if channel_count == 0 {
            return Err(BufferError::NoChannels);
        }
        if sample_rate == 0 {
            return Err(BufferError::ZeroSampleRate);
        }
        let expected = frame_count * channel_count;
        if samples.len() != expected {
            return Err(BufferError::LengthMismatch {
                expected,
                actual: samples.len(),
                frames: frame_count,
                channels: channel_count,
            });
        }

        Ok(Self {
            samples,
            frame_count,
            channel_count,
            sample_rate,
        })
    }

    /// Wrap a single-channel slice
    pub fn mono(samples: &'a [f32], sample_rate: u32) -> Result<Self, BufferError> {
        Self::new(samples, samples.len(), 1, sample_rate)
    }

    /// Raw interleaved samples
    pub fn samples(&self) -> &'a [f32] {
        self.samples
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Length of the buffer in seconds
    pub fn duration_seconds(&self) -> f64 {
        self.frame_count as f64 / self.sample_rate as f64
    }

    /// Iterate over the samples of one channel
    pub fn channel(&self, channel: usize) -> impl Iterator<Item = f32> + 'a {
        self.samples
            .iter()
            .skip(channel)
            .step_by(self.channel_count)
            .copied()
    }

    /// Average all channels into `out[..frame_count]`
    ///
    /// Non-finite samples are treated as silence.
    pub fn downmix_into(&self, out: &mut [f64]) {
        let scale = 1.0 / self.channel_count as f64;
        for (o, frame) in out
            .iter_mut()
            .zip(self.samples.chunks_exact(self.channel_count))
        {
            let sum: f64 = frame
                .iter()
                .map(|&s| if s.is_finite() { s as f64 } else { 0.0 })
                .sum();
            *o = sum * scale;
        }
    }

    /// True if every sample is exactly zero
    pub fn is_silent(&self) -> bool {
        self.samples.iter().all(|&s| s == 0.0)
    }
}

/// Re-blocks interleaved host data into fixed-size frames
///
/// The block storage is allocated once; `push` never allocates.
pub struct BlockAssembler {
    block: Vec<f32>,
    filled: usize,
    frames_per_block: usize,
    channels: usize,
}

impl BlockAssembler {
    /// Create an assembler producing blocks of `frames_per_block` frames
    pub fn new(frames_per_block: usize, channels: usize) -> Self {
        Self {
            block: vec![0.0; frames_per_block * channels],
            filled: 0,
            frames_per_block,
            channels,
        }
    }

    /// Append interleaved samples, calling `on_block` for every completed block
    ///
    /// Samples left over after the last complete block are kept for the next call.
    pub fn push<F: FnMut(&[f32])>(&mut self, mut data: &[f32], mut on_block: F) {
        while !data.is_empty() {
            let space = self.block.len() - self.filled;
            let take = space.min(data.len());
            self.block[self.filled..self.filled + take].copy_from_slice(&data[..take]);
            self.filled += take;
            data = &data[take..];

            if self.filled == self.block.len() {
                on_block(&self.block);
                self.filled = 0;
            }
        }
    }

    /// Number of interleaved samples waiting for the next block
    pub fn pending(&self) -> usize {
        self.filled
    }

    pub fn frames_per_block(&self) -> usize {
        self.frames_per_block
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Drop any partially assembled block
    pub fn clear(&mut self) {
        self.filled = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_length_invariant() {
        let data = vec![0.0f32; 1024];
        assert!(AudioBuffer::new(&data, 512, 2, 44100).is_ok());
        assert_eq!(
            AudioBuffer::new(&data, 512, 1, 44100).unwrap_err(),
            BufferError::LengthMismatch {
                expected: 512,
                actual: 1024,
                frames: 512,
                channels: 1
            }
        );
        assert_eq!(
            AudioBuffer::new(&data, 512, 0, 44100).unwrap_err(),
            BufferError::NoChannels
        );
        assert_eq!(
            AudioBuffer::new(&data, 1024, 1, 0).unwrap_err(),
            BufferError::ZeroSampleRate
        );
    }

    #[test]
    fn test_downmix_and_channels() {
        let data = [1.0f32, 3.0, -2.0, 2.0, f32::NAN, 4.0];
        let buffer = AudioBuffer::new(&data, 3, 2, 48000).unwrap();

        let mut mono = [0.0f64; 3];
        buffer.downmix_into(&mut mono);
        assert_eq!(mono, [2.0, 0.0, 2.0]);

        let right: Vec<f32> = buffer.channel(1).collect();
        assert_eq!(right, vec![3.0, 2.0, 4.0]);
        assert!(!buffer.is_silent());
    }

    #[test]
    fn test_duration() {
        let data = vec![0.0f32; 441];
        let buffer = AudioBuffer::mono(&data, 44100).unwrap();
        assert!((buffer.duration_seconds() - 0.01).abs() < 1e-12);
        assert!(buffer.is_silent());
    }

    #[test]
    fn test_block_assembler_reblocks() {
        let mut assembler = BlockAssembler::new(4, 2);
        let mut blocks: Vec<Vec<f32>> = Vec::new();

        let first: Vec<f32> = (0..5).map(|i| i as f32).collect();
        assembler.push(&first, |b| blocks.push(b.to_vec()));
        assert!(blocks.is_empty());
        assert_eq!(assembler.pending(), 5);

        let second: Vec<f32> = (5..21).map(|i| i as f32).collect();
        assembler.push(&second, |b| blocks.push(b.to_vec()));

        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0], (0..8).map(|i| i as f32).collect::<Vec<_>>());
        assert_eq!(blocks[1], (8..16).map(|i| i as f32).collect::<Vec<_>>());
        assert_eq!(assembler.pending(), 5);

        assembler.clear();
        assert_eq!(assembler.pending(), 0);
    }
}

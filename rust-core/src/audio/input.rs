//! Audio input capture using cpal
//!
//! Captures from an input device and drives a [`Pipeline`] directly from
//! the device callback, re-blocking host data into pipeline-sized buffers.

use super::buffer::BlockAssembler;
use crate::pipeline::Pipeline;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("No audio input device found")]
    NoDevice,

    #[error("Failed to get device name: {0}")]
    DeviceName(String),

    #[error("Failed to get default config: {0}")]
    DefaultConfig(String),

    #[error("Failed to build stream: {0}")]
    BuildStream(String),

    #[error("Failed to play stream: {0}")]
    PlayStream(String),

    #[error("Device runs at {found} Hz but the pipeline expects {expected} Hz")]
    UnsupportedSampleRate { found: u32, expected: u32 },

    #[error("Device sample format {0:?} is not supported, f32 is required")]
    UnsupportedSampleFormat(SampleFormat),
}

/// Audio input device information
#[derive(Debug, Clone)]
pub struct AudioDeviceInfo {
    pub name: String,
    pub sample_rate: u32,
    pub channels: u16,
}

fn check_format(found: u32, format: SampleFormat, expected: u32) -> Result<(), AudioError> {
    if found != expected {
        return Err(AudioError::UnsupportedSampleRate { found, expected });
    }
    if format != SampleFormat::F32 {
        return Err(AudioError::UnsupportedSampleFormat(format));
    }
    Ok(())
}

/// Input stream feeding a pipeline
///
/// The pipeline lives inside the stream callback; dropping the input stops
/// the stream first, so no `process` call can be in flight afterwards.
pub struct AudioInput {
    stream: Stream,
    device_info: AudioDeviceInfo,
}

impl AudioInput {
    /// Open the default input device for `pipeline`
    ///
    /// Subscribe listeners and take the snapshot reader before handing the
    /// pipeline over.
    pub fn from_default_device(pipeline: Pipeline) -> Result<Self, AudioError> {
        let host = cpal::default_host();
        let device = host.default_input_device().ok_or(AudioError::NoDevice)?;

        Self::from_device(device, pipeline)
    }

    /// Open a specific input device for `pipeline`
    pub fn from_device(device: Device, mut pipeline: Pipeline) -> Result<Self, AudioError> {
        let name = device
            .name()
            .map_err(|e| AudioError::DeviceName(e.to_string()))?;

        let config = device
            .default_input_config()
            .map_err(|e| AudioError::DefaultConfig(e.to_string()))?;

        let sample_rate = config.sample_rate().0;
        check_format(sample_rate, config.sample_format(), pipeline.config().sample_rate)?;

        let channels = config.channels();
        let device_info = AudioDeviceInfo {
            name,
            sample_rate,
            channels,
        };

        let stream_config: StreamConfig = config.into();
        let frames = pipeline.config().buffer_size;
        let mut assembler = BlockAssembler::new(frames, channels as usize);

        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let channels = assembler.channels();
                    assembler.push(data, |block| pipeline.on_audio_in(block, frames, channels));
                },
                move |err| {
                    log::error!("Audio input error: {}", err);
                },
                None,
            )
            .map_err(|e| AudioError::BuildStream(e.to_string()))?;

        log::info!(
            "Opened input '{}' at {} Hz, {} channels",
            device_info.name,
            device_info.sample_rate,
            device_info.channels
        );

        Ok(Self {
            stream,
            device_info,
        })
    }

    /// Start capturing audio
    pub fn start(&self) -> Result<(), AudioError> {
        self.stream
            .play()
            .map_err(|e| AudioError::PlayStream(e.to_string()))
    }

    /// Pause audio capture
    pub fn pause(&self) -> Result<(), AudioError> {
        self.stream
            .pause()
            .map_err(|e| AudioError::PlayStream(e.to_string()))
    }

    /// Get device information
    pub fn device_info(&self) -> &AudioDeviceInfo {
        &self.device_info
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_checks() {
        assert!(check_format(44100, SampleFormat::F32, 44100).is_ok());
        assert!(matches!(
            check_format(48000, SampleFormat::F32, 44100),
            Err(AudioError::UnsupportedSampleRate {
                found: 48000,
                expected: 44100
            })
        ));
        assert!(matches!(
            check_format(44100, SampleFormat::I16, 44100),
            Err(AudioError::UnsupportedSampleFormat(SampleFormat::I16))
        ));
    }

    #[test]
    fn test_default_device_does_not_panic() {
        // No device is fine; only a clean error is required
        let pipeline = Pipeline::configure(44100, 512, 256, 40).unwrap();
        let _ = AudioInput::from_default_device(pipeline);
    }
}

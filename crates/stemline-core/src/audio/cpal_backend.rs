//! CPAL audio backend implementation
//!
//! Opens one stereo output stream whose callback owns the [`MixBus`].
//!
//! ```text
//! ┌──────────────────┐                     ┌─────────────────────┐
//! │    Transport     │───push()───────────►│   Command Queue     │
//! │  (caller thread) │                     │  (lock-free SPSC)   │
//! └──────────────────┘                     └──────────┬──────────┘
//!         ▲                                           │ pop()
//!         │ SourceEnded / BusClock                    ▼
//!         │                                ┌─────────────────────┐
//!         └────────────────────────────────│  CPAL Audio Thread  │
//!                                          │    (owns MixBus)    │
//!                                          └─────────────────────┘
//! ```
//!
//! The stream is built paused. `play` on the stream is the device
//! activation step of the transport, `pause` suspends it.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize as CpalBufferSize, SampleFormat, Stream, StreamConfig};

use super::backend::{OutputHandle, OutputSystem};
use super::config::{OutputConfig, DEFAULT_SAMPLE_RATE, MAX_BUFFER_SIZE};
use super::device::{find_device_by_id, get_cpal_default_device};
use super::error::{AudioError, AudioResult, PlaybackError, PlaybackResult};
use crate::engine::{bus_channel, MixBus};
use crate::types::StereoBuffer;

/// CPAL-specific output handle
///
/// Owns the stream. Closing drops it and stops audio.
pub struct CpalOutputHandle {
    stream: Option<Stream>,
}

impl CpalOutputHandle {
    pub(crate) fn activate(&mut self) -> PlaybackResult<()> {
        let stream = self.stream.as_ref().ok_or(PlaybackError::DeviceUnavailable)?;
        stream
            .play()
            .map_err(|e| PlaybackError::DeviceActivationFailed(e.to_string()))
    }

    pub(crate) fn suspend(&mut self) -> AudioResult<()> {
        match &self.stream {
            Some(stream) => stream
                .pause()
                .map_err(|e| AudioError::StreamPauseError(e.to_string())),
            None => Ok(()),
        }
    }

    pub(crate) fn close(&mut self) {
        if self.stream.take().is_some() {
            log::info!("Audio stream closed");
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.stream.is_none()
    }
}

/// Open the output stream described by `config`
pub(crate) fn start_output(config: &OutputConfig) -> AudioResult<OutputSystem> {
    let device = match &config.device {
        Some(id) => find_device_by_id(id)?,
        None => get_cpal_default_device()?,
    };

    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    log::info!("Using audio device: {}", device_name);

    let (supported_config, buffer_size) = get_output_config(&device, config)?;
    let sample_rate = supported_config.sample_rate().0;

    let stream_config = StreamConfig {
        channels: supported_config.channels(),
        sample_rate: supported_config.sample_rate(),
        buffer_size: CpalBufferSize::Fixed(buffer_size),
    };

    let latency_ms = (buffer_size as f32 / sample_rate as f32) * 1000.0;

    log::info!(
        "Audio config: {} channels, {}Hz, {} frames (~{:.1}ms latency)",
        stream_config.channels,
        sample_rate,
        buffer_size,
        latency_ms
    );

    let (bus_handle, bus) = bus_channel(sample_rate);
    let stream = build_output_stream(&device, &stream_config, bus)?;

    // Some hosts start streams as soon as they are built
    if let Err(e) = stream.pause() {
        log::debug!("Could not pause freshly built stream: {}", e);
    }

    let handle = CpalOutputHandle {
        stream: Some(stream),
    };

    Ok(OutputSystem {
        handle: OutputHandle::Cpal(handle),
        bus: bus_handle,
        sample_rate,
        buffer_size,
        latency_ms,
    })
}

/// Pick the best output configuration for a device
///
/// Returns (SupportedStreamConfig, buffer_size_in_frames)
fn get_output_config(
    device: &cpal::Device,
    config: &OutputConfig,
) -> AudioResult<(cpal::SupportedStreamConfig, u32)> {
    let supported_configs: Vec<_> = device
        .supported_output_configs()
        .map_err(|e| AudioError::ConfigError(e.to_string()))?
        .collect();

    if supported_configs.is_empty() {
        return Err(AudioError::ConfigError(
            "No supported output configurations".to_string(),
        ));
    }

    let target_sample_rate = config.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE);

    // Prefer f32 stereo at the requested rate, then any stereo config
    let best_config = supported_configs
        .iter()
        .filter(|c| c.sample_format() == SampleFormat::F32)
        .filter(|c| c.channels() >= 2)
        .find(|c| {
            target_sample_rate >= c.min_sample_rate().0
                && target_sample_rate <= c.max_sample_rate().0
        })
        .or_else(|| {
            supported_configs
                .iter()
                .find(|c| c.sample_format() == SampleFormat::F32 && c.channels() >= 2)
        })
        .or_else(|| {
            supported_configs
                .iter()
                .find(|c| c.sample_format() == SampleFormat::F32)
        })
        .ok_or_else(|| {
            AudioError::ConfigError("No f32 output configuration found".to_string())
        })?;

    let sample_rate = if target_sample_rate >= best_config.min_sample_rate().0
        && target_sample_rate <= best_config.max_sample_rate().0
    {
        cpal::SampleRate(target_sample_rate)
    } else {
        let fallback = best_config.max_sample_rate();
        log::warn!(
            "Audio device doesn't support {}Hz, falling back to {}Hz (stems will be resampled)",
            target_sample_rate,
            fallback.0
        );
        fallback
    };

    let stream_config = best_config.clone().with_sample_rate(sample_rate);
    let buffer_size = config.buffer_size.frames();

    log::debug!(
        "Selected buffer size: {} frames for {:?}",
        buffer_size,
        config.buffer_size
    );

    Ok((stream_config, buffer_size))
}

/// Build the output stream; the callback owns the mix bus
fn build_output_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    mut bus: MixBus,
) -> AudioResult<Stream> {
    let channels = config.channels as usize;
    let mut block = StereoBuffer::silence(MAX_BUFFER_SIZE);

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                // Hosts may ask for more than one pre-allocated block
                for chunk in data.chunks_mut(MAX_BUFFER_SIZE * channels) {
                    let n_frames = chunk.len() / channels;
                    block.set_len_from_capacity(n_frames);
                    bus.process(&mut block);

                    if channels == 2 {
                        chunk.copy_from_slice(block.as_interleaved());
                        continue;
                    }

                    for (frame, sample) in chunk.chunks_mut(channels).zip(block.iter()) {
                        frame[0] = sample.left;
                        if channels > 1 {
                            frame[1] = sample.right;
                        }
                        for ch in frame.iter_mut().skip(2) {
                            *ch = 0.0;
                        }
                    }
                }
            },
            move |err| {
                log::error!("Audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))?;

    Ok(stream)
}

//! CPAL audio backend.
//!
//! Builds the output stream that owns the audio-side engine. The callback
//! drains the command ring, renders one mono block into a pre-allocated
//! buffer, then duplicates it across the device's channels.
//!
//! ```text
//! ┌──────────────────┐                  ┌─────────────────────┐
//! │  Control Thread  │───push()────────►│   Command Queue     │
//! │ (song driver/UI) │                  │  (lock-free SPSC)   │
//! └──────────────────┘                  └──────────┬──────────┘
//!         │                                        │ pop()
//!         │ atomic Parameters                      ▼
//!         ▼                             ┌─────────────────────┐
//! ┌──────────────────┐                  │  CPAL Audio Thread  │
//! │  VoiceControls   │◄─────────────────│  (owns SynthEngine) │
//! └──────────────────┘   Relaxed loads  └─────────────────────┘
//! ```
//!
//! Device negotiation ([`open_output`]) is separated from stream
//! construction ([`OpenOutput::start`]) so a caller can fail and retry
//! negotiation without giving up its engine. Stream construction itself can
//! also fail after it has consumed the engine; the callback holds the engine
//! in a [`CallbackEngine`] cell that sends it back through a channel when
//! the dead callback is dropped, and `start` hands it to the caller.

use std::sync::mpsc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize as CpalBufferSize, SampleFormat, StreamConfig};

use super::backend::StreamHandle;
use super::config::{AudioConfig, BufferSize, DEFAULT_BUFFER_SIZE, DEFAULT_SAMPLE_RATE};
use super::error::{AudioError, AudioResult};
use crate::engine::SynthEngine;
use crate::types::{MonoBuffer, MAX_BUFFER_SIZE};

/// A negotiated output device, ready to host an engine.
pub struct OpenOutput {
    device: cpal::Device,
    stream_config: StreamConfig,
    sample_rate: u32,
    buffer_size: u32,
}

impl OpenOutput {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }

    /// Build the output stream around `engine`. Some hosts start rendering
    /// immediately; [`StreamHandle`] best-effort pauses the stream so the
    /// caller decides when playback begins. On failure the engine comes back
    /// with the error so it can be parked again and `start` retried.
    pub fn start(
        self,
        engine: SynthEngine,
    ) -> Result<StreamHandle, (AudioError, Option<SynthEngine>)> {
        let channels = self.stream_config.channels as usize;
        let mut render_buffer = MonoBuffer::with_capacity(MAX_BUFFER_SIZE);

        // build_output_stream consumes the callback, and with it the engine.
        // The reclaim cell sends the engine back out when the callback is
        // dropped without ever having run, which is what happens when the
        // build fails.
        let (reclaim_tx, reclaim_rx) = mpsc::channel();
        let mut cell = CallbackEngine {
            engine: Some(engine),
            reclaim: reclaim_tx,
        };

        let built = self.device.build_output_stream(
            &self.stream_config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                let engine = match cell.engine.as_mut() {
                    Some(engine) => engine,
                    None => return,
                };
                let n_frames = data.len() / channels;
                render_buffer.set_len(n_frames);

                engine.process(render_buffer.as_mut_slice());

                let samples = render_buffer.as_slice();
                for (i, frame) in data.chunks_mut(channels).enumerate() {
                    let sample = if i < samples.len() { samples[i] } else { 0.0 };
                    for ch in frame.iter_mut() {
                        *ch = sample;
                    }
                }
            },
            move |err| {
                log::error!("audio stream error: {err}");
            },
            None,
        );

        let stream = match built {
            Ok(stream) => stream,
            Err(e) => {
                let err = AudioError::StreamBuildError(e.to_string());
                // The failed build dropped the callback, so the cell has
                // already sent the engine back.
                return Err((err, reclaim_rx.try_recv().ok()));
            }
        };

        // Not every host supports pausing; if this fails the stream simply
        // runs from here, rendering silence until voices arrive.
        if let Err(e) = stream.pause() {
            log::debug!("could not pause freshly built stream: {e}");
        }

        Ok(StreamHandle {
            stream,
            sample_rate: self.sample_rate,
            buffer_size: self.buffer_size,
        })
    }
}

/// Holds the engine inside the stream callback. Dropping the cell returns
/// the engine through the reclaim channel, so a callback that cpal discards
/// without running does not take the engine with it.
struct CallbackEngine {
    engine: Option<SynthEngine>,
    reclaim: mpsc::Sender<SynthEngine>,
}

impl Drop for CallbackEngine {
    fn drop(&mut self) {
        if let Some(engine) = self.engine.take() {
            let _ = self.reclaim.send(engine);
        }
    }
}

/// Find the configured device and negotiate an f32 output configuration.
pub fn open_output(config: &AudioConfig) -> AudioResult<OpenOutput> {
    let device = find_device(config)?;
    let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());
    log::info!("using audio device: {device_name}");

    let (supported, buffer_size) = output_config(&device, config)?;
    if supported.sample_format() != SampleFormat::F32 {
        return Err(AudioError::UnsupportedFormat(format!(
            "{:?}",
            supported.sample_format()
        )));
    }

    let sample_rate = supported.sample_rate().0;
    let stream_config = StreamConfig {
        channels: supported.channels(),
        sample_rate: supported.sample_rate(),
        buffer_size: CpalBufferSize::Fixed(buffer_size),
    };

    log::info!(
        "audio config: {} channels, {}Hz, {} frames (~{:.1}ms latency)",
        stream_config.channels,
        sample_rate,
        buffer_size,
        (buffer_size as f32 / sample_rate as f32) * 1000.0
    );

    Ok(OpenOutput {
        device,
        stream_config,
        sample_rate,
        buffer_size,
    })
}

fn find_device(config: &AudioConfig) -> AudioResult<cpal::Device> {
    let host = cpal::default_host();
    match &config.device {
        Some(name) => {
            let mut devices = host
                .output_devices()
                .map_err(|e| AudioError::NoDefaultDevice(e.to_string()))?;
            devices
                .find(|d| d.name().map(|n| &n == name).unwrap_or(false))
                .ok_or_else(|| AudioError::DeviceNotFound(name.clone()))
        }
        None => host.default_output_device().ok_or(AudioError::NoDevices),
    }
}


/// Pick the best output configuration: f32, the requested sample rate when
/// the device supports it, otherwise the device maximum.
fn output_config(
    device: &cpal::Device,
    config: &AudioConfig,
) -> AudioResult<(cpal::SupportedStreamConfig, u32)> {
    let supported_configs: Vec<_> = device
        .supported_output_configs()
        .map_err(|e| AudioError::ConfigError(e.to_string()))?
        .collect();

    if supported_configs.is_empty() {
        return Err(AudioError::ConfigError(
            "no supported output configurations".to_string(),
        ));
    }

    let target_rate = config.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE);

    let best = supported_configs
        .iter()
        .filter(|c| c.sample_format() == SampleFormat::F32)
        .find(|c| target_rate >= c.min_sample_rate().0 && target_rate <= c.max_sample_rate().0)
        .or_else(|| {
            supported_configs
                .iter()
                .find(|c| c.sample_format() == SampleFormat::F32)
        })
        .or_else(|| supported_configs.first())
        .ok_or_else(|| {
            AudioError::ConfigError("no suitable output configuration found".to_string())
        })?;

    let sample_rate = if target_rate >= best.min_sample_rate().0
        && target_rate <= best.max_sample_rate().0
    {
        cpal::SampleRate(target_rate)
    } else {
        let fallback = best.max_sample_rate();
        log::warn!(
            "audio device doesn't support {target_rate}Hz, falling back to {}Hz",
            fallback.0
        );
        fallback
    };

    let stream_config = best.clone().with_sample_rate(sample_rate);

    let buffer_size = match config.buffer_size {
        BufferSize::Default => DEFAULT_BUFFER_SIZE,
        BufferSize::Fixed(frames) => frames.clamp(64, MAX_BUFFER_SIZE as u32),
    };

    Ok((stream_config, buffer_size))
}

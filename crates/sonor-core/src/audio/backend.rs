//! Backend-agnostic stream handle.
//!
//! The engine never talks to cpal types directly; the handle wraps whatever
//! the backend built and exposes play/pause plus the negotiated stream
//! geometry.

use cpal::traits::StreamTrait;

use super::error::{AudioError, AudioResult};

/// Keeps the output stream alive. Drop this to tear the stream down.
pub struct StreamHandle {
    pub(super) stream: cpal::Stream,
    pub(super) sample_rate: u32,
    pub(super) buffer_size: u32,
}

impl StreamHandle {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Buffer size in frames, as negotiated with the device.
    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }

    /// One-way output latency in milliseconds.
    pub fn latency_ms(&self) -> f32 {
        (self.buffer_size as f32 / self.sample_rate as f32) * 1000.0
    }

    pub fn play(&self) -> AudioResult<()> {
        self.stream
            .play()
            .map_err(|e| AudioError::StreamPlayError(e.to_string()))
    }

    pub fn pause(&self) -> AudioResult<()> {
        self.stream
            .pause()
            .map_err(|e| AudioError::StreamPauseError(e.to_string()))
    }
}

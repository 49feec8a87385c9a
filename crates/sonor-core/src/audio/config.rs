//! Audio backend configuration.

use serde::{Deserialize, Serialize};

/// Default buffer size when no preference is specified (frames).
/// 512 frames is a safe default that works on most systems.
pub const DEFAULT_BUFFER_SIZE: u32 = 512;

/// Default sample rate for the audio system (48 kHz).
pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

/// Preferred buffer size for the output stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BufferSize {
    /// Let the system choose the default buffer size
    #[default]
    Default,
    /// Request a specific buffer size in frames (may be adjusted by the system)
    Fixed(u32),
}

impl BufferSize {
    /// Buffer size in frames, or None for system default.
    pub fn as_frames(&self) -> Option<u32> {
        match self {
            BufferSize::Default => None,
            BufferSize::Fixed(frames) => Some(*frames),
        }
    }
}

/// Configuration for the audio backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Output device name (None = system default)
    pub device: Option<String>,

    /// Preferred buffer size
    #[serde(default)]
    pub buffer_size: BufferSize,

    /// Preferred sample rate (None = device default)
    pub sample_rate: Option<u32>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            buffer_size: BufferSize::default(),
            sample_rate: None,
        }
    }
}

impl AudioConfig {
    pub fn with_buffer_frames(mut self, frames: u32) -> Self {
        self.buffer_size = BufferSize::Fixed(frames);
        self
    }

    pub fn with_sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = Some(rate);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_system_defaults() {
        let config = AudioConfig::default();
        assert!(config.device.is_none());
        assert_eq!(config.buffer_size, BufferSize::Default);
        assert!(config.sample_rate.is_none());
    }

    #[test]
    fn fixed_buffer_size_reports_frames() {
        assert_eq!(BufferSize::Fixed(256).as_frames(), Some(256));
        assert_eq!(BufferSize::Default.as_frames(), None);
    }
}

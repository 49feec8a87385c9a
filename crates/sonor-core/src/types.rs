//! Core types shared across the engine.

/// Default sample rate used when the device does not dictate one.
pub const SAMPLE_RATE: u32 = 48000;
pub const SAMPLE_RATE_F: f32 = SAMPLE_RATE as f32;

/// Upper bound on samples per render call. Buffers are pre-allocated to this
/// so the render path never grows them.
pub const MAX_BUFFER_SIZE: usize = 8192;

/// Maximum simultaneously registered voices.
pub const MAX_VOICES: usize = 64;

/// Block size used for offline rendering.
pub const DEFAULT_RENDER_BLOCK: usize = 512;

/// A single audio sample.
pub type Sample = f32;

/// Engine-assigned identifier for a registered voice. Never reused within a
/// process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoiceId(pub u64);

impl std::fmt::Display for VoiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "voice#{}", self.0)
    }
}

/// Mono audio buffer with a fixed backing capacity.
///
/// Allocated once up front; render-path length changes only shrink or restore
/// within that capacity, so the audio thread never touches the allocator.
#[derive(Debug)]
pub struct MonoBuffer {
    samples: Vec<Sample>,
    capacity: usize,
}

impl MonoBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: vec![0.0; capacity],
            capacity,
        }
    }

    /// Resize within the pre-allocated capacity. `len` above capacity is
    /// clamped rather than grown.
    pub fn set_len(&mut self, len: usize) {
        let len = len.min(self.capacity);
        // Never reallocates: capacity was reserved in with_capacity.
        self.samples.resize(len, 0.0);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn fill_silence(&mut self) {
        self.samples.fill(0.0);
    }

    pub fn as_slice(&self) -> &[Sample] {
        &self.samples
    }

    pub fn as_mut_slice(&mut self) -> &mut [Sample] {
        &mut self.samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_len_clamps_to_capacity() {
        let mut buf = MonoBuffer::with_capacity(16);
        buf.set_len(64);
        assert_eq!(buf.len(), 16);
        buf.set_len(4);
        assert_eq!(buf.len(), 4);
    }

    #[test]
    fn fill_silence_zeroes_all_samples() {
        let mut buf = MonoBuffer::with_capacity(8);
        for s in buf.as_mut_slice() {
            *s = 0.5;
        }
        buf.fill_silence();
        assert!(buf.as_slice().iter().all(|&s| s == 0.0));
    }
}

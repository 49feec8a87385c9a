//! Audio-side engine.
//!
//! `SynthEngine` lives inside the audio callback. Each render call drains the
//! command ring, then asks the mixer for one block. Everything here is
//! bounded: no locks, no allocation, no I/O.

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::engine::command::EngineCommand;
use crate::engine::mixer::Mixer;
use crate::types::{Sample, SAMPLE_RATE};

/// Shared cells between the control side and the audio thread: counters the
/// audio thread publishes, plus the sample rate the control side publishes
/// once the device has negotiated one.
#[derive(Debug)]
pub struct EngineAtomics {
    /// Registered voices after the last block's command drain.
    pub active_voices: AtomicUsize,
    /// Render calls completed since the engine was built.
    pub periods: AtomicU64,
    /// Voices rejected because the mixer was at capacity. The audio thread
    /// cannot log, so the control side watches this instead.
    pub dropped_voices: AtomicUsize,
    /// Device sample rate in Hz. Written when the stream opens; read at every
    /// block boundary so voices registered before start still land on pitch.
    pub sample_rate: AtomicU32,
}

impl Default for EngineAtomics {
    fn default() -> Self {
        Self {
            active_voices: AtomicUsize::new(0),
            periods: AtomicU64::new(0),
            dropped_voices: AtomicUsize::new(0),
            sample_rate: AtomicU32::new(SAMPLE_RATE),
        }
    }
}

pub struct SynthEngine {
    mixer: Mixer,
    commands: rtrb::Consumer<EngineCommand>,
    atomics: Arc<EngineAtomics>,
}

impl SynthEngine {
    pub fn new(commands: rtrb::Consumer<EngineCommand>, atomics: Arc<EngineAtomics>) -> Self {
        Self {
            mixer: Mixer::new(),
            commands,
            atomics,
        }
    }

    /// Apply pending commands at the block boundary so no voice appears or
    /// vanishes mid-buffer.
    fn drain_commands(&mut self) {
        while let Ok(command) = self.commands.pop() {
            match command {
                EngineCommand::AddVoice(voice) => {
                    if self.mixer.add_voice(voice).is_err() {
                        // Owned drop here only enqueues a pointer for the GC
                        // thread.
                        self.atomics.dropped_voices.fetch_add(1, Ordering::Relaxed);
                    }
                }
                EngineCommand::RemoveVoice(id) => self.mixer.remove_voice(id),
                EngineCommand::ClearVoices => self.mixer.clear(),
            }
        }
    }

    /// Render one block into `buffer`.
    pub fn process(&mut self, buffer: &mut [Sample]) {
        self.drain_commands();
        let sample_rate = self.atomics.sample_rate.load(Ordering::Relaxed) as f32;
        self.mixer.render(buffer, sample_rate);

        self.atomics
            .active_voices
            .store(self.mixer.voice_count(), Ordering::Relaxed);
        self.atomics.periods.fetch_add(1, Ordering::Relaxed);
    }
}

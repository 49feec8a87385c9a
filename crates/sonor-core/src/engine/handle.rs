//! Control-side engine handle.
//!
//! `EngineHandle` is the surface the rest of the program talks to: it builds
//! voices from patches, routes controls, and manages the output stream. The
//! audio-side `SynthEngine` is parked here until `start` hands it to the
//! device callback; everything after that flows through the command ring and
//! the voices' atomic parameters.

use std::sync::Arc;

use basedrop::Owned;
use thiserror::Error;

use crate::audio::cpal_backend::open_output;
use crate::audio::{AudioConfig, AudioError, StreamHandle};
use crate::config::{ConfigError, EnvelopeConfig, PatchConfig};
use crate::engine::command::{command_channel, CommandSender, EngineCommand};
use crate::engine::control::ControlBus;
use crate::engine::engine::{EngineAtomics, SynthEngine};
use crate::engine::gc::gc_handle;
use crate::engine::oscillator::Oscillator;
use crate::engine::voice::{adsr_envelope, fall_off_envelope, Voice, VoiceControls};
use crate::music::midi_to_hz;
use crate::types::{Sample, VoiceId, SAMPLE_RATE_F};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid patch: {0}")]
    InvalidPatch(#[from] ConfigError),

    #[error("command queue full, voice change dropped")]
    CommandQueueFull,

    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error("audio stream was never started")]
    NotStarted,
}

pub struct EngineHandle {
    sender: CommandSender,
    bus: ControlBus,
    atomics: Arc<EngineAtomics>,
    next_id: u64,
    sample_rate: f32,
    /// Audio-side engine, present until the stream takes ownership.
    parked: Option<SynthEngine>,
    stream: Option<StreamHandle>,
    running: bool,
}

impl EngineHandle {
    pub fn new() -> Self {
        Self::with_sample_rate(SAMPLE_RATE_F)
    }

    pub fn with_sample_rate(sample_rate: f32) -> Self {
        let (sender, receiver) = command_channel();
        let atomics = Arc::new(EngineAtomics::default());
        atomics
            .sample_rate
            .store(sample_rate as u32, std::sync::atomic::Ordering::Relaxed);
        let engine = SynthEngine::new(receiver, Arc::clone(&atomics));
        Self {
            sender,
            bus: ControlBus::new(),
            atomics,
            next_id: 0,
            sample_rate,
            parked: Some(engine),
            stream: None,
            running: false,
        }
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Voice count as last published by the audio thread.
    pub fn active_voices(&self) -> usize {
        self.atomics
            .active_voices
            .load(std::sync::atomic::Ordering::Relaxed)
    }

    /// Registrations the audio thread rejected for lack of mixer capacity.
    pub fn dropped_voices(&self) -> usize {
        self.atomics
            .dropped_voices
            .load(std::sync::atomic::Ordering::Relaxed)
    }

    /// Build a voice from a patch and queue it for the audio thread.
    /// Registration is allowed at any time, including while rendering.
    pub fn register_voice(
        &mut self,
        patch: &PatchConfig,
        name: Option<&str>,
    ) -> Result<VoiceId, EngineError> {
        patch.validate()?;
        let waveform = patch.waveform()?;

        let controls = Arc::new(VoiceControls::new());
        let envelope = match &patch.envelope {
            EnvelopeConfig::Adsr {
                attack,
                decay,
                sustain,
                release,
            } => {
                controls.set("attack", *attack);
                controls.set("decay", *decay);
                controls.set("sustain", *sustain);
                controls.set("release", *release);
                adsr_envelope()
            }
            EnvelopeConfig::FallOff { fall_off_ms } => {
                controls.set("fall_off_ms", *fall_off_ms);
                fall_off_envelope()
            }
        };
        if let Some(cutoff) = patch.cutoff_hz {
            controls.set("cutoff", cutoff);
        }

        let id = VoiceId(self.next_id);
        self.next_id += 1;

        let voice = Voice::new(
            id,
            Arc::clone(&controls),
            Box::new(Oscillator::new(waveform, self.sample_rate)),
            envelope,
            patch.cutoff_hz.is_some(),
            self.sample_rate,
        );
        let voice = Owned::new(&gc_handle(), voice);

        self.sender
            .send(EngineCommand::AddVoice(voice))
            .map_err(|_| EngineError::CommandQueueFull)?;
        self.bus.add_voice(id, name.map(str::to_string), controls);
        log::debug!("registered {id} ({})", name.unwrap_or("unnamed"));
        Ok(id)
    }

    pub fn remove_voice(&mut self, id: VoiceId) -> Result<(), EngineError> {
        self.sender
            .send(EngineCommand::RemoveVoice(id))
            .map_err(|_| EngineError::CommandQueueFull)?;
        self.bus.remove_voice(id);
        Ok(())
    }

    pub fn clear_voices(&mut self) -> Result<(), EngineError> {
        self.sender
            .send(EngineCommand::ClearVoices)
            .map_err(|_| EngineError::CommandQueueFull)?;
        self.bus.clear_voices();
        Ok(())
    }

    pub fn voice_controls(&self, name: &str) -> Option<&Arc<VoiceControls>> {
        self.bus.lookup(name).and_then(|id| self.bus.controls(id))
    }

    /// Start a note on a named voice. Unknown names are logged and ignored.
    pub fn note_on(&self, voice: &str, note: u8, velocity: f32) {
        match self.voice_controls(voice) {
            Some(controls) => controls.note_on(midi_to_hz(note), velocity),
            None => log::warn!("note_on for unknown voice '{voice}'"),
        }
    }

    pub fn note_off(&self, voice: &str) {
        match self.voice_controls(voice) {
            Some(controls) => controls.note_off(),
            None => log::warn!("note_off for unknown voice '{voice}'"),
        }
    }

    pub fn set_param(&self, voice: &str, param: &str, value: f32) {
        match self.voice_controls(voice) {
            Some(controls) => controls.set(param, value),
            None => log::warn!("set_param for unknown voice '{voice}'"),
        }
    }

    /// Route a named control to a voice parameter.
    pub fn link(&mut self, control: &str, voice: &str, param: &str) {
        match self.bus.lookup(voice) {
            Some(id) => self.bus.link(control, id, param),
            None => log::warn!("cannot link '{control}': unknown voice '{voice}'"),
        }
    }

    /// Fan a control value out to every linked parameter.
    pub fn update_control(&self, control: &str, value: f32) {
        self.bus.update(control, value);
    }

    /// Open the device and start rendering. The first call moves the parked
    /// engine into the stream callback; later calls just resume. Calling
    /// start while running is a no-op, and a failed device negotiation
    /// leaves the engine parked so start can be retried.
    pub fn start(&mut self, config: &AudioConfig) -> Result<(), EngineError> {
        if self.running {
            return Ok(());
        }
        match &self.stream {
            Some(stream) => stream.play()?,
            None => {
                // Negotiate before taking the engine; a failure here must
                // not cost us the parked engine.
                let output = open_output(config)?;
                let engine = self.parked.take().ok_or(EngineError::NotStarted)?;
                let stream = match output.start(engine) {
                    Ok(stream) => stream,
                    Err((err, engine)) => {
                        // Re-park so start stays retryable after a failed
                        // stream build.
                        self.parked = engine;
                        return Err(err.into());
                    }
                };
                stream.play()?;
                self.sample_rate = stream.sample_rate() as f32;
                // Publish the negotiated rate; voices registered before
                // start pick it up at the next block boundary.
                self.atomics
                    .sample_rate
                    .store(stream.sample_rate(), std::sync::atomic::Ordering::Relaxed);
                self.stream = Some(stream);
            }
        }
        self.running = true;
        Ok(())
    }

    /// Pause the stream. Calling stop while stopped is a no-op.
    pub fn stop(&mut self) -> Result<(), EngineError> {
        if !self.running {
            return Ok(());
        }
        if let Some(stream) = &self.stream {
            stream.pause()?;
        }
        self.running = false;
        Ok(())
    }

    /// Render one block without a device, while the engine is still parked.
    /// Returns false once `start` has moved the engine into a stream.
    pub fn render_offline(&mut self, buffer: &mut [Sample]) -> bool {
        match &mut self.parked {
            Some(engine) => {
                engine.process(buffer);
                true
            }
            None => false,
        }
    }
}

impl Default for EngineHandle {
    fn default() -> Self {
        Self::new()
    }
}

//! A voice: one generator shaped by an envelope and an optional low-pass
//! filter, controlled entirely through shared atomic parameters.

use std::f32::consts::TAU;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::engine::envelope::{Adsr, AmpEnvelope, EnvelopeTimes, FallOff};
use crate::engine::oscillator::Generator;
use crate::engine::param::Parameter;
use crate::types::{Sample, VoiceId};

/// The control-facing half of a voice: every knob is a [`Parameter`], so the
/// control context writes and the audio context reads without coordination.
///
/// The gate is level-encoded and sampled once per block, which would swallow
/// a note re-struck between two callbacks. `trigger` closes that gap: a
/// monotonically increasing counter bumped by every `note_on`, compared by
/// the voice against the value it saw last block.
#[derive(Debug)]
pub struct VoiceControls {
    pub frequency: Parameter,
    pub gate: Parameter,
    pub velocity: Parameter,
    pub cutoff: Parameter,
    pub attack: Parameter,
    pub decay: Parameter,
    pub sustain: Parameter,
    pub release: Parameter,
    pub fall_off_ms: Parameter,
    trigger: AtomicU32,
}

impl VoiceControls {
    pub fn new() -> Self {
        Self {
            frequency: Parameter::new("frequency", 0.0, 20000.0, 440.0),
            gate: Parameter::new("gate", 0.0, 1.0, 0.0),
            velocity: Parameter::new("velocity", 0.0, 1.0, 1.0),
            cutoff: Parameter::new("cutoff", 20.0, 20000.0, 20000.0),
            attack: Parameter::new("attack", 0.0, 30.0, 0.01),
            decay: Parameter::new("decay", 0.0, 30.0, 0.1),
            sustain: Parameter::new("sustain", 0.0, 1.0, 0.8),
            release: Parameter::new("release", 0.0, 30.0, 0.2),
            fall_off_ms: Parameter::new("fall_off_ms", 1.0, 60000.0, 1000.0),
            trigger: AtomicU32::new(0),
        }
    }

    /// Set a parameter by name. Unknown names are logged and ignored so a
    /// stray control message cannot fault the engine.
    pub fn set(&self, name: &str, value: f32) {
        match name {
            "frequency" => self.frequency.set(value),
            "gate" => self.gate.set(value),
            "velocity" => self.velocity.set(value),
            "cutoff" => self.cutoff.set(value),
            "attack" => self.attack.set(value),
            "decay" => self.decay.set(value),
            "sustain" => self.sustain.set(value),
            "release" => self.release.set(value),
            "fall_off_ms" => self.fall_off_ms.set(value),
            other => log::warn!("unknown voice parameter '{other}' ignored"),
        }
    }

    pub fn by_name(&self, name: &str) -> Option<&Parameter> {
        match name {
            "frequency" => Some(&self.frequency),
            "gate" => Some(&self.gate),
            "velocity" => Some(&self.velocity),
            "cutoff" => Some(&self.cutoff),
            "attack" => Some(&self.attack),
            "decay" => Some(&self.decay),
            "sustain" => Some(&self.sustain),
            "release" => Some(&self.release),
            "fall_off_ms" => Some(&self.fall_off_ms),
            _ => None,
        }
    }

    /// Start a note: tune, set loudness, open the gate, then bump the
    /// trigger counter so the audio thread sees an edge even if the gate
    /// never read as closed in between.
    pub fn note_on(&self, hz: f32, velocity: f32) {
        self.frequency.set(hz);
        self.velocity.set(velocity);
        self.gate.set(1.0);
        self.trigger.fetch_add(1, Ordering::Relaxed);
    }

    pub fn note_off(&self) {
        self.gate.set(0.0);
    }

    pub fn gate_on(&self) -> bool {
        self.gate.get() >= 0.5
    }

    pub fn trigger_count(&self) -> u32 {
        self.trigger.load(Ordering::Relaxed)
    }
}

impl Default for VoiceControls {
    fn default() -> Self {
        Self::new()
    }
}

/// Single-pole low-pass, coefficient recomputed per block from the cutoff
/// parameter.
#[derive(Debug)]
struct OnePole {
    state: f32,
}

impl OnePole {
    fn new() -> Self {
        Self { state: 0.0 }
    }

    fn coeff(cutoff_hz: f32, sample_rate: f32) -> f32 {
        let dt = 1.0 / sample_rate;
        let rc = 1.0 / (TAU * cutoff_hz);
        dt / (rc + dt)
    }

    #[inline]
    fn process(&mut self, input: f32, coeff: f32) -> f32 {
        self.state += coeff * (input - self.state);
        self.state
    }
}

/// The audio-side half of a voice. Owned by the mixer; reads its controls
/// once per render call and accumulates into the shared output buffer.
pub struct Voice {
    id: VoiceId,
    controls: Arc<VoiceControls>,
    generator: Box<dyn Generator>,
    envelope: AmpEnvelope,
    filter: Option<OnePole>,
    sample_rate: f32,
    current_freq: f32,
    last_trigger: u32,
}

impl Voice {
    pub fn new(
        id: VoiceId,
        controls: Arc<VoiceControls>,
        generator: Box<dyn Generator>,
        envelope: AmpEnvelope,
        filtered: bool,
        sample_rate: f32,
    ) -> Self {
        let last_trigger = controls.trigger_count();
        Self {
            id,
            controls,
            generator,
            envelope,
            filter: if filtered { Some(OnePole::new()) } else { None },
            sample_rate,
            current_freq: 0.0,
            last_trigger,
        }
    }

    pub fn id(&self) -> VoiceId {
        self.id
    }

    pub fn controls(&self) -> &Arc<VoiceControls> {
        &self.controls
    }

    pub fn is_audible(&self) -> bool {
        !self.envelope.is_idle()
    }

    /// Render one block at `sample_rate`, adding into `buffer`. Parameters
    /// are sampled once at block start; within the block they are constant.
    /// The rate follows the device, which may differ from the rate the
    /// voice was built with.
    pub fn render(&mut self, buffer: &mut [Sample], sample_rate: f32) {
        let trigger = self.controls.trigger_count();
        let retrigger = trigger != self.last_trigger;
        self.last_trigger = trigger;

        let gate_on = self.controls.gate_on();
        if !gate_on && self.envelope.is_idle() {
            return;
        }

        if sample_rate != self.sample_rate {
            self.sample_rate = sample_rate;
            self.generator.set_sample_rate(sample_rate);
        }

        let freq = self.controls.frequency.get();
        if freq != self.current_freq {
            self.current_freq = freq;
            self.generator.set_frequency(freq);
        }
        let velocity = self.controls.velocity.get();

        let times = EnvelopeTimes {
            attack: self.controls.attack.get(),
            decay: self.controls.decay.get(),
            sustain: self.controls.sustain.get(),
            release: self.controls.release.get(),
            fall_off_ms: self.controls.fall_off_ms.get(),
        };

        let coeff = self
            .filter
            .as_ref()
            .map(|_| OnePole::coeff(self.controls.cutoff.get(), self.sample_rate));

        match &mut self.envelope {
            AmpEnvelope::Adsr(env) => {
                let rates = env.begin_block(gate_on, retrigger, &times, self.sample_rate);
                for out in buffer.iter_mut() {
                    let raw = self.generator.next_sample();
                    let shaped = raw * env.next(&rates) * velocity;
                    *out += apply_filter(&mut self.filter, shaped, coeff);
                }
            }
            AmpEnvelope::FallOff(env) => {
                let fall_rate = env.begin_block(gate_on, &times, self.sample_rate);
                for out in buffer.iter_mut() {
                    let raw = self.generator.next_sample();
                    let shaped = raw * env.next(fall_rate) * velocity;
                    *out += apply_filter(&mut self.filter, shaped, coeff);
                }
            }
        }
    }
}

#[inline]
fn apply_filter(filter: &mut Option<OnePole>, sample: f32, coeff: Option<f32>) -> f32 {
    match (filter, coeff) {
        (Some(f), Some(c)) => f.process(sample, c),
        _ => sample,
    }
}

/// Convenience constructors used by the handle and by tests.
pub fn adsr_envelope() -> AmpEnvelope {
    AmpEnvelope::Adsr(Adsr::new())
}

pub fn fall_off_envelope() -> AmpEnvelope {
    AmpEnvelope::FallOff(FallOff::new())
}

//! Note sources for the song schedule.
//!
//! A part's notes can come from a written step grid or from a generator
//! rolling over a scale. Both answer the same question: which notes start
//! at this tick of the part.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use sonor_core::config::{GeneratorConfig, StepConfig};

/// One note start, relative to whichever grid the source covers.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteEvent {
    pub voice: String,
    pub note: u8,
    pub velocity: f32,
    /// Length in ticks.
    pub length: u32,
}

pub trait NoteSource {
    /// Notes starting at `tick`. Called once per tick in playback order, so
    /// stateful sources may advance as they answer.
    fn notes_at(&mut self, tick: u32) -> Vec<NoteEvent>;
}

/// Notes written out in the song file, indexed by tick.
pub struct ScriptedSteps {
    by_tick: HashMap<u32, Vec<NoteEvent>>,
}

impl ScriptedSteps {
    pub fn new(steps: &[StepConfig]) -> Self {
        let mut by_tick: HashMap<u32, Vec<NoteEvent>> = HashMap::new();
        for step in steps {
            by_tick.entry(step.tick).or_default().push(NoteEvent {
                voice: step.voice.clone(),
                note: step.note,
                velocity: step.velocity,
                length: step.length,
            });
        }
        Self { by_tick }
    }
}

impl NoteSource for ScriptedSteps {
    fn notes_at(&mut self, tick: u32) -> Vec<NoteEvent> {
        self.by_tick.get(&tick).cloned().unwrap_or_default()
    }
}

/// Picks one random note from a scale every `every` ticks. The RNG state
/// carries across repeats of the part, so each pass plays a fresh line.
pub struct RandomScale {
    voice: String,
    scale: Vec<u8>,
    every: u32,
    length: u32,
    velocity: f32,
    rng: StdRng,
}

impl RandomScale {
    pub fn new(config: &GeneratorConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Deterministic variant for reproducible renders.
    pub fn seeded(config: &GeneratorConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: &GeneratorConfig, rng: StdRng) -> Self {
        Self {
            voice: config.voice.clone(),
            scale: config.scale.clone(),
            every: config.every.max(1),
            length: config.length,
            velocity: config.velocity,
            rng,
        }
    }
}

impl NoteSource for RandomScale {
    fn notes_at(&mut self, tick: u32) -> Vec<NoteEvent> {
        if tick % self.every != 0 {
            return Vec::new();
        }
        let note = self.scale[self.rng.gen_range(0..self.scale.len())];
        vec![NoteEvent {
            voice: self.voice.clone(),
            note,
            velocity: self.velocity,
            length: self.length,
        }]
    }
}

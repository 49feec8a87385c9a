//! Synthesis engine.
//!
//! Split across two contexts:
//! - control side: [`EngineHandle`], [`ControlBus`], voice registration
//! - audio side: [`SynthEngine`], [`Mixer`], the voices themselves
//!
//! The two meet only through the lock-free command ring and the voices'
//! atomic parameters.

pub mod command;
pub mod control;
#[allow(clippy::module_inception)]
mod engine;
pub mod envelope;
pub mod gc;
pub mod handle;
pub mod mixer;
pub mod oscillator;
pub mod param;
pub mod voice;

pub use command::{command_channel, CommandSender, EngineCommand, COMMAND_QUEUE_CAPACITY};
pub use control::ControlBus;
pub use engine::{EngineAtomics, SynthEngine};
pub use envelope::{Adsr, AmpEnvelope, EnvelopeTimes, FallOff, Stage};
pub use handle::{EngineHandle, EngineError};
pub use mixer::Mixer;
pub use oscillator::{Generator, Oscillator, Waveform};
pub use param::Parameter;
pub use voice::{Voice, VoiceControls};

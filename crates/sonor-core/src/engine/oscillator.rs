//! Waveform generation.

use std::f32::consts::TAU;

use crate::types::Sample;

/// A source of samples at a settable frequency. The render path calls
/// `next_sample` once per output sample; implementations must not allocate
/// or block. `set_sample_rate` arrives when the device negotiates a rate
/// other than the one the generator was built with.
pub trait Generator: Send {
    fn set_frequency(&mut self, hz: f32);
    fn set_sample_rate(&mut self, sample_rate: f32);
    fn next_sample(&mut self) -> Sample;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    Square,
    Sawtooth,
    Triangle,
}

impl Waveform {
    /// Parse a waveform name from config. Case-insensitive; accepts the
    /// common short form "saw".
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "sine" => Some(Self::Sine),
            "square" => Some(Self::Square),
            "saw" | "sawtooth" => Some(Self::Sawtooth),
            "triangle" => Some(Self::Triangle),
            _ => None,
        }
    }
}

/// Phase-accumulator oscillator. The per-sample phase increment is cached and
/// only recomputed when the frequency actually changes.
#[derive(Debug)]
pub struct Oscillator {
    waveform: Waveform,
    sample_rate: f32,
    frequency: f32,
    phase: f32,
    phase_delta: f32,
}

impl Oscillator {
    pub fn new(waveform: Waveform, sample_rate: f32) -> Self {
        let mut osc = Self {
            waveform,
            sample_rate,
            frequency: 0.0,
            phase: 0.0,
            phase_delta: 0.0,
        };
        osc.set_frequency(440.0);
        osc
    }

    pub fn waveform(&self) -> Waveform {
        self.waveform
    }
}

impl Generator for Oscillator {
    fn set_frequency(&mut self, hz: f32) {
        if hz == self.frequency {
            return;
        }
        self.frequency = hz;
        self.phase_delta = TAU * hz / self.sample_rate;
    }

    fn set_sample_rate(&mut self, sample_rate: f32) {
        if sample_rate == self.sample_rate {
            return;
        }
        self.sample_rate = sample_rate;
        self.phase_delta = TAU * self.frequency / sample_rate;
    }

    fn next_sample(&mut self) -> Sample {
        // Normalized position in the cycle, [0, 1).
        let t = self.phase / TAU;
        let sample = match self.waveform {
            Waveform::Sine => self.phase.sin(),
            Waveform::Square => {
                if t < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            Waveform::Sawtooth => 2.0 * t - 1.0,
            Waveform::Triangle => 1.0 - 4.0 * (t - 0.5).abs(),
        };
        self.phase += self.phase_delta;
        if self.phase >= TAU {
            self.phase -= TAU;
        }
        sample
    }
}

//! Atomic control parameter.
//!
//! A `Parameter` is the only channel through which the control context talks
//! to a rendering voice: a named f32 cell stored as bits in an `AtomicU32`.
//! Stores clamp to the parameter's range and reject non-finite input; loads
//! are wait-free. Relaxed ordering is sufficient because each cell is an
//! independent value with no cross-parameter ordering requirement.

use std::sync::atomic::{AtomicU32, Ordering};

#[derive(Debug)]
pub struct Parameter {
    name: &'static str,
    bits: AtomicU32,
    min: f32,
    max: f32,
}

impl Parameter {
    pub fn new(name: &'static str, min: f32, max: f32, default: f32) -> Self {
        let initial = default.clamp(min, max);
        Self {
            name,
            bits: AtomicU32::new(initial.to_bits()),
            min,
            max,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn min(&self) -> f32 {
        self.min
    }

    pub fn max(&self) -> f32 {
        self.max
    }

    /// Store a new value, clamped to the parameter range. NaN and infinite
    /// values are dropped so a bad control message can never poison the
    /// render path.
    pub fn set(&self, value: f32) {
        if !value.is_finite() {
            log::warn!("ignoring non-finite value for parameter '{}'", self.name);
            return;
        }
        let clamped = value.clamp(self.min, self.max);
        self.bits.store(clamped.to_bits(), Ordering::Relaxed);
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

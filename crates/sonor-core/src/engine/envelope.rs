//! Amplitude envelopes.
//!
//! Two shapes: a gate-driven ADSR state machine and a simpler fall-off ramp
//! that decays from full level whenever the gate is released. Slopes are
//! derived once per render call from the voice's current timing parameters,
//! then applied per sample.

/// Envelope timing constants, loaded from the voice's atomic parameters at
/// the start of each render call. Times in seconds except where noted.
#[derive(Debug, Clone, Copy)]
pub struct EnvelopeTimes {
    pub attack: f32,
    pub decay: f32,
    pub sustain: f32,
    pub release: f32,
    pub fall_off_ms: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

/// Per-block slopes, units of level per sample.
#[derive(Debug, Clone, Copy)]
pub struct AdsrRates {
    attack_rate: f32,
    decay_rate: f32,
    sustain: f32,
}

/// Gate-driven ADSR.
///
/// Retriggering while audible restarts the attack from the current level, and
/// release always ramps from the current level, so stage changes never step
/// the output discontinuously.
#[derive(Debug)]
pub struct Adsr {
    stage: Stage,
    level: f32,
    release_rate: f32,
}

impl Adsr {
    pub fn new() -> Self {
        Self {
            stage: Stage::Idle,
            level: 0.0,
            release_rate: 0.0,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn is_idle(&self) -> bool {
        self.stage == Stage::Idle
    }

    /// Apply gate transitions and compute this block's slopes. `retrigger`
    /// is the edge signal: a fresh note start observed since the previous
    /// block forces Attack from the current level even if the gate never
    /// read as closed in between.
    pub fn begin_block(
        &mut self,
        gate_on: bool,
        retrigger: bool,
        times: &EnvelopeTimes,
        sample_rate: f32,
    ) -> AdsrRates {
        if retrigger && gate_on {
            self.stage = Stage::Attack;
        } else {
            match (gate_on, self.stage) {
                (true, Stage::Idle) | (true, Stage::Release) => {
                    // Restart from wherever the level currently sits.
                    self.stage = Stage::Attack;
                }
                (false, Stage::Attack) | (false, Stage::Decay) | (false, Stage::Sustain) => {
                    self.stage = Stage::Release;
                    // Ramp from the current level over the full release time
                    // so an early release is no steeper than a late one.
                    let release_samples = times.release * sample_rate;
                    self.release_rate = if release_samples > 0.0 {
                        self.level / release_samples
                    } else {
                        1.0
                    };
                }
                _ => {}
            }
        }

        let attack_samples = times.attack * sample_rate;
        let decay_samples = times.decay * sample_rate;
        AdsrRates {
            attack_rate: if attack_samples > 0.0 {
                1.0 / attack_samples
            } else {
                1.0
            },
            decay_rate: if decay_samples > 0.0 {
                (1.0 - times.sustain) / decay_samples
            } else {
                1.0
            },
            sustain: times.sustain,
        }
    }

    /// Advance one sample and return the level to apply.
    pub fn next(&mut self, rates: &AdsrRates) -> f32 {
        match self.stage {
            Stage::Idle => {}
            Stage::Attack => {
                self.level += rates.attack_rate;
                if self.level >= 1.0 {
                    self.level = 1.0;
                    self.stage = Stage::Decay;
                }
            }
            Stage::Decay => {
                self.level -= rates.decay_rate;
                if self.level <= rates.sustain {
                    self.level = rates.sustain;
                    self.stage = Stage::Sustain;
                }
            }
            Stage::Sustain => {
                self.level = rates.sustain;
            }
            Stage::Release => {
                self.level -= self.release_rate;
                if self.level <= 0.0 {
                    self.level = 0.0;
                    self.stage = Stage::Idle;
                }
            }
        }
        self.level
    }
}

impl Default for Adsr {
    fn default() -> Self {
        Self::new()
    }
}

/// Linear fall-off: full level while the gate holds, then a straight ramp to
/// zero over `fall_off_ms`.
#[derive(Debug)]
pub struct FallOff {
    level: f32,
    gate_held: bool,
}

impl FallOff {
    pub fn new() -> Self {
        Self {
            level: 0.0,
            gate_held: false,
        }
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn is_idle(&self) -> bool {
        !self.gate_held && self.level <= 0.0
    }

    /// Returns the per-sample decrement for this block.
    pub fn begin_block(&mut self, gate_on: bool, times: &EnvelopeTimes, sample_rate: f32) -> f32 {
        if gate_on {
            self.gate_held = true;
            self.level = 1.0;
        } else {
            self.gate_held = false;
        }
        let fall_samples = times.fall_off_ms / 1000.0 * sample_rate;
        if fall_samples > 0.0 {
            1.0 / fall_samples
        } else {
            1.0
        }
    }

    pub fn next(&mut self, fall_rate: f32) -> f32 {
        if !self.gate_held && self.level > 0.0 {
            self.level = (self.level - fall_rate).max(0.0);
        }
        self.level
    }
}

impl Default for FallOff {
    fn default() -> Self {
        Self::new()
    }
}

/// The envelope a voice carries, chosen by its patch.
#[derive(Debug)]
pub enum AmpEnvelope {
    Adsr(Adsr),
    FallOff(FallOff),
}

impl AmpEnvelope {
    pub fn is_idle(&self) -> bool {
        match self {
            Self::Adsr(e) => e.is_idle(),
            Self::FallOff(e) => e.is_idle(),
        }
    }

    pub fn level(&self) -> f32 {
        match self {
            Self::Adsr(e) => e.level(),
            Self::FallOff(e) => e.level(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 48000.0;

    fn times(attack: f32, decay: f32, sustain: f32, release: f32) -> EnvelopeTimes {
        EnvelopeTimes {
            attack,
            decay,
            sustain,
            release,
            fall_off_ms: 1000.0,
        }
    }

    fn run(env: &mut Adsr, gate: bool, t: &EnvelopeTimes, n: usize) -> Vec<f32> {
        let rates = env.begin_block(gate, false, t, SR);
        (0..n).map(|_| env.next(&rates)).collect()
    }

    #[test]
    fn full_cycle_reaches_sustain_and_returns_to_idle() {
        let t = times(0.01, 0.01, 0.6, 0.01);
        let mut env = Adsr::new();

        // 0.01 s at 48 kHz is 480 samples per stage.
        let out = run(&mut env, true, &t, 2000);
        assert_eq!(env.stage(), Stage::Sustain);
        assert!((out[1999] - 0.6).abs() < 1e-4);
        // Attack peaked at 1.0 before decaying.
        assert!(out.iter().cloned().fold(f32::MIN, f32::max) >= 0.999);

        let out = run(&mut env, false, &t, 2000);
        assert_eq!(env.stage(), Stage::Idle);
        assert_eq!(out[1999], 0.0);
    }

    #[test]
    fn release_ramps_from_current_level() {
        let t = times(1.0, 0.1, 0.5, 0.1);
        let mut env = Adsr::new();

        // Long attack: release while still climbing.
        run(&mut env, true, &t, 4800);
        let level_at_release = env.level();
        assert!(level_at_release < 0.2, "attack should still be early");

        let rates = env.begin_block(false, false, &t, SR);
        let first = env.next(&rates);
        // No discontinuity: the first release sample is within one step of
        // the level at release time.
        assert!((level_at_release - first).abs() < level_at_release / (0.1 * SR) + 1e-6);
        assert_eq!(env.stage(), Stage::Release);
    }

    #[test]
    fn retrigger_during_release_restarts_attack_from_current_level() {
        let t = times(0.01, 0.01, 0.8, 0.5);
        let mut env = Adsr::new();
        run(&mut env, true, &t, 2000);
        run(&mut env, false, &t, 1000);
        let mid_release = env.level();
        assert!(mid_release > 0.0 && mid_release < 0.8);

        let rates = env.begin_block(true, false, &t, SR);
        assert_eq!(env.stage(), Stage::Attack);
        let first = env.next(&rates);
        assert!(first >= mid_release);
        // Climbs by exactly one attack step, no jump back to zero.
        assert!(first - mid_release < 1.0 / (0.01 * SR) + 1e-6);
    }

    #[test]
    fn gate_off_while_idle_is_a_no_op() {
        let t = times(0.01, 0.01, 0.5, 0.01);
        let mut env = Adsr::new();
        let out = run(&mut env, false, &t, 100);
        assert_eq!(env.stage(), Stage::Idle);
        assert!(out.iter().all(|&l| l == 0.0));
    }

    #[test]
    fn zero_attack_jumps_within_one_sample() {
        let t = times(0.0, 0.01, 0.5, 0.01);
        let mut env = Adsr::new();
        let rates = env.begin_block(true, false, &t, SR);
        let first = env.next(&rates);
        assert_eq!(first, 1.0);
    }

    #[test]
    fn retrigger_edge_restarts_attack_from_sustain() {
        let t = times(0.01, 0.01, 0.3, 0.2);
        let mut env = Adsr::new();
        run(&mut env, true, &t, 2000);
        assert_eq!(env.stage(), Stage::Sustain);

        // Gate reads on both before and after the re-strike; only the edge
        // signal distinguishes it from a held note.
        let rates = env.begin_block(true, true, &t, SR);
        assert_eq!(env.stage(), Stage::Attack);
        let first = env.next(&rates);
        assert!(first >= 0.3);
        assert!(first - 0.3 < 1.0 / (0.01 * SR) + 1e-6);
        // And it climbs back to full level.
        for _ in 0..2000 {
            env.next(&rates);
        }
        assert!(env.level() >= 0.3);
        assert_eq!(env.stage(), Stage::Sustain);
    }

    #[test]
    fn levels_never_leave_unit_range() {
        let t = times(0.001, 0.002, 0.3, 0.001);
        let mut env = Adsr::new();
        for gate in [true, false, true, true, false] {
            for level in run(&mut env, gate, &t, 300) {
                assert!((0.0..=1.0).contains(&level));
            }
        }
    }

    #[test]
    fn fall_off_decays_linearly_to_zero() {
        let mut env = FallOff::new();
        let t = EnvelopeTimes {
            attack: 0.0,
            decay: 0.0,
            sustain: 0.0,
            release: 0.0,
            fall_off_ms: 1000.0,
        };

        let rate = env.begin_block(true, &t, SR);
        assert_eq!(env.next(rate), 1.0);

        // 1000 ms at 48 kHz: monotone ramp, gone by 48000 samples.
        let rate = env.begin_block(false, &t, SR);
        let mut prev = 1.0;
        for _ in 0..47000 {
            let l = env.next(rate);
            assert!(l <= prev);
            prev = l;
        }
        assert!(prev > 0.0);
        for _ in 0..2000 {
            env.next(rate);
        }
        assert!(env.is_idle());
        assert_eq!(env.level(), 0.0);
    }

    #[test]
    fn fall_off_holds_full_level_while_gated() {
        let mut env = FallOff::new();
        let t = EnvelopeTimes {
            attack: 0.0,
            decay: 0.0,
            sustain: 0.0,
            release: 0.0,
            fall_off_ms: 10.0,
        };
        let rate = env.begin_block(true, &t, SR);
        for _ in 0..1000 {
            assert_eq!(env.next(rate), 1.0);
        }
    }
}

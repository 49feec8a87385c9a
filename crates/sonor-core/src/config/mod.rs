//! Patch and song configuration.
//!
//! Everything arriving from YAML is validated here, on the control side,
//! before a voice is ever built from it. A bad file is a `ConfigError`; the
//! audio thread never sees invalid data.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::oscillator::Waveform;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unknown waveform '{0}'")]
    UnknownWaveform(String),

    #[error("invalid envelope: {0}")]
    InvalidEnvelope(String),

    #[error("invalid cutoff {0} Hz, expected 20..=20000")]
    InvalidCutoff(f32),

    #[error("invalid tempo {0} bpm")]
    InvalidBpm(f32),

    #[error("invalid division {0}, expected a positive power of two")]
    InvalidDivision(u32),

    #[error("step {step} references unknown voice '{voice}'")]
    UnknownStepVoice { step: usize, voice: String },

    #[error("order references unknown part '{0}'")]
    UnknownPart(String),

    #[error("invalid part '{part}': {reason}")]
    InvalidPart { part: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Parse(#[from] serde_yaml::Error),
}

/// Envelope shape and timing for a patch. Times in seconds except
/// `fall_off_ms`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EnvelopeConfig {
    Adsr {
        attack: f32,
        decay: f32,
        sustain: f32,
        release: f32,
    },
    FallOff {
        fall_off_ms: f32,
    },
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self::Adsr {
            attack: 0.01,
            decay: 0.1,
            sustain: 0.8,
            release: 0.2,
        }
    }
}

/// One voice's sound definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchConfig {
    pub waveform: String,

    #[serde(default)]
    pub envelope: EnvelopeConfig,

    /// Low-pass cutoff in Hz. None means no filter.
    #[serde(default)]
    pub cutoff_hz: Option<f32>,
}

impl PatchConfig {
    pub fn new(waveform: &str) -> Self {
        Self {
            waveform: waveform.to_string(),
            envelope: EnvelopeConfig::default(),
            cutoff_hz: None,
        }
    }

    pub fn waveform(&self) -> Result<Waveform, ConfigError> {
        Waveform::from_name(&self.waveform)
            .ok_or_else(|| ConfigError::UnknownWaveform(self.waveform.clone()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.waveform()?;
        match &self.envelope {
            EnvelopeConfig::Adsr {
                attack,
                decay,
                sustain,
                release,
            } => {
                for (name, value) in [("attack", attack), ("decay", decay), ("release", release)] {
                    if !value.is_finite() || *value < 0.0 {
                        return Err(ConfigError::InvalidEnvelope(format!("{name} = {value}")));
                    }
                }
                if !sustain.is_finite() || !(0.0..=1.0).contains(sustain) {
                    return Err(ConfigError::InvalidEnvelope(format!("sustain = {sustain}")));
                }
            }
            EnvelopeConfig::FallOff { fall_off_ms } => {
                if !fall_off_ms.is_finite() || *fall_off_ms <= 0.0 {
                    return Err(ConfigError::InvalidEnvelope(format!(
                        "fall_off_ms = {fall_off_ms}"
                    )));
                }
            }
        }
        if let Some(cutoff) = self.cutoff_hz {
            if !cutoff.is_finite() || !(20.0..=20000.0).contains(&cutoff) {
                return Err(ConfigError::InvalidCutoff(cutoff));
            }
        }
        Ok(())
    }
}

/// One scheduled note event, placed on the song's tick grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    /// Tick index from song start.
    pub tick: u32,
    /// Name of the voice that plays this step.
    pub voice: String,
    /// MIDI note number.
    pub note: u8,
    #[serde(default = "default_velocity")]
    pub velocity: f32,
    /// Note length in ticks.
    #[serde(default = "default_length")]
    pub length: u32,
}

fn default_velocity() -> f32 {
    1.0
}

fn default_length() -> u32 {
    1
}

/// Routing entry: one named control feeding a voice parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    pub control: String,
    pub voice: String,
    pub param: String,
}

/// A control value change scheduled on the tick grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationConfig {
    pub tick: u32,
    pub control: String,
    pub value: f32,
}

/// A generative note source attached to a part: every `every` ticks it
/// plays one note picked at random from `scale` on the named voice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    pub voice: String,
    /// MIDI notes the generator picks from.
    pub scale: Vec<u8>,
    /// Ticks between generated notes.
    #[serde(default = "default_every")]
    pub every: u32,
    /// Note length in ticks.
    #[serde(default = "default_length")]
    pub length: u32,
    #[serde(default = "default_velocity")]
    pub velocity: f32,
}

fn default_every() -> u32 {
    1
}

/// A named section of the song. Step and automation ticks are relative to
/// the part's own start; the part plays `repeat` times before the song
/// moves on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartConfig {
    pub name: String,
    /// Part length in ticks.
    pub length: u32,
    #[serde(default = "default_repeat")]
    pub repeat: u32,
    #[serde(default)]
    pub steps: Vec<StepConfig>,
    #[serde(default)]
    pub automation: Vec<AutomationConfig>,
    #[serde(default)]
    pub generators: Vec<GeneratorConfig>,
}

fn default_repeat() -> u32 {
    1
}

/// One pass over one part, placed on the song's absolute tick grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartSpan {
    /// Index into [`SongConfig::parts`].
    pub part: usize,
    pub start_tick: u32,
}

/// A complete song: ensemble, note grid, and control routing. Notes can be
/// written flat on the absolute grid (`steps`) or grouped into named parts
/// arranged by `order`; the two layers compose.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SongConfig {
    pub bpm: f32,

    /// Ticks per quarter note, expressed as a note division (4 = quarter,
    /// 8 = eighth, 16 = sixteenth).
    #[serde(default = "default_division")]
    pub division: u32,

    pub voices: HashMap<String, PatchConfig>,

    #[serde(default)]
    pub steps: Vec<StepConfig>,

    #[serde(default)]
    pub parts: Vec<PartConfig>,

    /// Part names in play order. Empty means declaration order.
    #[serde(default)]
    pub order: Vec<String>,

    #[serde(default)]
    pub links: Vec<LinkConfig>,

    #[serde(default)]
    pub automation: Vec<AutomationConfig>,
}

fn default_division() -> u32 {
    16
}

impl SongConfig {
    /// Seconds between ticks at this song's tempo.
    pub fn tick_interval_secs(&self) -> f32 {
        60.0 / self.bpm / (self.division as f32 / 4.0)
    }

    /// Resolve the part arrangement into absolute spans: each entry in
    /// `order` (or each part in declaration order) contributes `repeat`
    /// consecutive passes. Call after `validate`; unknown order names are
    /// skipped here.
    pub fn timeline(&self) -> Vec<PartSpan> {
        let indices: Vec<usize> = if self.order.is_empty() {
            (0..self.parts.len()).collect()
        } else {
            self.order
                .iter()
                .filter_map(|name| self.parts.iter().position(|p| &p.name == name))
                .collect()
        };

        let mut spans = Vec::new();
        let mut tick = 0;
        for part in indices {
            for _ in 0..self.parts[part].repeat {
                spans.push(PartSpan {
                    part,
                    start_tick: tick,
                });
                tick += self.parts[part].length;
            }
        }
        spans
    }

    /// Last tick any step, part, or automation event touches.
    pub fn end_tick(&self) -> u32 {
        let step_end = self
            .steps
            .iter()
            .map(|s| s.tick + s.length)
            .max()
            .unwrap_or(0);
        let auto_end = self.automation.iter().map(|a| a.tick).max().unwrap_or(0);
        let parts_end = self
            .timeline()
            .last()
            .map(|span| span.start_tick + self.parts[span.part].length)
            .unwrap_or(0);
        step_end.max(auto_end).max(parts_end)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.bpm.is_finite() || self.bpm <= 0.0 {
            return Err(ConfigError::InvalidBpm(self.bpm));
        }
        if self.division == 0 || !self.division.is_power_of_two() {
            return Err(ConfigError::InvalidDivision(self.division));
        }
        for patch in self.voices.values() {
            patch.validate()?;
        }
        for (i, step) in self.steps.iter().enumerate() {
            if !self.voices.contains_key(&step.voice) {
                return Err(ConfigError::UnknownStepVoice {
                    step: i,
                    voice: step.voice.clone(),
                });
            }
        }
        for part in &self.parts {
            self.validate_part(part)?;
        }
        for name in &self.order {
            if !self.parts.iter().any(|p| &p.name == name) {
                return Err(ConfigError::UnknownPart(name.clone()));
            }
        }
        Ok(())
    }

    fn validate_part(&self, part: &PartConfig) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidPart {
            part: part.name.clone(),
            reason,
        };
        if part.length == 0 {
            return Err(invalid("length must be at least one tick".to_string()));
        }
        if part.repeat == 0 {
            return Err(invalid("repeat must be at least one".to_string()));
        }
        if self.parts.iter().filter(|p| p.name == part.name).count() > 1 {
            return Err(invalid("duplicate part name".to_string()));
        }
        for step in &part.steps {
            if !self.voices.contains_key(&step.voice) {
                return Err(invalid(format!("step references unknown voice '{}'", step.voice)));
            }
            if step.tick >= part.length {
                return Err(invalid(format!(
                    "step at tick {} falls outside the part's {} ticks",
                    step.tick, part.length
                )));
            }
        }
        for generator in &part.generators {
            if !self.voices.contains_key(&generator.voice) {
                return Err(invalid(format!(
                    "generator references unknown voice '{}'",
                    generator.voice
                )));
            }
            if generator.scale.is_empty() {
                return Err(invalid("generator scale is empty".to_string()));
            }
            if generator.every == 0 {
                return Err(invalid("generator interval must be at least one tick".to_string()));
            }
        }
        Ok(())
    }
}

pub fn load_song(path: &Path) -> Result<SongConfig, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    let song: SongConfig = serde_yaml::from_str(&text)?;
    song.validate()?;
    Ok(song)
}

pub fn load_patch(path: &Path) -> Result<PatchConfig, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    let patch: PatchConfig = serde_yaml::from_str(&text)?;
    patch.validate()?;
    Ok(patch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_patch_validates() {
        assert!(PatchConfig::new("sine").validate().is_ok());
    }

    #[test]
    fn unknown_waveform_is_rejected() {
        let patch = PatchConfig::new("wobble");
        assert!(matches!(
            patch.validate(),
            Err(ConfigError::UnknownWaveform(_))
        ));
    }

    #[test]
    fn sustain_outside_unit_range_is_rejected() {
        let mut patch = PatchConfig::new("square");
        patch.envelope = EnvelopeConfig::Adsr {
            attack: 0.01,
            decay: 0.1,
            sustain: 1.5,
            release: 0.2,
        };
        assert!(matches!(
            patch.validate(),
            Err(ConfigError::InvalidEnvelope(_))
        ));
    }

    #[test]
    fn cutoff_out_of_range_is_rejected() {
        let mut patch = PatchConfig::new("saw");
        patch.cutoff_hz = Some(5.0);
        assert!(matches!(patch.validate(), Err(ConfigError::InvalidCutoff(_))));
    }

    #[test]
    fn song_yaml_round_trip() {
        let yaml = r#"
bpm: 120
division: 16
voices:
  lead:
    waveform: square
    envelope:
      type: adsr
      attack: 0.01
      decay: 0.05
      sustain: 0.7
      release: 0.1
    cutoff_hz: 4000
  bass:
    waveform: sine
    envelope:
      type: fall_off
      fall_off_ms: 500
steps:
  - { tick: 0, voice: lead, note: 60, velocity: 0.8, length: 4 }
  - { tick: 4, voice: bass, note: 36 }
links:
  - { control: intensity, voice: lead, param: velocity }
automation:
  - { tick: 8, control: intensity, value: 0.5 }
"#;
        let song: SongConfig = serde_yaml::from_str(yaml).unwrap();
        song.validate().unwrap();
        assert_eq!(song.voices.len(), 2);
        assert_eq!(song.steps[1].velocity, 1.0);
        assert_eq!(song.steps[1].length, 1);
        assert_eq!(song.end_tick(), 8);
    }

    #[test]
    fn tick_interval_matches_tempo() {
        let song: SongConfig = serde_yaml::from_str(
            "bpm: 120\ndivision: 16\nvoices: {}\n",
        )
        .unwrap();
        // 120 bpm sixteenths: 0.125 s per tick.
        assert!((song.tick_interval_secs() - 0.125).abs() < 1e-6);
    }

    #[test]
    fn step_naming_missing_voice_is_rejected() {
        let song: SongConfig = serde_yaml::from_str(
            r#"
bpm: 100
voices:
  lead: { waveform: sine }
steps:
  - { tick: 0, voice: ghost, note: 60 }
"#,
        )
        .unwrap();
        assert!(matches!(
            song.validate(),
            Err(ConfigError::UnknownStepVoice { step: 0, .. })
        ));
    }

    #[test]
    fn parts_arrange_into_absolute_spans() {
        let song: SongConfig = serde_yaml::from_str(
            r#"
bpm: 110
voices:
  lead: { waveform: square }
parts:
  - name: verse
    length: 8
    repeat: 2
    steps:
      - { tick: 0, voice: lead, note: 60 }
  - name: chorus
    length: 4
    steps:
      - { tick: 2, voice: lead, note: 67 }
order: [verse, chorus, verse]
"#,
        )
        .unwrap();
        song.validate().unwrap();

        let spans = song.timeline();
        // verse twice, chorus once, verse twice again.
        assert_eq!(spans.len(), 5);
        assert_eq!(spans[0], PartSpan { part: 0, start_tick: 0 });
        assert_eq!(spans[1], PartSpan { part: 0, start_tick: 8 });
        assert_eq!(spans[2], PartSpan { part: 1, start_tick: 16 });
        assert_eq!(spans[3], PartSpan { part: 0, start_tick: 20 });
        assert_eq!(spans[4], PartSpan { part: 0, start_tick: 28 });
        assert_eq!(song.end_tick(), 36);
    }

    #[test]
    fn omitted_order_plays_parts_as_declared() {
        let song: SongConfig = serde_yaml::from_str(
            r#"
bpm: 100
voices:
  lead: { waveform: sine }
parts:
  - { name: a, length: 4 }
  - { name: b, length: 2 }
"#,
        )
        .unwrap();
        song.validate().unwrap();
        let spans = song.timeline();
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[1], PartSpan { part: 1, start_tick: 4 });
    }

    #[test]
    fn order_naming_missing_part_is_rejected() {
        let song: SongConfig = serde_yaml::from_str(
            r#"
bpm: 100
voices: {}
parts:
  - { name: verse, length: 4 }
order: [verse, bridge]
"#,
        )
        .unwrap();
        assert!(matches!(song.validate(), Err(ConfigError::UnknownPart(p)) if p == "bridge"));
    }

    #[test]
    fn part_step_outside_its_length_is_rejected() {
        let song: SongConfig = serde_yaml::from_str(
            r#"
bpm: 100
voices:
  lead: { waveform: sine }
parts:
  - name: verse
    length: 4
    steps:
      - { tick: 4, voice: lead, note: 60 }
"#,
        )
        .unwrap();
        assert!(matches!(song.validate(), Err(ConfigError::InvalidPart { .. })));
    }

    #[test]
    fn generator_with_empty_scale_is_rejected() {
        let song: SongConfig = serde_yaml::from_str(
            r#"
bpm: 100
voices:
  lead: { waveform: sine }
parts:
  - name: verse
    length: 4
    generators:
      - { voice: lead, scale: [] }
"#,
        )
        .unwrap();
        assert!(matches!(song.validate(), Err(ConfigError::InvalidPart { .. })));
    }

    #[test]
    fn generator_defaults_fill_in() {
        let generator: GeneratorConfig =
            serde_yaml::from_str("{ voice: lead, scale: [60, 62, 64] }").unwrap();
        assert_eq!(generator.every, 1);
        assert_eq!(generator.length, 1);
        assert_eq!(generator.velocity, 1.0);
    }

    #[test]
    fn zero_bpm_is_rejected() {
        let song: SongConfig =
            serde_yaml::from_str("bpm: 0\nvoices: {}\n").unwrap();
        assert!(matches!(song.validate(), Err(ConfigError::InvalidBpm(_))));
    }
}

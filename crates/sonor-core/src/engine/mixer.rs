//! Voice summation.

use basedrop::Owned;

use crate::engine::voice::Voice;
use crate::types::{Sample, VoiceId, MAX_VOICES};

/// Owns the registered voices and sums them into the output buffer.
///
/// The voice list is pre-allocated to [`MAX_VOICES`]; add and remove never
/// allocate, and removed voices are `Owned` so dropping them on the audio
/// thread defers the deallocation to the GC thread.
pub struct Mixer {
    voices: Vec<Owned<Voice>>,
}

impl Mixer {
    pub fn new() -> Self {
        Self {
            voices: Vec::with_capacity(MAX_VOICES),
        }
    }

    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }

    /// Append a voice. Returns the voice back when the mixer is full so the
    /// caller can drop it through the collector.
    pub fn add_voice(&mut self, voice: Owned<Voice>) -> Result<(), Owned<Voice>> {
        if self.voices.len() >= MAX_VOICES {
            return Err(voice);
        }
        self.voices.push(voice);
        Ok(())
    }

    /// Drop the voice with the given id, if present. Later voices keep their
    /// relative order.
    pub fn remove_voice(&mut self, id: VoiceId) {
        self.voices.retain(|v| v.id() != id);
    }

    pub fn clear(&mut self) {
        self.voices.clear();
    }

    /// Zero-fill the buffer, then let each voice accumulate its block in
    /// registration order. Pure summation; no limiting or normalization.
    /// `sample_rate` is the device rate and reaches every voice.
    pub fn render(&mut self, buffer: &mut [Sample], sample_rate: f32) {
        buffer.fill(0.0);
        for voice in &mut self.voices {
            voice.render(buffer, sample_rate);
        }
    }
}

impl Default for Mixer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::gc::gc_handle;
    use crate::engine::oscillator::{Oscillator, Waveform};
    use crate::engine::voice::{adsr_envelope, VoiceControls};
    use std::sync::Arc;

    const SR: f32 = 48000.0;

    fn make_voice(id: u64, hz: f32) -> (Owned<Voice>, Arc<VoiceControls>) {
        let controls = Arc::new(VoiceControls::new());
        let voice = Voice::new(
            VoiceId(id),
            Arc::clone(&controls),
            Box::new(Oscillator::new(Waveform::Sine, SR)),
            adsr_envelope(),
            false,
            SR,
        );
        (Owned::new(&gc_handle(), voice), controls)
    }

    #[test]
    fn empty_mixer_outputs_silence() {
        let mut mixer = Mixer::new();
        let mut buf = vec![0.7f32; 256];
        mixer.render(&mut buf, SR);
        assert!(buf.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn mix_is_the_sum_of_solo_renders() {
        let mut mixer = Mixer::new();
        let (v1, c1) = make_voice(1, 220.0);
        let (v2, c2) = make_voice(2, 330.0);
        c1.note_on(220.0, 0.5);
        c2.note_on(330.0, 0.5);
        mixer.add_voice(v1).ok().unwrap();
        mixer.add_voice(v2).ok().unwrap();

        let mut mixed = vec![0.0f32; 512];
        mixer.render(&mut mixed, SR);

        // Fresh voices with identical state, rendered separately.
        let (s1, d1) = make_voice(3, 220.0);
        let (s2, d2) = make_voice(4, 330.0);
        d1.note_on(220.0, 0.5);
        d2.note_on(330.0, 0.5);
        let mut solo = Mixer::new();
        solo.add_voice(s1).ok().unwrap();
        let mut a = vec![0.0f32; 512];
        solo.render(&mut a, SR);
        solo.clear();
        solo.add_voice(s2).ok().unwrap();
        let mut b = vec![0.0f32; 512];
        solo.render(&mut b, SR);

        for i in 0..512 {
            assert!((mixed[i] - (a[i] + b[i])).abs() < 1e-6);
        }
    }

    #[test]
    fn add_beyond_capacity_hands_the_voice_back() {
        let mut mixer = Mixer::new();
        for i in 0..MAX_VOICES as u64 {
            let (v, _) = make_voice(i, 440.0);
            assert!(mixer.add_voice(v).is_ok());
        }
        let (extra, _) = make_voice(999, 440.0);
        assert!(mixer.add_voice(extra).is_err());
        assert_eq!(mixer.voice_count(), MAX_VOICES);
    }

    #[test]
    fn remove_keeps_remaining_order() {
        let mut mixer = Mixer::new();
        for i in 0..3 {
            let (v, _) = make_voice(i, 440.0);
            mixer.add_voice(v).ok().unwrap();
        }
        mixer.remove_voice(VoiceId(1));
        assert_eq!(mixer.voice_count(), 2);
        assert_eq!(mixer.voices[0].id(), VoiceId(0));
        assert_eq!(mixer.voices[1].id(), VoiceId(2));
    }

    #[test]
    fn remove_unknown_id_is_a_no_op() {
        let mut mixer = Mixer::new();
        let (v, _) = make_voice(1, 440.0);
        mixer.add_voice(v).ok().unwrap();
        mixer.remove_voice(VoiceId(42));
        assert_eq!(mixer.voice_count(), 1);
    }
}

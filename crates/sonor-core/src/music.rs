//! Musical math helpers.

/// Convert a MIDI note number to its frequency in Hz, equal temperament with
/// A4 (note 69) at 440 Hz.
pub fn midi_to_hz(note: u8) -> f32 {
    440.0 * 2f32.powf((note as f32 - 69.0) / 12.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a4_is_440() {
        assert!((midi_to_hz(69) - 440.0).abs() < 1e-3);
    }

    #[test]
    fn octaves_double() {
        assert!((midi_to_hz(81) - 880.0).abs() < 1e-2);
        assert!((midi_to_hz(57) - 220.0).abs() < 1e-2);
    }

    #[test]
    fn middle_c() {
        assert!((midi_to_hz(60) - 261.6256).abs() < 1e-2);
    }
}

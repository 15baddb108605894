//! # Musical Tuning Module
//!
//! Equal temperament conversions between MIDI note numbers, frequencies and
//! note names, referenced to MIDI note 69 = A4 = 440 Hz.
//!
//! ## Features
//! - Precomputed frequency table for all 128 MIDI notes
//! - Frequency to nearest MIDI note conversion
//! - Note names for log output (e.g. "C#3")
//! - Cent deviation between a sung pitch and a target

use once_cell::sync::Lazy;

/// Reference pitch of MIDI note 69 (A4) in Hz.
pub const A4_FREQUENCY: f64 = 440.0;

/// MIDI note number of A4.
pub const A4_MIDI: u8 = 69;

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Statically computed frequencies for every MIDI note (0-127).
///
/// The formula is f = 440 * 2^((n - 69) / 12). It is computed once on first
/// use because the melody loader converts every note-on through it.
static MIDI_FREQUENCIES: Lazy<[f64; 128]> = Lazy::new(|| {
    let mut table = [0.0; 128];
    for (note, freq) in table.iter_mut().enumerate() {
        *freq = A4_FREQUENCY * 2.0_f64.powf((note as f64 - A4_MIDI as f64) / 12.0);
    }
    table
});

/// Frequency in Hz of a MIDI note number.
///
/// Values above 127 are clamped to 127; MIDI data bytes never exceed it.
pub fn midi_to_frequency(note: u8) -> f64 {
    MIDI_FREQUENCIES[note.min(127) as usize]
}

/// Nearest MIDI note number to a frequency, or `None` for non-positive input.
pub fn frequency_to_midi(freq: f64) -> Option<u8> {
    if !(freq > 0.0) || !freq.is_finite() {
        return None;
    }
    let note = A4_MIDI as f64 + 12.0 * (freq / A4_FREQUENCY).log2();
    Some(note.round().clamp(0.0, 127.0) as u8)
}

/// Scientific pitch name of a MIDI note, where note 60 is "C4".
pub fn note_name(note: u8) -> String {
    let octave = note as i32 / 12 - 1;
    format!("{}{}", NOTE_NAMES[note as usize % 12], octave)
}

/// Name of the note closest to a frequency, e.g. `"A4"` for 442 Hz.
pub fn nearest_note_name(freq: f64) -> Option<String> {
    frequency_to_midi(freq).map(note_name)
}

/// Calculates the deviation from a target frequency in cents.
///
/// Positive values are sharp, negative flat; 100 cents is one semitone.
pub fn calculate_cents_deviation(freq: f64, target_freq: f64) -> f64 {
    1200.0 * (freq / target_freq).log2()
}

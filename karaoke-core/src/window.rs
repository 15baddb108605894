//! Visible-window selection over the note timeline.
//!
//! A pure filter recomputed on every tick. Melodies are small enough that a
//! linear scan is cheaper than keeping an interval index up to date.

use crate::timeline::Note;
use serde::Serialize;

/// Notes overlapping `(elapsed - half_window, elapsed + half_window)`.
///
/// Both bounds are strict: a note ending exactly at `elapsed - half_window`
/// has already scrolled out, and one starting exactly at
/// `elapsed + half_window` has not yet scrolled in.
///
/// # Arguments
/// * `notes` - The melody timeline
/// * `elapsed` - Current session time in seconds
/// * `half_window` - Seconds of history shown behind `elapsed`
///
/// # Returns
/// References to the overlapping notes, in timeline order.
pub fn visible_notes(notes: &[Note], elapsed: f64, half_window: f64) -> Vec<&Note> {
    notes
        .iter()
        .filter(|note| note.end_time > elapsed - half_window && note.start_time < elapsed + half_window)
        .collect()
}

/// A note expressed relative to the current elapsed time, ready to draw.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelativeNote {
    pub start: f64,
    pub end: f64,
    pub frequency: f64,
    pub midi_note: u8,
    /// The live pitch is within tolerance of this note right now.
    pub matching: bool,
}

impl RelativeNote {
    pub fn from_note(note: &Note, elapsed: f64, matching: bool) -> Self {
        Self {
            start: note.start_time - elapsed,
            end: note.end_time - elapsed,
            frequency: note.frequency,
            midi_note: note.midi_note,
            matching,
        }
    }
}

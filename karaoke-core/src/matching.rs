//! # Match Progress Tracking
//!
//! Records, per target note, the continuous stretches of time during which
//! the sung pitch stayed within tolerance of the note's frequency.
//!
//! Every tick either extends the stretch that was still open on the previous
//! tick or starts a new one. A drop out of tolerance followed by a recovery
//! therefore shows up as two separate intervals, which keeps imperfect
//! attempts visible. Intervals that have scrolled out of the window are pruned.
//! The lifetime totals in [`NoteProgress`] are kept so a summary survives
//! pruning.

use crate::timeline::Note;
use crate::tuning;
use log::debug;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Identifies a target note by its start time and frequency.
///
/// Two notes with the same start time and frequency share a key and are
/// tracked as one.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct MatchKey {
    pub start_time: f64,
    pub frequency: f64,
}

impl MatchKey {
    pub fn of(note: &Note) -> Self {
        Self {
            start_time: note.start_time,
            frequency: note.frequency,
        }
    }
}

impl PartialEq for MatchKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MatchKey {}

impl PartialOrd for MatchKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MatchKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.start_time
            .total_cmp(&other.start_time)
            .then_with(|| self.frequency.total_cmp(&other.frequency))
    }
}

/// A continuous stretch of matching, in session seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MatchInterval {
    pub fill_start: f64,
    pub fill_end: f64,
}

impl MatchInterval {
    pub fn duration(&self) -> f64 {
        self.fill_end - self.fill_start
    }
}

/// A match interval relative to the current elapsed time, ready to draw.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RelativeInterval {
    pub frequency: f64,
    pub start: f64,
    pub end: f64,
}

/// Lifetime match totals for one note.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NoteProgress {
    pub start_time: f64,
    pub end_time: f64,
    pub frequency: f64,
    pub midi_note: u8,
    /// Scientific pitch name, e.g. `"A4"`.
    pub note: String,
    /// Seconds during which the pitch matched, summed over all intervals.
    pub matched_seconds: f64,
    /// Number of separate attempts (intervals) on this note.
    pub attempts: usize,
}

impl NoteProgress {
    /// Fraction of the note's duration that was matched, capped at 1.
    pub fn coverage(&self) -> f64 {
        let duration = self.end_time - self.start_time;
        if duration <= 0.0 {
            return 0.0;
        }
        (self.matched_seconds / duration).clamp(0.0, 1.0)
    }
}

/// Per-note match intervals, owned and mutated by the polling activity only.
#[derive(Debug, Clone)]
pub struct MatchTracker {
    tolerance: f64,
    half_window: f64,
    intervals: BTreeMap<MatchKey, Vec<MatchInterval>>,
    progress: BTreeMap<MatchKey, NoteProgress>,
    last_tick: Option<f64>,
}

impl MatchTracker {
    pub fn new(tolerance: f64, half_window: f64) -> Self {
        Self {
            tolerance,
            half_window,
            intervals: BTreeMap::new(),
            progress: BTreeMap::new(),
            last_tick: None,
        }
    }

    /// Whether `pitch` is within tolerance of `note`. A zero pitch never is.
    pub fn is_match(&self, pitch: f64, note: &Note) -> bool {
        pitch > 0.0 && (pitch - note.frequency).abs() <= self.tolerance
    }

    /// Advances the tracker by one tick.
    ///
    /// Every visible note within tolerance of `current_pitch` either extends
    /// its open interval to `elapsed` or starts a new one. Intervals that have
    /// scrolled past the trailing edge are pruned afterwards.
    ///
    /// # Arguments
    /// * `visible` - Notes currently inside the window
    /// * `current_pitch` - Latest pitch reading in Hz, 0 when nothing is sung
    /// * `elapsed` - Session time of this tick in seconds
    ///
    /// # Returns
    /// Whether each note matched, in the order of `visible`.
    pub fn update(&mut self, visible: &[&Note], current_pitch: f64, elapsed: f64) -> Vec<bool> {
        // An interval is still open if it reached the previous tick.
        let open_since = self.last_tick.unwrap_or(elapsed);
        let mut matched = Vec::with_capacity(visible.len());

        for note in visible {
            let is_match = self.is_match(current_pitch, note);
            matched.push(is_match);
            if !is_match {
                continue;
            }

            let key = MatchKey::of(note);
            let list = self.intervals.entry(key).or_default();
            let progress = self.progress.entry(key).or_insert_with(|| NoteProgress {
                start_time: note.start_time,
                end_time: note.end_time,
                frequency: note.frequency,
                midi_note: note.midi_note,
                note: tuning::note_name(note.midi_note),
                matched_seconds: 0.0,
                attempts: 0,
            });

            match list.last_mut() {
                Some(last) if last.fill_end >= open_since => {
                    let end = elapsed.max(last.fill_end);
                    progress.matched_seconds += end - last.fill_end;
                    last.fill_end = end;
                }
                _ => {
                    debug!(
                        "Match started on note {} ({:.1} Hz) at {:.3}s",
                        note.midi_note, note.frequency, elapsed
                    );
                    list.push(MatchInterval {
                        fill_start: elapsed,
                        fill_end: elapsed,
                    });
                    progress.attempts += 1;
                }
            }
        }

        self.last_tick = Some(elapsed);
        self.prune(elapsed);
        matched
    }

    /// Drops intervals that have fully scrolled past the trailing edge and
    /// removes keys left without intervals.
    pub fn prune(&mut self, elapsed: f64) {
        let half_window = self.half_window;
        self.intervals.retain(|_, list| {
            list.retain(|interval| interval.fill_end - elapsed > -half_window);
            !list.is_empty()
        });
    }

    pub fn intervals(&self) -> &BTreeMap<MatchKey, Vec<MatchInterval>> {
        &self.intervals
    }

    pub fn intervals_for(&self, note: &Note) -> &[MatchInterval] {
        self.intervals
            .get(&MatchKey::of(note))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// All live intervals shifted so that `elapsed` is zero.
    pub fn relative_intervals(&self, elapsed: f64) -> Vec<RelativeInterval> {
        self.intervals
            .iter()
            .flat_map(|(key, list)| {
                list.iter().map(move |interval| RelativeInterval {
                    frequency: key.frequency,
                    start: interval.fill_start - elapsed,
                    end: interval.fill_end - elapsed,
                })
            })
            .collect()
    }

    /// Lifetime totals of every note that was ever matched, in note order.
    pub fn progress(&self) -> Vec<NoteProgress> {
        self.progress.values().cloned().collect()
    }
}

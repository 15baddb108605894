//! # Timeline Loader
//!
//! Builds the list of target notes the singer has to match from a melody
//! event stream. The stream is either constructed directly or read from a
//! Standard MIDI File.
//!
//! Timing inside the stream is expressed in ticks. Seconds are derived from the
//! cumulative tick count, the ticks-per-beat constant and the active tempo.
//! Note-on/note-off events are paired per MIDI note number.

use crate::config::{SessionConfig, TempoMode};
use crate::error::{LoadError, Result};
use crate::tuning;
use log::{debug, info, warn};
use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;

/// A single target note of the melody.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Note {
    /// Seconds from the start of the melody.
    pub start_time: f64,
    /// Seconds from the start of the melody, always after `start_time`.
    pub end_time: f64,
    /// Target frequency in Hz.
    pub frequency: f64,
    /// MIDI note number the frequency was derived from.
    pub midi_note: u8,
    /// Reserved for renderers; the engine never changes it.
    pub visible: bool,
}

impl Note {
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}

/// What happens at one point of the melody stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// New tempo in microseconds per beat.
    Tempo(u32),
    NoteOn { key: u8, velocity: u8 },
    NoteOff { key: u8 },
    /// Any other event. It only advances time.
    Other,
}

/// One event with its distance in ticks from the previous event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MelodyEvent {
    pub delta: u32,
    pub kind: EventKind,
}

impl MelodyEvent {
    pub fn new(delta: u32, kind: EventKind) -> Self {
        Self { delta, kind }
    }
}

/// An ordered melody event stream plus its tick resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MelodyStream {
    pub ticks_per_beat: u16,
    pub events: Vec<MelodyEvent>,
}

impl MelodyStream {
    /// Flattens a Standard MIDI File into one event stream.
    ///
    /// With `track = None` every track is read in file order and the running
    /// tick count carries over from one track to the next. Pass an index to
    /// read only that track.
    ///
    /// # Arguments
    /// * `bytes` - Raw contents of the `.mid` file
    /// * `track` - Index of the single track to read, or `None` for all
    ///
    /// # Returns
    /// * `Ok(stream)` - Events in file order with their tick deltas
    /// * `Err(e)` - Unparsable file, SMPTE timing, or no such track
    pub fn from_smf(bytes: &[u8], track: Option<usize>) -> Result<Self> {
        let smf = Smf::parse(bytes)?;
        let ticks_per_beat = match smf.header.timing {
            Timing::Metrical(ticks) => ticks.as_int(),
            Timing::Timecode(..) => return Err(LoadError::UnsupportedTiming),
        };

        let tracks = match track {
            Some(index) => {
                let selected = smf.tracks.get(index).ok_or(LoadError::TrackOutOfRange {
                    index,
                    count: smf.tracks.len(),
                })?;
                std::slice::from_ref(selected)
            }
            None => &smf.tracks[..],
        };

        let events = tracks
            .iter()
            .flat_map(|track| track.iter())
            .map(|event| {
                let kind = match event.kind {
                    TrackEventKind::Meta(MetaMessage::Tempo(tempo)) => EventKind::Tempo(tempo.as_int()),
                    TrackEventKind::Midi { message, .. } => match message {
                        MidiMessage::NoteOn { key, vel } => EventKind::NoteOn {
                            key: key.as_int(),
                            velocity: vel.as_int(),
                        },
                        MidiMessage::NoteOff { key, .. } => EventKind::NoteOff { key: key.as_int() },
                        _ => EventKind::Other,
                    },
                    _ => EventKind::Other,
                };
                MelodyEvent::new(event.delta.as_int(), kind)
            })
            .collect::<Vec<_>>();

        debug!(
            "Flattened {} MIDI events from {} track(s) at {} ticks per beat",
            events.len(),
            tracks.len(),
            ticks_per_beat
        );

        Ok(Self { ticks_per_beat, events })
    }
}

/// Tracks the active tempo and converts cumulative ticks to seconds.
struct TempoClock {
    ticks_per_beat: f64,
    tempo: u32,
    mode: TempoMode,
    /// Tick count and seconds at the last tempo change (accumulated mode).
    anchor_ticks: u64,
    anchor_seconds: f64,
}

impl TempoClock {
    fn new(ticks_per_beat: u16, tempo: u32, mode: TempoMode) -> Self {
        Self {
            ticks_per_beat: ticks_per_beat as f64,
            tempo,
            mode,
            anchor_ticks: 0,
            anchor_seconds: 0.0,
        }
    }

    fn ticks_to_seconds(&self, ticks: u64, tempo: u32) -> f64 {
        ticks as f64 * tempo as f64 / (self.ticks_per_beat * 1_000_000.0)
    }

    fn set_tempo(&mut self, tempo: u32, now_ticks: u64) {
        if self.mode == TempoMode::Accumulated {
            self.anchor_seconds = self.seconds_at(now_ticks);
            self.anchor_ticks = now_ticks;
        }
        self.tempo = tempo;
    }

    fn seconds_at(&self, ticks: u64) -> f64 {
        match self.mode {
            TempoMode::Running => self.ticks_to_seconds(ticks, self.tempo),
            TempoMode::Accumulated => {
                self.anchor_seconds
                    + self.ticks_to_seconds(ticks.saturating_sub(self.anchor_ticks), self.tempo)
            }
        }
    }
}

/// An open note waiting for its note-off.
struct ActiveNote {
    start_time: f64,
    frequency: f64,
}

/// Pairs note-on and note-off events of a stream into notes.
///
/// A second note-on for a pitch that is already sounding replaces the open
/// note, so only the most recent start survives. Note-offs without an open
/// note are ignored. The returned notes are in order of their note-off.
/// A note whose note-off converts to a time at or before its note-on is
/// dropped with a warning.
///
/// # Arguments
/// * `stream` - Events to convert
/// * `default_tempo` - Microseconds per beat until the first tempo event
/// * `mode` - How tempo changes affect the tick-to-seconds conversion
///
/// # Returns
/// * `Ok(notes)` - Every closed note, `visible` unset
/// * `Err(LoadError::ZeroTicksPerBeat)` - The stream has no tick resolution
pub fn build_notes(stream: &MelodyStream, default_tempo: u32, mode: TempoMode) -> Result<Vec<Note>> {
    if stream.ticks_per_beat == 0 {
        return Err(LoadError::ZeroTicksPerBeat);
    }

    let mut clock = TempoClock::new(stream.ticks_per_beat, default_tempo, mode);
    let mut current_ticks: u64 = 0;
    let mut active: HashMap<u8, ActiveNote> = HashMap::new();
    let mut notes = Vec::new();

    for event in &stream.events {
        current_ticks += event.delta as u64;
        if let EventKind::Tempo(tempo) = event.kind {
            debug!("Tempo change to {} us/beat at tick {}", tempo, current_ticks);
            clock.set_tempo(tempo, current_ticks);
        }
        let seconds = clock.seconds_at(current_ticks);

        match event.kind {
            EventKind::NoteOn { key, velocity } if velocity > 0 => {
                let replaced = active.insert(
                    key,
                    ActiveNote {
                        start_time: seconds,
                        frequency: tuning::midi_to_frequency(key),
                    },
                );
                if replaced.is_some() {
                    debug!("Note {} retriggered at {:.3}s before its note-off", key, seconds);
                }
            }
            EventKind::NoteOn { key, .. } | EventKind::NoteOff { key } => {
                let Some(open) = active.remove(&key) else {
                    continue;
                };
                if seconds > open.start_time {
                    notes.push(Note {
                        start_time: open.start_time,
                        end_time: seconds,
                        frequency: open.frequency,
                        midi_note: key,
                        visible: false,
                    });
                } else {
                    warn!("Dropping zero-length note {} at {:.3}s", key, seconds);
                }
            }
            EventKind::Tempo(_) | EventKind::Other => {}
        }
    }

    if !active.is_empty() {
        debug!("{} note(s) never received a note-off", active.len());
    }

    Ok(notes)
}

/// Reads a MIDI file and builds its note timeline with the session settings.
///
/// `config.track`, `config.default_tempo` and `config.tempo_mode` control the
/// conversion; see [`MelodyStream::from_smf`] and [`build_notes`].
pub fn load_melody<P: AsRef<Path>>(path: P, config: &SessionConfig) -> Result<Vec<Note>> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    let stream = MelodyStream::from_smf(&bytes, config.track)?;
    let notes = build_notes(&stream, config.default_tempo, config.tempo_mode)?;
    info!("Loaded {} notes from {}", notes.len(), path.display());
    Ok(notes)
}

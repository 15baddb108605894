//! # Session Configuration
//!
//! Tunable constants for a practice session. Every field has a default, so a
//! config file only needs the values it wants to change:
//!
//! ```json
//! { "match_tolerance": 8.0, "start_delay": 1.5 }
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Default sample rate of incoming microphone PCM, in Hz.
pub const SAMPLE_RATE: u32 = 44100;

/// Number of samples per analysis frame.
pub const FRAME_SIZE: usize = 1024;

/// Seconds of pitch history kept, also the half-width of the visible window.
pub const MAX_HISTORY: f64 = 5.0;

/// Hz distance within which the sung pitch counts as matching a note.
pub const MATCH_TOLERANCE: f64 = 5.0;

/// Tempo assumed until the melody sets one, in microseconds per beat.
pub const DEFAULT_TEMPO: u32 = 606_060;

/// How cumulative ticks are converted to seconds when the tempo changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TempoMode {
    /// The whole cumulative tick count is converted with whatever tempo is
    /// active when the event is reached. Earlier times are never recomputed.
    #[default]
    Running,
    /// Each tempo segment is integrated separately, giving wall-clock
    /// accurate times for multi-tempo melodies.
    Accumulated,
}

/// Configuration for one practice session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub sample_rate: u32,
    pub frame_size: usize,
    pub max_history: f64,
    pub match_tolerance: f64,
    pub tick_interval_ms: u64,
    /// Seconds added to the playback-start instant before elapsed time is zero.
    pub start_delay: f64,
    pub default_tempo: u32,
    pub tempo_mode: TempoMode,
    /// Read a single track instead of every track in file order.
    pub track: Option<usize>,
    /// Bound of the channel between the capture and polling activities.
    pub channel_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            frame_size: FRAME_SIZE,
            max_history: MAX_HISTORY,
            match_tolerance: MATCH_TOLERANCE,
            tick_interval_ms: 10,
            start_delay: 0.0,
            default_tempo: DEFAULT_TEMPO,
            tempo_mode: TempoMode::Running,
            track: None,
            channel_capacity: 64,
        }
    }
}

impl SessionConfig {
    /// Loads a config from a JSON file, filling missing fields with defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_json(&content).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Maximum number of samples the pitch history may hold.
    ///
    /// This is `max_history * sample_rate / frame_size`, i.e. how many frames
    /// arrive in `max_history` seconds.
    pub fn history_capacity(&self) -> usize {
        if self.frame_size == 0 {
            return 0;
        }
        (self.max_history * self.sample_rate as f64 / self.frame_size as f64) as usize
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Horizontal range a renderer shows around the "now" line, in seconds
    /// relative to the current elapsed time.
    pub fn view_range(&self) -> (f64, f64) {
        (-self.max_history / 4.0, self.max_history - self.max_history / 4.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_practice_constants() {
        let config = SessionConfig::default();
        assert_eq!(config.sample_rate, 44100);
        assert_eq!(config.frame_size, 1024);
        assert_eq!(config.history_capacity(), 215);
        assert_eq!(config.tick_interval(), Duration::from_millis(10));
        assert_eq!(config.view_range(), (-1.25, 3.75));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config =
            SessionConfig::from_json(r#"{ "match_tolerance": 8.0, "tempo_mode": "accumulated" }"#)
                .unwrap();
        assert_eq!(config.match_tolerance, 8.0);
        assert_eq!(config.tempo_mode, TempoMode::Accumulated);
        assert_eq!(config.default_tempo, DEFAULT_TEMPO);
        assert_eq!(config.track, None);
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(SessionConfig::from_json("{ not json").is_err());
    }
}

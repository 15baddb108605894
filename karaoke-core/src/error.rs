//! Errors raised while loading a melody timeline.
//!
//! Everything after loading is either a pure computation or a bounded buffer
//! operation, so this is the only error type the engine surfaces. A corrupt
//! timeline invalidates the whole session; callers decide whether to abort.

use thiserror::Error;

/// Errors that can occur while turning a melody file into notes.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("MIDI parse error: {0}")]
    Midi(#[from] midly::Error),

    #[error("SMPTE timecode timing is not supported, the melody needs ticks per beat")]
    UnsupportedTiming,

    #[error("ticks per beat must be greater than zero")]
    ZeroTicksPerBeat,

    #[error("track {index} requested but the file only has {count} tracks")]
    TrackOutOfRange { index: usize, count: usize },
}

/// Result type for melody loading.
pub type Result<T> = std::result::Result<T, LoadError>;

// karaoke-core/src/lib.rs

//! The core logic for the singing practice engine.
//! This crate builds the target-note timeline from a melody, estimates the
//! sung pitch from microphone frames, and tracks how long the singer has
//! matched each note. It is completely headless and contains no rendering
//! code; a renderer consumes the [`session::TickReport`] produced every tick.

pub mod audio;
pub mod clock;
pub mod config;
pub mod error;
pub mod fft;
pub mod history;
pub mod matching;
pub mod pitch;
pub mod session;
pub mod timeline;
pub mod tuning;
pub mod window;

pub use config::{SessionConfig, TempoMode};
pub use error::LoadError;
pub use history::{PitchMonitor, PitchSample};
pub use matching::{MatchInterval, MatchKey, MatchTracker, NoteProgress};
pub use session::{FrameProcessor, Session, StopSignal, TickReport};
pub use timeline::{load_melody, Note};

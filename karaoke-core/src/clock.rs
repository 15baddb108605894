//! Session clock: the single instant playback started.

use log::{info, warn};
use once_cell::sync::OnceCell;
use std::time::{Duration, Instant};

/// Reference instant every elapsed-time computation is measured from.
///
/// It starts unset. Until [`SessionClock::mark_start`] runs, every elapsed
/// query returns `None` and callers treat the session as not yet started.
#[derive(Debug, Default)]
pub struct SessionClock {
    start: OnceCell<Instant>,
}

impl SessionClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the start instant, shifted forward by `delay`.
    ///
    /// Only the first call has an effect; later calls are ignored and return
    /// `false`. A delay too large to represent starts the clock at `instant`.
    pub fn mark_start(&self, instant: Instant, delay: Duration) -> bool {
        let start = instant.checked_add(delay).unwrap_or_else(|| {
            warn!("Start delay of {:.3}s is out of range, starting now", delay.as_secs_f64());
            instant
        });
        match self.start.set(start) {
            Ok(()) => {
                info!("Session clock started (delay {:.3}s)", delay.as_secs_f64());
                true
            }
            Err(_) => {
                warn!("Session clock already started, ignoring second start signal");
                false
            }
        }
    }

    pub fn is_started(&self) -> bool {
        self.start.get().is_some()
    }

    pub fn start_instant(&self) -> Option<Instant> {
        self.start.get().copied()
    }

    /// Seconds from the start instant to `now`, negative while a start delay
    /// is still running.
    pub fn elapsed_at(&self, now: Instant) -> Option<f64> {
        let start = *self.start.get()?;
        Some(if now >= start {
            (now - start).as_secs_f64()
        } else {
            -(start - now).as_secs_f64()
        })
    }

    pub fn elapsed(&self) -> Option<f64> {
        self.elapsed_at(Instant::now())
    }
}

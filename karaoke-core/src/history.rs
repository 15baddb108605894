//! # Pitch History
//!
//! A time-bounded FIFO of pitch samples and the lock-guarded state shared by
//! the capture and polling activities.

use log::trace;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;

/// One pitch estimate placed on the session timeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PitchSample {
    /// Seconds since the session clock started.
    pub timestamp: f64,
    /// Estimated frequency in Hz, always positive once recorded.
    pub frequency: f64,
}

impl PitchSample {
    pub fn new(timestamp: f64, frequency: f64) -> Self {
        Self { timestamp, frequency }
    }
}

/// Ordered pitch samples, oldest first, never longer than its capacity.
#[derive(Debug, Clone)]
pub struct PitchHistory {
    samples: VecDeque<PitchSample>,
    capacity: usize,
}

impl PitchHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a sample and evicts the oldest ones beyond capacity.
    ///
    /// Samples without a positive frequency, or older than the newest stored
    /// sample, are rejected so timestamps stay non-decreasing. Returns whether
    /// the sample was stored.
    pub fn record(&mut self, sample: PitchSample) -> bool {
        if !(sample.frequency > 0.0) {
            return false;
        }
        if let Some(last) = self.samples.back() {
            if sample.timestamp < last.timestamp {
                trace!(
                    "Rejecting out-of-order sample at {:.3}s (newest is {:.3}s)",
                    sample.timestamp,
                    last.timestamp
                );
                return false;
            }
        }

        self.samples.push_back(sample);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
        true
    }

    pub fn snapshot(&self) -> Vec<PitchSample> {
        self.samples.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

struct PitchState {
    history: PitchHistory,
    current_pitch: f64,
}

/// The pitch history and the current-pitch scalar behind one lock.
///
/// Both activities hold the lock only for a bounded append/evict or a copy.
pub struct PitchMonitor {
    state: Mutex<PitchState>,
}

impl PitchMonitor {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(PitchState {
                history: PitchHistory::new(capacity),
                current_pitch: 0.0,
            }),
        }
    }

    /// Publishes a new reading. A non-positive frequency clears the current
    /// pitch and is not stored in the history.
    pub fn record(&self, sample: PitchSample) {
        let mut state = self.state.lock();
        if sample.frequency > 0.0 {
            state.current_pitch = sample.frequency;
            state.history.record(sample);
        } else {
            state.current_pitch = 0.0;
        }
    }

    pub fn current_pitch(&self) -> f64 {
        self.state.lock().current_pitch
    }

    pub fn snapshot(&self) -> Vec<PitchSample> {
        self.state.lock().history.snapshot()
    }

    /// Current pitch and history copied under the same lock acquisition.
    pub fn consistent_view(&self) -> (f64, Vec<PitchSample>) {
        let state = self.state.lock();
        (state.current_pitch, state.history.snapshot())
    }
}

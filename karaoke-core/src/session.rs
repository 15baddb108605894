//! # Practice Session
//!
//! The explicit context shared by the three activities of a session:
//!
//! - **Capture**: a [`FrameProcessor`] turns each incoming frame into a
//!   timestamped reading and pushes it into a bounded channel. It never blocks;
//!   a full channel drops the reading.
//! - **Polling**: [`Session::tick`] drains the channel into the lock-guarded
//!   [`PitchMonitor`], selects the visible notes, advances the
//!   [`MatchTracker`] and returns a [`TickReport`] for the renderer.
//! - **Playback**: calls [`Session::mark_start`] once.
//!
//! Until the clock is started, frames are dropped and ticks return `None`.

use crate::audio;
use crate::clock::SessionClock;
use crate::config::SessionConfig;
use crate::history::{PitchMonitor, PitchSample};
use crate::matching::{MatchTracker, NoteProgress, RelativeInterval};
use crate::pitch::PitchEstimator;
use crate::timeline::Note;
use crate::window::{self, RelativeNote};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use log::{debug, info, trace, warn};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Session-wide stop flag shared by every activity.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything a renderer needs to draw one tick, in time relative to now.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickReport {
    pub elapsed: f64,
    pub current_pitch: f64,
    /// `(seconds relative to now, Hz)` points of the trailing pitch curve.
    pub pitch_curve: Vec<(f64, f64)>,
    pub notes: Vec<RelativeNote>,
    pub intervals: Vec<RelativeInterval>,
    /// Horizontal range the renderer shows, relative to now.
    pub view_range: (f64, f64),
}

impl TickReport {
    /// Notes the singer is matching at this tick.
    pub fn matching_notes(&self) -> impl Iterator<Item = &RelativeNote> {
        self.notes.iter().filter(|note| note.matching)
    }
}

/// The capture side: estimates pitch per frame and hands readings over.
pub struct FrameProcessor {
    estimator: PitchEstimator,
    clock: Arc<SessionClock>,
    readings: Sender<PitchSample>,
    dropped: u64,
}

impl FrameProcessor {
    /// Estimates the pitch of `frame` captured at `now` and queues it.
    ///
    /// Silent frames are queued with frequency 0 so the polling side clears
    /// its current pitch.
    ///
    /// # Arguments
    /// * `frame` - Mono 16-bit samples, `frame_size` of them
    /// * `now` - Capture instant of the frame
    ///
    /// # Returns
    /// * `Some(reading)` - The reading that was queued
    /// * `None` - The session has not started yet or the channel was full
    pub fn process(&mut self, frame: &[i16], now: Instant) -> Option<PitchSample> {
        let timestamp = self.clock.elapsed_at(now)?;
        let frequency = self.estimator.estimate(frame);
        let reading = PitchSample::new(timestamp, frequency);

        match self.readings.try_send(reading) {
            Ok(()) => Some(reading),
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                if self.dropped.is_power_of_two() {
                    warn!("Reading channel full, {} reading(s) dropped so far", self.dropped);
                }
                None
            }
            Err(TrySendError::Disconnected(_)) => {
                trace!("Reading channel closed, discarding frame");
                None
            }
        }
    }

    /// Same as [`FrameProcessor::process`] for raw little-endian 16-bit PCM,
    /// as delivered by byte-oriented capture backends.
    pub fn process_bytes(&mut self, bytes: &[u8], now: Instant) -> Option<PitchSample> {
        self.process(&audio::pcm16_from_le_bytes(bytes), now)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

/// Runs a [`FrameProcessor`] on its own thread, fed by raw frames.
///
/// The thread exits when the frame channel closes or the stop signal fires.
///
/// # Arguments
/// * `frames` - Receiving end of the capture channel
/// * `processor` - Processor from [`Session::frame_processor`]
/// * `stop` - Session stop signal, checked at least every 50 ms
///
/// # Returns
/// Handle of the `pitch-analysis` thread, or the error from spawning it.
pub fn spawn_frame_worker(
    frames: Receiver<Vec<i16>>,
    mut processor: FrameProcessor,
    stop: StopSignal,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("pitch-analysis".into())
        .spawn(move || {
            info!("Pitch analysis thread started");
            loop {
                crossbeam_channel::select! {
                    recv(frames) -> msg => match msg {
                        Ok(frame) => {
                            processor.process(&frame, Instant::now());
                        }
                        Err(_) => {
                            debug!("Frame channel closed");
                            break;
                        }
                    },
                    default(Duration::from_millis(50)) => {}
                }
                if stop.is_stopped() {
                    debug!("Pitch analysis thread received stop signal");
                    break;
                }
            }
            info!(
                "Pitch analysis thread finished ({} reading(s) dropped)",
                processor.dropped()
            );
        })
}

/// Shared context of one practice session.
pub struct Session {
    config: SessionConfig,
    notes: Vec<Note>,
    clock: Arc<SessionClock>,
    monitor: Arc<PitchMonitor>,
    readings_tx: Sender<PitchSample>,
    readings_rx: Receiver<PitchSample>,
    tracker: MatchTracker,
    stop: StopSignal,
}

impl Session {
    /// Creates a session over a loaded melody. The clock starts unset.
    pub fn new(notes: Vec<Note>, config: SessionConfig) -> Self {
        let (readings_tx, readings_rx) = crossbeam_channel::bounded(config.channel_capacity.max(1));
        info!(
            "Session ready: {} notes, {}-sample frames at {} Hz, +/-{:.1} Hz tolerance",
            notes.len(),
            config.frame_size,
            config.sample_rate,
            config.match_tolerance
        );
        Self {
            monitor: Arc::new(PitchMonitor::new(config.history_capacity())),
            tracker: MatchTracker::new(config.match_tolerance, config.max_history),
            clock: Arc::new(SessionClock::new()),
            stop: StopSignal::new(),
            readings_tx,
            readings_rx,
            notes,
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn clock(&self) -> Arc<SessionClock> {
        Arc::clone(&self.clock)
    }

    pub fn monitor(&self) -> Arc<PitchMonitor> {
        Arc::clone(&self.monitor)
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Builds a capture-side processor feeding this session.
    pub fn frame_processor(&self) -> FrameProcessor {
        FrameProcessor {
            estimator: PitchEstimator::new(self.config.frame_size, self.config.sample_rate),
            clock: Arc::clone(&self.clock),
            readings: self.readings_tx.clone(),
            dropped: 0,
        }
    }

    /// Starts the session clock at `instant` plus the configured start delay.
    ///
    /// A delay that is negative or not a usable number of seconds is treated
    /// as no delay.
    ///
    /// # Returns
    /// * `true` - The clock was started by this call
    /// * `false` - The clock had already been started
    pub fn mark_start(&self, instant: Instant) -> bool {
        let delay = Duration::try_from_secs_f64(self.config.start_delay.max(0.0))
            .unwrap_or_else(|e| {
                warn!("Ignoring start delay {}: {}", self.config.start_delay, e);
                Duration::ZERO
            });
        self.clock.mark_start(instant, delay)
    }

    /// End of the last note, in session seconds.
    pub fn melody_end(&self) -> f64 {
        self.notes.iter().map(|note| note.end_time).fold(0.0, f64::max)
    }

    /// True once every note has scrolled out of the window.
    pub fn is_finished(&self, now: Instant) -> bool {
        self.clock
            .elapsed_at(now)
            .is_some_and(|elapsed| elapsed - self.config.max_history >= self.melody_end())
    }

    /// Runs one polling step at `now`.
    ///
    /// Drains queued readings into the monitor, selects the visible notes and
    /// advances the match tracker against the current pitch.
    ///
    /// # Returns
    /// * `Some(report)` - Everything a renderer needs for this frame
    /// * `None` - The clock has not been started yet
    pub fn tick(&mut self, now: Instant) -> Option<TickReport> {
        let elapsed = self.clock.elapsed_at(now)?;

        for reading in self.readings_rx.try_iter() {
            self.monitor.record(reading);
        }
        let (current_pitch, history) = self.monitor.consistent_view();

        let visible = window::visible_notes(&self.notes, elapsed, self.config.max_history);
        let matched = self.tracker.update(&visible, current_pitch, elapsed);

        let notes = visible
            .iter()
            .zip(matched)
            .map(|(note, matching)| RelativeNote::from_note(note, elapsed, matching))
            .collect();
        let pitch_curve = history
            .iter()
            .map(|sample| (sample.timestamp - elapsed, sample.frequency))
            .collect();

        Some(TickReport {
            elapsed,
            current_pitch,
            pitch_curve,
            notes,
            intervals: self.tracker.relative_intervals(elapsed),
            view_range: self.config.view_range(),
        })
    }

    pub fn tracker(&self) -> &MatchTracker {
        &self.tracker
    }

    /// Lifetime match totals of every note that was matched at least once.
    pub fn progress(&self) -> Vec<NoteProgress> {
        self.tracker.progress()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_with(notes: Vec<Note>) -> Session {
        Session::new(notes, SessionConfig::default())
    }

    #[test]
    fn nothing_happens_before_start() {
        let mut session = session_with(vec![]);
        let mut processor = session.frame_processor();
        let now = Instant::now();
        assert_eq!(processor.process(&[0; 1024], now), None);
        assert_eq!(session.tick(now), None);
        assert!(session.monitor().snapshot().is_empty());
    }

    #[test]
    fn full_channel_drops_readings() {
        let config = SessionConfig { channel_capacity: 2, ..SessionConfig::default() };
        let session = Session::new(vec![], config);
        let t0 = Instant::now();
        session.mark_start(t0);
        let mut processor = session.frame_processor();
        for _ in 0..5 {
            processor.process(&[0; 1024], t0);
        }
        assert_eq!(processor.dropped(), 3);
    }

    #[test]
    fn raw_pcm_bytes_are_processed_like_samples() {
        let session = session_with(vec![]);
        let t0 = Instant::now();
        session.mark_start(t0);
        let mut processor = session.frame_processor();

        // Bin 10 at 44.1 kHz / 1024.
        let frequency = 10.0 * 44100.0 / 1024.0;
        let samples: Vec<i16> = (0..1024)
            .map(|i| (12_000.0 * (2.0 * std::f64::consts::PI * 10.0 * i as f64 / 1024.0).sin()) as i16)
            .collect();
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();

        let from_bytes = processor.process_bytes(&bytes, t0).unwrap();
        let from_samples = processor.process(&samples, t0).unwrap();
        assert_eq!(from_bytes, from_samples);
        assert!((from_bytes.frequency - frequency).abs() < 1e-9);
    }

    #[test]
    fn stop_signal_is_shared() {
        let session = session_with(vec![]);
        let stop = session.stop_signal();
        assert!(!stop.is_stopped());
        session.stop_signal().stop();
        assert!(stop.is_stopped());
    }

    #[test]
    fn finishes_after_last_note_scrolls_out() {
        let note = Note { start_time: 0.0, end_time: 1.0, frequency: 440.0, midi_note: 69, visible: false };
        let session = session_with(vec![note]);
        let t0 = Instant::now();
        assert!(!session.is_finished(t0));
        session.mark_start(t0);
        assert!(!session.is_finished(t0 + Duration::from_secs(5)));
        assert!(session.is_finished(t0 + Duration::from_secs(6)));
    }

    #[test]
    fn unusable_start_delay_starts_now() {
        let config = SessionConfig { start_delay: f64::INFINITY, ..SessionConfig::default() };
        let mut session = Session::new(vec![], config);
        let t0 = Instant::now();
        assert!(session.mark_start(t0));
        let report = session.tick(t0 + Duration::from_secs(1)).unwrap();
        assert!((report.elapsed - 1.0).abs() < 1e-9);
    }

    #[test]
    fn huge_start_delay_does_not_overflow_the_clock() {
        let config = SessionConfig { start_delay: 1e18, ..SessionConfig::default() };
        let session = Session::new(vec![], config);
        assert!(session.mark_start(Instant::now()));
        assert!(session.clock().is_started());
    }
}

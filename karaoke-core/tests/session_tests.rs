use karaoke_core::session::spawn_frame_worker;
use karaoke_core::{load_melody, LoadError, Note, Session, SessionConfig};
use std::f64::consts::PI;
use std::time::{Duration, Instant};

const SAMPLE_RATE: u32 = 44100;
const FRAME: usize = 1024;

/// Frequency of FFT bin 10 at 44.1 kHz / 1024, so a sine there peaks exactly.
const BIN_10: f64 = 10.0 * SAMPLE_RATE as f64 / FRAME as f64;

fn sine(freq: f64) -> Vec<i16> {
    (0..FRAME)
        .map(|i| (12_000.0 * (2.0 * PI * freq * i as f64 / SAMPLE_RATE as f64).sin()) as i16)
        .collect()
}

fn target(start_time: f64, end_time: f64, frequency: f64) -> Note {
    Note { start_time, end_time, frequency, midi_note: 57, visible: false }
}

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

#[test]
fn steady_singing_fills_one_interval() {
    let mut session = Session::new(vec![target(0.0, 2.0, BIN_10)], SessionConfig::default());
    let mut capture = session.frame_processor();
    let t0 = Instant::now();
    session.mark_start(t0);

    let mut last_end = f64::NEG_INFINITY;
    for step in 1..=3 {
        let now = t0 + ms(10 * step);
        capture.process(&sine(BIN_10), now).expect("reading queued");
        let report = session.tick(now).expect("session started");

        assert_eq!(report.notes.len(), 1);
        assert!(report.notes[0].matching);
        assert_eq!(report.intervals.len(), 1);
        let end = report.intervals[0].end + report.elapsed;
        assert!(end > last_end);
        last_end = end;
    }

    let note = &session.notes()[0];
    let intervals = session.tracker().intervals_for(note);
    assert_eq!(intervals.len(), 1);
    assert!((intervals[0].fill_start - 0.010).abs() < 1e-9);
    assert!((intervals[0].fill_end - 0.030).abs() < 1e-9);
}

#[test]
fn a_wobble_splits_the_match() {
    let mut session = Session::new(vec![target(0.0, 2.0, BIN_10)], SessionConfig::default());
    let mut capture = session.frame_processor();
    let t0 = Instant::now();
    session.mark_start(t0);

    let frames = [sine(BIN_10), vec![0; FRAME], sine(BIN_10)];
    for (i, frame) in frames.iter().enumerate() {
        let now = t0 + ms(10 * (i as u64 + 1));
        capture.process(frame, now);
        session.tick(now);
    }

    let note = &session.notes()[0];
    assert_eq!(session.tracker().intervals_for(note).len(), 2);
    let progress = session.progress();
    assert_eq!(progress.len(), 1);
    assert_eq!(progress[0].attempts, 2);
}

#[test]
fn pitch_curve_is_relative_to_now() {
    let mut session = Session::new(vec![], SessionConfig::default());
    let mut capture = session.frame_processor();
    let t0 = Instant::now();
    session.mark_start(t0);

    capture.process(&sine(BIN_10), t0 + ms(100));
    capture.process(&vec![0; FRAME], t0 + ms(200));
    let report = session.tick(t0 + ms(500)).unwrap();

    assert_eq!(report.current_pitch, 0.0);
    assert_eq!(report.pitch_curve.len(), 1);
    let (x, y) = report.pitch_curve[0];
    assert!((x + 0.4).abs() < 1e-9);
    assert!((y - BIN_10).abs() < 1e-9);
    assert_eq!(report.view_range, (-1.25, 3.75));
}

#[test]
fn only_notes_near_now_are_reported() {
    let notes = vec![
        target(0.0, 1.0, 200.0),
        target(9.0, 10.0, 300.0),
        target(16.0, 17.0, 400.0),
    ];
    let mut session = Session::new(notes, SessionConfig::default());
    let t0 = Instant::now();
    session.mark_start(t0);

    let report = session.tick(t0 + Duration::from_secs(11)).unwrap();
    let frequencies: Vec<f64> = report.notes.iter().map(|n| n.frequency).collect();
    assert_eq!(frequencies, vec![300.0]);
    assert!((report.notes[0].start + 2.0).abs() < 1e-9);
}

#[test]
fn worker_thread_feeds_the_session() {
    let mut session = Session::new(vec![target(0.0, 60.0, BIN_10)], SessionConfig::default());
    let t0 = Instant::now();
    session.mark_start(t0);

    let (frames_tx, frames_rx) = crossbeam_channel::bounded(8);
    let worker = spawn_frame_worker(frames_rx, session.frame_processor(), session.stop_signal())
        .unwrap();
    for _ in 0..4 {
        frames_tx.send(sine(BIN_10)).unwrap();
    }
    drop(frames_tx);
    worker.join().unwrap();

    let report = session.tick(Instant::now()).unwrap();
    assert_eq!(report.pitch_curve.len(), 4);
    assert!((report.current_pitch - BIN_10).abs() < 1e-9);
    assert_eq!(report.matching_notes().count(), 1);
}

#[test]
fn stop_signal_ends_the_worker() {
    let session = Session::new(vec![], SessionConfig::default());
    let (_frames_tx, frames_rx) = crossbeam_channel::bounded::<Vec<i16>>(1);
    let worker = spawn_frame_worker(frames_rx, session.frame_processor(), session.stop_signal())
        .unwrap();
    session.stop_signal().stop();
    worker.join().unwrap();
}

#[test]
fn loads_a_melody_file() {
    use midly::num::{u15, u28, u4, u7};
    use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind};

    let event = |delta: u32, message: MidiMessage| TrackEvent {
        delta: u28::new(delta),
        kind: TrackEventKind::Midi { channel: u4::new(0), message },
    };
    let track: Track = vec![
        event(0, MidiMessage::NoteOn { key: u7::new(60), vel: u7::new(100) }),
        event(480, MidiMessage::NoteOff { key: u7::new(60), vel: u7::new(0) }),
        event(0, MidiMessage::NoteOn { key: u7::new(62), vel: u7::new(100) }),
        event(480, MidiMessage::NoteOn { key: u7::new(62), vel: u7::new(0) }),
        TrackEvent { delta: u28::new(0), kind: TrackEventKind::Meta(MetaMessage::EndOfTrack) },
    ];
    let smf = Smf {
        header: Header::new(Format::SingleTrack, Timing::Metrical(u15::new(480))),
        tracks: vec![track],
    };
    let path = std::env::temp_dir().join(format!("karaoke-melody-{}.mid", std::process::id()));
    smf.save(&path).unwrap();

    let notes = load_melody(&path, &SessionConfig::default()).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(notes.len(), 2);
    // Default tempo is 606060 us/beat.
    assert!((notes[0].end_time - 0.60606).abs() < 1e-9);
    assert!((notes[1].start_time - 0.60606).abs() < 1e-9);
    assert!((notes[1].end_time - 1.21212).abs() < 1e-9);
    assert_eq!(notes[1].midi_note, 62);
}

#[test]
fn missing_melody_is_an_io_error() {
    let err = load_melody("/nonexistent/melody.mid", &SessionConfig::default()).unwrap_err();
    assert!(matches!(err, LoadError::Io(_)));
}

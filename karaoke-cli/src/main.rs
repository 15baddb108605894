//! # Karaoke Practice - headless runner
//!
//! Loads a melody, listens to the default microphone and reports how well the
//! singer matches each target note.
//!
//! ## Architecture
//! - **Capture**: CPAL callback cutting microphone input into fixed frames
//! - **Analysis Thread**: estimates pitch per frame and queues readings
//! - **Main Thread**: fixed-interval polling loop driving the match tracker
//! - **Stdin Thread**: pressing Enter raises the session stop signal

use anyhow::{bail, Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use cpal::traits::StreamTrait;
use karaoke_core::session::spawn_frame_worker;
use karaoke_core::window::RelativeNote;
use karaoke_core::{audio, load_melody, tuning, Session, SessionConfig, StopSignal, TempoMode};
use log::{debug, info, warn};
use std::collections::BTreeSet;
use std::io::BufRead;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

fn cli() -> Command {
    Command::new("karaoke")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Sing along to a MIDI melody and track how closely you match each note")
        .arg(
            Arg::new("melody")
                .value_name("MIDI_FILE")
                .help("Melody track to practice against")
                .required(true),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("JSON session config; missing fields use defaults"),
        )
        .arg(
            Arg::new("track")
                .short('t')
                .long("track")
                .value_name("INDEX")
                .value_parser(clap::value_parser!(usize))
                .help("Read only this MIDI track instead of all tracks"),
        )
        .arg(
            Arg::new("start-delay")
                .short('d')
                .long("start-delay")
                .value_name("SECONDS")
                .value_parser(clap::value_parser!(f64))
                .help("Seconds between playback start and the melody's time zero"),
        )
        .arg(
            Arg::new("tolerance")
                .long("tolerance")
                .value_name("HZ")
                .value_parser(clap::value_parser!(f64))
                .help("Hz within which the sung pitch matches a note (default: 5)"),
        )
        .arg(
            Arg::new("accurate-tempo")
                .long("accurate-tempo")
                .action(ArgAction::SetTrue)
                .help("Integrate tempo changes segment by segment"),
        )
        .arg(
            Arg::new("summary")
                .short('o')
                .long("summary")
                .value_name("FILE")
                .value_parser(clap::value_parser!(PathBuf))
                .help("Write the JSON progress summary here instead of stdout"),
        )
}

fn build_config(matches: &ArgMatches) -> Result<SessionConfig> {
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => SessionConfig::from_file(path)?,
        None => SessionConfig::default(),
    };
    if let Some(&track) = matches.get_one::<usize>("track") {
        config.track = Some(track);
    }
    if let Some(&delay) = matches.get_one::<f64>("start-delay") {
        if !delay.is_finite() || delay < 0.0 {
            bail!("start delay must be a finite number of seconds >= 0, got {delay}");
        }
        config.start_delay = delay;
    }
    if let Some(&tolerance) = matches.get_one::<f64>("tolerance") {
        config.match_tolerance = tolerance;
    }
    if matches.get_flag("accurate-tempo") {
        config.tempo_mode = TempoMode::Accumulated;
    }
    Ok(config)
}

/// Blocks until one line is read, then raises the stop signal.
///
/// # Returns
/// * `true` - A line arrived and the session was asked to stop
/// * `false` - The input was closed or failed; the session keeps running
fn wait_for_stop<R: BufRead>(mut input: R, stop: &StopSignal) -> bool {
    let mut line = String::new();
    match input.read_line(&mut line) {
        Ok(n) if n > 0 => {
            info!("Stop requested");
            stop.stop();
            true
        }
        Ok(_) => {
            debug!("Stdin closed, the session runs until the melody ends");
            false
        }
        Err(e) => {
            warn!("Could not read stdin, stop with Ctrl-C instead: {}", e);
            false
        }
    }
}

/// Raises the stop signal when the user presses Enter.
fn spawn_stdin_watcher(stop: StopSignal) {
    let spawned = thread::Builder::new()
        .name("stdin-watcher".into())
        .spawn(move || {
            wait_for_stop(std::io::stdin().lock(), &stop);
        });
    if let Err(e) = spawned {
        warn!("Could not watch stdin, stop with Ctrl-C instead: {}", e);
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = cli().get_matches();
    let mut config = build_config(&matches)?;
    let melody = matches
        .get_one::<String>("melody")
        .context("melody path is required")?;

    let notes = load_melody(melody, &config).with_context(|| format!("loading melody {melody}"))?;
    if notes.is_empty() {
        warn!("Melody {} has no notes to match", melody);
    }

    let (frames_tx, frames_rx) = crossbeam_channel::bounded(config.channel_capacity.max(1));
    let (stream, sample_rate) = audio::start_capture(frames_tx, config.sample_rate, config.frame_size)
        .context("starting microphone capture")?;
    if sample_rate != config.sample_rate {
        info!("Device runs at {} Hz instead of {} Hz", sample_rate, config.sample_rate);
        config.sample_rate = sample_rate;
    }

    let mut session = Session::new(notes, config);
    let stop = session.stop_signal();
    let worker = spawn_frame_worker(frames_rx, session.frame_processor(), stop.clone())
        .context("spawning pitch analysis thread")?;
    spawn_stdin_watcher(stop.clone());

    // The backing track is played by an external player; its start is now.
    session.mark_start(Instant::now());
    info!(
        "Sing along! Melody lasts {:.1}s, press Enter to stop",
        session.melody_end()
    );

    run_polling_loop(&mut session, &stop);

    stop.stop();
    if let Err(e) = stream.pause() {
        warn!("Error pausing stream: {}", e);
    }
    drop(stream);
    if worker.join().is_err() {
        warn!("Pitch analysis thread panicked");
    }

    report_summary(&session, matches.get_one::<PathBuf>("summary"))
}

/// Ticks the session at the configured interval until the melody has
/// scrolled past or the stop signal fires.
fn run_polling_loop(session: &mut Session, stop: &StopSignal) {
    let interval = session.config().tick_interval();
    let mut next_tick = Instant::now();
    // Notes matching on the previous tick, keyed by (start ms, MIDI note).
    let mut matching: BTreeSet<(i64, u8)> = BTreeSet::new();
    let mut last_status = Instant::now();

    while !stop.is_stopped() {
        let now = Instant::now();
        if session.is_finished(now) {
            info!("Melody finished");
            break;
        }

        if let Some(report) = session.tick(now) {
            let key_of = |note: &RelativeNote| {
                (((note.start + report.elapsed) * 1000.0).round() as i64, note.midi_note)
            };
            let current: BTreeSet<(i64, u8)> = report.matching_notes().map(key_of).collect();
            for note in report.matching_notes() {
                if matching.contains(&key_of(note)) {
                    continue;
                }
                let cents = tuning::calculate_cents_deviation(report.current_pitch, note.frequency);
                info!(
                    "[{:7.2}s] matching {} ({:.1} Hz, {:+.0} cents)",
                    report.elapsed,
                    tuning::note_name(note.midi_note),
                    note.frequency,
                    cents
                );
            }
            matching = current;

            if now.duration_since(last_status) >= Duration::from_secs(1) {
                let sung = tuning::nearest_note_name(report.current_pitch);
                debug!(
                    "[{:7.2}s] pitch {:.1} Hz ({}), {} visible note(s), {} interval(s)",
                    report.elapsed,
                    report.current_pitch,
                    sung.as_deref().unwrap_or("-"),
                    report.notes.len(),
                    report.intervals.len()
                );
                last_status = now;
            }
        }

        next_tick += interval;
        let now = Instant::now();
        if next_tick > now {
            thread::sleep(next_tick - now);
        } else {
            next_tick = now;
        }
    }
}

fn report_summary(session: &Session, path: Option<&PathBuf>) -> Result<()> {
    let progress = session.progress();
    let total_notes = session.notes().len();
    let matched_notes = progress.len();
    let mean_coverage = if total_notes == 0 {
        0.0
    } else {
        progress.iter().map(|p| p.coverage()).sum::<f64>() / total_notes as f64
    };
    info!(
        "Matched {} of {} notes, mean coverage {:.0}%",
        matched_notes,
        total_notes,
        mean_coverage * 100.0
    );

    let json = serde_json::to_string_pretty(&progress)?;
    match path {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("writing summary {}", path.display()))?;
            info!("Summary written to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let matches = cli()
            .try_get_matches_from([
                "karaoke",
                "song.mid",
                "--track",
                "2",
                "--start-delay",
                "1.5",
                "--tolerance",
                "8",
                "--accurate-tempo",
            ])
            .unwrap();
        let config = build_config(&matches).unwrap();
        assert_eq!(config.track, Some(2));
        assert_eq!(config.start_delay, 1.5);
        assert_eq!(config.match_tolerance, 8.0);
        assert_eq!(config.tempo_mode, TempoMode::Accumulated);
        assert_eq!(config.frame_size, 1024);
    }

    #[test]
    fn melody_is_required() {
        assert!(cli().try_get_matches_from(["karaoke"]).is_err());
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let matches = cli()
            .try_get_matches_from(["karaoke", "song.mid", "--config", "/nonexistent/config.json"])
            .unwrap();
        assert!(build_config(&matches).is_err());
    }

    #[test]
    fn unusable_start_delay_is_rejected() {
        for delay in ["inf", "NaN", "-1"] {
            let arg = format!("--start-delay={delay}");
            let matches = cli()
                .try_get_matches_from(["karaoke", "song.mid", arg.as_str()])
                .unwrap();
            assert!(build_config(&matches).is_err(), "accepted {delay}");
        }
    }

    #[test]
    fn closed_stdin_does_not_stop() {
        let stop = StopSignal::new();
        assert!(!wait_for_stop(&b""[..], &stop));
        assert!(!stop.is_stopped());
    }

    #[test]
    fn enter_stops_the_session() {
        let stop = StopSignal::new();
        assert!(wait_for_stop(&b"\n"[..], &stop));
        assert!(stop.is_stopped());
    }
}

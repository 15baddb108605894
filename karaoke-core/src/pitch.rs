//! # Pitch Estimation Module
//!
//! Turns one frame of mono 16-bit PCM into a single dominant-frequency
//! estimate by picking the strongest bin of its Hann-windowed spectrum.
//!
//! The estimator is instantaneous and monophonic: there is no smoothing
//! across frames, no octave correction and no voicing detection beyond
//! rejecting a spectrum whose strongest bin is DC.

use crate::fft::{peak_bin, SpectrumAnalyzer};

/// Estimates the dominant frequency of `samples` in Hz.
///
/// Plans a fresh FFT for the frame length on every call; prefer
/// [`PitchEstimator`] on the capture path.
///
/// # Returns
/// * The frequency of the strongest non-DC bin
/// * `0.0` for an empty frame, silence, or a frame dominated by DC
pub fn estimate_pitch(samples: &[i16], sample_rate: u32) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    PitchEstimator::new(samples.len(), sample_rate).estimate(samples)
}

/// A reusable estimator for fixed-size frames.
pub struct PitchEstimator {
    analyzer: SpectrumAnalyzer,
    sample_rate: u32,
    signal: Vec<f64>,
}

impl PitchEstimator {
    pub fn new(frame_size: usize, sample_rate: u32) -> Self {
        Self {
            analyzer: SpectrumAnalyzer::new(frame_size),
            sample_rate,
            signal: Vec::with_capacity(frame_size),
        }
    }

    pub fn frame_size(&self) -> usize {
        self.analyzer.frame_len()
    }

    /// Width of one spectrum bin in Hz, the resolution of every estimate.
    pub fn bin_width(&self) -> f64 {
        match self.frame_size() {
            0 => 0.0,
            n => self.sample_rate as f64 / n as f64,
        }
    }

    /// Estimates the dominant frequency of one frame.
    ///
    /// Frames shorter than the configured size are undersized and yield
    /// `0.0`. Longer frames are cut down to their first `frame_size` samples.
    pub fn estimate(&mut self, frame: &[i16]) -> f64 {
        let n = self.frame_size();
        if n == 0 || frame.len() < n {
            return 0.0;
        }

        self.signal.clear();
        self.signal.extend(frame[..n].iter().map(|&s| s as f64));
        let magnitudes = self.analyzer.magnitudes(&self.signal);

        match peak_bin(&magnitudes) {
            Some(bin) if bin > 0 => bin as f64 * self.sample_rate as f64 / n as f64,
            _ => 0.0,
        }
    }
}

//! # Fast Fourier Transform (FFT) Module
//!
//! Windowing and magnitude-spectrum helpers for the pitch estimator.
//!
//! ## Features
//! - High-performance FFT using RustFFT, planned once per frame size
//! - Symmetric Hann windowing for reduced spectral leakage
//! - One-sided magnitude spectrum of a real signal (bins 0..=N/2)

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::f64::consts::PI;
use std::sync::Arc;

/// Builds a symmetric Hann window of length `n`.
///
/// A window of length 1 is the single coefficient 1.0, the same convention
/// numerical libraries use, so a one-sample frame is not zeroed out.
pub fn hann_window(n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![1.0],
        _ => {
            let n_minus_1 = (n - 1) as f64;
            (0..n)
                .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / n_minus_1).cos())
                .collect()
        }
    }
}

/// A forward FFT planned for one frame length, plus its window.
///
/// Planning is the expensive part of RustFFT, so the capture path keeps one
/// of these alive instead of planning per frame.
pub struct SpectrumAnalyzer {
    fft: Arc<dyn Fft<f64>>,
    window: Vec<f64>,
    scratch: Vec<Complex<f64>>,
}

impl SpectrumAnalyzer {
    pub fn new(frame_len: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(frame_len);
        Self {
            fft,
            window: hann_window(frame_len),
            scratch: Vec::with_capacity(frame_len),
        }
    }

    pub fn frame_len(&self) -> usize {
        self.window.len()
    }

    /// Windows `signal` and returns the magnitudes of its one-sided spectrum.
    ///
    /// The result has `N/2 + 1` bins where bin `k` is `k * sample_rate / N` Hz.
    /// Returns an empty vector if `signal` is not exactly `frame_len` long.
    pub fn magnitudes(&mut self, signal: &[f64]) -> Vec<f64> {
        let n = self.frame_len();
        if n == 0 || signal.len() != n {
            return Vec::new();
        }

        self.scratch.clear();
        self.scratch.extend(
            signal
                .iter()
                .zip(&self.window)
                .map(|(&sample, &w)| Complex { re: sample * w, im: 0.0 }),
        );
        self.fft.process(&mut self.scratch);

        self.scratch
            .iter()
            .take(n / 2 + 1)
            .map(|c| c.norm()) // .norm() is sqrt(re^2 + im^2)
            .collect()
    }
}

/// Index of the largest value, preferring the first on ties.
pub fn peak_bin(magnitudes: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &m) in magnitudes.iter().enumerate() {
        match best {
            Some((_, best_m)) if !(m > best_m) => {}
            _ => best = Some((i, m)),
        }
    }
    best.map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hann_window_is_symmetric_and_tapered() {
        let w = hann_window(8);
        assert_eq!(w.len(), 8);
        assert!(w[0].abs() < 1e-12);
        assert!(w[7].abs() < 1e-12);
        for i in 0..4 {
            assert!((w[i] - w[7 - i]).abs() < 1e-12);
        }
        assert_eq!(hann_window(1), vec![1.0]);
        assert!(hann_window(0).is_empty());
    }

    #[test]
    fn spectrum_has_one_sided_length() {
        let mut analyzer = SpectrumAnalyzer::new(16);
        let mags = analyzer.magnitudes(&[1.0; 16]);
        assert_eq!(mags.len(), 9);
        assert_eq!(peak_bin(&mags), Some(0));
        assert!(analyzer.magnitudes(&[1.0; 8]).is_empty());
    }

    #[test]
    fn peak_prefers_first_maximum() {
        assert_eq!(peak_bin(&[0.0, 0.0, 0.0]), Some(0));
        assert_eq!(peak_bin(&[1.0, 3.0, 3.0]), Some(1));
        assert_eq!(peak_bin(&[]), None);
    }
}

//! # Audio Capture Module
//!
//! Microphone capture using CPAL (Cross-Platform Audio Library) plus the
//! PCM conversions the pitch estimator needs.
//!
//! ## Features
//! - Default input device selection with the closest supported sample rate
//! - Down-mix to mono by keeping the first channel
//! - Fixed-size `i16` frames handed over with a non-blocking `try_send`
//! - Little-endian 16-bit PCM byte decoding

use anyhow::{anyhow, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SupportedStreamConfigRange;
use crossbeam_channel::{Sender, TrySendError};
use log::{error, info, trace};

/// Decodes little-endian signed 16-bit PCM. A trailing odd byte is ignored.
pub fn pcm16_from_le_bytes(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Converts a device sample in `[-1.0, 1.0]` to signed 16-bit PCM.
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

/// Cuts an arbitrary stream of samples into fixed-size frames.
#[derive(Debug, Clone)]
pub struct FrameAssembler {
    frame_size: usize,
    buffer: Vec<i16>,
}

impl FrameAssembler {
    pub fn new(frame_size: usize) -> Self {
        Self {
            frame_size,
            buffer: Vec::with_capacity(frame_size * 2),
        }
    }

    /// Appends samples and returns every frame completed by them.
    pub fn push(&mut self, samples: impl IntoIterator<Item = i16>) -> Vec<Vec<i16>> {
        self.buffer.extend(samples);
        if self.frame_size == 0 {
            self.buffer.clear();
            return Vec::new();
        }

        let mut frames = Vec::new();
        while self.buffer.len() >= self.frame_size {
            frames.push(self.buffer.drain(..self.frame_size).collect());
        }
        frames
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

/// Starts capture from the default input device.
///
/// Every completed frame is sent with `try_send`; when the channel is full
/// the frame is dropped so the device callback never blocks.
///
/// # Returns
/// * `Ok((stream, sample_rate))` - Running stream handle and its sample rate
/// * `Err(e)` - No device, no usable f32 format, or the stream failed to start
pub fn start_capture(
    sender: Sender<Vec<i16>>,
    target_rate: u32,
    frame_size: usize,
) -> Result<(cpal::Stream, u32)> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| anyhow!("No input device available"))?;

    info!("Using audio input device: {}", device.name()?);

    let configs = device.supported_input_configs()?.collect::<Vec<_>>();
    let supported_config = find_supported_config(configs, target_rate)
        .ok_or_else(|| anyhow!("No suitable f32 input format found"))?;

    let sample_rate = cpal::SampleRate(
        target_rate.clamp(
            supported_config.min_sample_rate().0,
            supported_config.max_sample_rate().0,
        ),
    );
    let config = supported_config.with_sample_rate(sample_rate);
    let sample_rate_val = config.sample_rate().0;
    let channels = config.channels().max(1) as usize;
    let config: cpal::StreamConfig = config.into();

    info!(
        "Selected sample rate: {} Hz, {} channel(s), {}-sample frames",
        sample_rate_val, channels, frame_size
    );

    let err_fn = |err| error!("An error occurred on the audio stream: {}", err);
    let mut assembler = FrameAssembler::new(frame_size);

    let stream = device.build_input_stream(
        &config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            let mono = data.iter().step_by(channels).map(|&s| f32_to_i16(s));
            for frame in assembler.push(mono) {
                if let Err(TrySendError::Full(_)) = sender.try_send(frame) {
                    trace!("Frame channel full, dropping frame");
                }
            }
        },
        err_fn,
        None,
    )?;

    stream.play()?;

    Ok((stream, sample_rate_val))
}

/// Picks the f32 input configuration whose rate range is closest to the
/// target, preferring fewer channels.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| c.sample_format() == cpal::SampleFormat::F32)
        .min_by_key(|c| {
            let min = c.min_sample_rate().0;
            let max = c.max_sample_rate().0;
            let distance = if target_rate < min {
                min - target_rate
            } else {
                target_rate.saturating_sub(max)
            };
            (distance, c.channels())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_little_endian_pcm() {
        let bytes = [0x01, 0x00, 0xff, 0xff, 0x00, 0x80, 0x7f];
        assert_eq!(pcm16_from_le_bytes(&bytes), vec![1, -1, i16::MIN]);
        assert!(pcm16_from_le_bytes(&[]).is_empty());
    }

    #[test]
    fn float_samples_are_clamped() {
        assert_eq!(f32_to_i16(0.0), 0);
        assert_eq!(f32_to_i16(1.0), i16::MAX);
        assert_eq!(f32_to_i16(-2.0), -i16::MAX);
    }

    #[test]
    fn assembler_emits_whole_frames() {
        let mut assembler = FrameAssembler::new(4);
        assert!(assembler.push([1, 2, 3]).is_empty());
        let frames = assembler.push([4, 5, 6, 7, 8, 9]);
        assert_eq!(frames, vec![vec![1, 2, 3, 4], vec![5, 6, 7, 8]]);
        assert_eq!(assembler.pending(), 1);
    }
}

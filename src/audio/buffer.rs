//! # Audio Buffer
//!
//! The in-memory waveform every stage after decoding works on: mono 32-bit float samples
//! at a known sample rate.
//!
//! ## Invariants:
//! - **Sample rate**: always greater than zero (enforced by [`AudioBuffer::new`])
//! - **Channels**: always mono; multi-channel input is averaged down before a buffer exists
//! - **Range**: samples are nominally in `[-1.0, 1.0]`

/// Mono `f32` audio at a fixed sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AudioBuffer {
    /// Create a buffer, or `None` when `sample_rate` is zero.
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Option<Self> {
        if sample_rate == 0 {
            return None;
        }
        Some(Self {
            samples,
            sample_rate,
        })
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds: `sample_count / sample_rate`.
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Largest absolute sample value (0.0 for an empty buffer).
    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0f32, |peak, s| peak.max(s.abs()))
    }
}

/// Average interleaved multi-channel samples down to mono.
///
/// Every channel gets equal weight. A trailing partial frame (fewer samples than
/// `channels`) is dropped.
pub fn downmix_to_mono(interleaved: Vec<f32>, channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved;
    }

    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

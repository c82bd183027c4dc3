//! # Audio Normalizer
//!
//! Brings decoded audio to the sample rate a transcription request asked for using
//! band-limited sinc interpolation from `rubato`.
//!
//! ## Contract:
//! - Output rate equals the requested target rate
//! - Output length is `round(input_len * target / source)` (at least one sample)
//! - Output sample `n` lines up with source time `n / target` (resampler latency is measured and removed)
//! - Equal source and target rates return the buffer untouched

use rubato::{
    ResampleResult, Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use tracing::debug;

use super::buffer::AudioBuffer;
use super::error::NormalizeError;

const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Resamples mono audio to a target rate.
#[derive(Debug, Clone)]
pub struct AudioNormalizer {
    chunk_size: usize,
    sinc_len: usize,
    f_cutoff: f32,
    oversampling_factor: usize,
}

impl Default for AudioNormalizer {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            sinc_len: 256,
            f_cutoff: 0.95,
            oversampling_factor: 256,
        }
    }
}

impl AudioNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resample `audio` to `target_rate`.
    pub fn normalize(&self, audio: AudioBuffer, target_rate: u32) -> Result<AudioBuffer, NormalizeError> {
        if target_rate == 0 {
            return Err(NormalizeError::UnsupportedRate(target_rate));
        }

        let source_rate = audio.sample_rate();
        if source_rate == target_rate {
            return Ok(audio);
        }

        let resampled = self.resample(audio.samples(), source_rate, target_rate)?;
        debug!(
            from = source_rate,
            to = target_rate,
            input_samples = audio.len(),
            output_samples = resampled.len(),
            "Resampled audio"
        );

        AudioBuffer::new(resampled, target_rate).ok_or(NormalizeError::UnsupportedRate(target_rate))
    }

    fn resample(&self, input: &[f32], from: u32, to: u32) -> Result<Vec<f32>, NormalizeError> {
        let resampler_error = |source: Box<dyn std::error::Error + Send + Sync>| NormalizeError::Resampler {
            from,
            to,
            source,
        };

        let ratio = to as f64 / from as f64;
        let expected = ((input.len() as f64 * ratio).round() as usize).max(1);

        let params = SincInterpolationParameters {
            sinc_len: self.sinc_len,
            f_cutoff: self.f_cutoff,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: self.oversampling_factor,
            window: WindowFunction::BlackmanHarris2,
        };

        let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, self.chunk_size, 1)
            .map_err(|e| resampler_error(Box::new(e)))?;

        let latency = measure_latency(&mut resampler, ratio).map_err(|e| resampler_error(Box::new(e)))?;
        resampler.reset();

        let mut output: Vec<f32> = Vec::with_capacity(expected + latency);
        let mut position = 0;

        // Keep feeding (zero-padded past the end) until the delayed tail has been flushed.
        while output.len() < expected + latency {
            let needed = resampler.input_frames_next();
            let mut chunk = vec![0.0f32; needed];
            if position < input.len() {
                let end = (position + needed).min(input.len());
                chunk[..end - position].copy_from_slice(&input[position..end]);
            }
            position += needed;

            let processed = resampler
                .process(&[chunk], None)
                .map_err(|e| resampler_error(Box::new(e)))?;
            output.extend_from_slice(&processed[0]);
        }

        output.drain(..latency);
        output.truncate(expected);
        Ok(output)
    }
}

/// Output samples by which the resampler lags its input, found by pushing a unit step
/// through one chunk and locating the half-height crossing.
///
/// The resampler is left dirty; callers reset it before real use.
fn measure_latency(resampler: &mut SincFixedIn<f32>, ratio: f64) -> ResampleResult<usize> {
    let needed = resampler.input_frames_next();
    let step_at = needed / 2;
    let mut chunk = vec![0.0f32; needed];
    chunk[step_at..].fill(1.0);

    let processed = resampler.process(&[chunk], None)?;
    let response = &processed[0];

    let Some(k) = response.iter().position(|&y| y >= 0.5) else {
        return Ok(0);
    };
    if k == 0 {
        return Ok(0);
    }

    let (before, after) = (response[k - 1] as f64, response[k] as f64);
    let crossing = (k - 1) as f64 + (0.5 - before) / (after - before);
    // A band-limited step from sample `step_at` is half-way up half a sample earlier.
    let ideal = (step_at as f64 - 0.5) * ratio;

    Ok((crossing - ideal).round().max(0.0) as usize)
}

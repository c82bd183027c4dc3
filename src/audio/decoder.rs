//! # Audio Decoder
//!
//! Turns raw encoded bytes into an [`AudioBuffer`] by trying an ordered list of
//! decode strategies until one of them accepts the payload.
//!
//! ## Strategy Order:
//! 1. [`WavStrategy`]: fast path for RIFF/WAVE PCM (8/16/24-bit integer, 32-bit float)
//! 2. [`SymphoniaStrategy`]: general container probe (mp3, flac, m4a/aac, ogg/vorbis, wav)
//!
//! Decoding happens at the file's native sample rate. Multi-channel audio is averaged
//! down to mono; the native channel count is reported alongside the buffer.
//!
//! ## Rust Concepts:
//! - **Trait objects**: `Vec<Box<dyn DecodeStrategy>>` keeps the fallback chain open for extension
//! - **Panic isolation**: `catch_unwind` turns a codec panic into an ordinary strategy failure

use std::io::Cursor;
use std::panic::{self, AssertUnwindSafe};

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};
use wav::BitDepth;

use super::buffer::{downmix_to_mono, AudioBuffer};
use super::error::{AudioError, BoxError, DecodeError, StrategyFailure};
use super::format::AudioFormat;

/// Output of a successful decode.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// Mono audio at the file's native sample rate.
    pub audio: AudioBuffer,
    /// Channel count of the encoded stream before downmixing.
    pub native_channels: usize,
}

/// One way of turning bytes into samples.
pub trait DecodeStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn decode(&self, bytes: &[u8], hint: AudioFormat) -> Result<DecodedAudio, BoxError>;
}

/// RIFF/WAVE reader backed by the `wav` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct WavStrategy;

impl DecodeStrategy for WavStrategy {
    fn name(&self) -> &'static str {
        "wav"
    }

    fn decode(&self, bytes: &[u8], _hint: AudioFormat) -> Result<DecodedAudio, BoxError> {
        let mut cursor = Cursor::new(bytes);
        let (header, data) = wav::read(&mut cursor)?;

        let channels = header.channel_count as usize;
        if channels == 0 {
            return Err("WAV header declares zero channels".into());
        }

        let interleaved: Vec<f32> = match data {
            BitDepth::Eight(samples) => samples
                .into_iter()
                .map(|s| (s as f32 - 128.0) / 128.0)
                .collect(),
            BitDepth::Sixteen(samples) => samples.into_iter().map(|s| s as f32 / 32_768.0).collect(),
            BitDepth::TwentyFour(samples) => samples
                .into_iter()
                .map(|s| s as f32 / 8_388_608.0)
                .collect(),
            BitDepth::ThirtyTwoFloat(samples) => samples,
            BitDepth::Empty => return Err("WAV data chunk is empty".into()),
        };

        assemble(interleaved, channels, header.sampling_rate)
    }
}

/// General-purpose decoder backed by symphonia's format probe.
#[derive(Debug, Default, Clone, Copy)]
pub struct SymphoniaStrategy;

impl DecodeStrategy for SymphoniaStrategy {
    fn name(&self) -> &'static str {
        "symphonia"
    }

    fn decode(&self, bytes: &[u8], hint: AudioFormat) -> Result<DecodedAudio, BoxError> {
        let source = Cursor::new(bytes.to_vec());
        let stream = MediaSourceStream::new(Box::new(source), Default::default());

        let mut probe_hint = Hint::new();
        probe_hint.with_extension(hint.extension());

        let probed = symphonia::default::get_probe().format(
            &probe_hint,
            stream,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )?;
        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or("no decodable audio track found")?;
        let track_id = track.id;
        let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
        let mut channels = track
            .codec_params
            .channels
            .map(|c| c.count())
            .unwrap_or(0);

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())?;

        let mut interleaved: Vec<f32> = Vec::new();
        let mut sample_buf: Option<SampleBuffer<f32>> = None;

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    break;
                }
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => return Err(e.into()),
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!(error = %e, "Skipping undecodable audio frame");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let spec = *decoded.spec();
            if sample_rate == 0 {
                sample_rate = spec.rate;
            }
            if channels == 0 {
                channels = spec.channels.count();
            }

            let buf = sample_buf.get_or_insert_with(|| {
                SampleBuffer::<f32>::new(decoded.capacity() as u64, spec)
            });
            if buf.capacity() < decoded.capacity() * spec.channels.count() {
                *buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            }
            buf.copy_interleaved_ref(decoded);
            interleaved.extend_from_slice(buf.samples());
        }

        if channels == 0 {
            return Err("stream does not report a channel layout".into());
        }

        assemble(interleaved, channels, sample_rate)
    }
}

fn assemble(interleaved: Vec<f32>, channels: usize, sample_rate: u32) -> Result<DecodedAudio, BoxError> {
    let mono = downmix_to_mono(interleaved, channels);
    if mono.is_empty() {
        return Err("stream contains no audio samples".into());
    }

    let audio = AudioBuffer::new(mono, sample_rate).ok_or("stream reports a sample rate of 0")?;
    Ok(DecodedAudio {
        audio,
        native_channels: channels,
    })
}

/// Ordered fallback chain of decode strategies.
pub struct AudioDecoder {
    strategies: Vec<Box<dyn DecodeStrategy>>,
}

impl Default for AudioDecoder {
    fn default() -> Self {
        Self::new(vec![Box::new(WavStrategy), Box::new(SymphoniaStrategy)])
    }
}

impl AudioDecoder {
    pub fn new(strategies: Vec<Box<dyn DecodeStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Decode `bytes` with the first strategy that accepts them.
    ///
    /// Fails with [`AudioError::EmptyPayload`] for zero bytes, and with
    /// [`AudioError::Decode`] carrying every attempt when all strategies reject the payload.
    pub fn decode(&self, bytes: &[u8], hint: AudioFormat) -> Result<DecodedAudio, AudioError> {
        if bytes.is_empty() {
            return Err(AudioError::EmptyPayload);
        }

        let mut attempts = Vec::with_capacity(self.strategies.len());

        for strategy in &self.strategies {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| strategy.decode(bytes, hint)))
                .unwrap_or_else(|_| Err(format!("{} decoder panicked", strategy.name()).into()));

            match outcome {
                Ok(decoded) => {
                    debug!(
                        strategy = strategy.name(),
                        sample_rate = decoded.audio.sample_rate(),
                        channels = decoded.native_channels,
                        samples = decoded.audio.len(),
                        "Decoded audio payload"
                    );
                    return Ok(decoded);
                }
                Err(cause) => {
                    debug!(strategy = strategy.name(), error = %cause, "Decode strategy rejected payload");
                    attempts.push(StrategyFailure {
                        strategy: strategy.name(),
                        cause,
                    });
                }
            }
        }

        Err(DecodeError::new(attempts).into())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    /// Build a 16-bit PCM RIFF/WAVE file by hand.
    pub fn wav_bytes(sample_rate: u32, channels: u16, interleaved: &[f32]) -> Vec<u8> {
        let data_len = (interleaved.len() * 2) as u32;
        let block_align = channels * 2;
        let mut bytes = Vec::with_capacity(44 + data_len as usize);

        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
        bytes.extend_from_slice(b"WAVE");
        bytes.extend_from_slice(b"fmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&channels.to_le_bytes());
        bytes.extend_from_slice(&sample_rate.to_le_bytes());
        bytes.extend_from_slice(&(sample_rate * block_align as u32).to_le_bytes());
        bytes.extend_from_slice(&block_align.to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_len.to_le_bytes());
        for sample in interleaved {
            let value = (sample.clamp(-1.0, 1.0) * 32_767.0) as i16;
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        bytes
    }

    pub fn sine(frequency: f32, sample_rate: u32, seconds: f32) -> Vec<f32> {
        let count = (sample_rate as f32 * seconds) as usize;
        (0..count)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * frequency * i as f32 / sample_rate as f32).sin())
            .collect()
    }
}

//! # Audio Processing Module
//!
//! Everything between "the client sent some bytes" and "a provider receives a waveform".
//!
//! ## Key Components:
//! - **Format tags**: [`AudioFormat`] hints declared by the client
//! - **Audio Buffer**: mono `f32` samples plus a sample rate
//! - **Decoder**: ordered fallback chain of codec strategies, decoding at the native rate
//! - **Normalizer**: sinc resampling to the requested rate
//!
//! ## Pipeline:
//! ```text
//! bytes ──▶ AudioDecoder ──▶ AudioBuffer (native rate, mono) ──▶ AudioNormalizer ──▶ AudioBuffer (target rate)
//! ```
//!
//! Decode and normalize are CPU-bound; the transcription service runs them on the
//! worker pool rather than on the async runtime.

pub mod buffer; // Mono sample container
pub mod decoder; // Bytes -> samples, with fallback strategies
pub mod error; // Stage-tagged client-input errors
pub mod format; // Declared container/codec tags
pub mod normalizer; // Sample-rate conversion

pub use buffer::AudioBuffer;
pub use decoder::{AudioDecoder, DecodeStrategy, DecodedAudio, SymphoniaStrategy, WavStrategy};
pub use error::{AudioError, BoxError, DecodeError, NormalizeError};
pub use format::AudioFormat;
pub use normalizer::AudioNormalizer;

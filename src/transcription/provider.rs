//! # Transcription Provider Contract
//!
//! A provider wraps one speech-recognition backend (a local model, a remote API, a test
//! double) behind a uniform async interface.
//!
//! ## Contract:
//! - `transcribe` receives audio already decoded and normalized to the request's rate
//! - Backend setup is lazy; the first `transcribe` or an explicit `warm_up` triggers it
//! - `health_check` never fails: any problem is reported as `false`
//! - Implementations are `Send + Sync` and are shared as `Arc<dyn TranscriptionProvider>`

use async_trait::async_trait;
use std::sync::Arc;

use super::error::ProviderError;
use super::lifecycle::ProviderState;
use super::types::{BackendParams, TranscriptionResult};
use crate::audio::AudioBuffer;

#[async_trait]
pub trait TranscriptionProvider: Send + Sync {
    /// Name the provider is known by in results and logs.
    fn name(&self) -> &str;

    /// Current lifecycle state of the backend.
    fn state(&self) -> ProviderState;

    /// Eagerly initialize the backend (idempotent, single-flight).
    async fn warm_up(&self) -> Result<(), ProviderError>;

    /// Transcribe mono audio. `language` is a tag or `"auto"`.
    async fn transcribe(
        &self,
        audio: AudioBuffer,
        language: &str,
        params: Option<&BackendParams>,
    ) -> Result<TranscriptionResult, ProviderError>;

    /// Whether the provider can currently serve requests.
    async fn health_check(&self) -> bool;
}

/// How providers are stored and handed out.
pub type SharedProvider = Arc<dyn TranscriptionProvider>;

//! Deterministic provider with no model behind it.
//!
//! Useful for exercising the HTTP surface and the audio pipeline without downloading
//! weights. The transcript describes the audio it received, or echoes a `"text"` value
//! from the request's backend params.

use async_trait::async_trait;
use serde_json::Value;

use super::error::ProviderError;
use super::lifecycle::ProviderState;
use super::provider::TranscriptionProvider;
use super::types::{BackendParams, TranscriptionResult};
use crate::audio::AudioBuffer;

pub struct MockProvider {
    name: String,
}

impl MockProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl TranscriptionProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> ProviderState {
        ProviderState::Ready
    }

    async fn warm_up(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn transcribe(
        &self,
        audio: AudioBuffer,
        language: &str,
        params: Option<&BackendParams>,
    ) -> Result<TranscriptionResult, ProviderError> {
        let duration = audio.duration_secs();
        let text = params
            .and_then(|p| p.get("text"))
            .and_then(Value::as_str)
            .map(str::to_owned)
            .unwrap_or_else(|| {
                format!(
                    "{:.2} seconds of audio at {} Hz",
                    duration,
                    audio.sample_rate()
                )
            });

        Ok(TranscriptionResult::single_segment(
            text,
            duration,
            Some(1.0),
            self.name.as_str(),
            Some(language.to_string()),
            Some(audio.sample_rate()),
        ))
    }

    async fn health_check(&self) -> bool {
        true
    }
}

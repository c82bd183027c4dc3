//! Test doubles for provider lifecycle and fan-out behaviour.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::error::ProviderError;
use super::lifecycle::{LazyBackend, ProviderState};
use super::provider::TranscriptionProvider;
use super::types::{BackendParams, TranscriptionResult};
use crate::audio::AudioBuffer;

/// Provider with a slow lazy backend that counts its initialization attempts.
///
/// The first `failures` attempts fail, later ones succeed.
pub struct CountingProvider {
    name: String,
    backend: LazyBackend<String>,
    init_calls: Arc<AtomicUsize>,
    failures: usize,
    delay: Duration,
}

impl CountingProvider {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            backend: LazyBackend::new(name),
            init_calls: Arc::new(AtomicUsize::new(0)),
            failures: 0,
            delay: Duration::from_millis(100),
        }
    }

    pub fn failing_first(mut self, failures: usize) -> Self {
        self.failures = failures;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn always_failing(self) -> Self {
        self.failing_first(usize::MAX)
    }

    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    async fn load(&self) -> Result<Arc<String>, ProviderError> {
        let calls = Arc::clone(&self.init_calls);
        let failures = self.failures;
        let delay = self.delay;
        let name = self.name.clone();

        self.backend
            .get_or_init(move || async move {
                let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
                tokio::time::sleep(delay).await;
                if attempt <= failures {
                    anyhow::bail!("{} backend unavailable (attempt {})", name, attempt);
                }
                Ok(format!("{} transcript", name))
            })
            .await
    }
}

#[async_trait]
impl TranscriptionProvider for CountingProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> ProviderState {
        self.backend.state()
    }

    async fn warm_up(&self) -> Result<(), ProviderError> {
        self.load().await.map(|_| ())
    }

    async fn transcribe(
        &self,
        audio: AudioBuffer,
        language: &str,
        _params: Option<&BackendParams>,
    ) -> Result<TranscriptionResult, ProviderError> {
        let text = self.load().await?;
        Ok(TranscriptionResult::single_segment(
            text.as_str(),
            audio.duration_secs(),
            Some(0.9),
            self.name.as_str(),
            Some(language.to_string()),
            Some(audio.sample_rate()),
        ))
    }

    async fn health_check(&self) -> bool {
        self.load().await.is_ok()
    }
}

/// Provider whose health check panics.
pub struct PanickingProvider;

#[async_trait]
impl TranscriptionProvider for PanickingProvider {
    fn name(&self) -> &str {
        "panicking"
    }

    fn state(&self) -> ProviderState {
        ProviderState::Ready
    }

    async fn warm_up(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn transcribe(
        &self,
        _audio: AudioBuffer,
        _language: &str,
        _params: Option<&BackendParams>,
    ) -> Result<TranscriptionResult, ProviderError> {
        Err(ProviderError::backend("panicking", "not implemented"))
    }

    async fn health_check(&self) -> bool {
        panic!("health probe crashed")
    }
}

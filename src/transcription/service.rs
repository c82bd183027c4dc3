//! # Transcription Service
//!
//! The single entry point for turning a [`TranscriptionRequest`] into a
//! [`TranscriptionResult`].
//!
//! ## Request Flow:
//! 1. Resolve the provider (named, or the registry default)
//! 2. Validate the payload (non-empty, within the byte limit)
//! 3. Decode at the native rate on the worker pool and enforce the duration limit
//! 4. Normalize to the requested rate on the worker pool
//! 5. Hand the canonical audio to the provider
//!
//! Decode/normalize failures come back as [`TranscriptionError::ClientInput`]; provider and
//! worker failures come back as server-side errors.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures_util::future::join_all;
use futures_util::FutureExt;
use tracing::{debug, info, warn};

use super::error::{ProviderError, TranscriptionError};
use super::lifecycle::ProviderState;
use super::provider::TranscriptionProvider;
use super::registry::{ProviderRegistry, RegistrySummary};
use super::types::{TranscriptionRequest, TranscriptionResult};
use crate::audio::{AudioDecoder, AudioError, AudioNormalizer};
use crate::worker_pool::WorkerPool;

/// Input limits enforced before audio reaches a provider.
#[derive(Debug, Clone, Copy)]
pub struct ServiceLimits {
    pub max_payload_bytes: usize,
    pub max_audio_duration_secs: f64,
}

impl Default for ServiceLimits {
    fn default() -> Self {
        Self {
            max_payload_bytes: 50 * 1024 * 1024,
            max_audio_duration_secs: 300.0,
        }
    }
}

pub struct TranscriptionService {
    registry: ProviderRegistry,
    decoder: Arc<AudioDecoder>,
    normalizer: AudioNormalizer,
    pool: WorkerPool,
    limits: ServiceLimits,
}

impl TranscriptionService {
    pub fn new(registry: ProviderRegistry, pool: WorkerPool, limits: ServiceLimits) -> Self {
        Self {
            registry,
            decoder: Arc::new(AudioDecoder::default()),
            normalizer: AudioNormalizer::default(),
            pool,
            limits,
        }
    }

    /// Replace the default decode chain.
    pub fn with_decoder(mut self, decoder: AudioDecoder) -> Self {
        self.decoder = Arc::new(decoder);
        self
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn limits(&self) -> ServiceLimits {
        self.limits
    }

    pub fn worker_pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Run one request through decode, normalize and the chosen provider.
    pub async fn transcribe(
        &self,
        request: TranscriptionRequest,
        provider_name: Option<&str>,
    ) -> Result<TranscriptionResult, TranscriptionError> {
        let (name, provider) = self.registry.resolve(provider_name)?;

        let TranscriptionRequest {
            audio,
            format,
            sample_rate,
            language,
            params,
        } = request;

        if audio.is_empty() {
            return Err(AudioError::EmptyPayload.into());
        }
        if audio.len() > self.limits.max_payload_bytes {
            return Err(AudioError::PayloadTooLarge {
                size: audio.len(),
                limit: self.limits.max_payload_bytes,
            }
            .into());
        }

        let started = Instant::now();
        let payload_bytes = audio.len();

        let decoder = Arc::clone(&self.decoder);
        let decoded = self
            .pool
            .run("decode", move || decoder.decode(&audio, format))
            .await??;

        let duration_secs = decoded.audio.duration_secs();
        if duration_secs > self.limits.max_audio_duration_secs {
            return Err(AudioError::TooLong {
                duration_secs,
                limit_secs: self.limits.max_audio_duration_secs,
            }
            .into());
        }

        debug!(
            provider = %name,
            %format,
            payload_bytes,
            native_rate = decoded.audio.sample_rate(),
            native_channels = decoded.native_channels,
            duration_secs,
            "Decoded request audio"
        );

        let normalizer = self.normalizer.clone();
        let audio = self
            .pool
            .run("normalize", move || normalizer.normalize(decoded.audio, sample_rate))
            .await?
            .map_err(AudioError::from)?;

        let result = provider.transcribe(audio, &language, params.as_ref()).await?;

        info!(
            provider = %name,
            duration_secs,
            segments = result.segments.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Transcription completed"
        );

        Ok(result)
    }

    /// Probe every provider concurrently.
    ///
    /// A provider whose check errors or panics is reported as `false`; it never affects
    /// the other entries.
    pub async fn health_check_all(&self) -> BTreeMap<String, bool> {
        let checks = self.registry.iter().map(|(name, provider)| {
            let name = name.to_string();
            let provider = Arc::clone(provider);
            async move {
                let healthy = AssertUnwindSafe(provider.health_check())
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| {
                        warn!(provider = %name, "Health check panicked");
                        false
                    });
                (name, healthy)
            }
        });

        join_all(checks).await.into_iter().collect()
    }

    /// Initialize every provider's backend concurrently.
    pub async fn warm_up_all(&self) -> Vec<(String, Result<(), ProviderError>)> {
        let warm_ups = self.registry.iter().map(|(name, provider)| {
            let name = name.to_string();
            let provider = Arc::clone(provider);
            async move {
                let outcome = provider.warm_up().await;
                match &outcome {
                    Ok(()) => info!(provider = %name, "Provider warmed up"),
                    Err(e) => warn!(provider = %name, error = %e, "Provider warm-up failed"),
                }
                (name, outcome)
            }
        });

        join_all(warm_ups).await
    }

    /// Lifecycle state of every provider, in registration order.
    pub fn provider_states(&self) -> Vec<(String, ProviderState)> {
        self.registry
            .iter()
            .map(|(name, provider)| (name.to_string(), provider.state()))
            .collect()
    }

    pub fn summary(&self) -> RegistrySummary {
        self.registry.summary()
    }

    /// Registered provider names, in registration order.
    pub fn list_providers(&self) -> Vec<String> {
        self.registry.list()
    }

    pub fn default_provider(&self) -> Option<&str> {
        self.registry.default_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::decoder::test_support::{sine, wav_bytes};
    use crate::audio::AudioFormat;
    use crate::transcription::mock::MockProvider;
    use crate::transcription::provider::SharedProvider;
    use crate::transcription::testing::{CountingProvider, PanickingProvider};
    use serde_json::json;
    use std::time::Duration;

    fn service_with(providers: Vec<SharedProvider>) -> TranscriptionService {
        let mut registry = ProviderRegistry::new();
        for provider in providers {
            registry.register(provider.name().to_string(), provider);
        }
        TranscriptionService::new(registry, WorkerPool::new(4), ServiceLimits::default())
    }

    fn mock(name: &str) -> SharedProvider {
        Arc::new(MockProvider::new(name))
    }

    fn one_second_wav(rate: u32) -> Vec<u8> {
        wav_bytes(rate, 1, &sine(200.0, rate, 1.0))
    }

    #[tokio::test]
    async fn test_transcribes_with_default_provider() {
        let service = service_with(vec![mock("mock")]);
        let request = TranscriptionRequest::new(one_second_wav(16_000));

        let result = service.transcribe(request, None).await.unwrap();
        assert_eq!(result.model, "mock");
        assert_eq!(result.sample_rate, Some(16_000));
        assert!((result.duration - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_lists_providers_in_registration_order() {
        let service = service_with(vec![mock("b"), mock("a")]);
        assert_eq!(service.list_providers(), vec!["b".to_string(), "a".to_string()]);
        assert_eq!(service.default_provider(), Some("b"));

        let empty = service_with(Vec::new());
        assert!(empty.list_providers().is_empty());
        assert_eq!(empty.default_provider(), None);
    }

    #[tokio::test]
    async fn test_language_hint_is_echoed_verbatim() {
        let service = service_with(vec![mock("mock")]);

        let result = service
            .transcribe(TranscriptionRequest::new(one_second_wav(16_000)), None)
            .await
            .unwrap();
        assert_eq!(result.language.as_deref(), Some("auto"));

        let request = TranscriptionRequest::new(one_second_wav(16_000)).with_language("pt-BR");
        let result = service.transcribe(request, None).await.unwrap();
        assert_eq!(result.language.as_deref(), Some("pt-BR"));
    }

    #[tokio::test]
    async fn test_audio_is_normalized_to_requested_rate() {
        let service = service_with(vec![mock("mock")]);
        let request = TranscriptionRequest::new(one_second_wav(44_100)).with_sample_rate(8_000);

        let result = service.transcribe(request, Some("mock")).await.unwrap();
        assert_eq!(result.sample_rate, Some(8_000));
        assert!((result.duration - 1.0).abs() < 1e-3);
    }

    #[tokio::test]
    async fn test_backend_params_reach_provider() {
        let service = service_with(vec![mock("mock")]);
        let params = json!({ "text": "passthrough" }).as_object().cloned();
        let request = TranscriptionRequest::new(one_second_wav(16_000))
            .with_format(AudioFormat::Wav)
            .with_params(params);

        let result = service.transcribe(request, None).await.unwrap();
        assert_eq!(result.text, "passthrough");
    }

    #[tokio::test]
    async fn test_empty_and_garbage_audio_are_client_errors() {
        let service = service_with(vec![mock("mock")]);

        let empty = service.transcribe(TranscriptionRequest::new(Vec::new()), None).await;
        assert!(matches!(empty, Err(TranscriptionError::ClientInput(AudioError::EmptyPayload))));

        let garbage = TranscriptionRequest::new(b"this is not an audio file at all".repeat(4));
        let result = service.transcribe(garbage, None).await;
        assert!(matches!(result, Err(TranscriptionError::ClientInput(AudioError::Decode(_)))));
    }

    #[tokio::test]
    async fn test_zero_sample_rate_is_client_error() {
        let service = service_with(vec![mock("mock")]);
        let request = TranscriptionRequest::new(one_second_wav(16_000)).with_sample_rate(0);

        let result = service.transcribe(request, None).await;
        assert!(matches!(result, Err(TranscriptionError::ClientInput(AudioError::Normalize(_)))));
    }

    #[tokio::test]
    async fn test_limits_are_enforced() {
        let mut registry = ProviderRegistry::new();
        registry.register("mock", Arc::new(MockProvider::new("mock")));
        let limits = ServiceLimits {
            max_payload_bytes: 1_000_000,
            max_audio_duration_secs: 0.5,
        };
        let service = TranscriptionService::new(registry, WorkerPool::new(1), limits);

        let too_long = service
            .transcribe(TranscriptionRequest::new(one_second_wav(16_000)), None)
            .await;
        assert!(matches!(too_long, Err(TranscriptionError::ClientInput(AudioError::TooLong { .. }))));

        let too_big = service
            .transcribe(TranscriptionRequest::new(vec![0u8; 1_000_001]), None)
            .await;
        assert!(matches!(too_big, Err(TranscriptionError::ClientInput(AudioError::PayloadTooLarge { .. }))));
    }

    #[tokio::test]
    async fn test_unknown_provider_is_reported_before_decoding() {
        let service = service_with(vec![mock("mock")]);
        let result = service.transcribe(TranscriptionRequest::new(Vec::new()), Some("ghost")).await;
        assert!(matches!(result, Err(TranscriptionError::UnknownProvider { .. })));
    }

    #[tokio::test]
    async fn test_concurrent_requests_initialize_backend_once() {
        let counting = Arc::new(CountingProvider::new("lazy"));
        let service = Arc::new(service_with(vec![counting.clone() as SharedProvider]));
        let audio = one_second_wav(16_000);

        let requests = (0..16).map(|_| {
            let service = Arc::clone(&service);
            let request = TranscriptionRequest::new(audio.clone());
            async move { service.transcribe(request, None).await }
        });
        let results = join_all(requests).await;

        assert!(results.iter().all(Result::is_ok));
        assert_eq!(counting.init_calls(), 1);
        assert_eq!(counting.state(), ProviderState::Ready);
    }

    #[tokio::test]
    async fn test_failed_initialization_is_shared_then_retried() {
        let counting = Arc::new(
            CountingProvider::new("flaky")
                .failing_first(1)
                .with_delay(Duration::from_millis(300)),
        );
        let service = Arc::new(service_with(vec![counting.clone() as SharedProvider]));
        let audio = one_second_wav(16_000);

        let requests = (0..16).map(|_| {
            let service = Arc::clone(&service);
            let request = TranscriptionRequest::new(audio.clone());
            async move { service.transcribe(request, None).await }
        });
        let results = join_all(requests).await;

        assert_eq!(counting.init_calls(), 1);
        assert!(results.iter().all(|r| matches!(
            r,
            Err(TranscriptionError::Provider(ProviderError::Initialization { .. }))
        )));
        assert!(!results.iter().any(|r| matches!(r, Err(e) if e.is_client_error())));

        let retry = service.transcribe(TranscriptionRequest::new(audio), None).await;
        assert!(retry.is_ok());
        assert_eq!(counting.init_calls(), 2);
    }

    #[tokio::test]
    async fn test_health_check_all_isolates_failures() {
        let service = service_with(vec![
            mock("healthy"),
            Arc::new(CountingProvider::new("failing").always_failing()) as SharedProvider,
            Arc::new(PanickingProvider) as SharedProvider,
        ]);

        let health = service.health_check_all().await;
        assert_eq!(health.len(), 3);
        assert_eq!(health["healthy"], true);
        assert_eq!(health["failing"], false);
        assert_eq!(health["panicking"], false);
    }

    #[tokio::test]
    async fn test_warm_up_all_reports_each_provider() {
        let counting = Arc::new(CountingProvider::new("lazy"));
        let service = service_with(vec![
            counting.clone() as SharedProvider,
            Arc::new(CountingProvider::new("broken").always_failing()) as SharedProvider,
        ]);

        let outcomes = service.warm_up_all().await;
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].1.is_ok());
        assert!(outcomes[1].1.is_err());
        assert_eq!(counting.state(), ProviderState::Ready);

        let states = service.provider_states();
        assert_eq!(states[1], ("broken".to_string(), ProviderState::Failed));
    }
}

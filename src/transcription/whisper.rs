//! # Local Whisper Provider
//!
//! Runs a Candle Whisper checkpoint in-process.
//!
//! ## Behaviour:
//! - Weights are downloaded and loaded lazily on first use (or on warm-up), exactly once
//! - Audio must arrive at 16 kHz; other rates are rejected rather than silently resampled
//! - Long audio is cut into 30 second windows, each window becomes one segment
//! - One inference at a time per provider: the model sits behind a mutex and runs on
//!   the shared worker pool
//!
//! ## Backend Params:
//! - `max_tokens` (integer): decoder token budget per window, default 224

use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use super::error::ProviderError;
use super::lifecycle::{LazyBackend, ProviderState};
use super::model::{ModelSize, WhisperModel, WHISPER_SAMPLE_RATE, WINDOW_SAMPLES};
use super::provider::TranscriptionProvider;
use super::types::{backend_language, BackendParams, TranscriptionResult, TranscriptionSegment};
use crate::audio::AudioBuffer;
use crate::device::{DeviceManager, DevicePreference};
use crate::worker_pool::WorkerPool;

const DEFAULT_MAX_TOKENS: usize = 224;

pub struct WhisperProvider {
    name: String,
    size: ModelSize,
    device: DevicePreference,
    pool: WorkerPool,
    backend: LazyBackend<Mutex<WhisperModel>>,
}

impl WhisperProvider {
    pub fn new(name: impl Into<String>, size: ModelSize, device: DevicePreference, pool: WorkerPool) -> Self {
        let name = name.into();
        Self {
            backend: LazyBackend::new(name.clone()),
            name,
            size,
            device,
            pool,
        }
    }

    pub fn model_size(&self) -> ModelSize {
        self.size
    }

    async fn model(&self) -> Result<Arc<Mutex<WhisperModel>>, ProviderError> {
        let size = self.size;
        let preference = self.device;

        self.backend
            .get_or_init(move || async move {
                let device = DeviceManager::get_device(preference);
                debug!(device = %DeviceManager::get_device_info(&device), "Selected inference device");
                let model = WhisperModel::load(size, device).await?;
                Ok(Mutex::new(model))
            })
            .await
    }
}

#[async_trait]
impl TranscriptionProvider for WhisperProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> ProviderState {
        self.backend.state()
    }

    async fn warm_up(&self) -> Result<(), ProviderError> {
        self.model().await.map(|_| ())
    }

    async fn transcribe(
        &self,
        audio: AudioBuffer,
        language: &str,
        params: Option<&BackendParams>,
    ) -> Result<TranscriptionResult, ProviderError> {
        if audio.sample_rate() != WHISPER_SAMPLE_RATE {
            return Err(ProviderError::backend(
                &self.name,
                anyhow!(
                    "Whisper expects {} Hz audio, got {} Hz",
                    WHISPER_SAMPLE_RATE,
                    audio.sample_rate()
                ),
            ));
        }

        let model = self.model().await?;
        let max_tokens = params
            .and_then(|p| p.get("max_tokens"))
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_MAX_TOKENS);
        let window_language = backend_language(language);
        let duration = audio.duration_secs();
        let samples = audio.into_samples();

        let segments = self
            .pool
            .run("whisper inference", move || -> anyhow::Result<Vec<TranscriptionSegment>> {
                let mut model = model
                    .lock()
                    .map_err(|_| anyhow!("Whisper model lock poisoned by an earlier panic"))?;
                let rate = WHISPER_SAMPLE_RATE as f64;

                let mut segments = Vec::new();
                for (index, window) in samples.chunks(WINDOW_SAMPLES).enumerate() {
                    let start = (index * WINDOW_SAMPLES) as f64 / rate;
                    let end = start + window.len() as f64 / rate;

                    let transcript = model.transcribe_window(window, window_language.as_deref(), max_tokens)?;
                    if transcript.text.is_empty() {
                        continue;
                    }
                    segments.push(TranscriptionSegment::new(start, end, transcript.text, transcript.confidence));
                }
                Ok(segments)
            })
            .await
            .map_err(|e| ProviderError::backend(&self.name, e))?
            .map_err(|e| ProviderError::backend(&self.name, e))?;

        Ok(TranscriptionResult::from_segments(
            segments,
            duration,
            self.name.as_str(),
            Some(language.to_string()),
            Some(WHISPER_SAMPLE_RATE),
        ))
    }

    async fn health_check(&self) -> bool {
        match self.model().await {
            Ok(_) => true,
            Err(e) => {
                warn!(provider = %self.name, error = %e, "Whisper health check failed");
                false
            }
        }
    }
}

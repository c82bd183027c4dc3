//! # Remote Whisper Provider
//!
//! Delegates transcription to an OpenAI-compatible `/audio/transcriptions` endpoint.
//!
//! ## Request Shape:
//! - Audio is re-encoded as 16-bit PCM WAV at the normalized rate
//! - `response_format=verbose_json` so segment timings come back
//! - `language` is sent unless it is `"auto"`
//! - Scalar backend params are forwarded as extra form fields (`model` overrides the
//!   configured model)
//!
//! ## Retries:
//! Connection failures, timeouts, HTTP 429 and HTTP 5xx are retried once after a short pause.
//! Other failures are returned immediately.

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::io::Cursor;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::error::ProviderError;
use super::lifecycle::{LazyBackend, ProviderState};
use super::provider::TranscriptionProvider;
use super::types::{backend_language, BackendParams, TranscriptionResult, TranscriptionSegment};
use crate::audio::AudioBuffer;
use crate::worker_pool::WorkerPool;

const MAX_ATTEMPTS: usize = 2;
const RETRY_DELAY: Duration = Duration::from_millis(500);
const WAV_FORMAT_PCM: u16 = 1;
const RESERVED_FIELDS: [&str; 2] = ["file", "response_format"];

/// Connection settings for an OpenAI-compatible transcription API.
#[derive(Debug, Clone)]
pub struct RemoteOptions {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout: Duration,
}

pub struct RemoteWhisperProvider {
    name: String,
    options: RemoteOptions,
    client: LazyBackend<Client>,
    pool: WorkerPool,
}

impl RemoteWhisperProvider {
    pub fn new(name: impl Into<String>, mut options: RemoteOptions, pool: WorkerPool) -> Self {
        let name = name.into();
        options.base_url = options.base_url.trim_end_matches('/').to_string();
        Self {
            client: LazyBackend::new(name.clone()),
            name,
            options,
            pool,
        }
    }

    async fn client(&self) -> Result<std::sync::Arc<Client>, ProviderError> {
        let timeout = self.options.timeout;
        let base_url = self.options.base_url.clone();

        self.client
            .get_or_init(move || async move {
                reqwest::Url::parse(&base_url).with_context(|| format!("Invalid base URL '{}'", base_url))?;
                let client = Client::builder()
                    .timeout(timeout)
                    .build()
                    .context("Failed to build HTTP client")?;
                Ok(client)
            })
            .await
    }

    fn build_form(
        &self,
        wav: Vec<u8>,
        language: Option<&str>,
        params: Option<&BackendParams>,
    ) -> anyhow::Result<Form> {
        let file = Part::bytes(wav)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .context("Invalid audio MIME type")?;

        let mut model = self.options.model.clone();
        let mut extra = Vec::new();
        for (key, value) in params.into_iter().flatten() {
            if RESERVED_FIELDS.contains(&key.as_str()) {
                debug!(field = %key, "Ignoring reserved backend param");
                continue;
            }
            let Some(text) = form_value(value) else {
                debug!(field = %key, "Ignoring non-scalar backend param");
                continue;
            };
            if key == "model" {
                model = text;
            } else {
                extra.push((key.clone(), text));
            }
        }

        let mut form = Form::new()
            .text("model", model)
            .text("response_format", "verbose_json")
            .part("file", file);
        if let Some(language) = language {
            form = form.text("language", language.to_string());
        }
        for (key, value) in extra {
            form = form.text(key, value);
        }
        Ok(form)
    }

    async fn request(
        &self,
        client: &Client,
        wav: &[u8],
        language: Option<&str>,
        params: Option<&BackendParams>,
    ) -> Result<VerboseTranscription, Attempt> {
        let url = format!("{}/audio/transcriptions", self.options.base_url);
        let form = self
            .build_form(wav.to_vec(), language, params)
            .map_err(Attempt::Fatal)?;

        let mut builder = client.post(&url).multipart(form);
        if let Some(key) = &self.options.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            let retryable = e.is_connect() || e.is_timeout();
            let error = anyhow!(e).context(format!("Request to {} failed", url));
            if retryable {
                Attempt::Retryable(error)
            } else {
                Attempt::Fatal(error)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            let error = anyhow!("status {}: {}", status, body.trim());
            return Err(if is_retryable_status(status) {
                Attempt::Retryable(error)
            } else {
                Attempt::Fatal(error)
            });
        }

        response
            .json::<VerboseTranscription>()
            .await
            .map_err(|e| Attempt::Fatal(anyhow!(e).context("Malformed transcription response")))
    }
}

enum Attempt {
    Retryable(anyhow::Error),
    Fatal(anyhow::Error),
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn form_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(_) | Value::Number(_) => Some(value.to_string()),
        _ => None,
    }
}

#[async_trait]
impl TranscriptionProvider for RemoteWhisperProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> ProviderState {
        self.client.state()
    }

    async fn warm_up(&self) -> Result<(), ProviderError> {
        self.client().await.map(|_| ())
    }

    async fn transcribe(
        &self,
        audio: AudioBuffer,
        language: &str,
        params: Option<&BackendParams>,
    ) -> Result<TranscriptionResult, ProviderError> {
        let client = self.client().await?;
        let hint = backend_language(language);
        let duration = audio.duration_secs();
        let sample_rate = audio.sample_rate();
        let wav = self
            .pool
            .run("wav encoding", move || encode_wav(&audio))
            .await
            .map_err(|e| ProviderError::backend(&self.name, e))?
            .map_err(|e| ProviderError::backend(&self.name, e))?;

        debug!(provider = %self.name, model = %self.options.model, bytes = wav.len(), "Sending audio to remote transcription API");

        let mut attempt = 1;
        let response = loop {
            match self.request(&client, &wav, hint.as_deref(), params).await {
                Ok(response) => break response,
                Err(Attempt::Retryable(error)) if attempt < MAX_ATTEMPTS => {
                    warn!(provider = %self.name, attempt, error = %error, "Remote transcription failed, retrying");
                    attempt += 1;
                    tokio::time::sleep(RETRY_DELAY).await;
                }
                Err(Attempt::Retryable(error)) | Err(Attempt::Fatal(error)) => {
                    return Err(ProviderError::backend(&self.name, error));
                }
            }
        };

        info!(provider = %self.name, chars = response.text.len(), "Remote transcription completed");
        Ok(response.into_result(&self.name, duration, language, sample_rate))
    }

    async fn health_check(&self) -> bool {
        let client = match self.client().await {
            Ok(client) => client,
            Err(e) => {
                warn!(provider = %self.name, error = %e, "Remote provider unavailable");
                return false;
            }
        };

        let mut request = client.get(format!("{}/models", self.options.base_url));
        if let Some(key) = &self.options.api_key {
            request = request.bearer_auth(key);
        }

        match request.send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                warn!(provider = %self.name, error = %e, "Remote health check failed");
                false
            }
        }
    }
}

/// `verbose_json` response body.
#[derive(Debug, Deserialize)]
struct VerboseTranscription {
    text: String,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    segments: Vec<RemoteSegment>,
}

#[derive(Debug, Deserialize)]
struct RemoteSegment {
    start: f64,
    end: f64,
    text: String,
    #[serde(default)]
    avg_logprob: Option<f64>,
}

impl VerboseTranscription {
    fn into_result(
        self,
        provider: &str,
        audio_duration: f64,
        requested_language: &str,
        sample_rate: u32,
    ) -> TranscriptionResult {
        let duration = self.duration.unwrap_or(audio_duration);
        let language = Some(requested_language.to_string());

        if self.segments.is_empty() {
            return TranscriptionResult::single_segment(
                self.text.trim(),
                duration,
                None,
                provider,
                language,
                Some(sample_rate),
            );
        }

        let segments = self
            .segments
            .into_iter()
            .map(|s| {
                let confidence = s.avg_logprob.map(|lp| lp.exp() as f32);
                TranscriptionSegment::new(s.start, s.end, s.text.trim(), confidence)
            })
            .collect();
        TranscriptionResult::from_segments(segments, duration, provider, language, Some(sample_rate))
    }
}

/// Encode mono audio as a 16-bit PCM WAV file.
fn encode_wav(audio: &AudioBuffer) -> anyhow::Result<Vec<u8>> {
    let header = wav::Header::new(WAV_FORMAT_PCM, 1, audio.sample_rate(), 16);
    let samples: Vec<i16> = audio
        .samples()
        .iter()
        .map(|s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
        .collect();

    let mut cursor = Cursor::new(Vec::new());
    wav::write(header, &wav::BitDepth::Sixteen(samples), &mut cursor).context("Failed to encode WAV")?;
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioDecoder, AudioFormat};
    use serde_json::json;

    fn options(base_url: &str) -> RemoteOptions {
        RemoteOptions {
            base_url: base_url.to_string(),
            api_key: None,
            model: "whisper-1".to_string(),
            timeout: Duration::from_secs(2),
        }
    }

    #[test]
    fn test_encoded_wav_decodes_back() {
        let audio = AudioBuffer::new(vec![0.0, 0.25, -0.25, 0.5], 16_000).unwrap();
        let bytes = encode_wav(&audio).unwrap();

        let decoded = AudioDecoder::default().decode(&bytes, AudioFormat::Wav).unwrap();
        assert_eq!(decoded.audio.sample_rate(), 16_000);
        assert_eq!(decoded.audio.len(), 4);
        assert!((decoded.audio.samples()[3] - 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_verbose_response_maps_segments() {
        let body = json!({
            "text": " hello world",
            "language": "english",
            "duration": 2.0,
            "segments": [
                { "start": 0.0, "end": 1.0, "text": " hello", "avg_logprob": -0.1 },
                { "start": 1.0, "end": 2.0, "text": " world" }
            ]
        });
        let response: VerboseTranscription = serde_json::from_value(body).unwrap();
        let result = response.into_result("remote", 1.9, "auto", 16_000);

        assert_eq!(result.text, "hello world");
        assert_eq!(result.duration, 2.0);
        assert_eq!(result.language.as_deref(), Some("auto"));
        assert_eq!(result.segments.len(), 2);
        assert!(result.segments[0].confidence.unwrap() > 0.85);
        assert_eq!(result.segments[1].confidence, None);
    }

    #[test]
    fn test_plain_response_becomes_single_segment() {
        let response: VerboseTranscription = serde_json::from_value(json!({ "text": "hi" })).unwrap();
        let result = response.into_result("remote", 1.5, "en", 16_000);

        assert_eq!(result.segments.len(), 1);
        assert_eq!(result.segments[0].end_time, 1.5);
        assert_eq!(result.language.as_deref(), Some("en"));
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(StatusCode::BAD_GATEWAY));
        assert!(!is_retryable_status(StatusCode::UNAUTHORIZED));
        assert!(!is_retryable_status(StatusCode::BAD_REQUEST));
    }

    #[test]
    fn test_form_values() {
        assert_eq!(form_value(&json!("x")), Some("x".to_string()));
        assert_eq!(form_value(&json!(0.2)), Some("0.2".to_string()));
        assert_eq!(form_value(&json!(true)), Some("true".to_string()));
        assert_eq!(form_value(&json!({ "nested": 1 })), None);
    }

    #[tokio::test]
    async fn test_unreachable_server_is_unhealthy() {
        let provider = RemoteWhisperProvider::new("remote", options("http://127.0.0.1:9/v1/"), WorkerPool::new(1));
        assert!(!provider.health_check().await);
        assert_eq!(provider.state(), ProviderState::Ready);
    }

    #[tokio::test]
    async fn test_encoding_runs_on_worker_pool() {
        let pool = WorkerPool::new(1);
        pool.close();
        let provider = RemoteWhisperProvider::new("remote", options("http://127.0.0.1:9/v1/"), pool);
        let audio = AudioBuffer::new(vec![0.1; 1_600], 16_000).unwrap();

        match provider.transcribe(audio, "auto", None).await {
            Err(ProviderError::Backend { source, .. }) => {
                assert!(source.to_string().contains("wav encoding"), "{}", source)
            }
            other => panic!("expected backend error, got {:?}", other.map(|r| r.text)),
        }
    }

    #[tokio::test]
    async fn test_invalid_base_url_fails_initialization() {
        let provider = RemoteWhisperProvider::new("remote", options("not a url"), WorkerPool::new(1));
        assert!(provider.warm_up().await.is_err());
        assert_eq!(provider.state(), ProviderState::Failed);
        assert!(!provider.health_check().await);
    }
}

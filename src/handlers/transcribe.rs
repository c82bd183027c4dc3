//! # Transcription Handlers
//!
//! ## Available Endpoints:
//! - `POST /transcribe` - JSON body with base64 audio
//! - `POST /transcribe/file` - multipart upload with an `audio` file field
//!
//! Both accept `?provider=<name>`; without it the registry's default provider is used.

use crate::audio::{AudioError, AudioFormat};
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::transcription::{BackendParams, TranscriptionError, TranscriptionRequest};
use actix_multipart::{Field, Multipart};
use actix_web::{web, HttpResponse};
use base64::Engine;
use futures_util::stream::StreamExt;
use serde::Deserialize;
use tracing::debug;

/// Request body for `POST /transcribe`.
///
/// ```json
/// {
///   "audio": "UklGRiQAAABXQVZF...",
///   "sample_rate": 16000,
///   "language": "en",
///   "format": "wav",
///   "model_params": {"max_tokens": 128}
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct TranscribeBody {
    /// Base64-encoded audio file
    pub audio: String,
    pub sample_rate: Option<u32>,
    pub language: Option<String>,
    pub format: Option<String>,
    pub model_params: Option<BackendParams>,
}

#[derive(Debug, Deserialize)]
pub struct ProviderQuery {
    pub provider: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FileQuery {
    pub provider: Option<String>,
    pub language: Option<String>,
    pub sample_rate: Option<u32>,
    pub format: Option<String>,
}

pub async fn transcribe(
    state: web::Data<AppState>,
    query: web::Query<ProviderQuery>,
    body: web::Json<TranscribeBody>,
) -> AppResult<HttpResponse> {
    let body = body.into_inner();
    let audio = base64::engine::general_purpose::STANDARD.decode(body.audio.trim())?;
    let format = parse_format(body.format.as_deref())?.unwrap_or_default();

    let request = build_request(&state, audio, format, body.sample_rate, body.language)
        .with_params(body.model_params);

    run_transcription(&state, request, query.provider.as_deref()).await
}

pub async fn transcribe_file(
    state: web::Data<AppState>,
    query: web::Query<FileQuery>,
    mut payload: Multipart,
) -> AppResult<HttpResponse> {
    let limit = state.config.server.max_payload_bytes;
    let mut upload: Option<(Vec<u8>, Option<String>)> = None;

    while let Some(item) = payload.next().await {
        let mut field: Field = item?;

        let (field_name, filename) = match field.content_disposition() {
            Some(disposition) => (
                disposition.get_name().unwrap_or_default().to_string(),
                disposition.get_filename().map(str::to_string),
            ),
            None => continue,
        };

        if field_name != "audio" {
            // Drain fields we don't use so the stream can advance.
            while let Some(chunk) = field.next().await {
                chunk?;
            }
            continue;
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk?;
            if bytes.len() + chunk.len() > limit {
                return Err(TranscriptionError::from(AudioError::PayloadTooLarge {
                    size: bytes.len() + chunk.len(),
                    limit,
                })
                .into());
            }
            bytes.extend_from_slice(&chunk);
        }
        upload = Some((bytes, filename));
    }

    let (audio, filename) =
        upload.ok_or_else(|| AppError::ValidationError("No audio file provided".to_string()))?;

    let query = query.into_inner();
    let format = match parse_format(query.format.as_deref())? {
        Some(format) => format,
        None => filename
            .as_deref()
            .and_then(AudioFormat::from_file_name)
            .unwrap_or_default(),
    };
    debug!(filename = ?filename, %format, size_bytes = audio.len(), "Received audio upload");

    let request = build_request(&state, audio, format, query.sample_rate, query.language);
    run_transcription(&state, request, query.provider.as_deref()).await
}

fn parse_format(format: Option<&str>) -> AppResult<Option<AudioFormat>> {
    format
        .map(|value| value.parse::<AudioFormat>().map_err(AppError::ValidationError))
        .transpose()
}

fn build_request(
    state: &AppState,
    audio: Vec<u8>,
    format: AudioFormat,
    sample_rate: Option<u32>,
    language: Option<String>,
) -> TranscriptionRequest {
    let mut request = TranscriptionRequest::new(audio)
        .with_format(format)
        .with_sample_rate(sample_rate.unwrap_or(state.config.audio.default_sample_rate));
    if let Some(language) = language.filter(|l| !l.trim().is_empty()) {
        request = request.with_language(language);
    }
    request
}

async fn run_transcription(
    state: &AppState,
    request: TranscriptionRequest,
    provider: Option<&str>,
) -> AppResult<HttpResponse> {
    state.begin_transcription();
    let outcome = state.service.transcribe(request, provider).await;
    state.finish_transcription(outcome.as_ref().ok().map(|result| result.duration));

    Ok(HttpResponse::Ok().json(outcome?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::decoder::test_support::{sine, wav_bytes};
    use crate::config::AppConfig;
    use crate::handlers::configure;
    use crate::transcription::mock::MockProvider;
    use crate::transcription::{ProviderRegistry, TranscriptionService};
    use crate::worker_pool::WorkerPool;
    use actix_web::{http::StatusCode, test, App};
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn state() -> AppState {
        let config = AppConfig::default();
        let mut registry = ProviderRegistry::new();
        registry.register("mock", Arc::new(MockProvider::new("mock")));
        registry.register("echo", Arc::new(MockProvider::new("echo")));
        let service = TranscriptionService::new(registry, WorkerPool::new(2), config.service_limits());
        AppState::new(config, service)
    }

    fn clip() -> Vec<u8> {
        wav_bytes(16_000, 1, &sine(440.0, 16_000, 0.5))
    }

    fn encoded_clip() -> String {
        base64::engine::general_purpose::STANDARD.encode(clip())
    }

    macro_rules! app {
        ($state:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new($state))
                    .configure(|cfg| configure(cfg, 1024 * 1024)),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn test_transcribe_json_with_default_provider() {
        let app = app!(state());
        let req = test::TestRequest::post()
            .uri("/transcribe")
            .set_json(json!({"audio": encoded_clip(), "language": "en"}))
            .to_request();

        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["model"], "mock");
        assert_eq!(body["language"], "en");
        assert_eq!(body["sample_rate"], 16000);
        assert_eq!(body["text"], "0.50 seconds of audio at 16000 Hz");
    }

    #[actix_web::test]
    async fn test_transcribe_json_forwards_params_to_named_provider() {
        let app = app!(state());
        let req = test::TestRequest::post()
            .uri("/transcribe?provider=echo")
            .set_json(json!({
                "audio": encoded_clip(),
                "sample_rate": 8000,
                "model_params": {"text": "hello there"}
            }))
            .to_request();

        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["model"], "echo");
        assert_eq!(body["text"], "hello there");
        assert_eq!(body["sample_rate"], 8000);
    }

    #[actix_web::test]
    async fn test_unknown_provider_is_not_found() {
        let app = app!(state());
        let req = test::TestRequest::post()
            .uri("/transcribe?provider=nope")
            .set_json(json!({"audio": encoded_clip()}))
            .to_request();

        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["type"], "not_found");
        assert_eq!(body["error"]["message"], "Provider 'nope' not found. Available: [mock, echo]");
    }

    #[actix_web::test]
    async fn test_undecodable_audio_is_bad_request() {
        let state = state();
        let metrics = state.metrics.clone();
        let app = app!(state);
        let garbage = base64::engine::general_purpose::STANDARD.encode(b"definitely not audio");
        let req = test::TestRequest::post()
            .uri("/transcribe")
            .set_json(json!({"audio": garbage}))
            .to_request();

        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["type"], "bad_request");
        assert_eq!(metrics.read().unwrap().transcription.failed, 1);
    }

    #[actix_web::test]
    async fn test_invalid_base64_is_validation_error() {
        let app = app!(state());
        let req = test::TestRequest::post()
            .uri("/transcribe")
            .set_json(json!({"audio": "%%% not base64 %%%"}))
            .to_request();

        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["type"], "validation_error");
    }

    #[actix_web::test]
    async fn test_unknown_format_is_validation_error() {
        let app = app!(state());
        let req = test::TestRequest::post()
            .uri("/transcribe")
            .set_json(json!({"audio": encoded_clip(), "format": "midi"}))
            .to_request();

        let resp = test::call_service(&app, req).await;
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["type"], "validation_error");
    }

    #[actix_web::test]
    async fn test_transcribe_file_upload() {
        let app = app!(state());
        let boundary = "----ole-asr-boundary";

        let mut payload = Vec::new();
        payload.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        payload.extend_from_slice(
            b"Content-Disposition: form-data; name=\"audio\"; filename=\"clip.wav\"\r\n",
        );
        payload.extend_from_slice(b"Content-Type: audio/wav\r\n\r\n");
        payload.extend_from_slice(&clip());
        payload.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        let req = test::TestRequest::post()
            .uri("/transcribe/file?language=de")
            .insert_header((
                "content-type",
                format!("multipart/form-data; boundary={boundary}"),
            ))
            .set_payload(payload)
            .to_request();

        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["model"], "mock");
        assert_eq!(body["language"], "de");
        assert_eq!(body["segments"].as_array().unwrap().len(), 1);
    }

    #[actix_web::test]
    async fn test_transcribe_file_without_audio_field() {
        let app = app!(state());
        let boundary = "----ole-asr-boundary";
        let payload = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nhello\r\n--{boundary}--\r\n"
        );

        let req = test::TestRequest::post()
            .uri("/transcribe/file")
            .insert_header((
                "content-type",
                format!("multipart/form-data; boundary={boundary}"),
            ))
            .set_payload(payload)
            .to_request();

        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}

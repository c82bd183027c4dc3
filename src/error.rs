//! # HTTP Error Handling
//!
//! The transport-level error type and how it is rendered as a JSON response.
//!
//! ## JSON Response Format:
//! Every error returns the same envelope:
//! ```json
//! {
//!   "error": {
//!     "type": "not_found",
//!     "message": "Provider 'nope' not found. Available: [whisper, mock]",
//!     "timestamp": "2025-01-01T12:00:00Z"
//!   }
//! }
//! ```
//!
//! ## Rust Concepts:
//! - **From trait**: lets handlers use `?` on core errors and get the right status code
//! - **ResponseError trait**: actix-web calls `error_response` whenever a handler returns `Err`

use crate::transcription::TranscriptionError;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;
use tracing::error;

/// Errors a request handler can return.
///
/// ## Error Categories:
/// - **Internal**: provider, backend or worker failures (500)
/// - **BadRequest**: the audio itself was rejected (400)
/// - **NotFound**: unknown provider name (404)
/// - **ValidationError**: the request envelope could not be read (400)
/// - **ServiceUnavailable**: no provider is registered (503)
#[derive(Debug)]
pub enum AppError {
    Internal(String),
    BadRequest(String),
    NotFound(String),
    ValidationError(String),
    ServiceUnavailable(String),
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, &str) {
        match self {
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg.as_str()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.as_str()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.as_str()),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, "validation_error", msg.as_str()),
            AppError::ServiceUnavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", msg.as_str())
            }
        }
    }

    /// Machine-readable error type, as sent in the `type` field.
    pub fn kind(&self) -> &'static str {
        self.parts().1
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::ServiceUnavailable(msg) => write!(f, "Service unavailable: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        self.parts().0
    }

    fn error_response(&self) -> HttpResponse {
        let (status, error_type, message) = self.parts();

        HttpResponse::build(status).json(json!({
            "error": {
                "type": error_type,
                "message": message,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

/// Map the core taxonomy onto HTTP semantics.
///
/// Server-side failures are logged here with their full cause chain.
impl From<TranscriptionError> for AppError {
    fn from(err: TranscriptionError) -> Self {
        match &err {
            TranscriptionError::ClientInput(_) => AppError::BadRequest(err.to_string()),
            TranscriptionError::UnknownProvider { .. } => AppError::NotFound(err.to_string()),
            TranscriptionError::NoProviderAvailable => AppError::ServiceUnavailable(err.to_string()),
            TranscriptionError::Provider(_) | TranscriptionError::Worker(_) => {
                error!(error = %cause_chain(&err), "Transcription failed");
                AppError::Internal(err.to_string())
            }
        }
    }
}

fn cause_chain(err: &dyn std::error::Error) -> String {
    let mut chain = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        chain.push_str(": ");
        chain.push_str(&cause.to_string());
        source = cause.source();
    }
    chain
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::ValidationError(format!("JSON parsing error: {}", err))
    }
}

impl From<base64::DecodeError> for AppError {
    fn from(err: base64::DecodeError) -> Self {
        AppError::ValidationError(format!("Invalid base64 audio: {}", err))
    }
}

impl From<actix_multipart::MultipartError> for AppError {
    fn from(err: actix_multipart::MultipartError) -> Self {
        AppError::ValidationError(format!("Multipart error: {}", err))
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioError;
    use crate::transcription::ProviderError;

    #[test]
    fn test_transcription_error_mapping() {
        let cases = [
            (TranscriptionError::from(AudioError::EmptyPayload), StatusCode::BAD_REQUEST, "bad_request"),
            (
                TranscriptionError::UnknownProvider {
                    name: "nope".to_string(),
                    available: vec!["mock".to_string()],
                },
                StatusCode::NOT_FOUND,
                "not_found",
            ),
            (TranscriptionError::NoProviderAvailable, StatusCode::SERVICE_UNAVAILABLE, "service_unavailable"),
            (
                TranscriptionError::from(ProviderError::NotInitialized { provider: "whisper".to_string() }),
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
            ),
        ];

        for (err, status, kind) in cases {
            let app_error = AppError::from(err);
            assert_eq!(app_error.status_code(), status);
            assert_eq!(app_error.kind(), kind);
        }
    }

    #[test]
    fn test_unknown_provider_message_is_kept() {
        let app_error = AppError::from(TranscriptionError::UnknownProvider {
            name: "nope".to_string(),
            available: vec!["whisper".to_string(), "mock".to_string()],
        });
        match app_error {
            AppError::NotFound(msg) => assert!(msg.contains("Available: [whisper, mock]")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[actix_web::test]
    async fn test_error_envelope() {
        let response = AppError::ValidationError("bad audio field".to_string()).error_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = actix_web::body::to_bytes(response.into_body()).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["error"]["type"], "validation_error");
        assert_eq!(value["error"]["message"], "bad audio field");
        assert!(value["error"]["timestamp"].is_string());
    }
}

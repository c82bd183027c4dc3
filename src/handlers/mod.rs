//! # HTTP Handlers
//!
//! Route table for the whole service. `configure` is shared by `main` and the handler tests,
//! so both see the same routes and the same extractor limits.

pub mod providers;
pub mod transcribe;

use crate::error::AppError;
use crate::health;
use actix_web::web;

pub use providers::{index, list_providers, service_info};
pub use transcribe::{transcribe, transcribe_file};

/// Register every route.
///
/// `max_payload_bytes` bounds the decoded audio; the JSON limit is sized for its base64 form.
pub fn configure(cfg: &mut web::ServiceConfig, max_payload_bytes: usize) {
    let json_limit = max_payload_bytes.saturating_mul(4) / 3 + 64 * 1024;

    cfg.app_data(
        web::JsonConfig::default()
            .limit(json_limit)
            .error_handler(|err, _req| AppError::ValidationError(err.to_string()).into()),
    )
    .app_data(
        web::QueryConfig::default()
            .error_handler(|err, _req| AppError::ValidationError(err.to_string()).into()),
    )
    .service(
        web::scope("/api/v1")
            .route("/health", web::get().to(health::health_check))
            .route("/metrics", web::get().to(health::detailed_metrics)),
    )
    .route("/", web::get().to(index))
    .route("/info", web::get().to(service_info))
    .route("/providers", web::get().to(list_providers))
    .route("/health", web::get().to(health::providers_health))
    .route("/health", web::post().to(health::providers_health))
    .route("/transcribe", web::post().to(transcribe))
    .route("/transcribe/file", web::post().to(transcribe_file));
}

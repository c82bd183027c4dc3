//! Service discovery endpoints: the banner, service info and the provider list.

use crate::audio::AudioFormat;
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::{json, Map, Value};

/// `GET /providers`
///
/// ```json
/// {"providers": ["whisper", "mock"], "default": "whisper"}
/// ```
pub async fn list_providers(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "providers": state.service.list_providers(),
        "default": state.service.default_provider()
    }))
}

/// `GET /`
pub async fn index(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "service": env!("CARGO_PKG_NAME"),
        "description": env!("CARGO_PKG_DESCRIPTION"),
        "version": env!("CARGO_PKG_VERSION"),
        "providers": state.service.list_providers(),
        "status": "running"
    }))
}

/// `GET /info`
pub async fn service_info(state: web::Data<AppState>) -> HttpResponse {
    let config = &state.config;

    let provider_states: Map<String, Value> = state
        .service
        .provider_states()
        .into_iter()
        .map(|(name, provider_state)| (name, json!(provider_state)))
        .collect();
    let formats: Vec<&str> = AudioFormat::ALL.iter().map(|f| f.extension()).collect();

    HttpResponse::Ok().json(json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "providers_count": state.service.registry().len(),
        "providers": state.service.list_providers(),
        "default_provider": state.service.default_provider(),
        "provider_states": provider_states,
        "supported_formats": formats,
        "default_sample_rate": config.audio.default_sample_rate,
        "max_audio_duration_secs": config.audio.max_audio_duration_secs,
        "max_payload_bytes": config.server.max_payload_bytes,
        "worker_threads": state.service.worker_pool().size()
    }))
}

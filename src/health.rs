//! # Health and Metrics Endpoints
//!
//! - `GET|POST /health`: one boolean per provider, straight from `health_check_all`
//! - `GET /api/v1/health`: uptime, request metrics, provider health and lifecycle states
//! - `GET /api/v1/metrics`: per-endpoint timings plus transcription counters

use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;

/// Provider health map, e.g. `{"whisper": true, "remote-whisper": false}`.
pub async fn providers_health(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(state.service.health_check_all().await)
}

pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let config = &state.config;
    let health = state.service.health_check_all().await;
    let summary = state.service.summary();

    let providers: Vec<_> = state
        .service
        .provider_states()
        .into_iter()
        .map(|(name, provider_state)| {
            json!({
                "healthy": health.get(&name).copied().unwrap_or(false),
                "state": provider_state,
                "description": provider_state.description(),
                "name": name,
            })
        })
        .collect();

    let status = if health.is_empty() {
        "no_providers"
    } else if health.values().all(|healthy| *healthy) {
        "healthy"
    } else if health.values().any(|healthy| *healthy) {
        "degraded"
    } else {
        "unhealthy"
    };

    HttpResponse::Ok().json(json!({
        "status": status,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": state.get_uptime_seconds(),
        "service": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "host": config.server.host,
            "port": config.server.port
        },
        "metrics": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "error_rate": metrics.error_rate(),
            "transcriptions_in_flight": metrics.transcription.in_flight
        },
        "providers": providers,
        "summary": summary,
        "worker_pool": {
            "size": state.service.worker_pool().size(),
            "available": state.service.worker_pool().available()
        },
        "memory": get_memory_info()
    }))
}

pub async fn detailed_metrics(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let uptime_seconds = state.get_uptime_seconds();

    let mut endpoint_stats: Vec<_> = metrics
        .endpoint_metrics
        .iter()
        .map(|(endpoint, metric)| {
            json!({
                "endpoint": endpoint,
                "request_count": metric.request_count,
                "error_count": metric.error_count,
                "error_rate": metric.error_rate(),
                "average_duration_ms": metric.average_duration_ms(),
                "total_duration_ms": metric.total_duration_ms
            })
        })
        .collect();
    endpoint_stats.sort_by(|a, b| a["endpoint"].as_str().cmp(&b["endpoint"].as_str()));

    let transcription = &metrics.transcription;

    HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "overall": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "error_rate": metrics.error_rate(),
            "requests_per_second": if uptime_seconds > 0 {
                metrics.request_count as f64 / uptime_seconds as f64
            } else {
                0.0
            }
        },
        "transcription": {
            "in_flight": transcription.in_flight,
            "completed": transcription.completed,
            "failed": transcription.failed,
            "audio_seconds": transcription.audio_seconds
        },
        "endpoints": endpoint_stats,
        "memory": get_memory_info()
    }))
}

fn get_memory_info() -> serde_json::Value {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string(format!("/proc/{}/status", std::process::id())) {
            let mut vm_rss = 0;
            let mut vm_size = 0;

            for line in status.lines() {
                let kilobytes = || {
                    line.split_whitespace()
                        .nth(1)
                        .and_then(|kb| kb.parse::<u64>().ok())
                        .unwrap_or(0)
                };
                if line.starts_with("VmRSS:") {
                    vm_rss = kilobytes() * 1024;
                } else if line.starts_with("VmSize:") {
                    vm_size = kilobytes() * 1024;
                }
            }

            return json!({
                "resident_memory_bytes": vm_rss,
                "virtual_memory_bytes": vm_size,
                "available": true
            });
        }
    }

    json!({
        "resident_memory_bytes": 0,
        "virtual_memory_bytes": 0,
        "available": false
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::transcription::mock::MockProvider;
    use crate::transcription::testing::CountingProvider;
    use crate::transcription::{ProviderRegistry, ServiceLimits, TranscriptionService};
    use crate::worker_pool::WorkerPool;
    use actix_web::{test, App};
    use std::sync::Arc;

    fn state() -> AppState {
        let mut registry = ProviderRegistry::new();
        registry.register("mock", Arc::new(MockProvider::new("mock")));
        registry.register("broken", Arc::new(CountingProvider::new("broken").always_failing()));
        let service = TranscriptionService::new(registry, WorkerPool::new(2), ServiceLimits::default());
        AppState::new(AppConfig::default(), service)
    }

    #[actix_web::test]
    async fn test_provider_health_map() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state()))
                .route("/health", web::get().to(providers_health)),
        )
        .await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body, json!({"mock": true, "broken": false}));
    }

    #[actix_web::test]
    async fn test_detailed_health_reports_degraded() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state()))
                .route("/api/v1/health", web::get().to(health_check)),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/v1/health").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["summary"]["total_providers"], 2);
        assert_eq!(body["providers"][0]["name"], "mock");
        assert_eq!(body["providers"][0]["state"], "ready");
        assert_eq!(body["providers"][1]["healthy"], false);
    }

    #[actix_web::test]
    async fn test_metrics_include_transcription_counters() {
        let state = state();
        state.begin_transcription();
        state.finish_transcription(Some(1.5));

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route("/api/v1/metrics", web::get().to(detailed_metrics)),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/v1/metrics").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["transcription"]["completed"], 1);
        assert_eq!(body["transcription"]["audio_seconds"], 1.5);
        assert!(body["memory"]["available"].is_boolean());
    }

    #[::core::prelude::v1::test]
    #[cfg(target_os = "linux")]
    fn test_memory_is_read_from_proc() {
        let memory = get_memory_info();
        assert_eq!(memory["available"], true);
        assert!(memory["resident_memory_bytes"].as_u64().unwrap() > 0);
    }
}

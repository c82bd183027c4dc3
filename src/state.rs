//! # Application State Management
//!
//! Shared state handed to every HTTP request handler through `web::Data<AppState>`.
//!
//! ## Key Rust Concepts:
//!
//! ### Arc (Atomically Reference Counted)
//! - **Purpose**: lets every actix worker thread hold the same config, service and metrics
//! - **Memory safety**: the data is dropped when the last reference goes away
//!
//! ### RwLock (Reader-Writer Lock)
//! - **Purpose**: many readers OR one writer at a time
//! - **Usage here**: only the metrics are mutable; config and service are read-only after startup
//!
//! ## Poisoned Locks:
//! A panic while a metrics lock is held poisons it. Metrics are plain counters, so the guard is
//! recovered with `PoisonError::into_inner` instead of propagating the panic to every request.

use crate::config::AppConfig;
use crate::transcription::TranscriptionService;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

/// The main application state shared across all HTTP request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Validated configuration; never changes after startup.
    pub config: Arc<AppConfig>,

    /// The transcription pipeline and its provider registry.
    pub service: Arc<TranscriptionService>,

    /// Request and transcription counters, updated by middleware and handlers.
    pub metrics: Arc<RwLock<AppMetrics>>,

    /// When the server started (never changes, so no lock needed)
    pub start_time: Instant,
}

/// Performance metrics collected across all HTTP requests.
#[derive(Debug, Default, Clone)]
pub struct AppMetrics {
    /// Total number of HTTP requests processed since server start
    pub request_count: u64,

    /// Total number of HTTP requests answered with a 4xx/5xx status
    pub error_count: u64,

    /// Detailed metrics for each API endpoint, keyed by e.g. "POST /transcribe"
    pub endpoint_metrics: HashMap<String, EndpointMetric>,

    pub transcription: TranscriptionMetrics,
}

/// Counters for the transcription pipeline itself.
#[derive(Debug, Default, Clone)]
pub struct TranscriptionMetrics {
    /// Requests currently being decoded, normalized or transcribed
    pub in_flight: u32,
    pub completed: u64,
    pub failed: u64,
    /// Total seconds of audio successfully transcribed
    pub audio_seconds: f64,
}

/// Detailed performance metrics for a specific API endpoint.
///
/// ## Performance calculations:
/// - **Average response time**: total_duration_ms / request_count
/// - **Error rate**: error_count / request_count
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

impl AppState {
    pub fn new(config: AppConfig, service: TranscriptionService) -> Self {
        Self {
            config: Arc::new(config),
            service: Arc::new(service),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            start_time: Instant::now(),
        }
    }

    fn read_metrics(&self) -> RwLockReadGuard<'_, AppMetrics> {
        self.metrics.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_metrics(&self) -> RwLockWriteGuard<'_, AppMetrics> {
        self.metrics.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Increment the total request counter (called by middleware for every request).
    pub fn increment_request_count(&self) {
        self.write_metrics().request_count += 1;
    }

    /// Increment the total error counter (called when any request fails).
    pub fn increment_error_count(&self) {
        self.write_metrics().error_count += 1;
    }

    /// Record detailed metrics for a specific endpoint.
    ///
    /// The first time an endpoint is seen a zeroed [`EndpointMetric`] is created for it.
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.write_metrics();
        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();

        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;
        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// Mark one transcription as started.
    pub fn begin_transcription(&self) {
        self.write_metrics().transcription.in_flight += 1;
    }

    /// Mark one transcription as finished.
    ///
    /// `audio_seconds` is the duration of the transcribed audio on success, `None` on failure.
    pub fn finish_transcription(&self, audio_seconds: Option<f64>) {
        let mut metrics = self.write_metrics();
        let transcription = &mut metrics.transcription;

        transcription.in_flight = transcription.in_flight.saturating_sub(1);
        match audio_seconds {
            Some(seconds) => {
                transcription.completed += 1;
                transcription.audio_seconds += seconds;
            }
            None => transcription.failed += 1,
        }
    }

    /// Get a snapshot of current metrics, so no lock is held while a response is serialized.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        self.read_metrics().clone()
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl EndpointMetric {
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    /// Error rate between 0.0 (no errors) and 1.0 (every request failed).
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

impl AppMetrics {
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

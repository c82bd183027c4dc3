//! # ole-asr - Main Application Entry Point
//!
//! Sets up the Actix-web HTTP server in front of the transcription service.
//!
//! ## Startup Order:
//! 1. **Configuration**: `.env`, defaults, `config.toml` and environment variables
//! 2. **Logging**: `tracing` with an `EnvFilter`
//! 3. **Providers**: the registry is built from config; nothing is loaded yet
//! 4. **Warm-up**: optionally initializes every provider in the background
//! 5. **Server**: routes, middleware and graceful shutdown on SIGINT/SIGTERM

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::{Context, Result};
use ole_asr::config::AppConfig;
use ole_asr::state::AppState;
use ole_asr::transcription::{ProviderFactory, TranscriptionService};
use ole_asr::worker_pool::WorkerPool;
use ole_asr::{handlers, middleware};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Set by the signal handler; polled by `wait_for_shutdown`.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::load().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    info!("Starting {} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    info!(
        host = %config.server.host,
        port = config.server.port,
        worker_threads = config.performance.worker_threads,
        providers = ?config.enabled_provider_names(),
        "Configuration loaded"
    );

    let pool = WorkerPool::new(config.performance.worker_threads);
    let registry = ProviderFactory::build_registry(&config.providers, &pool)?;
    let service = TranscriptionService::new(registry, pool, config.service_limits());

    let app_state = AppState::new(config.clone(), service);
    if config.providers.warm_up_on_start {
        spawn_warm_up(Arc::clone(&app_state.service));
    }

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let max_payload_bytes = config.server.max_payload_bytes;

    setup_signal_handlers()?;

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        // Middleware executes in reverse order of registration for responses
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(cors)
            .wrap(Logger::default())
            .wrap(middleware::MetricsMiddleware)
            .wrap(middleware::RequestLogging)
            .configure(|cfg| handlers::configure(cfg, max_payload_bytes))
    })
    .bind(&bind_addr)
    .with_context(|| format!("Failed to bind {}", bind_addr))?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task error: {}", e),
                Ok(Ok(())) => {}
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// `RUST_LOG` controls the filter; defaults to `ole_asr=debug,actix_web=info`.
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ole_asr=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Initialize every provider in the background so the first request doesn't pay for it.
///
/// Failures are only logged; a failed provider retries on its next request.
fn spawn_warm_up(service: Arc<TranscriptionService>) {
    tokio::spawn(async move {
        let outcomes = service.warm_up_all().await;
        let failed = outcomes.iter().filter(|(_, outcome)| outcome.is_err()).count();
        if failed > 0 {
            warn!(failed, total = outcomes.len(), "Some providers failed to warm up");
        } else {
            info!(total = outcomes.len(), "All providers warmed up");
        }
    });
}

fn setup_signal_handlers() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;

    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
        }
        SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
    });

    Ok(())
}

async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}

//! # Configuration Management
//!
//! This module handles loading and managing application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with ASR_ prefix, `__` between nested keys)
//! - Flat legacy variables (HOST, PORT, DEFAULT_SAMPLE_RATE, ...)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Legacy flat variables (`PORT=9000`, `THREAD_POOL_SIZE=8`, ...)
//! 2. Prefixed environment variables (`ASR_SERVER__PORT`, `ASR_PROVIDERS__MOCK__ENABLED`, ...)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)
//!
//! ## Key Rust Concepts Used:
//! - **Serde**: the same structs are serialized into the loader as defaults and deserialized back out
//! - **Builder pattern**: `config::Config::builder()` stacks sources in priority order
//! - **Closures as dependencies**: `load_with` takes the variable lookup as a parameter so
//!   tests never touch the process environment

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::time::Duration;

use crate::transcription::model::ModelSize;
use crate::transcription::service::ServiceLimits;

/// Flat variables understood for compatibility with older deployments, and the key each
/// one overrides.
const LEGACY_ENV_OVERRIDES: [(&str, &str); 7] = [
    ("HOST", "server.host"),
    ("PORT", "server.port"),
    ("DEFAULT_SAMPLE_RATE", "audio.default_sample_rate"),
    ("MAX_AUDIO_DURATION", "audio.max_audio_duration_secs"),
    ("THREAD_POOL_SIZE", "performance.worker_threads"),
    ("DEFAULT_MODEL", "providers.default"),
    ("DEVICE", "providers.whisper.device"),
];

/// Main application configuration that contains all settings.
///
/// ## Why separate config structs:
/// Breaking configuration into logical groups (server, audio, performance, providers)
/// keeps each concern's settings together and maps 1:1 onto TOML tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub audio: AudioConfig,
    pub performance: PerformanceConfig,
    pub providers: ProvidersConfig,
}

/// Server-specific configuration settings.
///
/// ## Common values:
/// - `host = "127.0.0.1"`: Only accept connections from localhost (development)
/// - `host = "0.0.0.0"`: Accept connections from any IP address (production)
/// - `max_payload_bytes`: upper bound on uploaded audio, also sizes the JSON body limit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_payload_bytes: usize,
}

/// Audio pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Rate requests are normalized to when they do not name one.
    pub default_sample_rate: u32,
    /// Longest accepted clip, measured after decoding.
    pub max_audio_duration_secs: f64,
}

/// Performance tuning configuration.
///
/// ## Tuning guidelines:
/// `worker_threads` bounds how many decode/resample/inference jobs run at once. More
/// workers serve more concurrent requests but compete for the same cores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    pub worker_threads: usize,
}

/// Which providers to register at start-up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// Default provider name; empty means "first registered".
    pub default: String,
    /// Initialize every provider's backend in the background right after start-up.
    pub warm_up_on_start: bool,
    pub whisper: WhisperProviderConfig,
    pub remote: RemoteProviderConfig,
    pub mock: MockProviderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhisperProviderConfig {
    pub enabled: bool,
    pub name: String,
    /// tiny, base, small, medium or large
    pub model_size: String,
    /// auto, cpu, cuda or metal
    pub device: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteProviderConfig {
    pub enabled: bool,
    pub name: String,
    /// e.g. `https://api.openai.com/v1`
    pub base_url: String,
    /// Bearer token; empty means no authentication header.
    pub api_key: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl RemoteProviderConfig {
    pub fn api_key(&self) -> Option<String> {
        let key = self.api_key.trim();
        (!key.is_empty()).then(|| key.to_string())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockProviderConfig {
    pub enabled: bool,
    pub name: String,
}

/// Provides default configuration values.
///
/// ## Why defaults matter:
/// Default values ensure the application can start even if no configuration file exists.
/// They also serve as documentation of reasonable starting values.
impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8000,
                max_payload_bytes: 50 * 1024 * 1024, // 50 MiB
            },
            audio: AudioConfig {
                default_sample_rate: 16_000,
                max_audio_duration_secs: 300.0, // 5 minutes
            },
            performance: PerformanceConfig { worker_threads: 4 },
            providers: ProvidersConfig {
                default: String::new(),
                warm_up_on_start: true,
                whisper: WhisperProviderConfig {
                    enabled: true,
                    name: "whisper".to_string(),
                    model_size: "base".to_string(), // Fast, reasonable accuracy
                    device: "auto".to_string(),
                },
                remote: RemoteProviderConfig {
                    enabled: false,
                    name: "remote-whisper".to_string(),
                    base_url: String::new(),
                    api_key: String::new(),
                    model: "whisper-1".to_string(),
                    timeout_secs: 120,
                },
                mock: MockProviderConfig {
                    enabled: false,
                    name: "mock".to_string(),
                },
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, config.toml and the process environment.
    ///
    /// ## Environment Variable Examples:
    /// - `ASR_SERVER__PORT=3000`: Override server port
    /// - `ASR_PROVIDERS__WHISPER__MODEL_SIZE=small`: Override whisper model size
    /// - `ASR_PROVIDERS__REMOTE__ENABLED=true`: Turn on the remote provider
    /// - `PORT=3000`: Special case for deployment platforms
    pub fn load() -> Result<Self> {
        Self::load_with(|key| env::var(key).ok())
    }

    /// Same as [`AppConfig::load`], with legacy variables read through `lookup`.
    pub fn load_with<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("ASR")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        for (variable, key) in LEGACY_ENV_OVERRIDES {
            if let Some(value) = lookup(variable) {
                settings = settings.set_override(key, value)?;
            }
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// ## Why validate:
    /// Catching configuration errors at start-up gives a clear message instead of a
    /// confusing failure on the first request.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow!("Server port cannot be 0"));
        }
        if self.server.max_payload_bytes == 0 {
            return Err(anyhow!("Max payload size must be greater than 0"));
        }
        if self.audio.default_sample_rate == 0 {
            return Err(anyhow!("Default sample rate must be greater than 0"));
        }
        if !(self.audio.max_audio_duration_secs > 0.0) {
            return Err(anyhow!("Max audio duration must be greater than 0"));
        }
        if self.performance.worker_threads == 0 {
            return Err(anyhow!("Worker threads must be greater than 0"));
        }

        let providers = &self.providers;
        if providers.whisper.enabled {
            providers.whisper.model_size.parse::<ModelSize>()?;
        }
        if providers.remote.enabled && providers.remote.base_url.trim().is_empty() {
            return Err(anyhow!("Remote provider is enabled but has no base_url"));
        }

        let mut names = HashSet::new();
        for name in self.enabled_provider_names() {
            if name.trim().is_empty() {
                return Err(anyhow!("Provider names cannot be empty"));
            }
            if !names.insert(name) {
                return Err(anyhow!("Provider name '{}' is used more than once", name));
            }
        }

        Ok(())
    }

    /// Names of the providers that will be registered, in registration order.
    pub fn enabled_provider_names(&self) -> Vec<&str> {
        let providers = &self.providers;
        [
            (providers.whisper.enabled, providers.whisper.name.as_str()),
            (providers.remote.enabled, providers.remote.name.as_str()),
            (providers.mock.enabled, providers.mock.name.as_str()),
        ]
        .into_iter()
        .filter_map(|(enabled, name)| enabled.then_some(name))
        .collect()
    }

    /// Input limits for the transcription service.
    pub fn service_limits(&self) -> ServiceLimits {
        ServiceLimits {
            max_payload_bytes: self.server.max_payload_bytes,
            max_audio_duration_secs: self.audio.max_audio_duration_secs,
        }
    }
}

//! Builds the provider registry from configuration.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use super::mock::MockProvider;
use super::model::ModelSize;
use super::registry::ProviderRegistry;
use super::remote::{RemoteOptions, RemoteWhisperProvider};
use super::whisper::WhisperProvider;
use crate::config::ProvidersConfig;
use crate::device::DevicePreference;
use crate::worker_pool::WorkerPool;

pub struct ProviderFactory;

impl ProviderFactory {
    /// Register every enabled provider, in a fixed order: whisper, remote, mock.
    ///
    /// Construction is cheap; no model is loaded and no connection is opened here.
    pub fn build_registry(config: &ProvidersConfig, pool: &WorkerPool) -> Result<ProviderRegistry> {
        let mut registry = ProviderRegistry::new();

        if config.whisper.enabled {
            let whisper = &config.whisper;
            let size: ModelSize = whisper
                .model_size
                .parse()
                .with_context(|| format!("Invalid model size for provider '{}'", whisper.name))?;
            let device = whisper.device.parse::<DevicePreference>().unwrap_or_else(|e| {
                warn!(provider = %whisper.name, "{}, using auto", e);
                DevicePreference::Auto
            });

            info!(provider = %whisper.name, model = %size, ?device, "Configuring local Whisper provider");
            registry.register(
                whisper.name.clone(),
                Arc::new(WhisperProvider::new(whisper.name.clone(), size, device, pool.clone())),
            );
        }

        if config.remote.enabled {
            let remote = &config.remote;
            let options = RemoteOptions {
                base_url: remote.base_url.clone(),
                api_key: remote.api_key(),
                model: remote.model.clone(),
                timeout: remote.timeout(),
            };

            info!(provider = %remote.name, base_url = %remote.base_url, model = %remote.model, "Configuring remote Whisper provider");
            registry.register(
                remote.name.clone(),
                Arc::new(RemoteWhisperProvider::new(remote.name.clone(), options, pool.clone())),
            );
        }

        if config.mock.enabled {
            info!(provider = %config.mock.name, "Configuring mock provider");
            registry.register(
                config.mock.name.clone(),
                Arc::new(MockProvider::new(config.mock.name.clone())),
            );
        }

        let default = config.default.trim();
        if !default.is_empty() {
            registry.set_default(default)?;
        }

        if registry.is_empty() {
            warn!("No transcription providers enabled; transcription requests will fail");
        }

        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::transcription::lifecycle::ProviderState;
    use crate::transcription::provider::TranscriptionProvider;

    #[test]
    fn test_default_config_registers_whisper_only() {
        let config = AppConfig::default();
        let registry = ProviderFactory::build_registry(&config.providers, &WorkerPool::new(1)).unwrap();

        assert_eq!(registry.list(), vec!["whisper"]);
        assert_eq!(registry.default_name(), Some("whisper"));
        // Nothing is loaded until first use.
        assert_eq!(registry.summary().ready_providers, 0);
        assert_eq!(registry.get("whisper").unwrap().state(), ProviderState::Uninitialized);
    }

    #[test]
    fn test_all_providers_with_explicit_default() {
        let mut config = AppConfig::default();
        config.providers.remote.enabled = true;
        config.providers.remote.base_url = "http://localhost:9000/v1".to_string();
        config.providers.mock.enabled = true;
        config.providers.default = "mock".to_string();

        let registry = ProviderFactory::build_registry(&config.providers, &WorkerPool::new(1)).unwrap();
        assert_eq!(registry.list(), vec!["whisper", "remote-whisper", "mock"]);
        assert_eq!(registry.default_name(), Some("mock"));
    }

    #[test]
    fn test_unknown_default_is_an_error() {
        let mut config = AppConfig::default();
        config.providers.default = "nope".to_string();
        assert!(ProviderFactory::build_registry(&config.providers, &WorkerPool::new(1)).is_err());
    }

    #[test]
    fn test_no_providers_is_allowed() {
        let mut config = AppConfig::default();
        config.providers.whisper.enabled = false;
        let registry = ProviderFactory::build_registry(&config.providers, &WorkerPool::new(1)).unwrap();
        assert!(registry.is_empty());
    }
}

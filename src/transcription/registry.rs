//! # Provider Registry
//!
//! Maps provider names to provider instances and tracks which one serves requests that
//! do not name a provider.
//!
//! ## Key Features:
//! - **Ordered listing**: providers are listed in registration order
//! - **Default tracking**: the first registered provider is the default until
//!   [`ProviderRegistry::set_default`] says otherwise
//! - **Lock-free reads**: registration happens during start-up through `&mut self`; once
//!   the registry is handed to the service it is only read
//!
//! ## Usage:
//! ```rust,ignore
//! let mut registry = ProviderRegistry::new();
//! registry.register("whisper", Arc::new(whisper));
//! registry.register("mock", Arc::new(MockProvider::new("mock")));
//! registry.set_default("mock")?;
//! ```

use serde::Serialize;
use std::collections::HashMap;
use tracing::{info, warn};

use super::error::TranscriptionError;
use super::lifecycle::ProviderState;
use super::provider::{SharedProvider, TranscriptionProvider};

#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, SharedProvider>,
    order: Vec<String>,
    default: Option<String>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a provider under `name`, replacing any existing entry with that name.
    ///
    /// The first provider ever registered becomes the default. Replacing an entry keeps
    /// its position in the listing and does not change the default.
    pub fn register(&mut self, name: impl Into<String>, provider: SharedProvider) {
        let name = name.into();

        if self.providers.insert(name.clone(), provider).is_some() {
            warn!(provider = %name, "Replacing already registered provider");
        } else {
            info!(provider = %name, "Registered transcription provider");
            self.order.push(name.clone());
        }

        if self.default.is_none() {
            self.default = Some(name);
        }
    }

    /// Make an already registered provider the default.
    pub fn set_default(&mut self, name: &str) -> Result<(), TranscriptionError> {
        if !self.providers.contains_key(name) {
            return Err(self.unknown(name));
        }
        info!(provider = %name, "Default provider set");
        self.default = Some(name.to_string());
        Ok(())
    }

    /// Look up a provider by name.
    pub fn get(&self, name: &str) -> Result<SharedProvider, TranscriptionError> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| self.unknown(name))
    }

    /// Resolve an optional provider name to `(name, provider)`, falling back to the default.
    pub fn resolve(&self, requested: Option<&str>) -> Result<(String, SharedProvider), TranscriptionError> {
        match requested.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => Ok((name.to_string(), self.get(name)?)),
            None => {
                let name = self
                    .default
                    .as_deref()
                    .ok_or(TranscriptionError::NoProviderAvailable)?;
                Ok((name.to_string(), self.get(name)?))
            }
        }
    }

    /// Registered names in registration order.
    pub fn list(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn default_name(&self) -> Option<&str> {
        self.default.as_deref()
    }

    /// Iterate `(name, provider)` pairs in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SharedProvider)> + '_ {
        self.order
            .iter()
            .filter_map(|name| self.providers.get(name).map(|p| (name.as_str(), p)))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Counts of providers per lifecycle state.
    pub fn summary(&self) -> RegistrySummary {
        let states: Vec<ProviderState> = self.iter().map(|(_, p)| p.state()).collect();
        let count = |state: ProviderState| states.iter().filter(|s| **s == state).count();

        RegistrySummary {
            total_providers: states.len(),
            ready_providers: count(ProviderState::Ready),
            initializing_providers: count(ProviderState::Initializing),
            failed_providers: count(ProviderState::Failed),
            default_provider: self.default.clone(),
        }
    }

    fn unknown(&self, name: &str) -> TranscriptionError {
        TranscriptionError::UnknownProvider {
            name: name.to_string(),
            available: self.list(),
        }
    }
}

/// Summary of the registry state.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrySummary {
    pub total_providers: usize,
    pub ready_providers: usize,
    pub initializing_providers: usize,
    pub failed_providers: usize,
    pub default_provider: Option<String>,
}

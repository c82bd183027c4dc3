//! Error taxonomy of the transcription layer.
//!
//! Callers can always tell "your input was bad" ([`TranscriptionError::ClientInput`])
//! apart from "we could not serve you" (everything else).

use std::error::Error as StdError;
use std::sync::Arc;
use thiserror::Error;

use crate::audio::{AudioError, BoxError};
use crate::worker_pool::WorkerError;

/// Initialization failure shared by every caller that waited on the same attempt.
pub type SharedError = Arc<dyn StdError + Send + Sync>;

/// Failures raised by a provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider '{provider}' is not initialized")]
    NotInitialized { provider: String },

    #[error("provider '{provider}' failed to initialize: {source}")]
    Initialization {
        provider: String,
        #[source]
        source: SharedError,
    },

    #[error("provider '{provider}' failed: {source}")]
    Backend {
        provider: String,
        #[source]
        source: BoxError,
    },
}

impl ProviderError {
    pub fn backend(provider: &str, source: impl Into<BoxError>) -> Self {
        ProviderError::Backend {
            provider: provider.to_string(),
            source: source.into(),
        }
    }

    pub fn provider(&self) -> &str {
        match self {
            ProviderError::NotInitialized { provider }
            | ProviderError::Initialization { provider, .. }
            | ProviderError::Backend { provider, .. } => provider,
        }
    }
}

/// Every way a transcription request can fail.
#[derive(Debug, Error)]
pub enum TranscriptionError {
    /// The submitted audio could not be validated, decoded or normalized.
    #[error("invalid audio input: {0}")]
    ClientInput(#[from] AudioError),

    #[error("Provider '{name}' not found. Available: [{}]", .available.join(", "))]
    UnknownProvider { name: String, available: Vec<String> },

    #[error("no transcription provider available")]
    NoProviderAvailable,

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Worker(#[from] WorkerError),
}

impl TranscriptionError {
    /// True when the failure was caused by the request itself.
    pub fn is_client_error(&self) -> bool {
        matches!(self, TranscriptionError::ClientInput(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_provider_lists_available_names() {
        let error = TranscriptionError::UnknownProvider {
            name: "nope".to_string(),
            available: vec!["whisper".to_string(), "mock".to_string()],
        };
        assert_eq!(error.to_string(), "Provider 'nope' not found. Available: [whisper, mock]");
        assert!(!error.is_client_error());
    }

    #[test]
    fn test_client_input_classification() {
        let error = TranscriptionError::from(AudioError::EmptyPayload);
        assert!(error.is_client_error());
    }

    #[test]
    fn test_backend_error_keeps_cause() {
        let error = ProviderError::backend("remote", anyhow::anyhow!("HTTP 500"));
        assert_eq!(error.provider(), "remote");
        assert_eq!(error.source().unwrap().to_string(), "HTTP 500");
    }
}

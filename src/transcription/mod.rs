//! # Transcription Module
//!
//! Speech-to-text behind a uniform provider interface.
//!
//! ## Key Components:
//! - **Provider contract**: [`TranscriptionProvider`], implemented by every backend
//! - **Lifecycle**: [`LazyBackend`], single-flight lazy initialization shared by providers
//! - **Registry**: [`ProviderRegistry`], name → provider plus the default choice
//! - **Service**: [`TranscriptionService`], decode → normalize → dispatch for one request
//! - **Providers**: local Candle Whisper, OpenAI-compatible remote API, and a mock
//!
//! ## Whisper Model Sizes:
//! - **tiny**: ~39MB, fastest but least accurate
//! - **base**: ~74MB, good balance for development
//! - **small**: ~244MB, better accuracy
//! - **medium**: ~769MB, good technical vocabulary
//! - **large**: ~1550MB, best accuracy but slowest

pub mod error; // Error taxonomy
pub mod factory; // Config -> registry
pub mod lifecycle; // Lazy single-flight backend initialization
pub mod mock; // Model-free provider
pub mod model; // Whisper model loading and inference
pub mod provider; // Provider trait
pub mod registry; // Name -> provider lookup
pub mod remote; // OpenAI-compatible HTTP provider
pub mod service; // Request pipeline
pub mod types; // Request/result types
pub mod whisper; // Local Candle Whisper provider

#[cfg(test)]
pub(crate) mod testing;

pub use error::{ProviderError, SharedError, TranscriptionError};
pub use factory::ProviderFactory;
pub use lifecycle::{LazyBackend, ProviderState};
pub use provider::{SharedProvider, TranscriptionProvider};
pub use registry::{ProviderRegistry, RegistrySummary};
pub use service::{ServiceLimits, TranscriptionService};
pub use types::{BackendParams, TranscriptionRequest, TranscriptionResult, TranscriptionSegment};

//! # ole-asr
//!
//! Speech-to-text service with pluggable transcription providers.
//!
//! ## Module Layout:
//! - **audio**: decode arbitrary containers to mono PCM and resample to a target rate
//! - **transcription**: provider contract, lazy lifecycle, registry and the request pipeline
//! - **worker_pool**: bounded pool for CPU-heavy work off the async runtime
//! - **config**: layered configuration (defaults, config.toml, environment)
//! - **handlers** / **health** / **middleware** / **state** / **error**: the HTTP surface

pub mod audio;
pub mod config;
pub mod device;
pub mod error;
pub mod handlers;
pub mod health;
pub mod middleware;
pub mod state;
pub mod transcription;
pub mod worker_pool;

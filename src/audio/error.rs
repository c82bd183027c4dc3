//! Error types for the decode and normalize stages.
//!
//! All of these describe problems with what the client sent, so the service surfaces them
//! as client-input errors.

use std::error::Error as StdError;
use std::fmt;
use thiserror::Error;

/// Boxed, thread-safe error used for causes coming out of codec libraries.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Client-input failures of the audio pipeline, tagged by stage.
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("audio payload is empty")]
    EmptyPayload,

    #[error("audio payload is {size} bytes, limit is {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("audio is {duration_secs:.2}s long, limit is {limit_secs:.2}s")]
    TooLong { duration_secs: f64, limit_secs: f64 },

    #[error("decode stage failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("normalize stage failed: {0}")]
    Normalize(#[from] NormalizeError),
}

impl AudioError {
    /// Pipeline stage the failure belongs to.
    pub fn stage(&self) -> &'static str {
        match self {
            AudioError::EmptyPayload | AudioError::PayloadTooLarge { .. } => "validate",
            AudioError::Decode(_) | AudioError::TooLong { .. } => "decode",
            AudioError::Normalize(_) => "normalize",
        }
    }
}

/// One rejected decode attempt.
#[derive(Debug)]
pub struct StrategyFailure {
    pub strategy: &'static str,
    pub cause: BoxError,
}

/// Every configured decode strategy rejected the payload.
///
/// Keeps each attempt so nothing is swallowed; `source()` is the final attempt's cause.
#[derive(Debug)]
pub struct DecodeError {
    attempts: Vec<StrategyFailure>,
}

impl DecodeError {
    pub fn new(attempts: Vec<StrategyFailure>) -> Self {
        Self { attempts }
    }

    pub fn attempts(&self) -> &[StrategyFailure] {
        &self.attempts
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no decoder accepted the payload")?;
        for attempt in &self.attempts {
            write!(f, "; {}: {}", attempt.strategy, attempt.cause)?;
        }
        Ok(())
    }
}

impl StdError for DecodeError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.attempts
            .last()
            .map(|attempt| attempt.cause.as_ref() as &(dyn StdError + 'static))
    }
}

/// Resampling failures.
#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("target sample rate must be greater than 0, got {0}")]
    UnsupportedRate(u32),

    #[error("resampling {from} Hz -> {to} Hz failed: {source}")]
    Resampler {
        from: u32,
        to: u32,
        #[source]
        source: BoxError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_lists_every_attempt() {
        let error = DecodeError::new(vec![
            StrategyFailure { strategy: "wav", cause: "missing RIFF header".into() },
            StrategyFailure { strategy: "symphonia", cause: "unsupported format".into() },
        ]);

        let message = error.to_string();
        assert!(message.contains("wav: missing RIFF header"));
        assert!(message.contains("symphonia: unsupported format"));
        assert_eq!(error.source().unwrap().to_string(), "unsupported format");
    }

    #[test]
    fn test_stage_tags() {
        assert_eq!(AudioError::EmptyPayload.stage(), "validate");
        assert_eq!(AudioError::from(NormalizeError::UnsupportedRate(0)).stage(), "normalize");
        assert_eq!(AudioError::from(DecodeError::new(Vec::new())).stage(), "decode");
    }
}

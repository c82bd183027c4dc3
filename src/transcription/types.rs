//! Request and result types shared by every provider.

use serde::{Deserialize, Serialize};

use crate::audio::AudioFormat;

/// Opaque provider-specific options forwarded untouched by the service.
pub type BackendParams = serde_json::Map<String, serde_json::Value>;

/// Language tag meaning "let the provider detect it".
pub const AUTO_LANGUAGE: &str = "auto";

/// Rate audio is normalized to when a request does not name one.
pub const DEFAULT_SAMPLE_RATE: u32 = 16_000;

/// A single transcription job as handed to the service.
#[derive(Debug, Clone)]
pub struct TranscriptionRequest {
    /// Encoded audio file contents.
    pub audio: Vec<u8>,
    /// Declared container/codec, used as a decode hint.
    pub format: AudioFormat,
    /// Rate the audio is normalized to before the provider sees it.
    pub sample_rate: u32,
    /// Language tag, or `"auto"`.
    pub language: String,
    /// Provider-specific options.
    pub params: Option<BackendParams>,
}

impl TranscriptionRequest {
    pub fn new(audio: Vec<u8>) -> Self {
        Self {
            audio,
            format: AudioFormat::default(),
            sample_rate: DEFAULT_SAMPLE_RATE,
            language: AUTO_LANGUAGE.to_string(),
            params: None,
        }
    }

    pub fn with_format(mut self, format: AudioFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_params(mut self, params: Option<BackendParams>) -> Self {
        self.params = params;
        self
    }
}

/// A timed piece of transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionSegment {
    pub start_time: f64,
    pub end_time: f64,
    pub text: String,
    pub confidence: Option<f32>,
}

impl TranscriptionSegment {
    /// Build a segment; `end_time` is raised to `start_time` if needed and confidence is
    /// clamped to `[0, 1]`.
    pub fn new(start_time: f64, end_time: f64, text: impl Into<String>, confidence: Option<f32>) -> Self {
        let start_time = start_time.max(0.0);
        Self {
            start_time,
            end_time: end_time.max(start_time),
            text: text.into(),
            confidence: confidence.map(|c| c.clamp(0.0, 1.0)),
        }
    }
}

/// The final transcript returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionResult {
    pub text: String,
    pub segments: Vec<TranscriptionSegment>,
    /// Seconds of audio that were transcribed.
    pub duration: f64,
    /// Name of the provider that produced the transcript.
    pub model: String,
    pub language: Option<String>,
    pub sample_rate: Option<u32>,
}

impl TranscriptionResult {
    /// Assemble a result whose `text` is the segment texts joined by single spaces.
    pub fn from_segments(
        segments: Vec<TranscriptionSegment>,
        duration: f64,
        model: impl Into<String>,
        language: Option<String>,
        sample_rate: Option<u32>,
    ) -> Self {
        let text = segments
            .iter()
            .map(|s| s.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        Self {
            text,
            segments,
            duration,
            model: model.into(),
            language,
            sample_rate,
        }
    }

    /// Result with one segment covering the whole clip.
    pub fn single_segment(
        text: impl Into<String>,
        duration: f64,
        confidence: Option<f32>,
        model: impl Into<String>,
        language: Option<String>,
        sample_rate: Option<u32>,
    ) -> Self {
        let segment = TranscriptionSegment::new(0.0, duration, text, confidence);
        Self::from_segments(vec![segment], duration, model, language, sample_rate)
    }
}

/// Language hint to hand a backend: `None` lets it detect the language itself.
///
/// Results still echo the caller's hint verbatim.
pub fn backend_language(language: &str) -> Option<String> {
    let language = language.trim();
    if language.is_empty() || language.eq_ignore_ascii_case(AUTO_LANGUAGE) {
        None
    } else {
        Some(language.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults() {
        let request = TranscriptionRequest::new(vec![1, 2, 3]);
        assert_eq!(request.format, AudioFormat::Wav);
        assert_eq!(request.sample_rate, 16_000);
        assert_eq!(request.language, "auto");
        assert!(request.params.is_none());
    }

    #[test]
    fn test_segment_bounds_are_enforced() {
        let segment = TranscriptionSegment::new(2.0, 1.0, "hi", Some(1.7));
        assert_eq!(segment.end_time, 2.0);
        assert_eq!(segment.confidence, Some(1.0));
    }

    #[test]
    fn test_text_is_joined_from_segments() {
        let result = TranscriptionResult::from_segments(
            vec![
                TranscriptionSegment::new(0.0, 1.0, " hello ", None),
                TranscriptionSegment::new(1.0, 2.0, "", None),
                TranscriptionSegment::new(2.0, 3.0, "world", None),
            ],
            3.0,
            "mock",
            None,
            Some(16_000),
        );
        assert_eq!(result.text, "hello world");
    }

    #[test]
    fn test_result_serialization_shape() {
        let result = TranscriptionResult::single_segment("hi", 1.5, Some(0.9), "mock", Some("en".into()), Some(16_000));
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["text"], "hi");
        assert_eq!(json["model"], "mock");
        assert_eq!(json["segments"][0]["end_time"], 1.5);
        assert_eq!(json["sample_rate"], 16_000);
    }

    #[test]
    fn test_backend_language() {
        assert_eq!(backend_language("auto"), None);
        assert_eq!(backend_language(""), None);
        assert_eq!(backend_language("de"), Some("de".to_string()));
    }
}

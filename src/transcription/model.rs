//! # Whisper Model Management
//!
//! Downloads, loads and runs Whisper checkpoints with Candle.
//!
//! ## Model Loading Process:
//! 1. Fetch `config.json`, `tokenizer.json` and `model.safetensors` from HuggingFace (cached locally)
//! 2. Resolve the special decoder tokens from the tokenizer
//! 3. Build the mel filterbank for the model's mel bin count
//! 4. Memory-map the weights onto the selected device
//!
//! ## Inference:
//! Whisper consumes fixed 30 second windows of 16 kHz audio. [`WhisperModel::transcribe_window`]
//! pads or truncates one window, runs the encoder once and greedily decodes tokens until
//! end-of-text, a repetition loop, or the token budget.

use anyhow::{anyhow, Context, Result};
use candle_core::{DType, Device, IndexOp, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::whisper::{self as m, Config};
use hf_hub::api::tokio::{Api, ApiBuilder};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokenizers::Tokenizer;
use tracing::{debug, info};

/// Sample rate every Whisper checkpoint expects.
pub const WHISPER_SAMPLE_RATE: u32 = m::SAMPLE_RATE as u32;

/// Length of one inference window in samples.
pub const WINDOW_SAMPLES: usize = m::N_SAMPLES;

/// Decoded text of one window plus how sure the greedy decoder was of it.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowTranscript {
    pub text: String,
    /// Geometric mean of the probabilities of the chosen tokens, `None` when nothing was emitted.
    pub confidence: Option<f32>,
}

/// Available Whisper model sizes with their characteristics.
///
/// ## Trade-offs:
/// - **Size vs Accuracy**: Larger models are more accurate but slower
/// - **Memory vs Speed**: More memory usage for better performance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelSize {
    Tiny,
    Base,
    Small,
    Medium,
    Large,
}

impl ModelSize {
    /// Get the HuggingFace model repository name.
    pub fn repo_name(&self) -> &'static str {
        match self {
            ModelSize::Tiny => "openai/whisper-tiny",
            ModelSize::Base => "openai/whisper-base",
            ModelSize::Small => "openai/whisper-small",
            ModelSize::Medium => "openai/whisper-medium",
            ModelSize::Large => "openai/whisper-large-v2",
        }
    }

    /// Get the approximate model size in MB.
    pub fn size_mb(&self) -> u32 {
        match self {
            ModelSize::Tiny => 39,
            ModelSize::Base => 74,
            ModelSize::Small => 244,
            ModelSize::Medium => 769,
            ModelSize::Large => 1550,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ModelSize::Tiny => "Fastest, basic accuracy",
            ModelSize::Base => "Fast, good for testing",
            ModelSize::Small => "Balanced speed and accuracy",
            ModelSize::Medium => "Good accuracy, handles technical vocabulary",
            ModelSize::Large => "Best accuracy, slower processing",
        }
    }
}

impl std::str::FromStr for ModelSize {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "tiny" => Ok(ModelSize::Tiny),
            "base" => Ok(ModelSize::Base),
            "small" => Ok(ModelSize::Small),
            "medium" => Ok(ModelSize::Medium),
            "large" => Ok(ModelSize::Large),
            _ => Err(anyhow!("Unknown model size: {}", s)),
        }
    }
}

impl std::fmt::Display for ModelSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ModelSize::Tiny => "tiny",
            ModelSize::Base => "base",
            ModelSize::Small => "small",
            ModelSize::Medium => "medium",
            ModelSize::Large => "large",
        };
        write!(f, "{}", name)
    }
}

/// Token ids the decoder prompt is built from.
#[derive(Debug, Clone, Copy)]
struct SpecialTokens {
    sot: u32,
    eot: u32,
    transcribe: u32,
    no_timestamps: u32,
}

impl SpecialTokens {
    fn resolve(tokenizer: &Tokenizer) -> Result<Self> {
        Ok(Self {
            sot: token_id(tokenizer, m::SOT_TOKEN)?,
            eot: token_id(tokenizer, m::EOT_TOKEN)?,
            transcribe: token_id(tokenizer, m::TRANSCRIBE_TOKEN)?,
            no_timestamps: token_id(tokenizer, m::NO_TIMESTAMPS_TOKEN)?,
        })
    }
}

fn token_id(tokenizer: &Tokenizer, token: &str) -> Result<u32> {
    tokenizer
        .token_to_id(token)
        .ok_or_else(|| anyhow!("Tokenizer has no id for {}", token))
}

/// A loaded Whisper model ready for transcription.
///
/// ## Thread Safety:
/// Inference mutates the decoder's key/value cache, so a model serves one window at a
/// time. Callers wrap it in a mutex.
pub struct WhisperModel {
    model: m::model::Whisper,
    config: Config,
    device: Device,
    tokenizer: Tokenizer,
    mel_filters: Vec<f32>,
    tokens: SpecialTokens,
    size: ModelSize,
}

impl WhisperModel {
    /// Download (or reuse cached) model files and load them onto `device`.
    pub async fn load(size: ModelSize, device: Device) -> Result<Self> {
        info!(model = %size, repo = size.repo_name(), size_mb = size.size_mb(), "Loading Whisper model");
        let started = Instant::now();

        let api = hub_api()?;
        let repo = api.model(size.repo_name().to_string());

        let config_path = repo
            .get("config.json")
            .await
            .with_context(|| format!("Failed to download config.json from {}", size.repo_name()))?;
        let tokenizer_path = repo
            .get("tokenizer.json")
            .await
            .with_context(|| format!("Failed to download tokenizer.json from {}", size.repo_name()))?;
        let weights_path = repo
            .get("model.safetensors")
            .await
            .with_context(|| format!("Failed to download model.safetensors from {}", size.repo_name()))?;

        let model = tokio::task::spawn_blocking(move || {
            Self::from_files(size, device, &config_path, &tokenizer_path, &weights_path)
        })
        .await
        .context("Whisper loading task panicked")??;

        info!(
            model = %size,
            elapsed_secs = started.elapsed().as_secs_f64(),
            "Whisper model loaded"
        );
        Ok(model)
    }

    fn from_files(
        size: ModelSize,
        device: Device,
        config_path: &Path,
        tokenizer_path: &Path,
        weights_path: &Path,
    ) -> Result<Self> {
        let config: Config = serde_json::from_reader(std::fs::File::open(config_path)?)
            .context("Failed to parse Whisper config.json")?;
        debug!(?config, "Whisper model config");

        let tokenizer =
            Tokenizer::from_file(tokenizer_path).map_err(|e| anyhow!("Failed to load tokenizer: {}", e))?;
        let tokens = SpecialTokens::resolve(&tokenizer)?;
        let mel_filters = mel_filter_bank(config.num_mel_bins, m::N_FFT, m::SAMPLE_RATE);

        // SAFETY: the weights file is owned by the HuggingFace cache and not modified while mapped.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights_path], m::DTYPE, &device)? };
        let model = m::model::Whisper::load(&vb, config.clone())?;

        Ok(Self {
            model,
            config,
            device,
            tokenizer,
            mel_filters,
            tokens,
            size,
        })
    }

    pub fn size(&self) -> ModelSize {
        self.size
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Transcribe one window of 16 kHz mono audio.
    ///
    /// `pcm` longer than [`WINDOW_SAMPLES`] is truncated, shorter input is zero-padded.
    /// `language` is an ISO code such as `"en"`; `None` lets the model decide.
    pub fn transcribe_window(
        &mut self,
        pcm: &[f32],
        language: Option<&str>,
        max_tokens: usize,
    ) -> Result<WindowTranscript> {
        let mut window = vec![0.0f32; WINDOW_SAMPLES];
        let copy_len = pcm.len().min(WINDOW_SAMPLES);
        window[..copy_len].copy_from_slice(&pcm[..copy_len]);

        let mel = m::audio::pcm_to_mel(&self.config, &window, &self.mel_filters);
        let n_mels = self.config.num_mel_bins;
        let n_frames = mel.len() / n_mels;
        let mel = Tensor::from_vec(mel, (1, n_mels, n_frames), &self.device)?;

        let features = self.model.encoder.forward(&mel, true)?;

        let mut tokens = vec![self.tokens.sot];
        if let Some(language_token) = language.and_then(|l| self.language_token(l)) {
            tokens.push(language_token);
        }
        tokens.push(self.tokens.transcribe);
        tokens.push(self.tokens.no_timestamps);

        let budget = max_tokens.min(self.config.max_target_positions.saturating_sub(tokens.len()));
        let mut output = Vec::new();
        let mut log_probs = Vec::new();

        for step in 0..budget {
            let input = Tensor::new(tokens.as_slice(), &self.device)?.unsqueeze(0)?;
            let hidden = self.model.decoder.forward(&input, &features, step == 0)?;
            let (_, seq_len, _) = hidden.dims3()?;
            let logits = self
                .model
                .decoder
                .final_linear(&hidden.i((..1, seq_len - 1..))?)?
                .i(0)?
                .i(0)?;
            let next = logits.argmax(0)?.to_scalar::<u32>()?;

            if next == self.tokens.eot || is_repetitive(&output, next) {
                break;
            }
            let probability = candle_nn::ops::softmax(&logits, 0)?
                .i(next as usize)?
                .to_dtype(DType::F32)?
                .to_scalar::<f32>()?;
            log_probs.push(f64::from(probability.max(f32::MIN_POSITIVE)).ln());
            tokens.push(next);
            output.push(next);
        }

        self.model.reset_kv_cache();

        let text = self
            .tokenizer
            .decode(&output, true)
            .map_err(|e| anyhow!("Tokenizer decode error: {}", e))?;
        Ok(WindowTranscript {
            text: text.trim().to_string(),
            confidence: mean_probability(&log_probs),
        })
    }

    fn language_token(&self, language: &str) -> Option<u32> {
        let code = language.trim().to_lowercase();
        self.tokenizer.token_to_id(&format!("<|{}|>", code))
    }
}

fn hub_api() -> Result<Api> {
    let mut builder = ApiBuilder::new().with_progress(false);

    if let Ok(token) = std::env::var("HF_TOKEN") {
        builder = builder.with_token(Some(token));
    }
    if let Ok(cache_dir) = std::env::var("HF_HUB_CACHE") {
        builder = builder.with_cache_dir(PathBuf::from(cache_dir));
    } else if let Ok(hf_home) = std::env::var("HF_HOME") {
        builder = builder.with_cache_dir(PathBuf::from(hf_home).join("hub"));
    }

    builder.build().context("Failed to create HuggingFace API client")
}

/// `exp` of the average log-probability, the same scale as `avg_logprob` from the Whisper API.
fn mean_probability(log_probs: &[f64]) -> Option<f32> {
    if log_probs.is_empty() {
        return None;
    }
    let mean = log_probs.iter().sum::<f64>() / log_probs.len() as f64;
    Some(mean.exp().clamp(0.0, 1.0) as f32)
}

/// True when appending `next` would continue a degenerate loop.
fn is_repetitive(tokens: &[u32], next: u32) -> bool {
    if tokens.len() < 6 {
        return false;
    }

    if tokens[tokens.len() - 3..] == [next, next, next] {
        return true;
    }

    let last_3 = &tokens[tokens.len() - 3..];
    let prev_3 = &tokens[tokens.len() - 6..tokens.len() - 3];
    last_3 == prev_3
}

fn hz_to_mel(hz: f64) -> f64 {
    const F_SP: f64 = 200.0 / 3.0;
    const MIN_LOG_HZ: f64 = 1000.0;
    let min_log_mel = MIN_LOG_HZ / F_SP;
    let log_step = 6.4f64.ln() / 27.0;

    if hz >= MIN_LOG_HZ {
        min_log_mel + (hz / MIN_LOG_HZ).ln() / log_step
    } else {
        hz / F_SP
    }
}

fn mel_to_hz(mel: f64) -> f64 {
    const F_SP: f64 = 200.0 / 3.0;
    const MIN_LOG_HZ: f64 = 1000.0;
    let min_log_mel = MIN_LOG_HZ / F_SP;
    let log_step = 6.4f64.ln() / 27.0;

    if mel >= min_log_mel {
        MIN_LOG_HZ * (log_step * (mel - min_log_mel)).exp()
    } else {
        mel * F_SP
    }
}

/// Slaney-style mel filterbank laid out as `[n_mels][n_fft / 2 + 1]`.
pub fn mel_filter_bank(n_mels: usize, n_fft: usize, sample_rate: usize) -> Vec<f32> {
    let n_freqs = n_fft / 2 + 1;
    let fft_freqs: Vec<f64> = (0..n_freqs)
        .map(|i| i as f64 * sample_rate as f64 / n_fft as f64)
        .collect();

    let min_mel = hz_to_mel(0.0);
    let max_mel = hz_to_mel(sample_rate as f64 / 2.0);
    let edges: Vec<f64> = (0..n_mels + 2)
        .map(|i| mel_to_hz(min_mel + (max_mel - min_mel) * i as f64 / (n_mels + 1) as f64))
        .collect();

    let mut filters = vec![0.0f32; n_mels * n_freqs];
    for band in 0..n_mels {
        let (lower, center, upper) = (edges[band], edges[band + 1], edges[band + 2]);
        let norm = 2.0 / (upper - lower);

        for (k, &freq) in fft_freqs.iter().enumerate() {
            let rising = (freq - lower) / (center - lower);
            let falling = (upper - freq) / (upper - center);
            filters[band * n_freqs + k] = (norm * rising.min(falling).max(0.0)) as f32;
        }
    }
    filters
}

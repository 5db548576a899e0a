//! Run configuration.
//!
//! [`ExtractConfig`] deserializes from the camelCase JSON shape used by
//! front-ends (`baseUrl`, `maxCharsPerChunk`, ...) and every field has a
//! default, so partial documents are accepted.

use crate::error::Result;
use crate::PipelineError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Output format requested from the model for extraction tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// A JSON array of records.
    #[default]
    Json,
    /// Tab-separated rows, one record per line.
    Tsv,
}

/// Sampling parameters forwarded verbatim in the request body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingOptions {
    pub temperature: f64,
    pub top_k: u32,
    pub repeat_penalty: f64,
}

/// Configuration for a pipeline run.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExtractConfig {
    /// Server root including the API prefix, e.g. `http://localhost:1234/v1`.
    pub base_url: String,

    /// Sent as `Authorization: Bearer {key}` when present.
    pub api_key: Option<String>,

    /// Model identifier. Required.
    pub model: String,

    pub temperature: f64,
    pub top_k: u32,
    pub repeat_penalty: f64,

    /// Upper bound on segment length, in characters.
    pub max_chars_per_chunk: usize,

    /// Characters shared between consecutive segments. Must be smaller than
    /// `max_chars_per_chunk`.
    pub overlap_chars: usize,

    pub output_format: OutputFormat,

    /// HTTP client timeout.
    pub timeout_secs: u64,

    /// Minimum spacing between live stream statistics updates.
    pub stats_interval_ms: u64,

    /// Frames read from one response before the reader stops.
    pub max_stream_frames: usize,

    /// Accept paragraph-split text when a chunking response is not JSON.
    pub allow_fallback: bool,

    /// Check the model against `GET /models` before the first request.
    pub validate_model: bool,

    /// Target chunk size bounds for chunking prompts and local chunk methods.
    pub min_chunk_size: usize,
    pub max_chunk_size: usize,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:1234/v1".to_string(),
            api_key: Some("lm-studio".to_string()),
            model: String::new(),
            temperature: 0.7,
            top_k: 40,
            repeat_penalty: 1.1,
            max_chars_per_chunk: 2000,
            overlap_chars: 200,
            output_format: OutputFormat::Json,
            timeout_secs: 300,
            stats_interval_ms: 100,
            max_stream_frames: 100_000,
            allow_fallback: true,
            validate_model: true,
            min_chunk_size: 100,
            max_chunk_size: 1000,
        }
    }
}

impl std::fmt::Debug for ExtractConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_deref().map(redact))
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("top_k", &self.top_k)
            .field("repeat_penalty", &self.repeat_penalty)
            .field("max_chars_per_chunk", &self.max_chars_per_chunk)
            .field("overlap_chars", &self.overlap_chars)
            .field("output_format", &self.output_format)
            .field("timeout_secs", &self.timeout_secs)
            .field("stats_interval_ms", &self.stats_interval_ms)
            .field("max_stream_frames", &self.max_stream_frames)
            .field("allow_fallback", &self.allow_fallback)
            .field("validate_model", &self.validate_model)
            .finish_non_exhaustive()
    }
}

pub(crate) fn redact(key: &str) -> String {
    let prefix: String = key.chars().take(6).collect();
    if key.chars().count() > 6 {
        format!("{}***", prefix)
    } else {
        "***".to_string()
    }
}

impl ExtractConfig {
    /// Parse a JSON configuration document. Missing keys take defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn without_api_key(mut self) -> Self {
        self.api_key = None;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temp: f64) -> Self {
        self.temperature = temp;
        self
    }

    pub fn with_top_k(mut self, top_k: u32) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_repeat_penalty(mut self, penalty: f64) -> Self {
        self.repeat_penalty = penalty;
        self
    }

    /// Set the segment size and overlap together.
    pub fn with_chunking(mut self, max_chars: usize, overlap_chars: usize) -> Self {
        self.max_chars_per_chunk = max_chars;
        self.overlap_chars = overlap_chars;
        self
    }

    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }

    pub fn with_stats_interval(mut self, interval: Duration) -> Self {
        self.stats_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_max_stream_frames(mut self, frames: usize) -> Self {
        self.max_stream_frames = frames;
        self
    }

    pub fn with_fallback(mut self, enabled: bool) -> Self {
        self.allow_fallback = enabled;
        self
    }

    pub fn with_model_validation(mut self, enabled: bool) -> Self {
        self.validate_model = enabled;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_millis(self.stats_interval_ms)
    }

    pub fn sampling(&self) -> SamplingOptions {
        SamplingOptions {
            temperature: self.temperature,
            top_k: self.top_k,
            repeat_penalty: self.repeat_penalty,
        }
    }

    /// Reject configurations that cannot produce a run.
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(PipelineError::InvalidConfig("baseUrl is empty".into()));
        }
        if self.model.trim().is_empty() {
            return Err(PipelineError::InvalidConfig("no model selected".into()));
        }
        check_chunking(self.max_chars_per_chunk, self.overlap_chars)
    }
}

/// Segment size must be positive and strictly larger than the overlap.
pub(crate) fn check_chunking(max_chars: usize, overlap_chars: usize) -> Result<()> {
    if max_chars == 0 {
        return Err(PipelineError::InvalidConfig(
            "maxCharsPerChunk must be greater than zero".into(),
        ));
    }
    if max_chars <= overlap_chars {
        return Err(PipelineError::InvalidConfig(format!(
            "maxCharsPerChunk ({}) must exceed overlapChars ({})",
            max_chars, overlap_chars
        )));
    }
    Ok(())
}

/// Strip endpoint suffixes so `{base}/chat/completions` is never doubled.
pub(crate) fn normalize_base_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    for suffix in &["/chat/completions", "/models"] {
        if let Some(stripped) = trimmed.strip_suffix(suffix) {
            return stripped.trim_end_matches('/').to_string();
        }
    }
    trimmed.to_string()
}

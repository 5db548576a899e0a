//! Backend trait and normalized request types.
//!
//! The [`Backend`] trait abstracts over the completion server: it streams
//! one chat completion and lists the available models. Built-in
//! implementations: [`OpenAiBackend`] (HTTP) and [`MockBackend`] (scripted).
//!
//! ## Architecture
//!
//! ```text
//! Pipeline ──► ChatRequest ──► Backend::stream_completion() ──► Completion
//!                                     │
//!                          ┌──────────┴──────────┐
//!                    OpenAiBackend           MockBackend
//!               POST {base}/chat/completions  scripted SSE bytes
//!                          └──────────┬──────────┘
//!                              stream::read_stream
//! ```

pub mod mock;
pub mod openai;
pub mod sse;

pub use mock::{MockBackend, MockReply};
pub use openai::OpenAiBackend;

use crate::config::SamplingOptions;
use crate::error::Result;
use crate::stream::{Completion, StreamCallbacks, StreamLimits};
use crate::PipelineError;
use async_trait::async_trait;
use reqwest::Client;
use tokio_util::sync::CancellationToken;

/// One system + user chat request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Model identifier (e.g. `"qwen3-8b"`).
    pub model: String,
    pub system_prompt: String,
    pub user_prompt: String,
    pub sampling: SamplingOptions,
}

impl ChatRequest {
    /// Prompt length in characters, used for token estimates.
    pub fn prompt_chars(&self) -> usize {
        self.system_prompt.chars().count() + self.user_prompt.chars().count()
    }
}

/// Abstraction over completion servers.
///
/// # Object Safety
///
/// This trait is object-safe and designed to be used as `Arc<dyn Backend>`.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Stream one chat completion.
    ///
    /// `callbacks.on_delta` sees every content delta in arrival order.
    /// Returns [`PipelineError::Cancelled`] promptly once `cancel` fires.
    async fn stream_completion(
        &self,
        client: &Client,
        base_url: &str,
        request: &ChatRequest,
        limits: StreamLimits,
        callbacks: StreamCallbacks<'_>,
        cancel: &CancellationToken,
    ) -> Result<Completion>;

    /// Model identifiers the server offers.
    async fn list_models(&self, client: &Client, base_url: &str) -> Result<Vec<String>>;

    /// Human-readable name for logging and diagnostics.
    fn name(&self) -> &'static str;
}

/// Whether a caller could reasonably retry after `error`.
///
/// Retryable conditions:
/// - [`PipelineError::HttpError`] with status 408, 429 or 5xx
/// - [`PipelineError::Request`] and [`PipelineError::Timeout`]
///
/// The pipeline itself never retries.
pub fn is_retryable(error: &PipelineError) -> bool {
    match error {
        PipelineError::HttpError { status, .. } => {
            *status == 408 || *status == 429 || (500..600).contains(status)
        }
        PipelineError::Request(_) | PipelineError::Timeout => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http(status: u16) -> PipelineError {
        PipelineError::HttpError {
            status,
            body: String::new(),
            retry_after: None,
        }
    }

    #[test]
    fn test_is_retryable_statuses() {
        assert!(is_retryable(&http(429)));
        assert!(is_retryable(&http(503)));
        assert!(!is_retryable(&http(400)));
        assert!(!is_retryable(&http(401)));
    }

    #[test]
    fn test_is_retryable_other_errors() {
        assert!(is_retryable(&PipelineError::Timeout));
        assert!(!is_retryable(&PipelineError::Cancelled));
        assert!(!is_retryable(&PipelineError::InvalidConfig("x".into())));
        assert!(!is_retryable(&PipelineError::Other("x".into())));
    }

    #[test]
    fn test_prompt_chars_counts_characters() {
        let request = ChatRequest {
            model: "m".into(),
            system_prompt: "系统".into(),
            user_prompt: "abc".into(),
            sampling: crate::ExtractConfig::default().sampling(),
        };
        assert_eq!(request.prompt_chars(), 5);
    }
}

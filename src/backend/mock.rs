//! Mock backend for testing without a live server.
//!
//! [`MockBackend`] renders scripted replies into real SSE bytes and feeds
//! them through the same stream reader the HTTP backend uses, so tests
//! exercise delta forwarding, usage capture and cancellation end to end.
//!
//! # Example
//!
//! ```
//! use llm_extract::backend::MockBackend;
//!
//! let mock = MockBackend::new(vec!["ENTITIES: 人物".to_string()]);
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use futures::{stream, StreamExt};
use reqwest::Client;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use super::{Backend, ChatRequest};
use crate::error::Result;
use crate::stream::{read_stream, Completion, StreamCallbacks, StreamLimits};
use crate::PipelineError;

/// Model name the mock reports by default.
pub const MOCK_MODEL: &str = "mock-model";

/// Characters per delta when a reply is built from plain text.
const DELTA_CHARS: usize = 8;

/// One scripted answer.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Stream these deltas, then a usage frame and `[DONE]`.
    Deltas(Vec<String>),
    /// Stream these deltas, then hang until cancelled.
    Stall(Vec<String>),
    /// Answer with a non-success HTTP status.
    Status(u16, String),
    /// Fail as if the transport timed out.
    Timeout,
    /// Send this SSE body verbatim.
    Raw(String),
}

impl MockReply {
    /// Stream `text` in small deltas.
    pub fn text(text: impl AsRef<str>) -> Self {
        let chars: Vec<char> = text.as_ref().chars().collect();
        MockReply::Deltas(
            chars
                .chunks(DELTA_CHARS)
                .map(|c| c.iter().collect())
                .collect(),
        )
    }
}

/// A test backend that plays scripted replies in order.
///
/// Cycles back to the beginning when all replies have been consumed.
/// Every request is recorded for later inspection.
#[derive(Debug)]
pub struct MockBackend {
    replies: Vec<MockReply>,
    index: AtomicUsize,
    models: Vec<String>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl MockBackend {
    /// Create a mock that streams the given texts in order.
    pub fn new(responses: Vec<String>) -> Self {
        Self::scripted(responses.into_iter().map(MockReply::text).collect())
    }

    /// Create a mock that always streams the same text.
    pub fn fixed(response: impl Into<String>) -> Self {
        Self::new(vec![response.into()])
    }

    /// Create a mock from explicit replies.
    pub fn scripted(replies: Vec<MockReply>) -> Self {
        Self {
            replies,
            index: AtomicUsize::new(0),
            models: vec![MOCK_MODEL.to_string()],
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Replace the model list returned by [`Backend::list_models`].
    pub fn with_models(mut self, models: Vec<String>) -> Self {
        self.models = models;
        self
    }

    /// Requests received so far, in order.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    fn next_reply(&self) -> MockReply {
        if self.replies.is_empty() {
            return MockReply::Deltas(Vec::new());
        }
        let idx = self.index.fetch_add(1, Ordering::Relaxed) % self.replies.len();
        self.replies[idx].clone()
    }
}

fn render(deltas: &[String], prompt_chars: usize, finish: bool) -> String {
    let mut body: String = deltas
        .iter()
        .map(|d| format!("data: {}\n\n", json!({"choices": [{"delta": {"content": d}}]})))
        .collect();
    if finish {
        let prompt_tokens = prompt_chars.div_ceil(2);
        let frame = json!({
            "choices": [{"delta": {}, "finish_reason": "stop"}],
            "usage": {
                "prompt_tokens": prompt_tokens,
                "completion_tokens": deltas.len(),
                "total_tokens": prompt_tokens + deltas.len(),
            }
        });
        body.push_str(&format!("data: {}\n\ndata: [DONE]\n\n", frame));
    }
    body
}

fn frames(body: &str) -> Vec<Result<Vec<u8>>> {
    body.split_inclusive("\n\n")
        .map(|frame| Ok(frame.as_bytes().to_vec()))
        .collect()
}

#[async_trait]
impl Backend for MockBackend {
    async fn stream_completion(
        &self,
        _client: &Client,
        _base_url: &str,
        request: &ChatRequest,
        limits: StreamLimits,
        callbacks: StreamCallbacks<'_>,
        cancel: &CancellationToken,
    ) -> Result<Completion> {
        if let Ok(mut seen) = self.requests.lock() {
            seen.push(request.clone());
        }
        let prompt_chars = request.prompt_chars();

        match self.next_reply() {
            MockReply::Deltas(deltas) => {
                let body = stream::iter(frames(&render(&deltas, prompt_chars, true)));
                read_stream(body, prompt_chars, limits, callbacks, cancel).await
            }
            MockReply::Raw(body) => {
                let body = stream::iter(frames(&body));
                read_stream(body, prompt_chars, limits, callbacks, cancel).await
            }
            MockReply::Stall(deltas) => {
                let body = stream::iter(frames(&render(&deltas, prompt_chars, false)))
                    .chain(stream::pending());
                read_stream(body, prompt_chars, limits, callbacks, cancel).await
            }
            MockReply::Status(status, body) => Err(PipelineError::HttpError {
                status,
                body,
                retry_after: None,
            }),
            MockReply::Timeout => Err(PipelineError::Timeout),
        }
    }

    async fn list_models(&self, _client: &Client, _base_url: &str) -> Result<Vec<String>> {
        Ok(self.models.clone())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

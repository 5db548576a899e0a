//! Backend for OpenAI-compatible chat servers.
//!
//! [`OpenAiBackend`] covers LM Studio, llama.cpp server, vLLM, Ollama's
//! `/v1/` endpoint, and hosted OpenAI-compatible APIs.
//!
//! Endpoints: `POST {base}/chat/completions` (always streamed) and
//! `GET {base}/models`.
//! Streaming: SSE with `data: {"choices": [{"delta": {"content": "token"}}]}`.

use super::{Backend, ChatRequest};
use crate::config::{redact, ExtractConfig};
use crate::error::Result;
use crate::stream::{read_stream, Completion, StreamCallbacks, StreamLimits};
use crate::PipelineError;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Response};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Backend for any OpenAI-compatible API.
///
/// # Example
///
/// ```
/// use llm_extract::backend::OpenAiBackend;
///
/// let backend = OpenAiBackend::new();
/// let with_key = OpenAiBackend::new().with_api_key("lm-studio");
/// assert!(with_key.has_api_key());
/// ```
#[derive(Clone, Default)]
pub struct OpenAiBackend {
    /// Optional API key. If set, sent as `Authorization: Bearer {key}`.
    pub(crate) api_key: Option<String>,
}

impl std::fmt::Debug for OpenAiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiBackend")
            .field("api_key", &self.api_key.as_deref().map(redact))
            .finish()
    }
}

impl OpenAiBackend {
    /// Create a new OpenAI-compatible backend without authentication.
    pub fn new() -> Self {
        Self { api_key: None }
    }

    /// Backend using the API key from `config`, if any.
    pub fn from_config(config: &ExtractConfig) -> Self {
        Self {
            api_key: config.api_key.clone().filter(|k| !k.trim().is_empty()),
        }
    }

    /// Set the API key for authentication.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Returns `true` if an API key has been configured.
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Build the request body for `/chat/completions`.
    fn build_body(request: &ChatRequest) -> Value {
        let mut messages = Vec::with_capacity(2);
        if !request.system_prompt.is_empty() {
            messages.push(json!({"role": "system", "content": request.system_prompt}));
        }
        messages.push(json!({"role": "user", "content": request.user_prompt}));

        json!({
            "model": request.model,
            "messages": messages,
            "temperature": request.sampling.temperature,
            "top_k": request.sampling.top_k,
            "repeat_penalty": request.sampling.repeat_penalty,
            "stream": true,
            "stream_options": {"include_usage": true},
        })
    }

    /// Parse a `Retry-After` header value as seconds.
    fn parse_retry_after(value: &str) -> Option<std::time::Duration> {
        value
            .trim()
            .parse::<u64>()
            .ok()
            .map(std::time::Duration::from_secs)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.api_key {
            Some(ref key) => req.header("Authorization", format!("Bearer {}", key)),
            None => req,
        }
    }

    /// Build the streaming chat request with appropriate headers.
    fn build_http_request(
        &self,
        client: &Client,
        url: &str,
        body: &Value,
    ) -> reqwest::RequestBuilder {
        self.authorize(client.post(url).json(body))
            .header("Accept", "text/event-stream")
    }

    /// Turn a non-success response into [`PipelineError::HttpError`].
    async fn check_status(resp: Response) -> Result<Response> {
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status().as_u16();
        let retry_after = resp
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(Self::parse_retry_after);
        let body = resp.text().await.unwrap_or_default();
        Err(PipelineError::HttpError {
            status,
            body,
            retry_after,
        })
    }
}

#[async_trait]
impl Backend for OpenAiBackend {
    async fn stream_completion(
        &self,
        client: &Client,
        base_url: &str,
        request: &ChatRequest,
        limits: StreamLimits,
        callbacks: StreamCallbacks<'_>,
        cancel: &CancellationToken,
    ) -> Result<Completion> {
        let url = format!("{}/chat/completions", base_url.trim_end_matches('/'));
        let body = Self::build_body(request);
        debug!(url = %url, model = %request.model, "sending chat completion request");

        let send = self.build_http_request(client, &url, &body).send();
        let resp = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
            resp = send => resp.map_err(PipelineError::from_transport)?,
        };
        let resp = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
            resp = Self::check_status(resp) => resp?,
        };
        debug!(status = resp.status().as_u16(), "completion stream opened");

        let body = resp
            .bytes_stream()
            .map(|chunk| chunk.map_err(PipelineError::from_transport));
        read_stream(body, request.prompt_chars(), limits, callbacks, cancel).await
    }

    async fn list_models(&self, client: &Client, base_url: &str) -> Result<Vec<String>> {
        let url = format!("{}/models", base_url.trim_end_matches('/'));
        let resp = self
            .authorize(client.get(&url))
            .send()
            .await
            .map_err(PipelineError::from_transport)?;
        let resp = Self::check_status(resp).await?;
        let json_resp: Value = resp.json().await.map_err(PipelineError::from_transport)?;

        let models = json_resp
            .get("data")
            .and_then(Value::as_array)
            .ok_or_else(|| PipelineError::Protocol("model list has no `data` array".into()))?
            .iter()
            .filter_map(|m| {
                m.get("id")
                    .or_else(|| m.get("name"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .collect();
        Ok(models)
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::StreamStats;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_request() -> ChatRequest {
        ChatRequest {
            model: "qwen3-8b".into(),
            system_prompt: "你是信息抽取助手。".into(),
            user_prompt: "张三在北京。".into(),
            sampling: ExtractConfig::default().sampling(),
        }
    }

    fn sse_body(parts: &[&str]) -> String {
        let mut body: String = parts
            .iter()
            .map(|p| format!("data: {}\n\n", json!({"choices": [{"delta": {"content": p}}]})))
            .collect();
        body.push_str(&format!(
            "data: {}\n\n",
            json!({
                "choices": [{"delta": {}, "finish_reason": "stop"}],
                "usage": {"prompt_tokens": 20, "completion_tokens": 2, "total_tokens": 22}
            })
        ));
        body.push_str("data: [DONE]\n\n");
        body
    }

    async fn stream(
        backend: &OpenAiBackend,
        client: &Client,
        base: &str,
    ) -> (Result<Completion>, Vec<String>) {
        let mut deltas = Vec::new();
        let cancel = CancellationToken::new();
        let result = backend
            .stream_completion(
                client,
                base,
                &test_request(),
                StreamLimits::default(),
                StreamCallbacks {
                    on_delta: &mut |d: &str| deltas.push(d.to_string()),
                    on_stats: &mut |_: &StreamStats| {},
                },
                &cancel,
            )
            .await;
        (result, deltas)
    }

    #[test]
    fn test_body_carries_sampling_and_stream_options() {
        let body = OpenAiBackend::build_body(&test_request());
        assert_eq!(body["model"], "qwen3-8b");
        assert_eq!(body["temperature"], 0.7);
        assert_eq!(body["top_k"], 40);
        assert_eq!(body["repeat_penalty"], 1.1);
        assert_eq!(body["stream"], true);
        assert_eq!(body["stream_options"]["include_usage"], true);

        let messages = body["messages"].as_array().expect("messages");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[1]["content"], "张三在北京。");
    }

    const COMPLETIONS_URL: &str = "http://localhost:1234/v1/chat/completions";

    #[test]
    fn test_auth_header() {
        let backend = OpenAiBackend::new().with_api_key("sk-test123");
        let req = backend
            .build_http_request(&Client::new(), COMPLETIONS_URL, &json!({}))
            .build()
            .expect("build request");
        assert_eq!(req.headers().get("Authorization").expect("auth"), "Bearer sk-test123");

        let req = OpenAiBackend::new()
            .build_http_request(&Client::new(), COMPLETIONS_URL, &json!({}))
            .build()
            .expect("build request");
        assert!(req.headers().get("Authorization").is_none());
    }

    #[test]
    fn test_from_config_ignores_blank_key() {
        let cfg = ExtractConfig::default().with_api_key("  ");
        assert!(!OpenAiBackend::from_config(&cfg).has_api_key());
        assert!(OpenAiBackend::from_config(&ExtractConfig::default()).has_api_key());
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let backend = OpenAiBackend::new().with_api_key("sk-1234567890abcdef");
        let debug_output = format!("{:?}", backend);
        assert!(!debug_output.contains("1234567890abcdef"));
        assert!(debug_output.contains("sk-123***"));
    }

    #[tokio::test]
    async fn test_streams_completion_from_server() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer lm-studio"))
            .and(body_partial_json(json!({"stream": true, "top_k": 40})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(sse_body(&["张", "三"]), "text/event-stream"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let backend = OpenAiBackend::new().with_api_key("lm-studio");
        let base = format!("{}/v1", server.uri());
        let (result, deltas) = stream(&backend, &Client::new(), &base).await;
        let completion = result.unwrap();
        assert_eq!(completion.text, "张三");
        assert_eq!(deltas, vec!["张", "三"]);
        assert_eq!(completion.usage.total_tokens, 22);
        assert_eq!(completion.finish_reason.as_deref(), Some("stop"));
    }

    #[tokio::test]
    async fn test_http_error_carries_status_and_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("retry-after", "7")
                    .set_body_string("slow down"),
            )
            .mount(&server)
            .await;

        let base = format!("{}/v1", server.uri());
        let (result, deltas) = stream(&OpenAiBackend::new(), &Client::new(), &base).await;
        match result {
            Err(PipelineError::HttpError { status, body, retry_after }) => {
                assert_eq!(status, 429);
                assert_eq!(body, "slow down");
                assert_eq!(retry_after, Some(Duration::from_secs(7)));
            }
            other => panic!("expected HttpError, got {:?}", other.map(|c| c.text)),
        }
        assert!(deltas.is_empty());
    }

    #[tokio::test]
    async fn test_slow_server_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let client = Client::builder()
            .timeout(Duration::from_millis(200))
            .build()
            .unwrap();
        let (result, _) = stream(&OpenAiBackend::new(), &client, &server.uri()).await;
        assert!(matches!(result, Err(PipelineError::Timeout)));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let (result, _) =
            stream(&OpenAiBackend::new(), &Client::new(), "http://127.0.0.1:1/v1").await;
        let err = result.unwrap_err();
        assert!(err.is_transport());
        assert!(crate::backend::is_retryable(&err));
    }

    #[tokio::test]
    async fn test_cancel_before_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
            .mount(&server)
            .await;

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });
        let result = OpenAiBackend::new()
            .stream_completion(
                &Client::new(),
                &server.uri(),
                &test_request(),
                StreamLimits::default(),
                StreamCallbacks {
                    on_delta: &mut |_: &str| {},
                    on_stats: &mut |_: &StreamStats| {},
                },
                &cancel,
            )
            .await;
        assert!(matches!(result, Err(PipelineError::Cancelled)));
    }

    #[tokio::test]
    async fn test_list_models() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/models"))
            .and(header("authorization", "Bearer k"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "object": "list",
                "data": [{"id": "qwen3-8b"}, {"name": "glm-4"}, {"owned_by": "nobody"}]
            })))
            .mount(&server)
            .await;

        let models = OpenAiBackend::new()
            .with_api_key("k")
            .list_models(&Client::new(), &format!("{}/v1", server.uri()))
            .await
            .unwrap();
        assert_eq!(models, vec!["qwen3-8b", "glm-4"]);
    }

    #[tokio::test]
    async fn test_list_models_unexpected_shape() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"models": []})))
            .mount(&server)
            .await;

        let err = OpenAiBackend::new()
            .list_models(&Client::new(), &server.uri())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Protocol(_)));
    }
}

//! Execution context shared by every run of a [`Pipeline`](crate::Pipeline).
//!
//! [`ExecCtx`] carries the HTTP client, completion backend, normalised
//! endpoint, configuration, cancellation token and optional event handler.
//! Build it once and hand it to [`Pipeline::new`](crate::Pipeline::new).

use crate::backend::{Backend, OpenAiBackend};
use crate::config::{normalize_base_url, ExtractConfig};
use crate::error::Result;
use crate::events::EventHandler;
use reqwest::Client;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Shared execution context for runs.
///
/// # Example
///
/// ```
/// use llm_extract::{ExecCtx, ExtractConfig};
///
/// let config = ExtractConfig::default().with_model("qwen3-8b");
/// let ctx = ExecCtx::builder(config).build().unwrap();
/// assert_eq!(ctx.base_url, "http://localhost:1234/v1");
/// ```
pub struct ExecCtx {
    /// HTTP client (cheap to clone, uses `Arc` internally).
    pub client: Client,
    /// Normalised server root; endpoints are appended to it.
    pub base_url: String,
    /// Completion backend. Default: [`OpenAiBackend`] built from the config.
    pub backend: Arc<dyn Backend>,
    pub config: ExtractConfig,
    /// Cancels every run that uses this context.
    pub cancellation: CancellationToken,
    /// Optional observer for run events.
    pub event_handler: Option<Arc<dyn EventHandler>>,
}

impl ExecCtx {
    /// Create a new builder.
    pub fn builder(config: ExtractConfig) -> ExecCtxBuilder {
        ExecCtxBuilder {
            client: None,
            backend: None,
            config,
            cancellation: None,
            event_handler: None,
        }
    }

    /// Check whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Return an error if cancellation has been requested.
    pub fn check_cancelled(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(crate::PipelineError::Cancelled);
        }
        Ok(())
    }
}

impl std::fmt::Debug for ExecCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecCtx")
            .field("base_url", &self.base_url)
            .field("backend", &self.backend.name())
            .field("config", &self.config)
            .field("cancelled", &self.cancellation.is_cancelled())
            .field("has_event_handler", &self.event_handler.is_some())
            .finish()
    }
}

/// Builder for [`ExecCtx`].
pub struct ExecCtxBuilder {
    client: Option<Client>,
    backend: Option<Arc<dyn Backend>>,
    config: ExtractConfig,
    cancellation: Option<CancellationToken>,
    event_handler: Option<Arc<dyn EventHandler>>,
}

impl ExecCtxBuilder {
    /// Set the HTTP client. If not set, one is built with the config timeout.
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Set the completion backend.
    pub fn backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Share an existing cancellation token.
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Set the event handler.
    pub fn event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    /// Build the execution context.
    ///
    /// Fails only if the default HTTP client cannot be constructed.
    pub fn build(self) -> Result<ExecCtx> {
        let client = match self.client {
            Some(client) => client,
            None => Client::builder().timeout(self.config.timeout()).build()?,
        };
        let backend = self
            .backend
            .unwrap_or_else(|| Arc::new(OpenAiBackend::from_config(&self.config)));
        Ok(ExecCtx {
            client,
            base_url: normalize_base_url(&self.config.base_url),
            backend,
            config: self.config,
            cancellation: self.cancellation.unwrap_or_default(),
            event_handler: self.event_handler,
        })
    }
}

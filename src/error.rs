use std::time::Duration;
use thiserror::Error;

/// Errors produced by the pipeline and its components.
///
/// Malformed stream frames and unparseable model output are not errors at
/// this level: the first are logged and skipped by the stream reader, the
/// second are reported through [`ParseDiagnostics`](crate::ParseDiagnostics).
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Low-level HTTP transport failure (connection refused, reset, DNS).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The transport gave up waiting for the server.
    #[error("Request timed out")]
    Timeout,

    /// JSON parsing failed at the serde level.
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// The run was cancelled through its [`RunHandle`](crate::RunHandle).
    #[error("Run was cancelled")]
    Cancelled,

    /// Invalid configuration (missing model, empty base URL, bad chunk sizes).
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// HTTP error with status code, response body, and optional Retry-After hint.
    ///
    /// Returned by [`Backend`](crate::backend::Backend) implementations when
    /// the server answers with a non-success status code.
    #[error("HTTP {status}: {body}")]
    HttpError {
        /// HTTP status code (e.g. 401, 429, 503).
        status: u16,
        /// Response body text.
        body: String,
        /// Parsed `Retry-After` header value, if present.
        retry_after: Option<Duration>,
    },

    /// The response stream could not be read as a completion stream at all.
    #[error("Stream protocol error: {0}")]
    Protocol(String),

    /// Catch-all for other errors.
    #[error("{0}")]
    Other(String),
}

impl PipelineError {
    /// Map a reqwest error, keeping timeouts distinguishable.
    pub(crate) fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            PipelineError::Timeout
        } else {
            PipelineError::Request(err)
        }
    }

    /// `true` for failures of the connection itself (including HTTP status errors).
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            PipelineError::Request(_) | PipelineError::Timeout | PipelineError::HttpError { .. }
        )
    }
}

impl From<anyhow::Error> for PipelineError {
    fn from(err: anyhow::Error) -> Self {
        PipelineError::Other(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

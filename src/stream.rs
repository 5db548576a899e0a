//! Reading a streamed chat completion.
//!
//! [`read_stream`] drives any byte stream of SSE frames to completion:
//! deltas are appended and forwarded in arrival order, usage and finish
//! reason are captured when the server sends them, live statistics are
//! throttled to a fixed cadence, and cancellation abandons the read at the
//! next suspension point. The HTTP backend and the mock backend share it.

use std::time::{Duration, Instant};

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::backend::sse::{SseDecoder, SseFrame};
use crate::error::Result;
use crate::PipelineError;

/// Token counts reported by the server (or estimated).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// Live statistics for one streamed request.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StreamStats {
    /// Characters received so far.
    pub chars: usize,
    /// Non-empty deltas received so far.
    pub deltas: u64,
    pub elapsed: Duration,
    pub time_to_first_token: Option<Duration>,
    /// Deltas per second since the request was sent.
    pub tokens_per_second: f64,
    /// Server-reported usage, once seen.
    pub usage: Option<Usage>,
    pub finish_reason: Option<String>,
}

/// The finished result of one streamed request.
#[derive(Debug, Clone)]
pub struct Completion {
    /// Concatenation of every content delta, in arrival order.
    pub text: String,
    pub usage: Usage,
    /// `usage` was estimated because the server did not report it.
    pub usage_estimated: bool,
    pub finish_reason: Option<String>,
    pub first_token_at: Option<Instant>,
    pub time_to_first_token: Option<Duration>,
    pub elapsed: Duration,
    /// Frames that were skipped because they could not be read.
    pub malformed_frames: usize,
}

/// Callbacks invoked while a stream is read.
pub struct StreamCallbacks<'a> {
    /// Each non-empty content delta, in order.
    pub on_delta: &'a mut (dyn FnMut(&str) + Send),
    /// Throttled statistics, plus one final update.
    pub on_stats: &'a mut (dyn FnMut(&StreamStats) + Send),
}

/// Cadence and safety bound for [`read_stream`].
#[derive(Debug, Clone, Copy)]
pub struct StreamLimits {
    pub stats_interval: Duration,
    /// Upper bound on frames plus body reads that carried no frame.
    pub max_frames: usize,
}

impl Default for StreamLimits {
    fn default() -> Self {
        Self {
            stats_interval: Duration::from_millis(100),
            max_frames: 100_000,
        }
    }
}

/// Accumulator for one response.
#[derive(Debug)]
pub struct StreamState {
    started: Instant,
    prompt_chars: usize,
    text: String,
    deltas: u64,
    first_token_at: Option<Instant>,
    usage: Option<Usage>,
    finish_reason: Option<String>,
    frames: usize,
    malformed: usize,
    last_stats: Instant,
}

impl StreamState {
    /// `prompt_chars` feeds the prompt-token estimate used when the server
    /// reports no usage.
    pub fn new(prompt_chars: usize) -> Self {
        let now = Instant::now();
        Self {
            started: now,
            prompt_chars,
            text: String::new(),
            deltas: 0,
            first_token_at: None,
            usage: None,
            finish_reason: None,
            frames: 0,
            malformed: 0,
            last_stats: now,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn stats(&self) -> StreamStats {
        let elapsed = self.started.elapsed();
        let secs = elapsed.as_secs_f64();
        StreamStats {
            chars: self.text.chars().count(),
            deltas: self.deltas,
            elapsed,
            time_to_first_token: self.first_token_at.map(|t| t - self.started),
            tokens_per_second: if secs > 0.0 { self.deltas as f64 / secs } else { 0.0 },
            usage: self.usage,
            finish_reason: self.finish_reason.clone(),
        }
    }

    /// Count one iteration against the frame limit. Returns `false` once the
    /// limit is exceeded.
    fn tick(&mut self, limits: &StreamLimits) -> bool {
        self.frames += 1;
        if self.frames > limits.max_frames {
            warn!(
                max_frames = limits.max_frames,
                "stream exceeded frame limit; stopping read"
            );
            self.finish_reason = Some("frame_limit".to_string());
            return false;
        }
        true
    }

    /// Apply one frame. Returns `false` when reading should stop.
    fn on_frame(
        &mut self,
        frame: SseFrame,
        callbacks: &mut StreamCallbacks<'_>,
        limits: &StreamLimits,
    ) -> bool {
        if !self.tick(limits) {
            return false;
        }

        match frame {
            SseFrame::Done => return false,
            SseFrame::Malformed(line) => {
                self.malformed += 1;
                warn!(line = %line, "skipping malformed stream frame");
            }
            SseFrame::Data(value) => {
                if !value.is_object() {
                    self.malformed += 1;
                    warn!(frame = %value, "skipping unexpected stream frame");
                    return true;
                }
                self.apply(&value, callbacks, limits);
            }
        }
        true
    }

    fn apply(&mut self, value: &Value, callbacks: &mut StreamCallbacks<'_>, limits: &StreamLimits) {
        let choice = value.get("choices").and_then(|c| c.get(0));

        if let Some(content) = choice
            .and_then(|c| c.get("delta"))
            .and_then(|d| d.get("content"))
            .and_then(Value::as_str)
        {
            if !content.is_empty() {
                let now = Instant::now();
                self.first_token_at.get_or_insert(now);
                self.deltas += 1;
                self.text.push_str(content);
                (callbacks.on_delta)(content);

                if now.duration_since(self.last_stats) >= limits.stats_interval {
                    self.last_stats = now;
                    (callbacks.on_stats)(&self.stats());
                }
            }
        }

        if let Some(reason) = choice
            .and_then(|c| c.get("finish_reason"))
            .and_then(Value::as_str)
        {
            self.finish_reason = Some(reason.to_string());
        }

        if let Some(usage) = value.get("usage").filter(|u| u.is_object()) {
            match serde_json::from_value::<Usage>(usage.clone()) {
                Ok(usage) => self.usage = Some(usage),
                Err(err) => debug!(error = %err, "ignoring unreadable usage block"),
            }
        }
    }

    /// Close the request, estimating usage if the server sent none.
    pub fn finish(self) -> Completion {
        let (usage, usage_estimated) = match self.usage {
            Some(mut usage) if usage.completion_tokens > 0 => {
                if usage.total_tokens == 0 {
                    usage.total_tokens = usage.prompt_tokens + usage.completion_tokens;
                }
                (usage, false)
            }
            _ => {
                let prompt_tokens = self.prompt_chars.div_ceil(2) as u64;
                let completion_tokens = self.deltas;
                (
                    Usage {
                        prompt_tokens,
                        completion_tokens,
                        total_tokens: prompt_tokens + completion_tokens,
                    },
                    true,
                )
            }
        };
        Completion {
            time_to_first_token: self.first_token_at.map(|t| t - self.started),
            elapsed: self.started.elapsed(),
            text: self.text,
            usage,
            usage_estimated,
            finish_reason: self.finish_reason,
            first_token_at: self.first_token_at,
            malformed_frames: self.malformed,
        }
    }
}

/// Read an SSE completion stream until `[DONE]`, end of body, the frame
/// limit, or cancellation.
///
/// Transport errors from `body` are returned as-is. Cancellation returns
/// [`PipelineError::Cancelled`] and drops the body.
pub async fn read_stream<S, B>(
    body: S,
    prompt_chars: usize,
    limits: StreamLimits,
    mut callbacks: StreamCallbacks<'_>,
    cancel: &CancellationToken,
) -> Result<Completion>
where
    S: Stream<Item = Result<B>>,
    B: AsRef<[u8]>,
{
    let mut body = std::pin::pin!(body);
    let mut decoder = SseDecoder::new();
    let mut state = StreamState::new(prompt_chars);
    let mut ended_early = false;

    'read: loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
            item = body.next() => item,
        };
        let Some(chunk) = next else {
            break;
        };
        let frames = decoder.decode(chunk?.as_ref());
        // Reads that complete no frame (keep-alives, partial lines) still count.
        if frames.is_empty() && !state.tick(&limits) {
            ended_early = true;
            break;
        }
        for frame in frames {
            if !state.on_frame(frame, &mut callbacks, &limits) {
                ended_early = true;
                break 'read;
            }
        }
    }

    if !ended_early {
        for frame in decoder.flush() {
            if !state.on_frame(frame, &mut callbacks, &limits) {
                break;
            }
        }
    }

    (callbacks.on_stats)(&state.stats());
    debug!(
        chars = state.text().len(),
        malformed = state.malformed,
        "stream finished"
    );
    Ok(state.finish())
}

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::stream::Completion;

/// Severity of a user-facing log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warn,
    Error,
}

/// Which pass of a run is executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Semantic chunking of a document.
    Chunking,
    /// First NER pass: discover entity and relation types.
    Discovery,
    /// Second NER pass: extract records constrained to the discovered types.
    Extraction,
}

impl Phase {
    pub fn label(self) -> &'static str {
        match self {
            Phase::Chunking => "chunking",
            Phase::Discovery => "type discovery",
            Phase::Extraction => "entity extraction",
        }
    }
}

/// Lifecycle of one run.
///
/// ```text
/// Idle -> Splitting -> (Requesting -> Extracting -> Merging)* -> Completed | Canceled | Failed
/// ```
///
/// Segment indices are 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "segment", rename_all = "lowercase")]
pub enum RunState {
    Idle,
    Splitting,
    Requesting(usize),
    Extracting(usize),
    Merging(usize),
    Completed,
    Canceled,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Completed | RunState::Canceled | RunState::Failed)
    }
}

/// Counters accumulated over a run.
///
/// Token counts only grow. Segment counters describe the current phase and
/// `segments_processed` never exceeds `segments_total`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    /// Wall time spent in completion requests.
    pub elapsed: Duration,
    pub segments_processed: usize,
    pub segments_total: usize,
    /// At least one request reported no usage and was estimated.
    pub usage_estimated: bool,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset the segment counters for a phase over `segments_total` segments.
    pub fn begin_phase(&mut self, segments_total: usize) {
        self.segments_total = segments_total;
        self.segments_processed = 0;
    }

    /// Add the usage and timing of one finished request.
    pub fn absorb(&mut self, completion: &Completion) {
        self.prompt_tokens += completion.usage.prompt_tokens;
        self.completion_tokens += completion.usage.completion_tokens;
        self.total_tokens += completion.usage.total_tokens;
        self.elapsed += completion.elapsed;
        self.usage_estimated |= completion.usage_estimated;
    }

    /// Count a finished segment.
    pub fn segment_done(&mut self) {
        self.segments_processed = (self.segments_processed + 1).min(self.segments_total);
    }

    /// Fraction of the current phase completed, in `[0, 1]`.
    pub fn fraction(&self) -> f64 {
        if self.segments_total == 0 {
            return 0.0;
        }
        self.segments_processed as f64 / self.segments_total as f64
    }
}

//! Run orchestration.
//!
//! A [`Pipeline`] drives one document through the stages of a run:
//!
//! ```text
//! Idle -> Splitting -> (Requesting -> Extracting -> Merging)* -> Completed | Canceled | Failed
//! ```
//!
//! Segments run strictly one after another. The stream read is the only
//! suspension point inside a segment; everything else is synchronous.
//! Cancellation is checked before each segment and during every read, and a
//! canceled or failed run still returns the records and statistics
//! accumulated up to the last fully merged segment.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::chunker::{self, ChunkMethod};
use crate::error::Result;
use crate::events::{emit, Event};
use crate::exec_ctx::ExecCtx;
use crate::merge::ResultSet;
use crate::output_parser::extract;
use crate::record::TypeVocabulary;
use crate::stream::{StreamCallbacks, StreamLimits, StreamStats};
use crate::task::Task;
use crate::types::{Phase, RunState, RunStats, Severity};
use crate::PipelineError;

/// Result of a finished run, whatever its terminal state.
#[derive(Debug)]
pub struct RunOutcome {
    /// `Completed`, `Canceled` or `Failed`.
    pub state: RunState,
    /// Records merged before the run ended.
    pub result: ResultSet,
    pub stats: RunStats,
    /// Why the run failed. `None` for completed and canceled runs.
    pub error: Option<PipelineError>,
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        self.state == RunState::Completed
    }
}

/// Cancels a run, or every run of a [`Pipeline`].
///
/// Cloneable and usable from any task. Canceling more than once is harmless.
#[derive(Debug, Clone)]
pub struct RunHandle {
    token: CancellationToken,
}

impl RunHandle {
    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// A run executing on its own task.
#[derive(Debug)]
pub struct SpawnedRun {
    pub handle: RunHandle,
    pub join: JoinHandle<RunOutcome>,
}

/// Orchestrates chunking, streaming, extraction and merging.
///
/// Cheap to clone; clones share the execution context. Each run gets its own
/// cancellation token, a child of the context's token.
///
/// # Example
///
/// ```no_run
/// use llm_extract::{ExecCtx, ExtractConfig, Pipeline, Task};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = ExtractConfig::default().with_model("qwen3-8b");
///     let pipeline = Pipeline::new(ExecCtx::builder(config).build()?);
///     let outcome = pipeline.run("很长的文本……", &Task::SemanticChunking).await;
///     println!("{:?}: {} chunks", outcome.state, outcome.result.len());
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Pipeline {
    ctx: Arc<ExecCtx>,
}

/// How one pass over the segments ended.
pub(crate) struct PassOutcome {
    pub state: RunState,
    pub result: ResultSet,
    pub error: Option<PipelineError>,
}

impl Pipeline {
    pub fn new(ctx: ExecCtx) -> Self {
        Self { ctx: Arc::new(ctx) }
    }

    pub fn ctx(&self) -> &ExecCtx {
        &self.ctx
    }

    /// A handle that cancels every run of this pipeline, current and future.
    pub fn handle(&self) -> RunHandle {
        RunHandle {
            token: self.ctx.cancellation.clone(),
        }
    }

    /// A fresh handle for a single run; see [`run_with`](Self::run_with).
    ///
    /// Canceling it leaves other runs alone. Canceling [`handle`](Self::handle)
    /// cancels it too.
    pub fn run_handle(&self) -> RunHandle {
        RunHandle {
            token: self.ctx.cancellation.child_token(),
        }
    }

    /// Model identifiers offered by the server.
    pub async fn list_models(&self) -> Result<Vec<String>> {
        self.ctx
            .backend
            .list_models(&self.ctx.client, &self.ctx.base_url)
            .await
    }

    /// Run `task` over every segment of `text`.
    pub async fn run(&self, text: &str, task: &Task) -> RunOutcome {
        self.run_with(text, task, &self.run_handle()).await
    }

    /// Like [`run`](Self::run), canceled through `handle`.
    pub async fn run_with(&self, text: &str, task: &Task, handle: &RunHandle) -> RunOutcome {
        let cancel = handle.token();
        let mut stats = RunStats::new();
        if let Some(outcome) = self.preflight(&stats, cancel).await {
            return outcome;
        }
        let pass = self.run_pass(text, task, &mut stats, cancel).await;
        self.finish(pass, stats)
    }

    /// Start a run on a new task. The returned handle cancels only that run.
    pub fn spawn(&self, text: impl Into<String>, task: Task) -> SpawnedRun {
        let pipeline = self.clone();
        let text = text.into();
        let handle = self.run_handle();
        let run_handle = handle.clone();
        let join = tokio::spawn(async move { pipeline.run_with(&text, &task, &run_handle).await });
        SpawnedRun { handle, join }
    }

    /// Chunk `text` with the given method.
    ///
    /// [`ChunkMethod::Semantic`] asks the model; the other methods run
    /// locally without any request.
    pub async fn run_chunking(&self, text: &str, method: ChunkMethod) -> RunOutcome {
        let config = &self.ctx.config;
        let handle = self.run_handle();
        let records = match method {
            ChunkMethod::Semantic => {
                return self.run_with(text, &Task::SemanticChunking, &handle).await
            }
            ChunkMethod::Sentence => {
                chunker::sentence_chunks(text, config.min_chunk_size, config.max_chunk_size)
            }
            ChunkMethod::Paragraph => {
                chunker::paragraph_chunks(text, config.min_chunk_size, config.max_chunk_size)
            }
            ChunkMethod::Fixed => chunker::fixed_chunks(text, config.max_chunk_size),
        };

        let stats = RunStats::new();
        if handle.is_cancelled() {
            self.set_state(RunState::Canceled);
            return RunOutcome {
                state: RunState::Canceled,
                result: ResultSet::new(),
                stats,
                error: None,
            };
        }
        self.set_state(RunState::Splitting);
        let mut result = ResultSet::new();
        result.merge(records);
        result.renumber_chunks();
        self.log(
            format!("{:?} chunking produced {} chunks", method, result.len()),
            Severity::Success,
        );
        emit(&self.ctx.event_handler, Event::RecordsUpdated(result.records().to_vec()));
        self.set_state(RunState::Completed);
        RunOutcome {
            state: RunState::Completed,
            result,
            stats,
            error: None,
        }
    }

    /// Checks shared by every run before the first segment.
    ///
    /// Returns a terminal outcome when the run must not start.
    pub(crate) async fn preflight(
        &self,
        stats: &RunStats,
        cancel: &CancellationToken,
    ) -> Option<RunOutcome> {
        self.set_state(RunState::Idle);
        if cancel.is_cancelled() {
            self.log("run canceled before it started", Severity::Warn);
            return Some(self.finish(self.cancel_pass(ResultSet::new()), *stats));
        }
        match self.check_config(cancel).await {
            Ok(()) => None,
            Err(PipelineError::Cancelled) => {
                Some(self.finish(self.cancel_pass(ResultSet::new()), *stats))
            }
            Err(err) => Some(self.fail(ResultSet::new(), *stats, err)),
        }
    }

    async fn check_config(&self, cancel: &CancellationToken) -> Result<()> {
        let config = &self.ctx.config;
        config.validate()?;
        if !config.validate_model {
            return Ok(());
        }
        let models = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
            models = self.list_models() => models?,
        };
        if models.is_empty() {
            warn!("server returned no models; skipping model check");
            return Ok(());
        }
        if !models.iter().any(|m| m == &config.model) {
            return Err(PipelineError::InvalidConfig(format!(
                "model `{}` is not offered by the server (available: {})",
                config.model,
                models.join(", ")
            )));
        }
        debug!(model = %config.model, "model validated");
        Ok(())
    }

    /// One pass of `task` over the segments of `text`.
    ///
    /// Token counters in `stats` keep growing; segment counters are reset.
    pub(crate) async fn run_pass(
        &self,
        text: &str,
        task: &Task,
        stats: &mut RunStats,
        cancel: &CancellationToken,
    ) -> PassOutcome {
        let ctx = &self.ctx;
        let config = &ctx.config;
        let phase = task.phase();
        let mut result = ResultSet::new();

        self.set_state(RunState::Splitting);
        let segments =
            match chunker::split(text, config.max_chars_per_chunk, config.overlap_chars) {
                Ok(segments) => segments,
                Err(err) => return self.fail_pass(result, err),
            };
        let chars = text.chars().count();
        stats.begin_phase(segments.len());
        info!(
            phase = phase.label(),
            segments = segments.len(),
            chars,
            "starting pass"
        );
        self.log(
            format!(
                "{}: {} segment(s) from {} characters",
                phase.label(),
                segments.len(),
                chars
            ),
            Severity::Info,
        );

        let limits = StreamLimits {
            stats_interval: config.stats_interval(),
            max_frames: config.max_stream_frames,
        };
        let format = task.format(config);
        let allow_fallback = task.allow_fallback(config);
        let total = segments.len();

        for (i, segment) in segments.iter().enumerate() {
            if cancel.is_cancelled() {
                return self.cancel_pass(result);
            }
            emit(
                &ctx.event_handler,
                Event::Progress {
                    message: format!("{}: segment {}/{}", phase.label(), i + 1, total),
                    fraction: stats.fraction(),
                },
            );
            self.log(
                format!("segment {}/{} ({} characters)", i + 1, total, segment.len()),
                Severity::Info,
            );

            self.set_state(RunState::Requesting(i));
            let request = task.request(&segment.text, config);
            let handler = &ctx.event_handler;
            let mut on_delta = |chunk: &str| {
                emit(
                    handler,
                    Event::Delta {
                        segment: i,
                        chunk: chunk.to_string(),
                    },
                )
            };
            let mut on_stats = |live: &StreamStats| emit(handler, Event::StreamStats(live.clone()));
            let completion = ctx
                .backend
                .stream_completion(
                    &ctx.client,
                    &ctx.base_url,
                    &request,
                    limits,
                    StreamCallbacks {
                        on_delta: &mut on_delta,
                        on_stats: &mut on_stats,
                    },
                    cancel,
                )
                .await;
            let completion = match completion {
                Ok(completion) => completion,
                Err(PipelineError::Cancelled) => return self.cancel_pass(result),
                Err(err) => return self.fail_pass(result, err),
            };
            stats.absorb(&completion);
            if completion.finish_reason.as_deref() == Some("length") {
                self.log(
                    format!("segment {} output hit the length limit", i + 1),
                    Severity::Warn,
                );
            }

            self.set_state(RunState::Extracting(i));
            let extraction = extract(&completion.text, format, allow_fallback);
            let diagnostics = &extraction.diagnostics;
            if let Some(err) = &diagnostics.parse_error {
                self.log(format!("segment {}: {}", i + 1, err), Severity::Warn);
            } else if diagnostics.fallback_used {
                self.log(
                    format!("segment {}: fell back to paragraph chunks", i + 1),
                    Severity::Warn,
                );
            } else if diagnostics.truncated || diagnostics.dropped > 0 {
                self.log(
                    format!(
                        "segment {}: recovered from malformed output ({} entries dropped)",
                        i + 1,
                        diagnostics.dropped
                    ),
                    Severity::Warn,
                );
            }
            let parsed = extraction.records.len();
            let records: Vec<_> = extraction
                .records
                .into_iter()
                .filter(|r| task.admits(r))
                .collect();
            if records.len() < parsed {
                debug!(
                    segment = i,
                    discarded = parsed - records.len(),
                    "discarded records outside the task"
                );
            }

            self.set_state(RunState::Merging(i));
            let summary = result.merge(records);
            stats.segment_done();
            debug!(segment = i, ?summary, total = result.len(), "segment merged");
            emit(&ctx.event_handler, Event::RecordsUpdated(result.records().to_vec()));
            emit(&ctx.event_handler, Event::Stats(*stats));
            self.log(
                format!(
                    "segment {}/{} done: {} new record(s), {} total",
                    i + 1,
                    total,
                    summary.added,
                    result.len()
                ),
                Severity::Success,
            );
        }

        if matches!(task, Task::SemanticChunking) {
            result.renumber_chunks();
            emit(&ctx.event_handler, Event::RecordsUpdated(result.records().to_vec()));
        }
        let vocabulary = matches!(task, Task::TypeDiscovery)
            .then(|| TypeVocabulary::from_records(result.iter()));
        emit(&ctx.event_handler, Event::PhaseComplete { phase, vocabulary });
        emit(
            &ctx.event_handler,
            Event::Progress {
                message: format!("{} complete", phase.label()),
                fraction: 1.0,
            },
        );
        PassOutcome {
            state: RunState::Completed,
            result,
            error: None,
        }
    }

    /// Turn the last pass into the run's outcome, emitting the terminal state.
    pub(crate) fn finish(&self, pass: PassOutcome, stats: RunStats) -> RunOutcome {
        self.set_state(pass.state);
        match pass.state {
            RunState::Completed => self.log(
                format!("done: {} record(s), {} tokens", pass.result.len(), stats.total_tokens),
                Severity::Success,
            ),
            RunState::Canceled => self.log(
                format!("canceled: keeping {} record(s)", pass.result.len()),
                Severity::Warn,
            ),
            _ => {}
        }
        emit(&self.ctx.event_handler, Event::Stats(stats));
        RunOutcome {
            state: pass.state,
            result: pass.result,
            stats,
            error: pass.error,
        }
    }

    fn fail(&self, result: ResultSet, stats: RunStats, err: PipelineError) -> RunOutcome {
        let pass = self.fail_pass(result, err);
        self.finish(pass, stats)
    }

    fn fail_pass(&self, result: ResultSet, err: PipelineError) -> PassOutcome {
        warn!(error = %err, "run failed");
        self.log(format!("run failed: {}", err), Severity::Error);
        PassOutcome {
            state: RunState::Failed,
            result,
            error: Some(err),
        }
    }

    fn cancel_pass(&self, result: ResultSet) -> PassOutcome {
        info!(records = result.len(), "run canceled");
        PassOutcome {
            state: RunState::Canceled,
            result,
            error: None,
        }
    }

    pub(crate) fn set_state(&self, state: RunState) {
        emit(&self.ctx.event_handler, Event::StateChanged(state));
    }

    pub(crate) fn log(&self, message: impl Into<String>, severity: Severity) {
        emit(
            &self.ctx.event_handler,
            Event::Log {
                message: message.into(),
                severity,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockBackend, MockReply};
    use crate::events::FnEventHandler;
    use crate::record::Record;
    use crate::ExtractConfig;
    use std::sync::Mutex;
    use std::time::Duration;

    fn config() -> ExtractConfig {
        ExtractConfig::default()
            .with_model("mock-model")
            .with_chunking(40, 10)
    }

    type Recorded = Arc<Mutex<Vec<Event>>>;

    fn pipeline_with(
        mock: MockBackend,
        config: ExtractConfig,
    ) -> (Pipeline, Arc<MockBackend>, Recorded) {
        let mock = Arc::new(mock);
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let ctx = ExecCtx::builder(config)
            .backend(mock.clone())
            .event_handler(Arc::new(FnEventHandler(move |e: Event| {
                sink.lock().unwrap().push(e)
            })))
            .build()
            .unwrap();
        (Pipeline::new(ctx), mock, events)
    }

    fn states(events: &Mutex<Vec<Event>>) -> Vec<RunState> {
        events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                Event::StateChanged(s) => Some(*s),
                _ => None,
            })
            .collect()
    }

    /// Two lines of 33 characters; `with_chunking(40, 10)` cuts three segments.
    fn multi_segment_text() -> String {
        let sentence =
            "张三在北京大学读书，他非常喜欢研究历史和哲学问题。每周都去图书馆。";
        format!("{}\n{}", sentence, sentence)
    }

    #[tokio::test]
    async fn test_duplicate_entities_across_segments_merge_once() {
        let reply = r#"[{"text":"张三","type":"PERSON"}]"#;
        let (pipeline, mock, _) = pipeline_with(MockBackend::fixed(reply), config());
        let task = Task::EntityExtraction {
            vocabulary: {
                let mut v = TypeVocabulary::new();
                v.insert(crate::record::TypeCategory::Entity, "PERSON");
                v
            },
        };
        let outcome = pipeline.run(&multi_segment_text(), &task).await;
        assert_eq!(outcome.state, RunState::Completed);
        assert!(mock.requests().len() >= 2);
        assert_eq!(outcome.result.records(), &[Record::entity("张三", "PERSON")]);
        assert_eq!(outcome.stats.segments_processed, outcome.stats.segments_total);
        assert!(outcome.stats.total_tokens > 0);
    }

    #[tokio::test]
    async fn test_state_sequence_for_single_segment() {
        let reply = r#"[{"title":"t","summary":"s","content":"短文本。"}]"#;
        let (pipeline, _, events) = pipeline_with(MockBackend::fixed(reply), config());
        let outcome = pipeline.run("短文本。", &Task::SemanticChunking).await;
        assert!(outcome.is_completed());
        assert_eq!(
            states(&events),
            vec![
                RunState::Idle,
                RunState::Splitting,
                RunState::Requesting(0),
                RunState::Extracting(0),
                RunState::Merging(0),
                RunState::Completed,
            ]
        );
        let deltas: String = events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                Event::Delta { chunk, .. } => Some(chunk.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(deltas, reply);
    }

    #[tokio::test]
    async fn test_cancel_before_start_issues_no_request() {
        let (pipeline, mock, events) = pipeline_with(MockBackend::fixed("[]"), config());
        let handle = pipeline.handle();
        handle.cancel();
        handle.cancel();
        let outcome = pipeline.run(&multi_segment_text(), &Task::SemanticChunking).await;
        assert_eq!(outcome.state, RunState::Canceled);
        assert!(outcome.error.is_none());
        assert!(mock.requests().is_empty());
        assert_eq!(states(&events), vec![RunState::Idle, RunState::Canceled]);
    }

    #[tokio::test]
    async fn test_cancel_mid_stream_keeps_completed_segments() {
        let mock = MockBackend::scripted(vec![
            MockReply::text(r#"[{"text":"张三","type":"人物"}]"#),
            MockReply::Stall(vec![r#"[{"text":"李四","#.into()]),
        ]);
        let (pipeline, _, events) = pipeline_with(mock, config());
        let handle = pipeline.handle();
        let watcher = events.clone();
        let canceller = tokio::spawn(async move {
            loop {
                let stalled = watcher
                    .lock()
                    .unwrap()
                    .iter()
                    .any(|e| matches!(e, Event::Delta { segment: 1, .. }));
                if stalled {
                    handle.cancel();
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });
        let task = Task::EntityExtraction {
            vocabulary: {
                let mut v = TypeVocabulary::new();
                v.insert(crate::record::TypeCategory::Entity, "人物");
                v
            },
        };
        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            pipeline.run(&multi_segment_text(), &task),
        )
        .await
        .unwrap();
        canceller.await.unwrap();
        assert_eq!(outcome.state, RunState::Canceled);
        assert_eq!(outcome.result.records(), &[Record::entity("张三", "人物")]);
        assert_eq!(outcome.stats.segments_processed, 1);
    }

    #[tokio::test]
    async fn test_transport_failure_keeps_partial_results_and_stats() {
        let mock = MockBackend::scripted(vec![
            MockReply::text("ENTITY\t人物\t张三"),
            MockReply::Status(503, "overloaded".into()),
        ]);
        let config = config().with_output_format(crate::OutputFormat::Tsv);
        let (pipeline, _, _) = pipeline_with(mock, config);
        let task = Task::EntityExtraction {
            vocabulary: {
                let mut v = TypeVocabulary::new();
                v.insert(crate::record::TypeCategory::Entity, "人物");
                v
            },
        };
        let outcome = pipeline.run(&multi_segment_text(), &task).await;
        assert_eq!(outcome.state, RunState::Failed);
        assert!(matches!(outcome.error, Some(PipelineError::HttpError { status: 503, .. })));
        assert_eq!(outcome.result.len(), 1);
        assert_eq!(outcome.stats.segments_processed, 1);
        assert!(outcome.stats.total_tokens > 0);
    }

    #[tokio::test]
    async fn test_bad_output_degrades_per_segment() {
        let mock = MockBackend::new(vec![
            "<think>不知道</think>抱歉，我无法完成。".into(),
            r#"[{"text":"张三","type":"人物"}"#.into(),
        ]);
        let (pipeline, _, events) = pipeline_with(mock, config());
        let task = Task::EntityExtraction {
            vocabulary: {
                let mut v = TypeVocabulary::new();
                v.insert(crate::record::TypeCategory::Entity, "人物");
                v
            },
        };
        let outcome = pipeline.run(&multi_segment_text(), &task).await;
        assert!(outcome.is_completed());
        assert_eq!(outcome.result.records(), &[Record::entity("张三", "人物")]);
        let warned = events
            .lock()
            .unwrap()
            .iter()
            .any(|e| matches!(e, Event::Log { severity: Severity::Warn, .. }));
        assert!(warned);
    }

    #[tokio::test]
    async fn test_invalid_config_fails_without_request() {
        let (pipeline, mock, _) = pipeline_with(MockBackend::fixed("[]"), config().with_model(""));
        let outcome = pipeline.run("text", &Task::SemanticChunking).await;
        assert_eq!(outcome.state, RunState::Failed);
        assert!(matches!(outcome.error, Some(PipelineError::InvalidConfig(_))));
        assert!(mock.requests().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_model_rejected() {
        let (pipeline, mock, _) =
            pipeline_with(MockBackend::fixed("[]"), config().with_model("other"));
        let outcome = pipeline.run("text", &Task::SemanticChunking).await;
        match outcome.error {
            Some(PipelineError::InvalidConfig(ref message)) => assert!(message.contains("other")),
            ref other => panic!("expected InvalidConfig, got {:?}", other),
        }
        assert!(mock.requests().is_empty());

        let (pipeline, mock, _) = pipeline_with(
            MockBackend::fixed("[]"),
            config().with_model("other").with_model_validation(false),
        );
        let outcome = pipeline.run("text", &Task::SemanticChunking).await;
        assert!(outcome.is_completed());
        assert_eq!(mock.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_semantic_chunks_renumbered() {
        let mock = MockBackend::new(vec![
            r#"[{"id":7,"title":"甲","summary":"s","content":"第一段内容。"}]"#.into(),
            r#"[{"id":7,"title":"乙","summary":"s","content":"第二段内容。"}]"#.into(),
        ]);
        let (pipeline, _, _) = pipeline_with(mock, config());
        let outcome = pipeline.run(&multi_segment_text(), &Task::SemanticChunking).await;
        let ids: Vec<u32> = outcome
            .result
            .iter()
            .filter_map(|r| match r {
                Record::Chunk { id, .. } => Some(*id),
                _ => None,
            })
            .collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_local_chunking_issues_no_request() {
        let (pipeline, mock, _) = pipeline_with(MockBackend::fixed("[]"), config());
        let text = "第一段。\n\n第二段。";
        let outcome = pipeline.run_chunking(text, ChunkMethod::Paragraph).await;
        assert!(outcome.is_completed());
        assert!(!outcome.result.is_empty());
        assert!(mock.requests().is_empty());
    }

    #[tokio::test]
    async fn test_spawned_run_can_be_cancelled() {
        let mock = MockBackend::scripted(vec![MockReply::Stall(vec!["[".into()])]);
        let (pipeline, _, _) = pipeline_with(mock, config());
        let run = pipeline.spawn("一句话。", Task::SemanticChunking);
        tokio::time::sleep(Duration::from_millis(20)).await;
        run.handle.cancel();
        let outcome = run.join.await.unwrap();
        assert_eq!(outcome.state, RunState::Canceled);
        assert!(run.handle.is_cancelled());
    }

    #[tokio::test]
    async fn test_canceled_run_does_not_poison_later_runs() {
        let mock = MockBackend::scripted(vec![
            MockReply::Stall(vec!["[".into()]),
            MockReply::text(r#"[{"title":"t","summary":"s","content":"一句话。"}]"#),
        ]);
        let (pipeline, mock, _) = pipeline_with(mock, config());
        let run = pipeline.spawn("一句话。", Task::SemanticChunking);
        while mock.requests().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        run.handle.cancel();
        assert_eq!(run.join.await.unwrap().state, RunState::Canceled);

        let outcome = pipeline.run("一句话。", &Task::SemanticChunking).await;
        assert!(outcome.is_completed());
        assert_eq!(outcome.result.len(), 1);
        assert_eq!(mock.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_cancel_one_spawned_run_leaves_sibling_running() {
        let mock = MockBackend::scripted(vec![
            MockReply::Stall(vec!["[".into()]),
            MockReply::text(r#"[{"title":"t","summary":"s","content":"另一句话。"}]"#),
        ]);
        let (pipeline, mock, _) = pipeline_with(mock, config());
        let a = pipeline.spawn("一句话。", Task::SemanticChunking);
        while mock.requests().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let b = pipeline.spawn("另一句话。", Task::SemanticChunking);
        a.handle.cancel();

        assert_eq!(a.join.await.unwrap().state, RunState::Canceled);
        let b_outcome = b.join.await.unwrap();
        assert_eq!(b_outcome.state, RunState::Completed);
        assert!(!b.handle.is_cancelled());
    }

    #[tokio::test]
    async fn test_pipeline_handle_cancels_every_run() {
        let (pipeline, _, _) = pipeline_with(MockBackend::fixed("[]"), config());
        let run_handle = pipeline.run_handle();
        pipeline.handle().cancel();
        assert!(run_handle.is_cancelled());
        let outcome = pipeline
            .run_with("text", &Task::SemanticChunking, &run_handle)
            .await;
        assert_eq!(outcome.state, RunState::Canceled);
    }

    #[tokio::test]
    async fn test_cancel_during_model_check() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/models"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(30))
                    .set_body_json(serde_json::json!({"data": [{"id": "mock-model"}]})),
            )
            .mount(&server)
            .await;

        let config = config().with_base_url(format!("{}/v1", server.uri()));
        let pipeline = Pipeline::new(ExecCtx::builder(config).build().unwrap());
        let handle = pipeline.run_handle();
        let trigger = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });
        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            pipeline.run_with("text", &Task::SemanticChunking, &handle),
        )
        .await
        .unwrap();
        assert_eq!(outcome.state, RunState::Canceled);
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn test_list_models_passthrough() {
        let mock = MockBackend::fixed("[]").with_models(vec!["a".into(), "b".into()]);
        let (pipeline, _, _) = pipeline_with(mock, config());
        let models = tokio_test::assert_ok!(pipeline.list_models().await);
        assert_eq!(models, vec!["a", "b"]);
    }
}

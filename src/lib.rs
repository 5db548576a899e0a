//! # LLM Extract
//!
//! Chunked, streaming structured extraction over OpenAI-compatible chat
//! completion endpoints.
//!
//! A long document is split into overlapping, sentence-aligned segments.
//! Each segment is sent as a streamed chat completion; the streamed text is
//! parsed into records (chunks, entities, relations or type labels) with a
//! parser that tolerates reasoning blocks, code fences, truncation and
//! format drift. Records from all segments are merged into one
//! duplicate-free result.
//!
//! ## Core Concepts
//!
//! - **[`Pipeline`]** drives a run: split, then for each segment request,
//!   extract and merge. Runs can be canceled at any time through a
//!   [`RunHandle`].
//! - **[`Task`]** selects what is asked of each segment: semantic chunking,
//!   type discovery or constrained entity extraction.
//! - **[`ExecCtx`]** carries the HTTP client, backend, configuration,
//!   cancellation token and optional [`EventHandler`].
//! - **[`Backend`]** abstracts the completion server. [`OpenAiBackend`]
//!   talks HTTP/SSE; [`MockBackend`] replays scripted replies offline.
//! - **[`ResultSet`]** holds the merged records.
//!
//! ## Quick Start
//!
//! ```no_run
//! use llm_extract::{ExecCtx, ExtractConfig, NerState, Pipeline};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ExtractConfig::default()
//!         .with_base_url("http://localhost:1234/v1")
//!         .with_model("qwen3-8b");
//!     let pipeline = Pipeline::new(ExecCtx::builder(config).build()?);
//!
//!     let outcome = pipeline.analyze_entities("张三在北京大学读书。").await;
//!     if outcome.state == NerState::Completed {
//!         for record in outcome.extraction.iter().flat_map(|run| run.result.iter()) {
//!             println!("{:?}", record);
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod chunker;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod events;
pub mod exec_ctx;
pub mod merge;
pub mod ner;
pub mod output_parser;
pub mod pipeline;
pub mod prompt;
pub mod record;
pub mod stream;
pub mod task;
pub mod types;

pub use backend::{Backend, ChatRequest, MockBackend, MockReply, OpenAiBackend};
pub use chunker::{split, ChunkMethod, Segment};
pub use config::{ExtractConfig, OutputFormat, SamplingOptions};
pub use diagnostics::ParseDiagnostics;
pub use error::{PipelineError, Result};
pub use events::{ChannelEventHandler, Event, EventHandler, FnEventHandler};
pub use exec_ctx::{ExecCtx, ExecCtxBuilder};
pub use merge::{MergeSummary, ResultSet};
pub use ner::{NerOutcome, NerState};
pub use pipeline::{Pipeline, RunHandle, RunOutcome, SpawnedRun};
pub use record::{Record, TypeCategory, TypeVocabulary};
pub use stream::{Completion, StreamStats, Usage};
pub use task::Task;
pub use types::{Phase, RunState, RunStats, Severity};

//! Event system for run lifecycle and streaming hooks.
//!
//! Provides an optional, non-intrusive way to observe a run. The pipeline
//! emits events as it changes state, streams deltas, and merges records.
//! Implement [`EventHandler`] to receive them for logging, progress bars,
//! or streaming UIs.
//!
//! Handlers are called synchronously from the task that owns the run.
//! Handlers that need to cross threads should forward events, as
//! [`ChannelEventHandler`] does.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::record::{Record, TypeVocabulary};
use crate::stream::StreamStats;
use crate::types::{Phase, RunState, RunStats, Severity};

/// Events emitted during a run.
#[derive(Debug, Clone)]
pub enum Event {
    /// The run moved to a new state.
    StateChanged(RunState),
    /// Human-readable progress, with the fraction of the current phase done.
    Progress {
        message: String,
        fraction: f64,
    },
    /// A user-facing log line.
    Log {
        message: String,
        severity: Severity,
    },
    /// A content delta received while streaming `segment`.
    Delta {
        /// 0-based segment index.
        segment: usize,
        chunk: String,
    },
    /// Throttled live statistics of the request in flight.
    StreamStats(StreamStats),
    /// Accumulated run statistics, after each segment.
    Stats(RunStats),
    /// Snapshot of the result set after a merge.
    RecordsUpdated(Vec<Record>),
    /// A pass finished.
    PhaseComplete {
        phase: Phase,
        /// Types found by a discovery pass; `None` for other passes.
        vocabulary: Option<TypeVocabulary>,
    },
}

/// Handler for run events.
///
/// This is entirely optional; runs work without an event handler.
///
/// # Example
///
/// ```
/// use llm_extract::events::{Event, EventHandler};
///
/// struct PrintHandler;
///
/// impl EventHandler for PrintHandler {
///     fn on_event(&self, event: Event) {
///         match event {
///             Event::Delta { chunk, .. } => print!("{}", chunk),
///             Event::Progress { message, .. } => println!("[progress] {}", message),
///             Event::Log { message, severity } => println!("[{:?}] {}", severity, message),
///             _ => {}
///         }
///     }
/// }
/// ```
pub trait EventHandler: Send + Sync {
    /// Called when the run emits an event.
    fn on_event(&self, event: Event);
}

/// Emit an event if a handler is present. No-op otherwise.
pub(crate) fn emit(handler: &Option<Arc<dyn EventHandler>>, event: Event) {
    if let Some(ref h) = handler {
        h.on_event(event);
    }
}

/// An [`EventHandler`] backed by a closure.
///
/// # Example
///
/// ```
/// use llm_extract::events::{Event, FnEventHandler};
/// use std::sync::Arc;
///
/// let handler = Arc::new(FnEventHandler(|event: Event| {
///     if let Event::Delta { chunk, .. } = event {
///         print!("{}", chunk);
///     }
/// }));
/// ```
pub struct FnEventHandler<F: Fn(Event) + Send + Sync>(pub F);

impl<F: Fn(Event) + Send + Sync> EventHandler for FnEventHandler<F> {
    fn on_event(&self, event: Event) {
        (self.0)(event);
    }
}

/// An [`EventHandler`] that forwards events into a bounded channel.
///
/// Never blocks the run: when the receiver falls behind and the channel is
/// full, the event is dropped. Dropped events are counted.
#[derive(Debug)]
pub struct ChannelEventHandler {
    tx: mpsc::Sender<Event>,
    dropped: AtomicUsize,
}

impl ChannelEventHandler {
    /// Create a handler and the receiver it feeds.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                dropped: AtomicUsize::new(0),
            },
            rx,
        )
    }

    /// Events dropped because the channel was full or closed.
    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl EventHandler for ChannelEventHandler {
    fn on_event(&self, event: Event) {
        if self.tx.try_send(event).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

//! Two-phase named entity analysis.
//!
//! Phase 1 asks the model which entity and relation types a document talks
//! about. Phase 2 extracts entities and relations constrained to those
//! types. If phase 1 finds nothing, phase 2 never starts.

use tracing::info;

use crate::pipeline::{Pipeline, RunHandle, RunOutcome};
use crate::record::TypeVocabulary;
use crate::task::Task;
use crate::types::{RunState, RunStats, Severity};

/// Terminal state of a two-phase analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NerState {
    Completed,
    /// Discovery finished but found no types; extraction was skipped.
    NoTypesDiscovered,
    Canceled,
    Failed,
}

impl From<RunState> for NerState {
    fn from(state: RunState) -> Self {
        match state {
            RunState::Completed => NerState::Completed,
            RunState::Canceled => NerState::Canceled,
            _ => NerState::Failed,
        }
    }
}

/// Result of [`Pipeline::analyze_entities`].
#[derive(Debug)]
pub struct NerOutcome {
    pub state: NerState,
    /// Types found in phase 1. Empty if discovery did not complete.
    pub vocabulary: TypeVocabulary,
    /// Phase 1 run: label records.
    pub discovery: RunOutcome,
    /// Phase 2 run: entity and relation records. `None` if it never started.
    pub extraction: Option<RunOutcome>,
}

impl NerOutcome {
    /// Statistics of the whole analysis; tokens cover both phases.
    pub fn stats(&self) -> &RunStats {
        match &self.extraction {
            Some(extraction) => &extraction.stats,
            None => &self.discovery.stats,
        }
    }
}

impl Pipeline {
    /// Discover entity and relation types, then extract records of those types.
    pub async fn analyze_entities(&self, text: &str) -> NerOutcome {
        self.analyze_entities_with(text, &self.run_handle()).await
    }

    /// Like [`analyze_entities`](Self::analyze_entities), canceled through
    /// `handle`. One handle covers both phases.
    pub async fn analyze_entities_with(&self, text: &str, handle: &RunHandle) -> NerOutcome {
        let cancel = handle.token();
        let mut stats = RunStats::new();
        if let Some(discovery) = self.preflight(&stats, cancel).await {
            return NerOutcome {
                state: discovery.state.into(),
                vocabulary: TypeVocabulary::new(),
                discovery,
                extraction: None,
            };
        }

        self.log("phase 1: discovering entity and relation types", Severity::Info);
        let pass = self
            .run_pass(text, &Task::TypeDiscovery, &mut stats, cancel)
            .await;
        let vocabulary = TypeVocabulary::from_records(pass.result.iter());
        if pass.state != RunState::Completed || vocabulary.is_empty() {
            let discovery = self.finish(pass, stats);
            let state = if discovery.state == RunState::Completed {
                self.log(
                    "no entity or relation types discovered; skipping extraction",
                    Severity::Warn,
                );
                NerState::NoTypesDiscovered
            } else {
                discovery.state.into()
            };
            return NerOutcome {
                state,
                vocabulary: TypeVocabulary::new(),
                discovery,
                extraction: None,
            };
        }

        info!(
            entity_types = vocabulary.entity_types().len(),
            relation_types = vocabulary.relation_types().len(),
            "types discovered"
        );
        self.log(
            format!(
                "phase 1 done: entity types [{}], relation types [{}]",
                vocabulary.entity_types().join(", "),
                vocabulary.relation_types().join(", ")
            ),
            Severity::Success,
        );
        let discovery = RunOutcome {
            state: RunState::Completed,
            result: pass.result,
            stats,
            error: None,
        };

        self.log("phase 2: extracting entities and relations", Severity::Info);
        let task = Task::EntityExtraction {
            vocabulary: vocabulary.clone(),
        };
        let pass = self.run_pass(text, &task, &mut stats, cancel).await;
        let extraction = self.finish(pass, stats);
        NerOutcome {
            state: extraction.state.into(),
            vocabulary,
            discovery,
            extraction: Some(extraction),
        }
    }
}

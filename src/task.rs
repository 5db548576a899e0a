//! What a run asks the model to do with each segment.

use crate::backend::ChatRequest;
use crate::config::{ExtractConfig, OutputFormat};
use crate::output_parser::{ExtractFormat, Schema};
use crate::prompt;
use crate::record::{Record, TypeVocabulary};
use crate::types::Phase;

/// A per-segment extraction task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    /// Cut each segment into titled, summarised chunks (JSON).
    SemanticChunking,
    /// List the entity and relation types a segment talks about.
    TypeDiscovery,
    /// Extract entities and relations of the given types.
    EntityExtraction { vocabulary: TypeVocabulary },
}

impl Task {
    pub fn phase(&self) -> Phase {
        match self {
            Task::SemanticChunking => Phase::Chunking,
            Task::TypeDiscovery => Phase::Discovery,
            Task::EntityExtraction { .. } => Phase::Extraction,
        }
    }

    /// Build the chat request for one segment.
    pub fn request(&self, segment: &str, config: &ExtractConfig) -> ChatRequest {
        let (system_prompt, user_prompt) = match self {
            Task::SemanticChunking => {
                prompt::chunking(segment, config.min_chunk_size, config.max_chunk_size)
            }
            Task::TypeDiscovery => prompt::discovery(segment),
            Task::EntityExtraction { vocabulary } => {
                prompt::extraction(segment, vocabulary, config.output_format)
            }
        };
        ChatRequest {
            model: config.model.clone(),
            system_prompt,
            user_prompt,
            sampling: config.sampling(),
        }
    }

    /// How the response to [`request`](Self::request) is parsed.
    pub fn format(&self, config: &ExtractConfig) -> ExtractFormat {
        match self {
            Task::SemanticChunking => ExtractFormat::Json(Schema::Chunks),
            Task::TypeDiscovery => ExtractFormat::Labels,
            Task::EntityExtraction { .. } => match config.output_format {
                OutputFormat::Json => ExtractFormat::Json(Schema::Entities),
                OutputFormat::Tsv => ExtractFormat::Tsv,
            },
        }
    }

    /// Paragraph fallback only makes sense when the records are chunks.
    pub fn allow_fallback(&self, config: &ExtractConfig) -> bool {
        matches!(self, Task::SemanticChunking) && config.allow_fallback
    }

    /// Whether a parsed record belongs in this task's result.
    ///
    /// Extraction keeps entities of known types and every relation.
    pub fn admits(&self, record: &Record) -> bool {
        match (self, record) {
            (Task::SemanticChunking, Record::Chunk { .. }) => true,
            (Task::TypeDiscovery, Record::Label { .. }) => true,
            (Task::EntityExtraction { vocabulary }, Record::Entity { entity_type, .. }) => {
                vocabulary.allows_entity(entity_type)
            }
            (Task::EntityExtraction { .. }, Record::Relation { .. }) => true,
            _ => false,
        }
    }
}

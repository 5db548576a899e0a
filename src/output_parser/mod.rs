//! # Output Parser
//!
//! Turns raw model output into [`Record`]s without another model call.
//! Handles reasoning blocks, markdown fences, prose around the payload,
//! truncated JSON, and sloppy TSV.
//!
//! ## Formats
//!
//! | Format | Produces |
//! |--------|----------|
//! | [`ExtractFormat::Json`] with [`Schema::Chunks`] | chunk records |
//! | [`ExtractFormat::Json`] with [`Schema::Entities`] | entity and relation records |
//! | [`ExtractFormat::Tsv`] | entity and relation records |
//! | [`ExtractFormat::Labels`] | type-name label records |
//!
//! [`extract`] never fails. When nothing can be parsed it returns no records
//! and a [`ParseDiagnostics`] carrying the reason, unless the caller allows
//! the paragraph fallback.

pub mod error;
pub mod extract;
pub mod json;
pub mod labels;
pub mod tsv;

pub use error::ParseError;
pub use extract::{preprocess, strip_meta_blocks};

use tracing::{debug, warn};

use crate::chunker::split_paragraphs;
use crate::diagnostics::ParseDiagnostics;
use crate::record::{summarize, Record};
use error::truncate;

/// Record shape expected from a JSON payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schema {
    Chunks,
    Entities,
}

/// Payload format of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractFormat {
    Json(Schema),
    Tsv,
    Labels,
}

impl ExtractFormat {
    fn name(self) -> &'static str {
        match self {
            ExtractFormat::Json(_) => "JSON records",
            ExtractFormat::Tsv => "TSV rows",
            ExtractFormat::Labels => "type labels",
        }
    }
}

/// Records parsed from one response, with what it took to get them.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub records: Vec<Record>,
    pub diagnostics: ParseDiagnostics,
}

/// Parse a complete response.
///
/// With `allow_fallback`, a response with no usable payload is split into
/// blank-line separated paragraphs, each becoming a chunk record.
///
/// # Examples
///
/// ```
/// use llm_extract::output_parser::{extract, ExtractFormat, Schema};
/// use llm_extract::Record;
///
/// let raw = "<think>hmm</think>```json\n[{\"text\":\"张三\",\"type\":\"人物\"}]\n```";
/// let out = extract(raw, ExtractFormat::Json(Schema::Entities), false);
/// assert_eq!(out.records, vec![Record::entity("张三", "人物")]);
/// assert!(out.diagnostics.ok());
/// ```
pub fn extract(raw: &str, format: ExtractFormat, allow_fallback: bool) -> Extraction {
    let mut diagnostics = ParseDiagnostics::default();
    let cleaned = preprocess(raw, &mut diagnostics);
    if cleaned.is_empty() {
        diagnostics.parse_error = Some(ParseError::EmptyResponse.to_string());
        return Extraction {
            records: Vec::new(),
            diagnostics,
        };
    }

    let parsed = match format {
        ExtractFormat::Json(schema) => json::parse_records(&cleaned, schema, &mut diagnostics),
        ExtractFormat::Tsv => non_empty(tsv::parse_rows(&cleaned, &mut diagnostics)),
        ExtractFormat::Labels => non_empty(labels::parse_labels(&cleaned, &mut diagnostics)),
    };

    let records = match parsed {
        Some(records) => records,
        None if allow_fallback => {
            debug!(format = format.name(), "falling back to paragraph chunks");
            diagnostics.strategy = Some("paragraphs");
            diagnostics.fallback_used = true;
            paragraph_records(&cleaned)
        }
        None => {
            let err = ParseError::Unparseable {
                expected_format: format.name(),
                text: truncate(&cleaned, 200),
            };
            warn!(error = %err, "no records in response");
            diagnostics.parse_error = Some(err.to_string());
            Vec::new()
        }
    };

    Extraction {
        records,
        diagnostics,
    }
}

fn non_empty(records: Vec<Record>) -> Option<Vec<Record>> {
    if records.is_empty() {
        None
    } else {
        Some(records)
    }
}

fn paragraph_records(text: &str) -> Vec<Record> {
    split_paragraphs(text)
        .into_iter()
        .enumerate()
        .map(|(i, content)| {
            let id = i as u32 + 1;
            Record::Chunk {
                id,
                title: format!("Chunk {}", id),
                summary: summarize(&content),
                content,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::TypeCategory;

    #[test]
    fn test_empty_after_think_block() {
        let out = extract("<think>only reasoning", ExtractFormat::Tsv, true);
        assert!(out.records.is_empty());
        assert_eq!(out.diagnostics.parse_error.as_deref(), Some("empty model response"));
    }

    #[test]
    fn test_paragraph_fallback_for_chunks() {
        let raw = "第一段内容。\n\n第二段内容。";
        let out = extract(raw, ExtractFormat::Json(Schema::Chunks), true);
        assert_eq!(out.records.len(), 2);
        assert!(out.diagnostics.fallback_used);
        assert!(out.diagnostics.ok());
        match &out.records[1] {
            Record::Chunk { id, content, summary, .. } => {
                assert_eq!(*id, 2);
                assert_eq!(content, "第二段内容。");
                assert_eq!(summary, "第二段内容。");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unparseable_without_fallback_reports_error() {
        let out = extract("抱歉，我无法完成。", ExtractFormat::Tsv, false);
        assert!(out.records.is_empty());
        assert!(!out.diagnostics.ok());
        assert!(!out.diagnostics.fallback_used);
    }

    #[test]
    fn test_truncated_json_never_panics() {
        let raw = "```json\n[{\"content\":\"甲\",\"title\":\"一\"},{\"content\":\"乙";
        let out = extract(raw, ExtractFormat::Json(Schema::Chunks), true);
        assert_eq!(out.records.len(), 1);
        assert!(out.diagnostics.truncated);
        assert!(!out.diagnostics.fallback_used);
    }

    #[test]
    fn test_labels_format() {
        let raw = "<no_think></no_think>ENTITIES: 人物\nRELATIONS: 认识";
        let out = extract(raw, ExtractFormat::Labels, false);
        assert_eq!(
            out.records,
            vec![
                Record::label(TypeCategory::Entity, "人物"),
                Record::label(TypeCategory::Relation, "认识"),
            ]
        );
    }
}

//! JSON record extraction.
//!
//! Accepts a bare array of record objects, a single object, or an object
//! wrapping arrays under `entities` / `relations` / `chunks`. When the
//! payload does not parse (usually because the response was cut off),
//! every complete flat object is salvaged individually.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::extract::{find_bracketed, flat_objects};
use super::Schema;
use crate::diagnostics::ParseDiagnostics;
use crate::record::Record;

const WRAPPER_KEYS: [&str; 3] = ["entities", "relations", "chunks"];

/// Parse `text` into records of the given schema.
///
/// Returns `None` when the text holds no JSON at all; `Some` (possibly
/// empty) otherwise.
pub fn parse_records(
    text: &str,
    schema: Schema,
    diag: &mut ParseDiagnostics,
) -> Option<Vec<Record>> {
    let values = match parse_document(text) {
        Some(value) => {
            diag.strategy = Some("json");
            unwrap_elements(value)
        }
        None => {
            let salvaged: Vec<Value> = flat_objects(text)
                .into_iter()
                .filter_map(parse_lenient)
                .collect();
            if salvaged.is_empty() {
                return None;
            }
            debug!(count = salvaged.len(), "salvaged records from incomplete JSON");
            diag.strategy = Some("json_salvage");
            diag.truncated = true;
            salvaged
        }
    };

    let mut records = Vec::with_capacity(values.len());
    for (i, value) in values.iter().enumerate() {
        match to_record(value, schema, records.len()) {
            Some(record) => records.push(record),
            None => {
                diag.dropped += 1;
                warn!(index = i, entry = %value, "dropping entry without required fields");
            }
        }
    }
    Some(records)
}

/// The first complete array or object in `text`, whichever comes first.
fn parse_document(text: &str) -> Option<Value> {
    let start = text.find(|c: char| c == '[' || c == '{')?;
    let body = &text[start..];
    let region = if body.starts_with('[') {
        find_bracketed(body, '[', ']')
    } else {
        find_bracketed(body, '{', '}')
    }?;
    parse_lenient(region)
}

/// Parse, retrying once with common model mistakes repaired.
fn parse_lenient(text: &str) -> Option<Value> {
    serde_json::from_str(text)
        .ok()
        .or_else(|| serde_json::from_str(&repair(text)).ok())
}

/// Drop trailing commas and escape raw newlines inside strings.
fn repair(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escape_next = false;

    for (i, &ch) in chars.iter().enumerate() {
        if in_string {
            if escape_next {
                escape_next = false;
            } else if ch == '\\' {
                escape_next = true;
            } else if ch == '"' {
                in_string = false;
            } else if ch == '\n' {
                out.push_str("\\n");
                continue;
            }
            out.push(ch);
            continue;
        }
        match ch {
            '"' => in_string = true,
            ',' => {
                let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
                if matches!(next, Some(']') | Some('}')) {
                    continue;
                }
            }
            _ => {}
        }
        out.push(ch);
    }
    out
}

fn has_wrapper_array(map: &Map<String, Value>) -> bool {
    WRAPPER_KEYS
        .iter()
        .any(|k| map.get(*k).is_some_and(Value::is_array))
}

fn unwrap_elements(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Object(mut map) if has_wrapper_array(&map) => {
            let mut items = Vec::new();
            for key in WRAPPER_KEYS {
                if let Some(Value::Array(list)) = map.remove(key) {
                    items.extend(list);
                }
            }
            items
        }
        other => vec![other],
    }
}

fn field<'a>(map: &'a Map<String, Value>, names: &[&str]) -> Option<&'a str> {
    names
        .iter()
        .filter_map(|n| map.get(*n))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|s| !s.is_empty())
}

fn to_record(value: &Value, schema: Schema, kept: usize) -> Option<Record> {
    let map = value.as_object()?;
    match schema {
        Schema::Chunks => {
            let content = field(map, &["content", "text"])?;
            let id = map
                .get("id")
                .and_then(Value::as_u64)
                .and_then(|id| u32::try_from(id).ok())
                .unwrap_or_else(|| u32::try_from(kept + 1).unwrap_or(u32::MAX));
            let title = field(map, &["title"])
                .map(str::to_string)
                .unwrap_or_else(|| format!("Chunk {}", kept + 1));
            let summary = field(map, &["summary"]).unwrap_or_default().to_string();
            Some(Record::Chunk {
                id,
                title,
                summary,
                content: content.to_string(),
            })
        }
        Schema::Entities => {
            if map.contains_key("subject") || map.contains_key("object") {
                Some(Record::relation(
                    field(map, &["type", "relation", "predicate"])?,
                    field(map, &["subject"])?,
                    field(map, &["object"])?,
                ))
            } else {
                Some(Record::entity(
                    field(map, &["text", "name", "entity"])?,
                    field(map, &["type", "entity_type", "label"])?,
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str, schema: Schema) -> (Option<Vec<Record>>, ParseDiagnostics) {
        let mut diag = ParseDiagnostics::default();
        let records = parse_records(text, schema, &mut diag);
        (records, diag)
    }

    #[test]
    fn test_entity_array() {
        let (records, diag) = parse(
            r#"[{"text":"张三","type":"人物"},{"type":"就读于","subject":"张三","object":"北京大学"}]"#,
            Schema::Entities,
        );
        assert_eq!(
            records.unwrap(),
            vec![
                Record::entity("张三", "人物"),
                Record::relation("就读于", "张三", "北京大学"),
            ]
        );
        assert_eq!(diag.strategy, Some("json"));
        assert!(!diag.truncated);
    }

    #[test]
    fn test_wrapper_object_with_prose() {
        let text = r#"结果如下：{"entities":[{"name":"北京","type":"地点"}],"relations":[]} 完毕"#;
        let (records, _) = parse(text, Schema::Entities);
        assert_eq!(records.unwrap(), vec![Record::entity("北京", "地点")]);
    }

    #[test]
    fn test_truncated_array_keeps_complete_leading_records() {
        let text = r#"[{"text":"张三","type":"人物"},{"text":"李四","type":"人物"},{"text":"王"#;
        let (records, diag) = parse(text, Schema::Entities);
        assert_eq!(
            records.unwrap(),
            vec![Record::entity("张三", "人物"), Record::entity("李四", "人物")]
        );
        assert_eq!(diag.strategy, Some("json_salvage"));
        assert!(diag.truncated);
    }

    #[test]
    fn test_missing_required_fields_are_dropped() {
        let text = r#"[{"text":"张三"},{"text":"北京","type":"地点"},{"type":"位于","subject":"x"},"stray"]"#;
        let (records, diag) = parse(text, Schema::Entities);
        assert_eq!(records.unwrap(), vec![Record::entity("北京", "地点")]);
        assert_eq!(diag.dropped, 3);
    }

    #[test]
    fn test_chunk_defaults_and_empty_content_filtered() {
        let text = r#"[{"content":"第一段"},{"title":"空","content":"  "},{"id":9,"title":"二","summary":"概要","content":"第二段"}]"#;
        let (records, diag) = parse(text, Schema::Chunks);
        assert_eq!(
            records.unwrap(),
            vec![
                Record::Chunk {
                    id: 1,
                    title: "Chunk 1".into(),
                    summary: String::new(),
                    content: "第一段".into(),
                },
                Record::Chunk {
                    id: 9,
                    title: "二".into(),
                    summary: "概要".into(),
                    content: "第二段".into(),
                },
            ]
        );
        assert_eq!(diag.dropped, 1);
    }

    #[test]
    fn test_out_of_range_chunk_id_uses_position() {
        let text = r#"[{"id":4294967300,"title":"大","content":"正文"}]"#;
        let (records, _) = parse(text, Schema::Chunks);
        match records.unwrap().as_slice() {
            [Record::Chunk { id, .. }] => assert_eq!(*id, 1),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_trailing_comma_repaired() {
        let (records, diag) = parse(r#"[{"text":"张三","type":"人物",},]"#, Schema::Entities);
        assert_eq!(records.unwrap(), vec![Record::entity("张三", "人物")]);
        assert_eq!(diag.strategy, Some("json"));
    }

    #[test]
    fn test_no_json_returns_none() {
        let (records, _) = parse("模型没有返回结构化内容", Schema::Chunks);
        assert!(records.is_none());
    }

    #[test]
    fn test_repair_leaves_strings_alone() {
        assert_eq!(repair(r#"{"a":"x, }"}"#), r#"{"a":"x, }"}"#);
        assert_eq!(repair("{\"a\":\"l1\nl2\"}"), "{\"a\":\"l1\\nl2\"}");
    }
}

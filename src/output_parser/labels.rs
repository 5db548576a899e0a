//! `ENTITIES:` / `RELATIONS:` label lists used for type discovery.

use crate::diagnostics::ParseDiagnostics;
use crate::record::{Record, TypeCategory};

const SEPARATORS: [char; 5] = [',', '，', '、', ';', '；'];

/// The value list after `label:` (ASCII or full-width colon), ignoring case.
fn after_label<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    let head = line.get(..label.len())?;
    if !head.eq_ignore_ascii_case(label) {
        return None;
    }
    let rest = line[label.len()..].trim_start();
    rest.strip_prefix(':').or_else(|| rest.strip_prefix('：'))
}

/// Parse label lines into [`Record::Label`] records. Other lines are ignored.
pub fn parse_labels(text: &str, diag: &mut ParseDiagnostics) -> Vec<Record> {
    let mut records = Vec::new();
    for line in text.lines() {
        let line = line
            .trim()
            .trim_start_matches(|c: char| c == '-' || c == '#' || c.is_whitespace())
            .replace("**", "");
        let (category, values) = if let Some(v) = after_label(&line, "ENTITIES") {
            (TypeCategory::Entity, v)
        } else if let Some(v) = after_label(&line, "RELATIONS") {
            (TypeCategory::Relation, v)
        } else {
            continue;
        };
        records.extend(
            values
                .split(&SEPARATORS[..])
                .map(|v| v.trim().trim_matches(|c: char| c == '"' || c == '\'' || c == '`'))
                .filter(|v| !v.is_empty())
                .map(|v| Record::label(category, v)),
        );
    }
    if !records.is_empty() {
        diag.strategy = Some("labels");
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(records: &[Record], want: TypeCategory) -> Vec<String> {
        records
            .iter()
            .filter_map(|r| match r {
                Record::Label { category, name } if *category == want => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_parses_both_lists() {
        let mut diag = ParseDiagnostics::default();
        let text = "ENTITIES: 人物, 地点，组织\nRELATIONS: 就读于、位于";
        let records = parse_labels(text, &mut diag);
        assert_eq!(names(&records, TypeCategory::Entity), ["人物", "地点", "组织"]);
        assert_eq!(names(&records, TypeCategory::Relation), ["就读于", "位于"]);
        assert_eq!(diag.strategy, Some("labels"));
    }

    #[test]
    fn test_tolerates_case_markdown_and_fullwidth_colon() {
        let mut diag = ParseDiagnostics::default();
        let text = "说明文字\n- **Entities**：人物\nrelations : \"任职于\"";
        let records = parse_labels(text, &mut diag);
        assert_eq!(names(&records, TypeCategory::Entity), ["人物"]);
        assert_eq!(names(&records, TypeCategory::Relation), ["任职于"]);
    }

    #[test]
    fn test_no_labels() {
        let mut diag = ParseDiagnostics::default();
        assert!(parse_labels("没有类型", &mut diag).is_empty());
        assert!(diag.strategy.is_none());
    }
}

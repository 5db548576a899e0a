//! Tab-separated record rows.
//!
//! ```text
//! ENTITY    人物    张三
//! RELATION  就读于  张三  北京大学
//! ```
//!
//! Rows are split on tabs first; a row with the wrong number of fields is
//! re-split on whitespace runs before it is given up on.

use tracing::debug;

use crate::diagnostics::ParseDiagnostics;
use crate::record::Record;

const HEADER_WORDS: [&str; 10] = [
    "tag", "kind", "type", "name", "subject", "object", "类型", "名称", "主体", "客体",
];

#[derive(Clone, Copy)]
enum RowTag {
    Entity,
    Relation,
}

fn row_tag(field: &str) -> Option<RowTag> {
    let field = field.trim_matches(|c: char| c == '*' || c == '-');
    if field.eq_ignore_ascii_case("entity") || field == "实体" {
        Some(RowTag::Entity)
    } else if field.eq_ignore_ascii_case("relation") || field == "关系" {
        Some(RowTag::Relation)
    } else {
        None
    }
}

fn is_header(fields: &[&str]) -> bool {
    row_tag(fields[0]).is_none()
        && fields
            .iter()
            .any(|f| HEADER_WORDS.contains(&f.to_lowercase().as_str()))
}

fn row_record(fields: &[&str]) -> Option<Record> {
    match (row_tag(fields.first()?)?, fields.len()) {
        (RowTag::Entity, n) if n >= 3 => Some(Record::entity(fields[2..].join(" "), fields[1])),
        (RowTag::Relation, n) if n >= 4 => {
            Some(Record::relation(fields[1], fields[2], fields[3..].join(" ")))
        }
        _ => None,
    }
}

/// Parse every recognizable row; others are counted in `diag.dropped`.
pub fn parse_rows(text: &str, diag: &mut ParseDiagnostics) -> Vec<Record> {
    let mut records = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with("```") {
            continue;
        }

        let fields: Vec<&str> = line
            .split('\t')
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .collect();
        if is_header(&fields) {
            continue;
        }

        let record = row_record(&fields).or_else(|| {
            let loose: Vec<&str> = line.split_whitespace().collect();
            row_record(&loose)
        });
        match record {
            Some(record) => records.push(record),
            None => {
                diag.dropped += 1;
                debug!(row = line, "skipping unrecognized row");
            }
        }
    }
    if !records.is_empty() {
        diag.strategy = Some("tsv");
    }
    records
}

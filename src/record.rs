//! Structured records produced by the extractor.

use serde::{Deserialize, Serialize};

/// Whether a discovered type name labels entities or relations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeCategory {
    Entity,
    Relation,
}

/// A single structured item extracted from model output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Record {
    /// A named entity mention, e.g. `张三` of type `人物`.
    Entity {
        text: String,
        #[serde(rename = "type")]
        entity_type: String,
    },
    /// A typed relation between two entity mentions.
    Relation {
        #[serde(rename = "type")]
        relation_type: String,
        subject: String,
        object: String,
    },
    /// A semantic chunk of the source text.
    Chunk {
        id: u32,
        title: String,
        summary: String,
        content: String,
    },
    /// A type name discovered during vocabulary discovery.
    Label {
        category: TypeCategory,
        name: String,
    },
}

impl Record {
    pub fn entity(text: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Record::Entity {
            text: text.into(),
            entity_type: entity_type.into(),
        }
    }

    pub fn relation(
        relation_type: impl Into<String>,
        subject: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Record::Relation {
            relation_type: relation_type.into(),
            subject: subject.into(),
            object: object.into(),
        }
    }

    /// Build a chunk record, deriving the summary from the content.
    pub fn chunk(id: u32, title: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        Record::Chunk {
            id,
            title: title.into(),
            summary: summarize(&content),
            content,
        }
    }

    pub fn label(category: TypeCategory, name: impl Into<String>) -> Self {
        Record::Label {
            category,
            name: name.into(),
        }
    }

    /// Stable identity used for deduplication.
    ///
    /// Entities and relations compare on trimmed field values. Chunks compare
    /// on their content with all whitespace removed.
    pub fn dedup_key(&self) -> String {
        match self {
            Record::Entity { text, entity_type } => {
                format!("entity\u{1f}{}\u{1f}{}", entity_type.trim(), text.trim())
            }
            Record::Relation {
                relation_type,
                subject,
                object,
            } => format!(
                "relation\u{1f}{}\u{1f}{}\u{1f}{}",
                relation_type.trim(),
                subject.trim(),
                object.trim()
            ),
            Record::Chunk { content, .. } => format!("chunk\u{1f}{}", squash_whitespace(content)),
            Record::Label { category, name } => {
                let tag = match category {
                    TypeCategory::Entity => "entity",
                    TypeCategory::Relation => "relation",
                };
                format!("label\u{1f}{}\u{1f}{}", tag, name.trim())
            }
        }
    }

    pub fn is_chunk(&self) -> bool {
        matches!(self, Record::Chunk { .. })
    }
}

/// Content with every whitespace character removed.
pub(crate) fn squash_whitespace(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

/// First 50 characters of the content, with an ellipsis when cut.
pub(crate) fn summarize(content: &str) -> String {
    let trimmed = content.trim();
    if trimmed.chars().count() > 50 {
        let head: String = trimmed.chars().take(50).collect();
        format!("{}...", head)
    } else {
        trimmed.to_string()
    }
}

/// Ordered, duplicate-free set of discovered entity and relation type names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeVocabulary {
    entity_types: Vec<String>,
    relation_types: Vec<String>,
}

impl TypeVocabulary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a type name. Returns `false` if it was already present or blank.
    pub fn insert(&mut self, category: TypeCategory, name: &str) -> bool {
        let name = name.trim();
        if name.is_empty() {
            return false;
        }
        let list = match category {
            TypeCategory::Entity => &mut self.entity_types,
            TypeCategory::Relation => &mut self.relation_types,
        };
        if list.iter().any(|existing| existing == name) {
            return false;
        }
        list.push(name.to_string());
        true
    }

    /// Collect every [`Record::Label`] in `records`.
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a Record>) -> Self {
        let mut vocab = Self::new();
        for record in records {
            if let Record::Label { category, name } = record {
                vocab.insert(*category, name);
            }
        }
        vocab
    }

    pub fn entity_types(&self) -> &[String] {
        &self.entity_types
    }

    pub fn relation_types(&self) -> &[String] {
        &self.relation_types
    }

    pub fn is_empty(&self) -> bool {
        self.entity_types.is_empty() && self.relation_types.is_empty()
    }

    pub fn allows_entity(&self, entity_type: &str) -> bool {
        let entity_type = entity_type.trim();
        self.entity_types.iter().any(|t| t == entity_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_key_ignores_surrounding_whitespace() {
        let a = Record::entity("张三", "人物");
        let b = Record::entity(" 张三 ", "人物 ");
        assert_eq!(a.dedup_key(), b.dedup_key());
        assert_ne!(a.dedup_key(), Record::entity("张三", "地点").dedup_key());
    }

    #[test]
    fn test_chunk_key_ignores_inner_whitespace() {
        let a = Record::chunk(1, "a", "第一段 内容\n继续");
        let b = Record::chunk(9, "b", "第一段内容 继续");
        assert_eq!(a.dedup_key(), b.dedup_key());
    }

    #[test]
    fn test_record_kinds_never_collide() {
        let entity = Record::entity("x", "y");
        let label = Record::label(TypeCategory::Entity, "y");
        assert_ne!(entity.dedup_key(), label.dedup_key());
    }

    #[test]
    fn test_summarize_truncates_long_content() {
        let long: String = "字".repeat(80);
        let summary = summarize(&long);
        assert_eq!(summary.chars().count(), 53);
        assert!(summary.ends_with("..."));
        assert_eq!(summarize("短"), "短");
    }

    #[test]
    fn test_vocabulary_is_ordered_and_unique() {
        let mut vocab = TypeVocabulary::new();
        assert!(vocab.insert(TypeCategory::Entity, "人物"));
        assert!(vocab.insert(TypeCategory::Entity, "地点"));
        assert!(!vocab.insert(TypeCategory::Entity, " 人物 "));
        assert!(!vocab.insert(TypeCategory::Relation, ""));
        assert_eq!(vocab.entity_types(), ["人物", "地点"]);
        assert!(vocab.relation_types().is_empty());
        assert!(vocab.allows_entity("地点"));
        assert!(!vocab.allows_entity("组织"));
    }

    #[test]
    fn test_record_serializes_with_kind_tag() {
        let value = serde_json::to_value(Record::entity("北京", "地点")).unwrap();
        assert_eq!(value["kind"], "entity");
        assert_eq!(value["type"], "地点");
        assert_eq!(value["text"], "北京");
    }
}

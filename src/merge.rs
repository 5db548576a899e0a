//! Accumulating records across segments without duplicates.
//!
//! Overlapping segments make the model report the same entity, relation or
//! chunk more than once. [`ResultSet::merge`] folds each segment's records in
//! while keeping first-seen order:
//!
//! - entities, relations and labels with an equal [`Record::dedup_key`]
//!   keep the earliest occurrence;
//! - chunks compare on whitespace-free content, and when one chunk's content
//!   contains another's, the longer one survives in the earlier position.
//!
//! Merging the same records twice leaves the set unchanged.

use crate::record::{squash_whitespace, Record};
use serde::Serialize;
use std::collections::HashMap;

/// Counts from one [`ResultSet::merge`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub added: usize,
    pub replaced: usize,
    pub skipped: usize,
}

/// Ordered, duplicate-free collection of records for one run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResultSet {
    records: Vec<Record>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    pub fn contains(&self, record: &Record) -> bool {
        self.index.contains_key(&record.dedup_key())
    }

    /// Fold `incoming` into the set.
    pub fn merge(&mut self, incoming: impl IntoIterator<Item = Record>) -> MergeSummary {
        let mut summary = MergeSummary::default();
        for record in incoming {
            if record.is_chunk() {
                self.merge_chunk(record, &mut summary);
            } else {
                let key = record.dedup_key();
                if self.index.contains_key(&key) {
                    summary.skipped += 1;
                } else {
                    self.push(key, record);
                    summary.added += 1;
                }
            }
        }
        summary
    }

    fn push(&mut self, key: String, record: Record) {
        self.index.insert(key, self.records.len());
        self.records.push(record);
    }

    fn merge_chunk(&mut self, record: Record, summary: &mut MergeSummary) {
        let Record::Chunk { content, .. } = &record else {
            return;
        };
        let squashed = squash_whitespace(content);
        if squashed.is_empty() {
            summary.skipped += 1;
            return;
        }

        let existing_chunks = || {
            self.records.iter().enumerate().filter_map(|(i, r)| match r {
                Record::Chunk { content, .. } => Some((i, squash_whitespace(content))),
                _ => None,
            })
        };

        if existing_chunks().any(|(_, have)| have.contains(&squashed)) {
            summary.skipped += 1;
            return;
        }

        let superseded = existing_chunks().find(|(_, have)| squashed.contains(have.as_str()));
        match superseded {
            Some((pos, _)) => {
                let old_key = self.records[pos].dedup_key();
                self.index.remove(&old_key);
                self.index.insert(record.dedup_key(), pos);
                self.records[pos] = record;
                summary.replaced += 1;
            }
            None => {
                let key = record.dedup_key();
                self.push(key, record);
                summary.added += 1;
            }
        }
    }

    /// Renumber chunk ids `1..=n` in set order, filling blank titles.
    pub fn renumber_chunks(&mut self) {
        let mut next = 1;
        for record in &mut self.records {
            if let Record::Chunk { id, title, .. } = record {
                *id = next;
                if title.trim().is_empty() {
                    *title = format!("Chunk {}", next);
                }
                next += 1;
            }
        }
    }
}

impl IntoIterator for ResultSet {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

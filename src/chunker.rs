//! Splitting long text into bounded, overlapping segments.
//!
//! All offsets are character offsets (Unicode scalar values), never byte
//! offsets, so cuts never land inside a multi-byte character.
//!
//! [`split`] prepares text for the model: each segment is at most
//! `max_chars` long and ends at the strongest natural boundary found near
//! its end. The `*_chunks` functions are local chunking methods that
//! produce final chunk records without calling a model.

use crate::config::check_chunking;
use crate::error::Result;
use crate::record::Record;
use serde::{Deserialize, Serialize};

/// Lower bound on the boundary search window.
const MIN_SEARCH_WINDOW: usize = 200;
/// How far behind the overlap point the next start may snap back.
const RESNAP_LOOKBACK: usize = 200;
/// Back-off distance for [`fixed_chunks`].
const FIXED_LOOKBACK: usize = 100;

/// A contiguous slice of the source text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Segment {
    pub text: String,
    /// Inclusive start, in characters.
    pub start: usize,
    /// Exclusive end, in characters.
    pub end: usize,
}

impl Segment {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// How a chunking run produces chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkMethod {
    /// Ask the model to cut each segment into topical chunks.
    #[default]
    Semantic,
    /// Pack whole sentences.
    Sentence,
    /// Pack whole paragraphs.
    Paragraph,
    /// Fixed-size cuts backed off to a sentence end.
    Fixed,
}

#[derive(Debug, Clone, Copy)]
enum Boundary {
    Paragraph,
    Sentence,
    Clause,
    Whitespace,
}

impl Boundary {
    const PRIORITY: [Boundary; 4] = [
        Boundary::Paragraph,
        Boundary::Sentence,
        Boundary::Clause,
        Boundary::Whitespace,
    ];

    /// Whether a cut directly after `chars[i]` falls on this kind of boundary.
    fn matches(self, chars: &[char], i: usize, floor: usize) -> bool {
        match self {
            Boundary::Paragraph => chars[i] == '\n' && blank_line_before(chars, i, floor),
            Boundary::Sentence => is_sentence_end(chars, i),
            Boundary::Clause => matches!(chars[i], '，' | '；' | '、' | '：' | ',' | ';'),
            Boundary::Whitespace => chars[i].is_whitespace(),
        }
    }
}

/// `chars[i]` is a newline closing a line that holds only whitespace.
fn blank_line_before(chars: &[char], i: usize, floor: usize) -> bool {
    let mut k = i;
    while k > floor {
        k -= 1;
        match chars[k] {
            '\n' => return true,
            c if c.is_whitespace() => continue,
            _ => return false,
        }
    }
    false
}

fn is_sentence_end(chars: &[char], i: usize) -> bool {
    match chars[i] {
        '。' | '！' | '？' => true,
        '.' | '!' | '?' => chars.get(i + 1).map_or(true, |c| c.is_whitespace()),
        _ => false,
    }
}

fn is_resnap_point(chars: &[char], i: usize) -> bool {
    chars[i] == '\n' || is_sentence_end(chars, i)
}

/// Rightmost cut in `(from, to]` of the highest-priority boundary kind present.
fn find_cut(chars: &[char], from: usize, to: usize) -> Option<usize> {
    Boundary::PRIORITY.iter().find_map(|kind| {
        (from..to)
            .rev()
            .find(|&i| kind.matches(chars, i, from))
            .map(|i| i + 1)
    })
}

/// Start of the segment after `[start, end)`: the overlap point, moved to the
/// nearest sentence start behind it, or else ahead of it.
fn next_start(chars: &[char], start: usize, end: usize, overlap: usize) -> usize {
    let target = end.saturating_sub(overlap);
    let lower = (start + 1).max(target.saturating_sub(RESNAP_LOOKBACK));
    let upper = target.min(end - 1);
    if lower <= upper {
        if let Some(i) = (lower..=upper).rev().find(|&i| is_resnap_point(chars, i)) {
            return i + 1;
        }
    }
    (target.max(start + 1)..end)
        .find(|&i| is_resnap_point(chars, i))
        .map(|i| i + 1)
        .unwrap_or(target)
}

/// Split `text` into segments of at most `max_chars` characters, consecutive
/// segments sharing roughly `overlap_chars` characters.
///
/// Fails with [`PipelineError::InvalidConfig`](crate::PipelineError::InvalidConfig)
/// when `max_chars` is zero or not larger than `overlap_chars`. Empty input
/// yields no segments; input that fits yields exactly one.
///
/// ```
/// use llm_extract::chunker::split;
///
/// let segments = split("第一句。第二句。", 100, 10).unwrap();
/// assert_eq!(segments.len(), 1);
/// assert_eq!(segments[0].end, 8);
/// ```
pub fn split(text: &str, max_chars: usize, overlap_chars: usize) -> Result<Vec<Segment>> {
    check_chunking(max_chars, overlap_chars)?;

    let chars: Vec<char> = text.chars().collect();
    let total = chars.len();
    if total == 0 {
        return Ok(Vec::new());
    }
    if total <= max_chars {
        return Ok(vec![Segment {
            text: text.to_string(),
            start: 0,
            end: total,
        }]);
    }

    let window = MIN_SEARCH_WINDOW.max(max_chars / 10);
    let mut segments = Vec::new();
    let mut start = 0;

    loop {
        let mut end = (start + max_chars).min(total);
        if end < total {
            let floor = start + (max_chars - overlap_chars);
            let search_from = floor.max(end.saturating_sub(window));
            if let Some(cut) = find_cut(&chars, search_from, end) {
                end = cut;
            }
        }

        segments.push(Segment {
            text: chars[start..end].iter().collect(),
            start,
            end,
        });

        if end >= total {
            break;
        }

        let mut next = next_start(&chars, start, end, overlap_chars);
        if next <= start {
            next = start + max_chars / 2;
        }
        start = next.min(end).max(start + 1);
    }

    Ok(segments)
}

/// Blank-line separated paragraphs, trimmed, empty ones dropped.
pub(crate) fn split_paragraphs(text: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(current.join("\n").trim().to_string());
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        paragraphs.push(current.join("\n").trim().to_string());
    }
    paragraphs
}

fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut buf = String::new();
    for c in text.chars() {
        buf.push(c);
        if matches!(c, '。' | '！' | '？' | '\n') {
            let sentence = buf.trim();
            if !sentence.is_empty() {
                sentences.push(sentence.to_string());
            }
            buf.clear();
        }
    }
    let tail = buf.trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }
    sentences
}

/// Greedily join `pieces`: a chunk is closed once it holds at least
/// `min_size` characters and the next piece would push it past `max_size`.
fn pack(pieces: Vec<String>, separator: &str, min_size: usize, max_size: usize) -> Vec<Record> {
    let mut contents = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;
    for piece in pieces {
        let piece_len = piece.chars().count();
        if current_len > 0 && current_len + piece_len > max_size && current_len >= min_size {
            contents.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if current_len > 0 {
            current.push_str(separator);
            current_len += separator.chars().count();
        }
        current.push_str(&piece);
        current_len += piece_len;
    }
    if !current.trim().is_empty() {
        contents.push(current);
    }
    into_records(contents)
}

fn into_records(contents: Vec<String>) -> Vec<Record> {
    contents
        .into_iter()
        .enumerate()
        .map(|(i, content)| {
            let id = i as u32 + 1;
            Record::chunk(id, format!("Chunk {}", id), content)
        })
        .collect()
}

/// Chunk by whole sentences (split after `。！？` or a newline).
pub fn sentence_chunks(text: &str, min_size: usize, max_size: usize) -> Vec<Record> {
    pack(split_sentences(text), "", min_size, max_size)
}

/// Chunk by whole paragraphs.
pub fn paragraph_chunks(text: &str, min_size: usize, max_size: usize) -> Vec<Record> {
    pack(split_paragraphs(text), "\n\n", min_size, max_size)
}

/// Cut every `max_size` characters, backing off to the last sentence end
/// within the final 100 characters of each cut.
pub fn fixed_chunks(text: &str, max_size: usize) -> Vec<Record> {
    let chars: Vec<char> = text.chars().collect();
    let total = chars.len();
    let max_size = max_size.max(1);
    let mut contents = Vec::new();
    let mut start = 0;
    while start < total {
        let mut end = (start + max_size).min(total);
        if end < total {
            let lower = (start + 1).max(end.saturating_sub(FIXED_LOOKBACK));
            if let Some(i) = (lower..end)
                .rev()
                .find(|&i| matches!(chars[i], '。' | '！' | '？' | '\n'))
            {
                end = i + 1;
            }
        }
        let content: String = chars[start..end].iter().collect();
        if !content.trim().is_empty() {
            contents.push(content.trim().to_string());
        }
        start = end;
    }
    into_records(contents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PipelineError;

    const SENTENCE: &str = "张三在北京大学读书，他非常喜欢研究历史。";

    fn assert_covering(text: &str, segments: &[Segment], max_chars: usize) {
        let chars: Vec<char> = text.chars().collect();
        assert_eq!(segments.first().map(|s| s.start), Some(0));
        assert_eq!(segments.last().map(|s| s.end), Some(chars.len()));
        for seg in segments {
            assert!(seg.len() <= max_chars, "segment too long: {}", seg.len());
            assert!(!seg.is_empty());
            let expected: String = chars[seg.start..seg.end].iter().collect();
            assert_eq!(seg.text, expected);
        }
        for pair in segments.windows(2) {
            assert!(pair[1].start > pair[0].start, "starts must increase");
            assert!(pair[1].start <= pair[0].end, "gap between segments");
        }
    }

    #[test]
    fn test_empty_text_yields_no_segments() {
        assert!(split("", 100, 10).unwrap().is_empty());
    }

    #[test]
    fn test_short_text_single_segment() {
        let segments = split(SENTENCE, 5000, 500).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].text, SENTENCE);
        assert_eq!((segments[0].start, segments[0].end), (0, 20));
    }

    #[test]
    fn test_rejects_overlap_not_smaller_than_max() {
        assert!(matches!(split("abc", 10, 10), Err(PipelineError::InvalidConfig(_))));
        assert!(matches!(split("abc", 0, 0), Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn test_nine_thousand_chars_two_segments_at_terminators() {
        let text = SENTENCE.repeat(450);
        assert_eq!(text.chars().count(), 9000);

        let segments = split(&text, 5000, 500).unwrap();
        assert_eq!(segments.len(), 2);
        assert_covering(&text, &segments, 5000);
        assert!(segments[0].text.ends_with('。'));
        assert_eq!(segments[0].end, 5000);
        assert_eq!(segments[1].start, 4500);
        assert!(segments[1].text.starts_with("张三"));
    }

    #[test]
    fn test_prefers_paragraph_break_over_sentence_end() {
        let mut text = SENTENCE.repeat(10);
        text.push_str("\n\n");
        text.push_str(&SENTENCE.repeat(10));
        let segments = split(&text, 260, 100).unwrap();
        assert_eq!(segments[0].end, 202);
        assert_covering(&text, &segments, 260);
    }

    #[test]
    fn test_no_boundary_falls_back_to_hard_cut() {
        let text = "字".repeat(1000);
        let segments = split(&text, 300, 30).unwrap();
        assert_covering(&text, &segments, 300);
        assert_eq!(segments[0].end, 300);
        assert_eq!(segments[1].start, 270);
    }

    #[test]
    fn test_large_overlap_still_advances() {
        let text = SENTENCE.repeat(40);
        let segments = split(&text, 100, 90).unwrap();
        assert_covering(&text, &segments, 100);
    }

    #[test]
    fn test_latin_text_coverage() {
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(120)
            + "Pi is 3.14 and e is 2.71, roughly.";
        for (max, overlap) in [(500, 50), (1000, 200), (333, 0), (250, 240)] {
            let segments = split(&text, max, overlap).unwrap();
            assert_covering(&text, &segments, max);
        }
    }

    #[test]
    fn test_split_is_deterministic() {
        let tail = "第二部分，内容。".repeat(300);
        let text = format!("{}\n\n{}", SENTENCE.repeat(120), tail);
        let a = split(&text, 700, 70).unwrap();
        let b = split(&text, 700, 70).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_sentence_chunks_pack_up_to_max() {
        let text = SENTENCE.repeat(12);
        let chunks = sentence_chunks(&text, 30, 100);
        let lengths: Vec<usize> = chunks
            .iter()
            .map(|c| match c {
                Record::Chunk { content, .. } => content.chars().count(),
                _ => 0,
            })
            .collect();
        assert_eq!(lengths, vec![100, 100, 40]);
    }

    #[test]
    fn test_paragraph_chunks_keep_small_paragraphs_together() {
        let text = "甲段。\n\n乙段。\n\n\n丙段。";
        let chunks = paragraph_chunks(text, 100, 1000);
        assert_eq!(chunks.len(), 1);
        match &chunks[0] {
            Record::Chunk { id, title, content, .. } => {
                assert_eq!(*id, 1);
                assert_eq!(title, "Chunk 1");
                assert_eq!(content, "甲段。\n\n乙段。\n\n丙段。");
            }
            other => panic!("unexpected record {:?}", other),
        }
    }

    #[test]
    fn test_fixed_chunks_back_off_to_sentence_end() {
        let text = SENTENCE.repeat(6);
        let chunks = fixed_chunks(&text, 50);
        let lengths: Vec<usize> = chunks
            .iter()
            .map(|c| match c {
                Record::Chunk { content, .. } => content.chars().count(),
                _ => 0,
            })
            .collect();
        assert_eq!(lengths, vec![40, 40, 40]);
    }

    #[test]
    fn test_split_paragraphs_trims_and_skips_blank() {
        let paragraphs = split_paragraphs("  a\nb  \n   \n\n c \n");
        assert_eq!(paragraphs, vec!["a\nb".to_string(), "c".to_string()]);
    }
}

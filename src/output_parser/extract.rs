//! Shared extraction strategies for model output.
//!
//! Every format parser runs [`preprocess`] first, then uses the scanning
//! helpers here. No regex: everything is manual string scanning.

use crate::diagnostics::ParseDiagnostics;

/// Reasoning blocks some models emit before (or instead of) the answer.
const META_TAGS: [(&str, &str); 3] = [
    ("<think>", "</think>"),
    ("<thinking>", "</thinking>"),
    ("<no_think>", "</no_think>"),
];

/// Strip reasoning blocks, unwrap a code fence, trim.
///
/// Records what was done in `diag`.
pub fn preprocess(text: &str, diag: &mut ParseDiagnostics) -> String {
    let stripped = strip_meta_blocks(text);
    if stripped.len() != text.len() {
        diag.meta_stripped = true;
    }
    match unwrap_code_fence(&stripped) {
        Some((_, content)) => {
            diag.fence_unwrapped = true;
            content.to_string()
        }
        None => stripped.trim().to_string(),
    }
}

/// Strip all `<think>`, `<thinking>` and `<no_think>` blocks, matching tags
/// case-insensitively.
///
/// An opening tag without a closing tag drops everything after it.
///
/// # Examples
///
/// ```
/// use llm_extract::output_parser::strip_meta_blocks;
///
/// assert_eq!(strip_meta_blocks("<think>reasoning</think>result"), "result");
/// assert_eq!(strip_meta_blocks("<THINK>no closing tag"), "");
/// assert_eq!(strip_meta_blocks("<no_think></no_think>done"), "done");
/// ```
pub fn strip_meta_blocks(text: &str) -> String {
    META_TAGS
        .iter()
        .fold(text.to_string(), |acc, (open, close)| {
            strip_tag_variant(&acc, open, close)
        })
}

/// Strip a specific open/close tag pair, ignoring ASCII case.
fn strip_tag_variant(text: &str, open: &str, close: &str) -> String {
    let mut result = text.to_string();
    loop {
        // ASCII lowering keeps byte offsets identical to `result`.
        let lower = result.to_ascii_lowercase();
        let Some(start) = lower.find(open) else {
            break;
        };
        match lower[start..].find(close) {
            Some(end_offset) => {
                let end = start + end_offset + close.len();
                result.replace_range(start..end, "");
            }
            None => {
                result.truncate(start);
                break;
            }
        }
    }
    result
}

/// Extract content from the first markdown code fence.
///
/// Returns `(language_hint, content)`; the hint is `None` for bare fences.
/// A fence that is never closed (a truncated response) yields everything
/// after the opening line.
///
/// # Examples
///
/// ```
/// use llm_extract::output_parser::extract::unwrap_code_fence;
///
/// let input = "Here:\n```json\n[{\"a\": 1}]\n```";
/// assert_eq!(unwrap_code_fence(input), Some((Some("json"), "[{\"a\": 1}]")));
///
/// let cut = "```tsv\nENTITY\t人物\t张三";
/// assert_eq!(unwrap_code_fence(cut), Some((Some("tsv"), "ENTITY\t人物\t张三")));
/// ```
pub fn unwrap_code_fence(text: &str) -> Option<(Option<&str>, &str)> {
    let fence_start = text.find("```")?;
    let after_backticks = fence_start + 3;

    let line_end = after_backticks + text[after_backticks..].find('\n')?;
    let lang_str = text[after_backticks..line_end].trim();
    let lang = if lang_str.is_empty() {
        None
    } else {
        Some(lang_str)
    };

    let content_start = line_end + 1;
    let content = match text[content_start..].find("```") {
        Some(close_offset) => &text[content_start..content_start + close_offset],
        None => &text[content_start..],
    };
    Some((lang, content.trim()))
}

/// Find the first complete bracketed region starting at or after the first
/// `open` delimiter. Nesting- and string-aware.
///
/// # Examples
///
/// ```
/// use llm_extract::output_parser::extract::find_bracketed;
///
/// let input = r#"Result: [{"a": "]"}] trailing [2]"#;
/// assert_eq!(find_bracketed(input, '[', ']'), Some(r#"[{"a": "]"}]"#));
/// assert_eq!(find_bracketed("[1, 2", '[', ']'), None);
/// ```
pub fn find_bracketed(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in text[start..].char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        if ch == '\\' && in_string {
            escape_next = true;
            continue;
        }
        if ch == '"' {
            in_string = !in_string;
            continue;
        }
        if in_string {
            continue;
        }
        if ch == open {
            depth += 1;
        } else if ch == close {
            depth -= 1;
            if depth == 0 {
                return Some(&text[start..start + i + ch.len_utf8()]);
            }
        }
    }
    None
}

/// Every complete `{...}` that holds no nested object, in document order.
///
/// Used to salvage records from JSON that was cut off mid-stream: flat
/// record objects that closed before the cut are returned, the rest is
/// ignored.
pub fn flat_objects(text: &str) -> Vec<&str> {
    let mut found = Vec::new();
    // (byte offset of '{', saw a nested '{')
    let mut stack: Vec<(usize, bool)> = Vec::new();
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in text.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        if ch == '\\' && in_string {
            escape_next = true;
            continue;
        }
        if ch == '"' {
            in_string = !in_string;
            continue;
        }
        if in_string {
            continue;
        }
        match ch {
            '{' => {
                if let Some(parent) = stack.last_mut() {
                    parent.1 = true;
                }
                stack.push((i, false));
            }
            '}' => {
                if let Some((start, nested)) = stack.pop() {
                    if !nested {
                        found.push(&text[start..=i]);
                    }
                }
            }
            _ => {}
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── strip_meta_blocks ──

    #[test]
    fn strip_think_complete() {
        assert_eq!(strip_meta_blocks("<think>reasoning</think>result"), "result");
    }

    #[test]
    fn strip_think_unclosed_drops_rest() {
        assert_eq!(strip_meta_blocks("answer<think>reasoning without close"), "answer");
    }

    #[test]
    fn strip_multiple_and_mixed_case() {
        let input = "<Think>a</THINK>mid<thinking>b</thinking>end<NO_THINK></no_think>";
        assert_eq!(strip_meta_blocks(input), "midend");
    }

    #[test]
    fn strip_preserves_non_ascii() {
        assert_eq!(strip_meta_blocks("<think>想一想</think>张三"), "张三");
    }

    #[test]
    fn strip_no_tags() {
        assert_eq!(strip_meta_blocks("just plain text"), "just plain text");
    }

    // ── preprocess ──

    #[test]
    fn preprocess_records_steps() {
        let mut diag = ParseDiagnostics::default();
        let out = preprocess("<think>x</think>\n```json\n[1]\n```\n", &mut diag);
        assert_eq!(out, "[1]");
        assert!(diag.meta_stripped);
        assert!(diag.fence_unwrapped);
    }

    #[test]
    fn preprocess_plain_text_trims() {
        let mut diag = ParseDiagnostics::default();
        assert_eq!(preprocess("  hello  ", &mut diag), "hello");
        assert!(!diag.meta_stripped);
        assert!(!diag.fence_unwrapped);
    }

    // ── unwrap_code_fence ──

    #[test]
    fn fence_bare() {
        let (lang, content) = unwrap_code_fence("```\n[1]\n```").unwrap();
        assert_eq!(lang, None);
        assert_eq!(content, "[1]");
    }

    #[test]
    fn fence_absent() {
        assert!(unwrap_code_fence("no code blocks here").is_none());
    }

    // ── find_bracketed ──

    #[test]
    fn bracketed_nested() {
        let input = r#"x {"outer": {"inner": [1]}} y"#;
        assert_eq!(find_bracketed(input, '{', '}'), Some(r#"{"outer": {"inner": [1]}}"#));
    }

    // ── flat_objects ──

    #[test]
    fn flat_objects_skips_wrappers_and_cut_tail() {
        let input = r#"{"entities":[{"text":"张三","type":"人物"},{"text":"北{京","type":"地点"}],"relations":[{"type":"位于","sub"#;
        let objects = flat_objects(input);
        assert_eq!(
            objects,
            vec![r#"{"text":"张三","type":"人物"}"#, r#"{"text":"北{京","type":"地点"}"#]
        );
    }
}

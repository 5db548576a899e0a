//! Error types for output parsers.

/// Why a response produced no records.
///
/// These never escape [`extract`](crate::output_parser::extract); they are
/// rendered into [`ParseDiagnostics::parse_error`](crate::ParseDiagnostics).
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// The response was empty, whitespace-only, or only a reasoning block.
    #[error("empty model response")]
    EmptyResponse,

    /// No strategy could extract the expected format.
    #[error("could not parse {expected_format} from model response: {text}")]
    Unparseable {
        /// The format the parser was trying to extract.
        expected_format: &'static str,
        /// A truncated copy of the cleaned text (max 200 chars).
        text: String,
    },
}

/// Truncate to at most `max_len` characters, appending "..." if truncated.
pub(crate) fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len).collect();
        format!("{}...", head)
    }
}

//! Parse diagnostics for model output.
//!
//! [`ParseDiagnostics`] records what happened while turning one response
//! into records: which strategy produced them, whether anything was
//! stripped, salvaged or dropped, and the parse error when nothing worked.

use serde::Serialize;

/// Records what happened during output parsing.
///
/// Returned alongside the records of every
/// [`Extraction`](crate::output_parser::Extraction). Parsing never fails
/// with an error; a response that yields nothing reports it here.
///
/// # Example
///
/// ```
/// use llm_extract::diagnostics::ParseDiagnostics;
///
/// let diag = ParseDiagnostics::default();
/// assert!(diag.ok()); // No parse_error means success
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParseDiagnostics {
    /// Which strategy produced the records.
    /// One of `"json"`, `"json_salvage"`, `"tsv"`, `"labels"`, `"paragraphs"`.
    pub strategy: Option<&'static str>,

    /// If parsing failed, the error message. `None` means success.
    pub parse_error: Option<String>,

    /// Reasoning blocks (`<think>` and friends) were removed.
    pub meta_stripped: bool,

    /// The payload was taken from inside a markdown code fence.
    pub fence_unwrapped: bool,

    /// The payload ended mid-structure; only complete leading records were kept.
    pub truncated: bool,

    /// Entries or rows discarded for missing required fields.
    pub dropped: usize,

    /// Records came from the paragraph fallback.
    pub fallback_used: bool,
}

impl ParseDiagnostics {
    /// Quick check: did parsing succeed?
    pub fn ok(&self) -> bool {
        self.parse_error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostics_default_is_ok() {
        let d = ParseDiagnostics::default();
        assert!(d.ok());
        assert!(d.strategy.is_none());
        assert_eq!(d.dropped, 0);
        assert!(!d.truncated);
        assert!(!d.fallback_used);
    }

    #[test]
    fn test_diagnostics_with_error_is_not_ok() {
        let d = ParseDiagnostics {
            parse_error: Some("bad json".to_string()),
            ..Default::default()
        };
        assert!(!d.ok());
    }
}

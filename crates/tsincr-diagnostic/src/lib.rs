//! # tsincr diagnostics
//!
//! Compiler diagnostics as produced by a language service, plus the pipeline
//! that turns them into structured, severity-classified errors for the host:
//! ignore-list and `reportFiles` filtering, 1-based positions, message-chain
//! flattening and formatting.

pub mod filter;
pub mod format;
pub mod line_index;
pub mod paths;
pub mod render;

use std::fmt;
use std::ops::Range;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use filter::{DiagnosticFilter, FilterError};
pub use format::{
    default_error_formatter, format_errors, ErrorFormatter, ErrorInfo, ErrorStyle, Location,
    Palette, StructuredError,
};
pub use line_index::{LineCol, LineIndex};

/// Platform line-break sequence used when flattening messages and output.
pub const EOL: &str = if cfg!(windows) { "\r\n" } else { "\n" };

/// Category reported by the language service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticCategory {
    Warning,
    Error,
    Suggestion,
    Message,
}

/// Severity handed to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Message,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Message => "message",
        }
    }
}

impl From<DiagnosticCategory> for Severity {
    fn from(category: DiagnosticCategory) -> Self {
        match category {
            DiagnosticCategory::Error => Severity::Error,
            DiagnosticCategory::Warning => Severity::Warning,
            DiagnosticCategory::Suggestion | DiagnosticCategory::Message => Severity::Message,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A possibly multi-part diagnostic message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageChain {
    pub text: String,
    pub next: Vec<MessageChain>,
}

impl MessageChain {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            next: Vec::new(),
        }
    }

    pub fn with_next(mut self, next: MessageChain) -> Self {
        self.next.push(next);
        self
    }

    /// Flatten into one string; nested parts go on their own line, indented
    /// two spaces per level.
    pub fn flatten(&self, new_line: &str) -> String {
        let mut out = String::new();
        self.flatten_into(&mut out, new_line, 0);
        out
    }

    fn flatten_into(&self, out: &mut String, new_line: &str, indent: usize) {
        if indent > 0 {
            out.push_str(new_line);
            for _ in 0..indent {
                out.push_str("  ");
            }
        }
        out.push_str(&self.text);
        for next in &self.next {
            next.flatten_into(out, new_line, indent + 1);
        }
    }
}

impl From<&str> for MessageChain {
    fn from(text: &str) -> Self {
        MessageChain::new(text)
    }
}

impl From<String> for MessageChain {
    fn from(text: String) -> Self {
        MessageChain::new(text)
    }
}

/// The file a diagnostic points into, with the text it was computed against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticFile {
    pub path: PathBuf,
    pub text: Arc<str>,
}

/// A compiler finding, optionally tied to a byte range of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub code: u32,
    pub category: DiagnosticCategory,
    pub message: MessageChain,
    pub file: Option<DiagnosticFile>,
    /// Byte offset into `file.text`; meaningless without a file.
    pub start: usize,
    pub length: usize,
}

impl Diagnostic {
    pub fn new(code: u32, category: DiagnosticCategory, message: impl Into<MessageChain>) -> Self {
        Self {
            code,
            category,
            message: message.into(),
            file: None,
            start: 0,
            length: 0,
        }
    }

    pub fn error(code: u32, message: impl Into<MessageChain>) -> Self {
        Self::new(code, DiagnosticCategory::Error, message)
    }

    pub fn warning(code: u32, message: impl Into<MessageChain>) -> Self {
        Self::new(code, DiagnosticCategory::Warning, message)
    }

    pub fn message(code: u32, message: impl Into<MessageChain>) -> Self {
        Self::new(code, DiagnosticCategory::Message, message)
    }

    /// Attach the diagnostic to `range` of a file.
    pub fn in_file(mut self, path: impl Into<PathBuf>, text: Arc<str>, range: Range<usize>) -> Self {
        self.start = range.start;
        self.length = range.end.saturating_sub(range.start);
        self.file = Some(DiagnosticFile {
            path: path.into(),
            text,
        });
        self
    }

    pub fn severity(&self) -> Severity {
        self.category.into()
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.start + self.length
    }

    /// Zero-based position of `start`, when the diagnostic has a file.
    pub fn position(&self) -> Option<LineCol> {
        self.file
            .as_ref()
            .map(|file| LineIndex::new(&file.text).line_col(&file.text, self.start))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_flatten_chain() {
        let chain = MessageChain::new("Type 'A' is not assignable to type 'B'.")
            .with_next(
                MessageChain::new("Property 'x' is missing.")
                    .with_next(MessageChain::new("Deeper detail.")),
            );

        assert_eq!(
            chain.flatten("\n"),
            "Type 'A' is not assignable to type 'B'.\n  Property 'x' is missing.\n    Deeper detail."
        );
    }

    #[test]
    fn test_severity_from_category() {
        assert_eq!(Severity::from(DiagnosticCategory::Error), Severity::Error);
        assert_eq!(Severity::from(DiagnosticCategory::Warning), Severity::Warning);
        assert_eq!(Severity::from(DiagnosticCategory::Suggestion), Severity::Message);
        assert_eq!(Severity::from(DiagnosticCategory::Message), Severity::Message);
    }

    #[test]
    fn test_position_is_zero_based() {
        let text: Arc<str> = Arc::from("let a = 1;\nlet b = ;");
        let diag = Diagnostic::error(1109, "Expression expected.").in_file("/p/a.ts", text, 19..20);

        let pos = diag.position().unwrap();
        assert_eq!((pos.line, pos.character), (1, 8));
        assert_eq!(diag.range(), 19..20);
    }
}

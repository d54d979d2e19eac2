//! Turning diagnostics into host-facing structured errors.

use std::fmt;
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

use ariadne::{Color, Fmt};
use serde::Serialize;

use crate::filter::DiagnosticFilter;
use crate::{Diagnostic, Severity, EOL};

/// Everything a formatter needs to know about one error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorInfo {
    pub code: u32,
    pub severity: Severity,
    pub content: String,
    /// Empty when the diagnostic has no file.
    pub file: String,
    /// 1-based; 0 without a file.
    pub line: usize,
    /// 1-based; 0 without a file.
    pub character: usize,
    pub context: String,
}

/// 1-based position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Location {
    pub line: usize,
    pub character: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StructuredError {
    pub info: ErrorInfo,
    /// Rendered text.
    pub message: String,
    pub file: Option<String>,
    pub location: Option<Location>,
    /// Byte range in the file, for rich rendering.
    #[serde(skip)]
    pub span: Option<Range<usize>>,
}

impl StructuredError {
    /// Error raised by the engine itself rather than by the compiler.
    pub fn engine(message: impl Into<String>, file: Option<String>, context: &Path) -> Self {
        let message = message.into();
        Self {
            info: ErrorInfo {
                code: 0,
                severity: Severity::Error,
                content: message.clone(),
                file: file.clone().unwrap_or_default(),
                line: 0,
                character: 0,
                context: context.display().to_string(),
            },
            message,
            file,
            location: None,
            span: None,
        }
    }

    pub fn severity(&self) -> Severity {
        self.info.severity
    }
}

impl fmt::Display for StructuredError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Optional terminal colouring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    enabled: bool,
}

impl Palette {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn paint(&self, text: &str, color: Color) -> String {
        text.fg(self.enabled.then_some(color)).to_string()
    }

    pub fn severity(&self, text: &str, severity: Severity) -> String {
        let color = match severity {
            Severity::Error => Color::Red,
            Severity::Warning => Color::Yellow,
            Severity::Message => Color::Blue,
        };
        self.paint(text, color)
    }
}

/// Caller-supplied formatter; replaces the default rendering.
pub type ErrorFormatter = Arc<dyn Fn(&ErrorInfo, &Palette) -> String + Send + Sync>;

#[derive(Clone)]
pub struct ErrorStyle {
    pub palette: Palette,
    pub formatter: Option<ErrorFormatter>,
}

impl ErrorStyle {
    pub fn new(colors: bool, formatter: Option<ErrorFormatter>) -> Self {
        Self {
            palette: Palette::new(colors),
            formatter,
        }
    }

    fn render(&self, info: &ErrorInfo) -> String {
        match &self.formatter {
            Some(formatter) => formatter(info, &self.palette),
            None => default_error_formatter(info, &self.palette),
        }
    }
}

impl fmt::Debug for ErrorStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorStyle")
            .field("palette", &self.palette)
            .field("formatter", &self.formatter.as_ref().map(|_| ".."))
            .finish()
    }
}

/// `[tsincr] ERROR in /proj/src/a.ts(3,7)` then `      TS2322: <message>`.
pub fn default_error_formatter(info: &ErrorInfo, palette: &Palette) -> String {
    let mut header = palette.paint("[tsincr] ", Color::Fixed(8));
    header.push_str(&palette.severity(&info.severity.as_str().to_uppercase(), info.severity));
    if !info.file.is_empty() {
        header.push_str(&palette.severity(" in ", info.severity));
        let position = format!("{}({},{})", info.file, info.line, info.character);
        header.push_str(&palette.paint(&position, Color::Cyan));
    }
    let body = format!("      TS{}: {}", info.code, info.content);
    format!("{header}{EOL}{}", palette.severity(&body, info.severity))
}

/// Filter, classify and render `diagnostics`.
pub fn format_errors(
    diagnostics: &[Diagnostic],
    filter: &DiagnosticFilter,
    style: &ErrorStyle,
    context: &Path,
) -> Vec<StructuredError> {
    diagnostics
        .iter()
        .filter(|diagnostic| filter.allows(diagnostic, context))
        .map(|diagnostic| format_one(diagnostic, style, context))
        .collect()
}

fn format_one(diagnostic: &Diagnostic, style: &ErrorStyle, context: &Path) -> StructuredError {
    let location = diagnostic.position().map(|pos| Location {
        line: pos.line + 1,
        character: pos.character + 1,
    });
    let file = diagnostic
        .file
        .as_ref()
        .map(|file| file.path.display().to_string());

    let info = ErrorInfo {
        code: diagnostic.code,
        severity: diagnostic.severity(),
        content: diagnostic.message.flatten(EOL),
        file: file.clone().unwrap_or_default(),
        line: location.map_or(0, |l| l.line),
        character: location.map_or(0, |l| l.character),
        context: context.display().to_string(),
    };

    StructuredError {
        message: style.render(&info),
        info,
        file,
        location,
        span: diagnostic.file.as_ref().map(|_| diagnostic.range()),
    }
}

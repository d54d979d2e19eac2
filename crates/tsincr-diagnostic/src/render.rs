//! Rich terminal rendering of structured errors with ariadne.

use ariadne::{Color, Config, IndexType, Label, Report, ReportKind, Source};

use crate::{Severity, StructuredError};

/// Render `error` as an ariadne report over `source`.
///
/// Errors without a file, span or source text fall back to their plain
/// formatted message.
pub fn render_report(error: &StructuredError, source: Option<&str>, colors: bool) -> String {
    let (Some(file), Some(span), Some(source)) = (&error.file, &error.span, source) else {
        return error.message.clone();
    };

    let (kind, color) = match error.severity() {
        Severity::Error => (ReportKind::Error, Color::Red),
        Severity::Warning => (ReportKind::Warning, Color::Yellow),
        Severity::Message => (ReportKind::Advice, Color::Blue),
    };
    let end = span.end.max(span.start + 1).min(source.len().max(span.start));
    let range = span.start.min(source.len())..end;
    let label_span = (file.as_str(), range.clone());

    let mut buf = Vec::new();
    let written = Report::build(kind, label_span.clone())
        .with_config(
            Config::default()
                .with_color(colors)
                .with_index_type(IndexType::Byte),
        )
        .with_code(format!("TS{}", error.info.code))
        .with_message(&error.info.content)
        .with_label(
            Label::new(label_span)
                .with_message(&error.info.content)
                .with_color(color),
        )
        .finish()
        .write((file.as_str(), Source::from(source)), &mut buf);

    match written {
        Ok(()) => String::from_utf8_lossy(&buf).into_owned(),
        Err(_) => error.message.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{format_errors, Diagnostic, DiagnosticFilter, ErrorStyle};
    use std::path::Path;
    use std::sync::Arc;

    #[test]
    fn renders_code_and_file() {
        let source = "let x = ;\n";
        let diag = Diagnostic::error(1109, "Expression expected.").in_file(
            "/proj/a.ts",
            Arc::from(source),
            8..9,
        );
        let errors = format_errors(
            &[diag],
            &DiagnosticFilter::default(),
            &ErrorStyle::new(false, None),
            Path::new("/proj"),
        );

        let rendered = render_report(&errors[0], Some(source), false);
        assert!(rendered.contains("TS1109"));
        assert!(rendered.contains("/proj/a.ts"));
        assert!(rendered.contains("Expression expected."));
    }

    #[test]
    fn falls_back_without_source() {
        let error = StructuredError::engine("boom", None, Path::new("/"));
        assert_eq!(render_report(&error, None, false), "boom");
    }
}

//! Diagnostic filtering by code and by reporting file.

use std::collections::HashSet;
use std::path::Path;

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use thiserror::Error;

use crate::paths::{relative_path, to_slash};
use crate::Diagnostic;

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("invalid reportFiles pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },
}

/// Decides which diagnostics reach the host.
///
/// `reportFiles` patterns are matched against the diagnostic's file path
/// relative to the build context. A leading `!` negates a pattern. With only
/// negated patterns every file not excluded is reported.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticFilter {
    ignore: HashSet<u32>,
    report_files: Option<ReportFiles>,
}

#[derive(Debug, Clone)]
struct ReportFiles {
    include: Option<GlobSet>,
    exclude: GlobSet,
}

impl DiagnosticFilter {
    pub fn new(
        ignore: impl IntoIterator<Item = u32>,
        report_files: &[String],
    ) -> Result<Self, FilterError> {
        let report_files = if report_files.is_empty() {
            None
        } else {
            Some(ReportFiles::build(report_files)?)
        };
        Ok(Self {
            ignore: ignore.into_iter().collect(),
            report_files,
        })
    }

    pub fn is_ignored(&self, code: u32) -> bool {
        self.ignore.contains(&code)
    }

    /// Whether `diagnostic` survives both the ignore list and `reportFiles`.
    pub fn allows(&self, diagnostic: &Diagnostic, context: &Path) -> bool {
        if self.is_ignored(diagnostic.code) {
            return false;
        }
        match (&self.report_files, &diagnostic.file) {
            (Some(report_files), Some(file)) => {
                let relative = to_slash(&relative_path(context, &file.path));
                report_files.matches(&relative)
            }
            _ => true,
        }
    }
}

impl ReportFiles {
    fn build(patterns: &[String]) -> Result<Self, FilterError> {
        let mut include = GlobSetBuilder::new();
        let mut exclude = GlobSetBuilder::new();
        let mut has_include = false;

        for pattern in patterns {
            let (builder, glob) = match pattern.strip_prefix('!') {
                Some(negated) => (&mut exclude, negated),
                None => {
                    has_include = true;
                    (&mut include, pattern.as_str())
                }
            };
            let glob = GlobBuilder::new(glob.trim_start_matches("./"))
                .literal_separator(true)
                .build()
                .map_err(|source| FilterError::Pattern {
                    pattern: pattern.clone(),
                    source,
                })?;
            builder.add(glob);
        }

        let finish = |builder: GlobSetBuilder, pattern: String| {
            builder
                .build()
                .map_err(|source| FilterError::Pattern { pattern, source })
        };
        let joined = patterns.join(", ");
        Ok(Self {
            include: if has_include {
                Some(finish(include, joined.clone())?)
            } else {
                None
            },
            exclude: finish(exclude, joined)?,
        })
    }

    fn matches(&self, relative: &str) -> bool {
        let included = self
            .include
            .as_ref()
            .map_or(true, |include| include.is_match(relative));
        included && !self.exclude.is_match(relative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn in_file(code: u32, path: &str) -> Diagnostic {
        Diagnostic::error(code, "msg").in_file(path, Arc::from("x"), 0..1)
    }

    #[test]
    fn ignore_list_drops_codes() {
        let filter = DiagnosticFilter::new([2307], &[]).unwrap();
        let ctx = Path::new("/proj");

        assert!(!filter.allows(&in_file(2307, "/proj/a.ts"), ctx));
        assert!(filter.allows(&in_file(2322, "/proj/a.ts"), ctx));
        assert!(!filter.allows(&Diagnostic::error(2307, "global"), ctx));
    }

    #[test]
    fn report_files_match_relative_paths() {
        let filter = DiagnosticFilter::new([], &["src/**/*.ts".to_string()]).unwrap();
        let ctx = Path::new("/proj");

        assert!(filter.allows(&in_file(1, "/proj/src/a.ts"), ctx));
        assert!(filter.allows(&in_file(1, "/proj/src/deep/b.ts"), ctx));
        assert!(!filter.allows(&in_file(1, "/proj/lib/c.ts"), ctx));
        // Diagnostics without a file are never dropped by reportFiles
        assert!(filter.allows(&Diagnostic::error(1, "global"), ctx));
    }

    #[test]
    fn star_does_not_cross_separators() {
        let filter = DiagnosticFilter::new([], &["src/*.ts".to_string()]).unwrap();
        let ctx = Path::new("/proj");

        assert!(filter.allows(&in_file(1, "/proj/src/a.ts"), ctx));
        assert!(!filter.allows(&in_file(1, "/proj/src/nested/a.ts"), ctx));
    }

    #[test]
    fn negated_patterns_exclude() {
        let filter = DiagnosticFilter::new(
            [],
            &["src/**/*.{ts,tsx}".to_string(), "!src/skip.ts".to_string()],
        )
        .unwrap();
        let ctx = Path::new("/proj");

        assert!(filter.allows(&in_file(1, "/proj/src/view.tsx"), ctx));
        assert!(!filter.allows(&in_file(1, "/proj/src/skip.ts"), ctx));

        let only_negated = DiagnosticFilter::new([], &["!**/*.d.ts".to_string()]).unwrap();
        assert!(only_negated.allows(&in_file(1, "/proj/a.ts"), ctx));
        assert!(!only_negated.allows(&in_file(1, "/proj/types/a.d.ts"), ctx));
    }

    #[test]
    fn invalid_pattern_is_reported() {
        let err = DiagnosticFilter::new([], &["src/[".to_string()]).unwrap_err();
        assert!(err.to_string().contains("src/["));
    }
}

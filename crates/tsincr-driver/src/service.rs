//! The seam between the engine and a compiler.
//!
//! A [`Compiler`] hands out one [`LanguageService`] per instance. The engine
//! owns every file text; services read them through a [`HostView`] passed on
//! each call and may cache per `(path, version)`.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tsincr_diagnostic::Diagnostic;

use crate::dep_graph::DepGraph;
use crate::file_store::{FileStore, TrackedFile};
use crate::options::CompilerOptions;

/// A standard-library declaration file bundled with a compiler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibFile {
    pub path: PathBuf,
    pub text: Arc<str>,
}

/// Read-only view of an instance's state, as seen by its language service.
#[derive(Clone, Copy)]
pub struct HostView<'a> {
    pub files: &'a FileStore,
    pub graph: &'a DepGraph,
    pub options: &'a CompilerOptions,
    pub current_dir: &'a Path,
    pub libs: &'a [LibFile],
}

impl<'a> HostView<'a> {
    pub fn script_file_names(&self) -> BTreeSet<PathBuf> {
        self.files.all_paths()
    }

    pub fn script_version(&self, path: &Path) -> Option<u64> {
        self.files.get(path).map(|file| file.version)
    }

    pub fn script_text(&self, path: &Path) -> Option<Arc<str>> {
        self.files.get(path).map(|file| file.text.clone())
    }

    pub fn file(&self, path: &Path) -> Option<&'a TrackedFile> {
        self.files.get(path)
    }

    pub fn transitive_dependencies(&self, path: &Path) -> BTreeSet<PathBuf> {
        self.graph.transitive_dependencies(path)
    }

    pub fn lib_files(&self) -> &'a [LibFile] {
        self.libs
    }
}

/// One file written by an emit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    pub name: PathBuf,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmitOutput {
    pub output_files: Vec<OutputFile>,
    pub emit_skipped: bool,
}

impl EmitOutput {
    /// First output whose file name ends with `suffix`.
    pub fn find(&self, suffix: &str) -> Option<&OutputFile> {
        self.output_files
            .iter()
            .find(|file| file.name.to_string_lossy().ends_with(suffix))
    }
}

/// Per-instance compiler session.
pub trait LanguageService: Send {
    fn compiler_options_diagnostics(&self, host: &HostView<'_>) -> Vec<Diagnostic>;

    fn syntactic_diagnostics(&self, host: &HostView<'_>, path: &Path) -> Vec<Diagnostic>;

    fn semantic_diagnostics(&self, host: &HostView<'_>, path: &Path) -> Vec<Diagnostic>;

    fn emit(&self, host: &HostView<'_>, path: &Path) -> EmitOutput;
}

/// A compiler the registry can create instances with.
pub trait Compiler: Send + Sync {
    fn name(&self) -> &str;

    fn version(&self) -> &str;

    /// Whether the compiler can build against referenced projects' output.
    fn supports_project_references(&self) -> bool {
        false
    }

    /// Standard-library declarations for `options`, empty with `noLib`.
    fn default_libs(&self, options: &CompilerOptions) -> Vec<LibFile>;

    fn create_language_service(&self, options: &CompilerOptions) -> Box<dyn LanguageService>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_view_reads_store() {
        let mut files = FileStore::new();
        files.upsert(Path::new("/p/a.ts"), "export const a = 1;");
        files.upsert(Path::new("/p/a.ts"), "export const a = 2;");
        let graph = DepGraph::new();
        let options = CompilerOptions::default();
        let libs = [LibFile {
            path: PathBuf::from("/lib/lib.d.ts"),
            text: Arc::from("declare var NaN: number;"),
        }];

        let host = HostView {
            files: &files,
            graph: &graph,
            options: &options,
            current_dir: Path::new("/p"),
            libs: &libs,
        };

        assert_eq!(host.script_version(Path::new("/p/a.ts")), Some(1));
        assert_eq!(host.script_text(Path::new("/p/./a.ts")).as_deref(), Some("export const a = 2;"));
        assert_eq!(host.script_file_names().len(), 1);
        assert_eq!(host.lib_files().len(), 1);
        assert!(host.file(Path::new("/p/b.ts")).is_none());
    }

    #[test]
    fn test_find_output() {
        let output = EmitOutput {
            output_files: vec![
                OutputFile {
                    name: PathBuf::from("/p/a.js.map"),
                    text: "{}".into(),
                },
                OutputFile {
                    name: PathBuf::from("/p/a.js"),
                    text: "var a;".into(),
                },
            ],
            emit_skipped: false,
        };

        assert_eq!(output.find(".js").map(|f| f.text.as_str()), Some("var a;"));
        assert_eq!(output.find(".map").map(|f| f.text.as_str()), Some("{}"));
    }
}

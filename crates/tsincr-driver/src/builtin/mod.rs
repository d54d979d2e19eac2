//! The compiler bundled with the engine.
//!
//! It works one file at a time on the token stream: diagnostics cover
//! scanner errors, bracket balance, block-scoped redeclarations against the
//! globals visible to the file, and syntax that has no erasable JavaScript
//! form. Emit erases types and keeps every line where it was, so the
//! source map is line-to-line.

mod check;
mod declarations;
mod emit;
mod syntax;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tracing::{trace, warn};
use tsincr_diagnostic::paths::{relative_path, to_slash};
use tsincr_diagnostic::Diagnostic;
use tsincr_lexer::{Lexer, Scanned};

use crate::file_store::is_declaration_file;
use crate::options::{CompilerOptions, ScriptTarget};
use crate::service::{Compiler, EmitOutput, HostView, LanguageService, LibFile, OutputFile};
use crate::source_map::SourceMap;
use declarations::{global_bindings, BindingKind};
use syntax::Tokens;

pub const COMPILER_NAME: &str = "tsincr";

/// Virtual directory of the bundled lib files.
pub const LIB_ROOT: &str = "/__tsincr__/lib";

const LIB_ES5: &str = include_str!("lib.es5.d.ts");
const LIB_ES2015: &str = include_str!("lib.es2015.d.ts");

#[derive(Debug, Default)]
pub struct BuiltinCompiler;

impl BuiltinCompiler {
    pub fn new() -> Self {
        Self
    }
}

impl Compiler for BuiltinCompiler {
    fn name(&self) -> &str {
        COMPILER_NAME
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn supports_project_references(&self) -> bool {
        true
    }

    fn default_libs(&self, options: &CompilerOptions) -> Vec<LibFile> {
        if options.no_lib {
            return Vec::new();
        }
        let lib = |name: &str, text: &str| LibFile {
            path: Path::new(LIB_ROOT).join(name),
            text: Arc::from(text),
        };
        let mut libs = vec![lib("lib.es5.d.ts", LIB_ES5)];
        if options.target >= ScriptTarget::Es2015 {
            libs.push(lib("lib.es2015.d.ts", LIB_ES2015));
        }
        libs
    }

    fn create_language_service(&self, options: &CompilerOptions) -> Box<dyn LanguageService> {
        Box::new(BuiltinService::new(options.clone()))
    }
}

/// A file's text with its tokens.
struct Scan {
    text: Arc<str>,
    scanned: Scanned,
}

impl Scan {
    fn new(text: Arc<str>) -> Self {
        let scanned = Lexer::scan(&text);
        Self { text, scanned }
    }

    fn tokens(&self) -> Tokens<'_> {
        Tokens::new(&self.text, &self.scanned.tokens)
    }
}

pub(crate) struct BuiltinService {
    options: CompilerOptions,
    /// Keyed by path, valid while the stored version matches.
    scans: Mutex<HashMap<PathBuf, (u64, Arc<Scan>)>>,
    lib_globals: OnceLock<HashMap<String, BindingKind>>,
}

impl BuiltinService {
    fn new(options: CompilerOptions) -> Self {
        Self {
            options,
            scans: Mutex::new(HashMap::new()),
            lib_globals: OnceLock::new(),
        }
    }

    fn scan(&self, host: &HostView<'_>, path: &Path) -> Option<Arc<Scan>> {
        let file = host.file(path)?;
        let mut scans = self.scans.lock();
        if let Some((version, scan)) = scans.get(&file.path) {
            if *version == file.version {
                return Some(scan.clone());
            }
        }
        trace!(file = %file.path.display(), version = file.version, "scanning");
        let scan = Arc::new(Scan::new(file.text.clone()));
        scans.insert(file.path.clone(), (file.version, scan.clone()));
        Some(scan)
    }

    /// Globals from the lib files and from every file `path` depends on.
    fn ambient_globals(&self, host: &HostView<'_>, path: &Path) -> HashMap<String, BindingKind> {
        let mut ambient = self
            .lib_globals
            .get_or_init(|| {
                let mut globals = HashMap::new();
                for lib in host.lib_files() {
                    let scan = Scan::new(lib.text.clone());
                    globals.extend(global_bindings(&scan.tokens()));
                }
                globals
            })
            .clone();

        for dependency in host.transitive_dependencies(path) {
            if dependency == path {
                continue;
            }
            if let Some(scan) = self.scan(host, &dependency) {
                for (name, kind) in global_bindings(&scan.tokens()) {
                    ambient.entry(name).or_insert(kind);
                }
            }
        }
        ambient
    }
}

impl LanguageService for BuiltinService {
    fn compiler_options_diagnostics(&self, _host: &HostView<'_>) -> Vec<Diagnostic> {
        check::options_diagnostics(&self.options)
    }

    fn syntactic_diagnostics(&self, host: &HostView<'_>, path: &Path) -> Vec<Diagnostic> {
        match self.scan(host, path) {
            Some(scan) => check::syntactic(path, &scan.text, &scan.tokens()),
            None => Vec::new(),
        }
    }

    fn semantic_diagnostics(&self, host: &HostView<'_>, path: &Path) -> Vec<Diagnostic> {
        let Some(scan) = self.scan(host, path) else {
            return Vec::new();
        };
        let ambient = self.ambient_globals(host, path);
        check::semantic(path, &scan.text, &scan.tokens(), is_declaration_file(path), &ambient)
    }

    fn emit(&self, host: &HostView<'_>, path: &Path) -> EmitOutput {
        let skipped = EmitOutput {
            output_files: Vec::new(),
            emit_skipped: true,
        };
        if is_declaration_file(path) {
            return skipped;
        }
        let Some(scan) = self.scan(host, path) else {
            return skipped;
        };

        let javascript = emit::emit_javascript(scan.tokens(), self.options.module, self.options.target);
        let js_path = self.options.output_path(path, host.current_dir);
        let mut output_files = Vec::new();

        let text = match self.source_map(path, &js_path, &javascript) {
            Some((map_path, json)) => {
                let map_name = map_path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default();
                output_files.push(OutputFile {
                    name: map_path,
                    text: json,
                });
                format!("{javascript}\n//# sourceMappingURL={map_name}")
            }
            None => javascript,
        };
        output_files.insert(
            0,
            OutputFile {
                name: js_path,
                text,
            },
        );
        EmitOutput {
            output_files,
            emit_skipped: false,
        }
    }
}

impl BuiltinService {
    /// `<js>.map` and its JSON, when source maps are enabled.
    fn source_map(&self, path: &Path, js_path: &Path, javascript: &str) -> Option<(PathBuf, String)> {
        if !self.options.source_map {
            return None;
        }
        let mut map_path = js_path.as_os_str().to_owned();
        map_path.push(".map");
        let map_path = PathBuf::from(map_path);

        let file = js_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let source = to_slash(&relative_path(js_path.parent().unwrap_or(Path::new("/")), path));
        let lines = javascript.split('\n').count();
        match SourceMap::line_preserving(&file, &source, lines).to_json() {
            Ok(json) => Some((map_path, json)),
            Err(err) => {
                warn!(file = %path.display(), "failed to serialize source map: {err}");
                None
            }
        }
    }
}

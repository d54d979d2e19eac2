//! Compilation instances and the registry that owns them.
//!
//! An instance is an isolated compiler session keyed by name. It owns its
//! file store, dependency graph, options and language service; two
//! instances never share mutable state. The host owns the [`Registry`] and
//! passes it to every build step.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};
use tsincr_diagnostic::paths::normalize_path;
use tsincr_diagnostic::{format_errors, Diagnostic, DiagnosticFilter, ErrorStyle, StructuredError};

use crate::builtin::BuiltinCompiler;
use crate::config::{load_config, locate_config, ConfigError};
use crate::dep_graph::DepGraph;
use crate::error::{EngineError, Result};
use crate::file_store::FileStore;
use crate::options::{CompilerOptions, CompilerOptionsPatch, LoaderOptions};
use crate::project_refs::{load_references, ProjectReference};
use crate::service::{Compiler, HostView, LanguageService, LibFile};

/// An instance shared between build steps. The mutex serializes steps on
/// one instance.
pub type SharedInstance = Arc<tokio::sync::Mutex<Instance>>;

/// Whether the instance builds a single project or a composite one.
#[derive(Debug, Clone)]
pub enum ProjectLayout {
    Single,
    /// Files owned by one of these projects are taken from its output.
    Composite(Vec<Arc<ProjectReference>>),
}

pub struct Instance {
    id: String,
    loader_options: LoaderOptions,
    compiler_options: CompilerOptions,
    config_path: Option<PathBuf>,
    pub(crate) files: FileStore,
    pub(crate) graph: DepGraph,
    service: Box<dyn LanguageService>,
    compiler: Arc<dyn Compiler>,
    layout: ProjectLayout,
    filter: DiagnosticFilter,
    style: ErrorStyle,
    libs: Vec<LibFile>,
    pub(crate) declaration_mtimes: HashMap<PathBuf, SystemTime>,
    projects_with_validated_maps: HashSet<PathBuf>,
    current_dir: PathBuf,
}

impl Instance {
    /// Build a new instance for a build step on `file` from `context`.
    fn create(
        options: &LoaderOptions,
        compiler: Arc<dyn Compiler>,
        file: &Path,
        context: &Path,
    ) -> Result<Instance> {
        let config_path = locate_config(file, context, &options.config_file_name);
        let config = config_path
            .as_deref()
            .map(load_config)
            .transpose()
            .map_err(|err| config_error(err, config_path.as_deref(), context))?;

        let (project_patch, base_dir) = match &config {
            Some(config) => (config.compiler_options.clone(), config.dir.clone()),
            None => (CompilerOptionsPatch::default(), context.to_path_buf()),
        };
        let compiler_options = CompilerOptions::resolve(&options.query_patch(), &project_patch, &base_dir)
            .map_err(|message| EngineError::Config {
                path: config_path.clone().unwrap_or_else(|| context.to_path_buf()),
                message,
            })?;

        let libs = if compiler_options.no_lib {
            Vec::new()
        } else {
            compiler.default_libs(&compiler_options)
        };
        let service = compiler.create_language_service(&compiler_options);

        let references = config.as_ref().map(|c| c.references.as_slice()).unwrap_or(&[]);
        let layout = if references.is_empty() {
            ProjectLayout::Single
        } else if compiler.supports_project_references() {
            let loaded = load_references(references)
                .map_err(|err| config_error(err, config_path.as_deref(), context))?;
            ProjectLayout::Composite(loaded)
        } else {
            warn!(
                compiler = compiler.name(),
                "compiler does not support project references; building referenced files from source"
            );
            ProjectLayout::Single
        };

        let filter = DiagnosticFilter::new(options.ignore_diagnostics.iter().copied(), &options.report_files)
            .map_err(|err| EngineError::Config {
                path: config_path.clone().unwrap_or_else(|| context.to_path_buf()),
                message: err.to_string(),
            })?;
        let style = ErrorStyle::new(options.colors, options.error_formatter.clone());

        if !options.silent {
            match &config_path {
                Some(path) => info!(
                    instance = %options.instance,
                    "Using {}@{} and {}",
                    compiler.name(),
                    compiler.version(),
                    path.display()
                ),
                None => info!(
                    instance = %options.instance,
                    "Using {}@{} without a config file",
                    compiler.name(),
                    compiler.version()
                ),
            }
        }

        Ok(Instance {
            id: options.instance.clone(),
            loader_options: options.clone(),
            compiler_options,
            config_path,
            files: FileStore::new(),
            graph: DepGraph::new(),
            service,
            compiler,
            layout,
            filter,
            style,
            libs,
            declaration_mtimes: HashMap::new(),
            projects_with_validated_maps: HashSet::new(),
            current_dir: context.to_path_buf(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn loader_options(&self) -> &LoaderOptions {
        &self.loader_options
    }

    pub fn compiler_options(&self) -> &CompilerOptions {
        &self.compiler_options
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    pub fn files(&self) -> &FileStore {
        &self.files
    }

    pub fn graph(&self) -> &DepGraph {
        &self.graph
    }

    pub fn compiler(&self) -> &Arc<dyn Compiler> {
        &self.compiler
    }

    pub fn layout(&self) -> &ProjectLayout {
        &self.layout
    }

    pub fn libs(&self) -> &[LibFile] {
        &self.libs
    }

    pub fn current_dir(&self) -> &Path {
        &self.current_dir
    }

    pub fn is_tracking(&self, path: &Path) -> bool {
        self.files.contains(path)
    }

    pub fn host_view(&self) -> HostView<'_> {
        HostView {
            files: &self.files,
            graph: &self.graph,
            options: &self.compiler_options,
            current_dir: &self.current_dir,
            libs: &self.libs,
        }
    }

    pub fn service(&self) -> &dyn LanguageService {
        self.service.as_ref()
    }

    /// Compiler-option, syntactic and semantic diagnostics of `path`. For a
    /// declaration file, also those of every file depending on it.
    pub fn collect_diagnostics(&self, path: &Path) -> Vec<Diagnostic> {
        let host = self.host_view();
        let mut diagnostics = self.service.compiler_options_diagnostics(&host);
        diagnostics.extend(self.service.syntactic_diagnostics(&host, path));
        diagnostics.extend(self.service.semantic_diagnostics(&host, path));

        let is_declaration = self.files.get(path).is_some_and(|file| file.is_declaration);
        if is_declaration {
            for dependent in self.graph.transitive_dependents(path) {
                if dependent == path {
                    continue;
                }
                diagnostics.extend(self.service.syntactic_diagnostics(&host, &dependent));
                diagnostics.extend(self.service.semantic_diagnostics(&host, &dependent));
            }
        }
        diagnostics
    }

    /// Filter and render diagnostics with this instance's settings.
    pub fn format_diagnostics(&self, diagnostics: &[Diagnostic], context: &Path) -> Vec<StructuredError> {
        format_errors(diagnostics, &self.filter, &self.style, context)
    }

    /// Record that the source maps of `project` were checked. Returns false
    /// when they already were.
    pub(crate) fn mark_map_validated(&mut self, project: &Path) -> bool {
        self.projects_with_validated_maps.insert(project.to_path_buf())
    }
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.id)
            .field("compiler", &self.compiler.name())
            .field("compiler_options", &self.compiler_options)
            .field("config_path", &self.config_path)
            .field("files", &self.files.len())
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}

fn config_error(err: ConfigError, config_path: Option<&Path>, context: &Path) -> EngineError {
    let path = err
        .path()
        .or(config_path)
        .unwrap_or(context)
        .to_path_buf();
    EngineError::Config {
        path,
        message: err.to_string(),
    }
}

struct RegistryEntry {
    options: LoaderOptions,
    instance: SharedInstance,
}

/// Host-owned map of instance id to instance, plus the compilers instances
/// can be created with.
pub struct Registry {
    compilers: RwLock<HashMap<String, Arc<dyn Compiler>>>,
    instances: Mutex<HashMap<String, RegistryEntry>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// A registry that knows the built-in compiler.
    pub fn new() -> Self {
        let registry = Self {
            compilers: RwLock::new(HashMap::new()),
            instances: Mutex::new(HashMap::new()),
        };
        registry.register_compiler(Arc::new(BuiltinCompiler::new()));
        registry
    }

    pub fn register_compiler(&self, compiler: Arc<dyn Compiler>) {
        self.compilers
            .write()
            .insert(compiler.name().to_string(), compiler);
    }

    fn compiler(&self, name: &str) -> Result<Arc<dyn Compiler>> {
        self.compilers
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::UnknownCompiler {
                name: name.to_string(),
            })
    }

    /// Return the instance named by `options`, creating it on first use.
    ///
    /// Asking for an existing instance with different settings is an error.
    /// A failed creation registers nothing.
    pub fn ensure_instance(&self, options: &LoaderOptions, file: &Path, context: &Path) -> Result<SharedInstance> {
        let mut instances = self.instances.lock();
        if let Some(entry) = instances.get(&options.instance) {
            if !entry.options.same_settings(options) {
                return Err(EngineError::ConflictingOptions {
                    instance: options.instance.clone(),
                });
            }
            return Ok(entry.instance.clone());
        }

        let compiler = self.compiler(&options.compiler)?;
        let file = normalize_path(file);
        let instance = Instance::create(options, compiler, &file, context)?;
        debug!(instance = %options.instance, "registered instance");

        let shared = Arc::new(tokio::sync::Mutex::new(instance));
        instances.insert(
            options.instance.clone(),
            RegistryEntry {
                options: options.clone(),
                instance: shared.clone(),
            },
        );
        Ok(shared)
    }

    pub fn get(&self, id: &str) -> Option<SharedInstance> {
        self.instances.lock().get(id).map(|entry| entry.instance.clone())
    }

    /// Every registered instance, ordered by id.
    pub fn instances(&self) -> Vec<SharedInstance> {
        let instances = self.instances.lock();
        let mut ids: Vec<&String> = instances.keys().collect();
        ids.sort();
        ids.into_iter()
            .filter_map(|id| instances.get(id))
            .map(|entry| entry.instance.clone())
            .collect()
    }

    pub fn instance_ids(&self) -> BTreeSet<String> {
        self.instances.lock().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{ModuleKind, ScriptTarget};
    use std::fs;

    fn quiet() -> LoaderOptions {
        LoaderOptions {
            silent: true,
            ..LoaderOptions::default()
        }
    }

    #[test]
    fn test_default_instance_without_config() {
        let temp = tempfile::tempdir().unwrap();
        let registry = Registry::new();

        let shared = registry
            .ensure_instance(&quiet(), &temp.path().join("a.ts"), temp.path())
            .unwrap();
        let instance = shared.try_lock().unwrap();

        assert_eq!(instance.id(), "default");
        assert_eq!(instance.compiler_options().target, ScriptTarget::Es5);
        assert_eq!(instance.compiler_options().module, ModuleKind::CommonJs);
        assert!(instance.config_path().is_none());
        assert!(!instance.libs().is_empty());
        assert!(instance.files().is_empty());
    }

    #[test]
    fn test_same_id_returns_same_instance() {
        let temp = tempfile::tempdir().unwrap();
        let registry = Registry::new();
        let file = temp.path().join("a.ts");

        let first = registry.ensure_instance(&quiet(), &file, temp.path()).unwrap();
        let second = registry.ensure_instance(&quiet(), &file, temp.path()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let other = registry
            .ensure_instance(&quiet().with_instance("other"), &file, temp.path())
            .unwrap();
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(registry.instance_ids().len(), 2);
    }

    #[test]
    fn test_conflicting_options() {
        let temp = tempfile::tempdir().unwrap();
        let registry = Registry::new();
        let file = temp.path().join("a.ts");
        registry.ensure_instance(&quiet(), &file, temp.path()).unwrap();

        let changed = LoaderOptions {
            target: Some("es2015".into()),
            ..quiet()
        };
        assert!(matches!(
            registry.ensure_instance(&changed, &file, temp.path()),
            Err(EngineError::ConflictingOptions { .. })
        ));
    }

    #[test]
    fn test_unknown_compiler() {
        let temp = tempfile::tempdir().unwrap();
        let registry = Registry::new();
        let options = LoaderOptions {
            compiler: "nope".into(),
            ..quiet()
        };

        assert!(matches!(
            registry.ensure_instance(&options, &temp.path().join("a.ts"), temp.path()),
            Err(EngineError::UnknownCompiler { .. })
        ));
        assert!(registry.get("default").is_none());
    }

    #[test]
    fn test_config_error_registers_nothing() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join("tsconfig.json"), "{ \"compilerOptions\": ").unwrap();
        let registry = Registry::new();

        let result = registry.ensure_instance(&quiet(), &temp.path().join("a.ts"), temp.path());
        assert!(matches!(result, Err(EngineError::Config { .. })));
        assert!(registry.instances().is_empty());
    }

    #[test]
    fn test_config_options_are_used() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(
            temp.path().join("tsconfig.json"),
            r#"{
                // comments are fine
                "compilerOptions": { "target": "es2015", "module": "esnext", "noLib": true, },
            }"#,
        )
        .unwrap();
        let registry = Registry::new();

        let shared = registry
            .ensure_instance(&quiet(), &temp.path().join("src/a.ts"), temp.path())
            .unwrap();
        let instance = shared.try_lock().unwrap();
        assert_eq!(instance.compiler_options().target, ScriptTarget::Es2015);
        assert_eq!(instance.compiler_options().module, ModuleKind::EsNext);
        assert!(instance.libs().is_empty());
        assert_eq!(
            instance.config_path(),
            Some(normalize_path(&temp.path().join("tsconfig.json")).as_path())
        );
    }
}

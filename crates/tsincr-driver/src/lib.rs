//! tsincr driver library
//!
//! The incremental compilation engine: instances and their registry, file
//! store, dependency loading and graph, diagnostics, project references,
//! declaration watching, and the bundled compiler. A host drives it one
//! build step at a time through [`compile`].

pub mod builtin;
pub mod config;
pub mod dep_graph;
pub mod deps;
pub mod error;
pub mod file_store;
pub mod instance;
pub mod loader;
pub mod npm_resolver;
pub mod options;
pub mod package_json;
pub mod preprocess;
pub mod project_refs;
pub mod resolver;
pub mod service;
pub mod source_map;
pub mod watch;

pub use builtin::{BuiltinCompiler, COMPILER_NAME};
pub use dep_graph::{DepGraph, DependencyEdge};
pub use deps::{ensure_dependencies, refresh_dependencies};
pub use error::{EngineError, ResolveError, Result};
pub use file_store::{FileStore, TrackedFile};
pub use instance::{Instance, ProjectLayout, Registry, SharedInstance};
pub use loader::{compile, CompileOutput, CompileRequest};
pub use options::{CompilerOptions, CompilerOptionsPatch, JsxEmit, LoaderOptions, ModuleKind, ScriptTarget};
pub use project_refs::{find_owning_project, output_path_for, validate_source_map_once, ProjectReference};
pub use resolver::{ModuleResolver, Resolve};
pub use service::{Compiler, EmitOutput, HostView, LanguageService, LibFile, OutputFile};
pub use source_map::SourceMap;
pub use watch::Invalidation;

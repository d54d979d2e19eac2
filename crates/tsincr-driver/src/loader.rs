//! One build step: compile a single file for the host.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::debug;
use tsincr_diagnostic::paths::{normalize_path, to_slash};
use tsincr_diagnostic::{StructuredError, EOL};

use crate::deps::{ensure_dependencies, record_declaration_mtime, refresh_dependencies};
use crate::error::{EngineError, Result};
use crate::file_store::is_declaration_file;
use crate::instance::{Instance, Registry};
use crate::options::LoaderOptions;
use crate::project_refs::{find_owning_project, output_path_for, validate_source_map_once, ProjectReference};
use crate::resolver::Resolve;
use crate::source_map::{strip_source_mapping_url, SourceMap};

/// A file handed to the engine by the host.
#[derive(Debug, Clone)]
pub struct CompileRequest {
    pub path: PathBuf,
    pub text: String,
    /// Directory the host resolves relative paths from.
    pub context: PathBuf,
    /// Name the host uses for the file; becomes the source map's source.
    pub request: Option<String>,
}

impl CompileRequest {
    pub fn new(path: impl Into<PathBuf>, text: impl Into<String>, context: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            text: text.into(),
            context: context.into(),
            request: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CompileOutput {
    pub output: String,
    pub source_map: Option<SourceMap>,
    pub errors: Vec<StructuredError>,
    pub warnings: Vec<String>,
    /// Files whose diagnostics may have changed with this one: the
    /// transitive dependents of a declaration file.
    pub affected: BTreeSet<PathBuf>,
}

/// Compile `request` in the instance named by `options`.
///
/// Compiler diagnostics end up in [`CompileOutput::errors`]; an `Err` means
/// the build step itself failed.
pub async fn compile(
    registry: &Registry,
    options: &LoaderOptions,
    resolver: &dyn Resolve,
    request: &CompileRequest,
) -> Result<CompileOutput> {
    let shared = registry.ensure_instance(options, &request.path, &request.context)?;
    let mut guard = shared.lock().await;
    let instance: &mut Instance = &mut guard;

    let path = if request.path.is_absolute() {
        normalize_path(&request.path)
    } else {
        normalize_path(&request.context.join(&request.path))
    };

    if let Some(reference) = find_owning_project(instance, &path).cloned() {
        return from_referenced_project(instance, &path, &reference, request).await;
    }

    // A first build step stores the file at version 0; later ones bump it.
    let previous = instance.files.get(&path).map(|file| file.text.clone());
    let version = match previous {
        Some(previous) => {
            if *previous != *request.text {
                refresh_dependencies(resolver, instance, &path, &request.text).await?;
            }
            let version = instance.files.upsert(&path, request.text.as_str());
            record_declaration_mtime(instance, &path).await;
            version
        }
        None => {
            ensure_dependencies(resolver, instance, &path, &request.text).await?;
            0
        }
    };
    debug!(file = %path.display(), version, "compiling");

    let host = instance.host_view();
    let emitted = instance.service().emit(&host, &path);
    let diagnostics = instance.collect_diagnostics(&path);
    let errors = instance.format_diagnostics(&diagnostics, &request.context);

    let is_declaration = is_declaration_file(&path);
    let affected = if is_declaration {
        let mut dependents = instance.graph.transitive_dependents(&path);
        dependents.remove(&path);
        dependents
    } else {
        BTreeSet::new()
    };

    let javascript = emitted.find(".js").or_else(|| emitted.find(".jsx"));
    let Some(javascript) = javascript else {
        if is_declaration {
            return Ok(CompileOutput {
                errors,
                affected,
                ..CompileOutput::default()
            });
        }
        return Err(EngineError::NoOutput { path });
    };
    let map = emitted.find(".js.map").or_else(|| emitted.find(".jsx.map"));

    let mut warnings = Vec::new();
    let source = request.request.clone().unwrap_or_else(|| to_slash(&path));
    let (output, source_map) = finish_output(
        &javascript.text,
        map.map(|file| file.text.as_str()),
        &source,
        &request.text,
        &mut warnings,
    );

    Ok(CompileOutput {
        output,
        source_map,
        errors,
        warnings,
        affected,
    })
}

/// Serve a file of a referenced project from that project's build output.
async fn from_referenced_project(
    instance: &mut Instance,
    path: &Path,
    reference: &ProjectReference,
    request: &CompileRequest,
) -> Result<CompileOutput> {
    let js_path = output_path_for(path, reference);
    debug!(
        file = %path.display(),
        output = %js_path.display(),
        project = %reference.config_path.display(),
        "using referenced project output"
    );
    let javascript = tokio::fs::read_to_string(&js_path)
        .await
        .map_err(|_| EngineError::ReferencedOutputMissing {
            input: path.to_path_buf(),
            output: js_path.clone(),
        })?;

    let mut warnings = Vec::new();
    warnings.extend(validate_source_map_once(instance, &js_path, reference));

    let mut map_path = js_path.clone().into_os_string();
    map_path.push(".map");
    let map_text = tokio::fs::read_to_string(PathBuf::from(map_path)).await.ok();

    let source = request.request.clone().unwrap_or_else(|| to_slash(path));
    let (output, source_map) = finish_output(&javascript, map_text.as_deref(), &source, &request.text, &mut warnings);
    Ok(CompileOutput {
        output,
        source_map,
        warnings,
        ..CompileOutput::default()
    })
}

/// Strip the map comment, point the map at the original text and use the
/// platform line ending.
fn finish_output(
    javascript: &str,
    map_text: Option<&str>,
    source: &str,
    original: &str,
    warnings: &mut Vec<String>,
) -> (String, Option<SourceMap>) {
    let output = strip_source_mapping_url(javascript).replace("\r\n", EOL);
    let source_map = map_text.and_then(|raw| match SourceMap::parse(raw) {
        Ok(map) => Some(map.with_source(source, original)),
        Err(err) => {
            warnings.push(format!("failed to parse source map for {source}: {err}"));
            None
        }
    });
    (output, source_map)
}

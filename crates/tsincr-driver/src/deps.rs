//! Loading the transitive references of a file into an instance.
//!
//! Resolution runs level by level: every reference of every file in the
//! current frontier is resolved concurrently, the new TypeScript targets are
//! read concurrently, and those become the next frontier. A file enters the
//! store before its references are followed, so cycles terminate.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::try_join_all;
use tracing::debug;
use tsincr_diagnostic::paths::normalize_path;

use crate::dep_graph::DependencyEdge;
use crate::error::{EngineError, Result};
use crate::file_store::is_declaration_file;
use crate::instance::Instance;
use crate::preprocess::{preprocess, Reference, ReferenceKind};
use crate::resolver::Resolve;

/// Load `file_path` and everything it references, transitively.
///
/// Returns `text` unchanged. A file the instance already tracks is not
/// looked at again. On failure every file this call inserted is removed.
pub async fn ensure_dependencies(
    resolver: &dyn Resolve,
    instance: &mut Instance,
    file_path: &Path,
    text: &str,
) -> Result<Arc<str>> {
    let path = normalize_path(file_path);
    let text: Arc<str> = Arc::from(text);
    if instance.files.contains(&path) {
        return Ok(text);
    }

    instance.files.insert_new(&path, text.clone());
    record_declaration_mtime(instance, &path).await;
    let mut inserted = vec![path.clone()];
    let result = load_closure(resolver, instance, vec![(path, text.clone())], &mut inserted).await;
    if let Err(err) = result {
        rollback(instance, &inserted);
        return Err(err);
    }
    Ok(text)
}

/// Re-read the references of a tracked file whose text changed.
///
/// Its forward edges are replaced, new targets are loaded like in
/// [`ensure_dependencies`]. Targets that are no longer referenced stay
/// tracked. On failure the previous edges are restored.
pub async fn refresh_dependencies(
    resolver: &dyn Resolve,
    instance: &mut Instance,
    file_path: &Path,
    text: &str,
) -> Result<()> {
    let path = normalize_path(file_path);
    let previous = instance.graph.dependencies(&path).to_vec();
    let mut inserted = Vec::new();

    let frontier = vec![(path.clone(), Arc::from(text))];
    if let Err(err) = load_closure(resolver, instance, frontier, &mut inserted).await {
        rollback(instance, &inserted);
        instance.graph.set_edges(&path, previous);
        return Err(err);
    }
    Ok(())
}

/// One reference to resolve, with everything the resolver call needs.
struct Job {
    from: PathBuf,
    context: PathBuf,
    specifier: String,
    reference: Reference,
}

async fn load_closure(
    resolver: &dyn Resolve,
    instance: &mut Instance,
    mut frontier: Vec<(PathBuf, Arc<str>)>,
    inserted: &mut Vec<PathBuf>,
) -> Result<()> {
    while !frontier.is_empty() {
        let jobs: Vec<Job> = frontier
            .iter()
            .flat_map(|(from, text)| jobs_for(from, text))
            .collect();

        let resolved = try_join_all(jobs.iter().map(|job| async move {
            resolver
                .resolve(&job.context, &job.specifier)
                .await
                .map(|target| normalize_path(&target))
                .map_err(|source| EngineError::Resolve {
                    specifier: job.reference.specifier.clone(),
                    from: job.from.clone(),
                    source,
                })
        }))
        .await?;

        let mut edges: Vec<(PathBuf, Vec<DependencyEdge>)> = frontier
            .iter()
            .map(|(from, _)| (from.clone(), Vec::new()))
            .collect();
        let mut to_read = BTreeSet::new();
        for (job, target) in jobs.into_iter().zip(resolved) {
            if !is_typescript_source(&target) {
                debug!(
                    specifier = %job.reference.specifier,
                    resolved = %target.display(),
                    "skipping non-TypeScript reference"
                );
                continue;
            }
            if !instance.files.contains(&target) {
                to_read.insert(target.clone());
            }
            if let Some((_, list)) = edges.iter_mut().find(|(from, _)| *from == job.from) {
                list.push(DependencyEdge {
                    original: job.reference.specifier,
                    resolved: target,
                    span: job.reference.span,
                    kind: job.reference.kind,
                });
            }
        }
        for (from, list) in edges {
            instance.graph.set_edges(&from, list);
        }

        let loaded = try_join_all(to_read.into_iter().map(|path| async move {
            let text = tokio::fs::read_to_string(&path)
                .await
                .map_err(|source| EngineError::Read {
                    path: path.clone(),
                    source,
                })?;
            let modified = if is_declaration_file(&path) {
                tokio::fs::metadata(&path)
                    .await
                    .and_then(|meta| meta.modified())
                    .ok()
            } else {
                None
            };
            Ok::<_, EngineError>((path, text, modified))
        }))
        .await?;

        frontier = Vec::with_capacity(loaded.len());
        for (path, text, modified) in loaded {
            let text: Arc<str> = Arc::from(text);
            if instance.files.insert_new(&path, text.clone()) {
                debug!(file = %path.display(), "loaded dependency");
                inserted.push(path.clone());
                if let Some(modified) = modified {
                    instance.declaration_mtimes.insert(path.clone(), modified);
                }
                frontier.push((path, text));
            }
        }
    }
    Ok(())
}

fn jobs_for(from: &Path, text: &str) -> Vec<Job> {
    let context = from.parent().map(Path::to_path_buf).unwrap_or_default();
    preprocess(text)
        .references
        .into_iter()
        .map(|reference| {
            let specifier = match reference.kind {
                ReferenceKind::Directive => root_reference_path(&reference.specifier, &context),
                ReferenceKind::Import => reference.specifier.clone(),
            };
            Job {
                from: from.to_path_buf(),
                context: context.clone(),
                specifier,
                reference,
            }
        })
        .collect()
}

/// Directive paths are relative to the referencing file's directory unless
/// absolute.
fn root_reference_path(path: &str, context: &Path) -> String {
    if Path::new(path).is_absolute() {
        path.to_string()
    } else {
        normalize_path(&context.join(path)).to_string_lossy().into_owned()
    }
}

/// `.ts` and `.tsx` files, declaration files included.
fn is_typescript_source(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("ts" | "tsx")
    )
}

/// Remember the on-disk modification time of a declaration file, so a
/// later mtime scan compares against the text that was loaded.
pub(crate) async fn record_declaration_mtime(instance: &mut Instance, path: &Path) {
    if !is_declaration_file(path) {
        return;
    }
    if let Ok(modified) = tokio::fs::metadata(path).await.and_then(|meta| meta.modified()) {
        instance.declaration_mtimes.insert(path.to_path_buf(), modified);
    }
}

fn rollback(instance: &mut Instance, inserted: &[PathBuf]) {
    for path in inserted {
        debug!(file = %path.display(), "rolling back");
        instance.files.remove(path);
        instance.graph.remove_file(path);
        instance.declaration_mtimes.remove(path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typescript_source_filter() {
        assert!(is_typescript_source(Path::new("/p/a.ts")));
        assert!(is_typescript_source(Path::new("/p/a.d.ts")));
        assert!(is_typescript_source(Path::new("/p/view.tsx")));
        assert!(!is_typescript_source(Path::new("/p/a.js")));
        assert!(!is_typescript_source(Path::new("/p/data.json")));
        assert!(!is_typescript_source(Path::new("node:fs")));
    }

    #[test]
    fn test_root_reference_path() {
        assert_eq!(
            root_reference_path("../types/globals.d.ts", Path::new("/proj/src")),
            "/proj/types/globals.d.ts"
        );
        assert_eq!(root_reference_path("/abs/x.d.ts", Path::new("/proj")), "/abs/x.d.ts");
    }

    #[test]
    fn test_jobs_keep_import_specifiers_verbatim() {
        let jobs = jobs_for(
            Path::new("/proj/src/a.ts"),
            "/// <reference path=\"./g.d.ts\" />\nimport { b } from './b';\n",
        );
        let specifiers: Vec<&str> = jobs.iter().map(|job| job.specifier.as_str()).collect();

        assert_eq!(specifiers, vec!["/proj/src/g.d.ts", "./b"]);
        assert!(jobs.iter().all(|job| job.context == Path::new("/proj/src")));
    }
}

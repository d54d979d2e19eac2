//! Declaration-file change notifications.
//!
//! Declaration files are read by the engine, not handed over by the host,
//! so their changes arrive as notifications (or are found by comparing
//! modification times). A notification re-reads the file's references,
//! bumps its version and returns the dependents the host should rebuild.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use tsincr_diagnostic::paths::normalize_path;

use crate::deps::{record_declaration_mtime, refresh_dependencies};
use crate::error::{EngineError, Result};
use crate::instance::{Instance, Registry};
use crate::resolver::Resolve;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invalidation {
    pub path: PathBuf,
    /// Version of the file after the reload.
    pub version: u64,
    pub dependents: BTreeSet<PathBuf>,
}

impl Instance {
    /// Reload `path` from disk and load whatever its new text references.
    /// `None` when the instance does not track it.
    pub async fn notify_declaration_changed(
        &mut self,
        resolver: &dyn Resolve,
        path: &Path,
    ) -> Result<Option<Invalidation>> {
        let path = normalize_path(path);
        if !self.is_tracking(&path) {
            return Ok(None);
        }

        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| EngineError::Read {
                path: path.clone(),
                source,
            })?;
        refresh_dependencies(resolver, self, &path, &text).await?;

        let version = self.files.upsert(&path, text);
        record_declaration_mtime(self, &path).await;
        let mut dependents = self.graph.transitive_dependents(&path);
        dependents.remove(&path);
        debug!(
            instance = self.id(),
            file = %path.display(),
            version,
            dependents = dependents.len(),
            "declaration changed"
        );

        Ok(Some(Invalidation {
            path,
            version,
            dependents,
        }))
    }

    /// Reload every tracked declaration file whose modification time moved.
    ///
    /// Files that cannot be stat'ed are skipped. A file seen for the first
    /// time only records its time.
    pub async fn refresh_modified_declarations(&mut self, resolver: &dyn Resolve) -> Result<Vec<Invalidation>> {
        let declarations: Vec<PathBuf> = self
            .files
            .declaration_files()
            .map(|file| file.path.clone())
            .collect();

        let mut invalidations = Vec::new();
        for path in declarations {
            let Ok(modified) = tokio::fs::metadata(&path).await.and_then(|meta| meta.modified()) else {
                continue;
            };
            match self.declaration_mtimes.get(&path) {
                Some(previous) if *previous == modified => {}
                Some(_) => invalidations.extend(self.notify_declaration_changed(resolver, &path).await?),
                None => {
                    self.declaration_mtimes.insert(path, modified);
                }
            }
        }
        Ok(invalidations)
    }
}

impl Registry {
    /// Tell every instance tracking `path` that it changed on disk.
    ///
    /// Returns one result per tracking instance id. A failure in one
    /// instance does not stop the others from being notified.
    pub async fn notify_declaration_changed(
        &self,
        resolver: &dyn Resolve,
        path: &Path,
    ) -> Vec<(String, Result<Invalidation>)> {
        let mut results = Vec::new();
        for shared in self.instances() {
            let mut instance = shared.lock().await;
            let id = instance.id().to_string();
            match instance.notify_declaration_changed(resolver, path).await {
                Ok(Some(invalidation)) => results.push((id, Ok(invalidation))),
                Ok(None) => {}
                Err(err) => {
                    warn!(instance = %id, file = %path.display(), "declaration reload failed: {err}");
                    results.push((id, Err(err)));
                }
            }
        }
        results
    }
}

//! NPM package resolution
//!
//! Resolves bare specifiers through `node_modules`, preferring type
//! declarations the way the TypeScript compiler does.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::ResolveError;
use crate::package_json::parse_package_json;
use crate::resolver::probe_file;

#[derive(Debug, Clone)]
pub struct NpmResolver {
    /// Resolution does not climb above this directory when set
    project_root: Option<PathBuf>,
}

impl NpmResolver {
    /// Create a new NPM resolver
    pub fn new(project_root: Option<PathBuf>) -> Self {
        Self { project_root }
    }

    /// Find the project root by searching for package.json
    pub fn find_project_root(start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .find(|dir| dir.join("package.json").is_file())
            .map(Path::to_path_buf)
    }

    /// Resolve a package specifier to its entry file
    ///
    /// Algorithm:
    /// 1. Split package name and subpath (`lodash/fp` -> `lodash` + `fp`)
    /// 2. From `context` upwards, look for `node_modules/<name>`
    /// 3. Then for `node_modules/@types/<name>` in the same directories
    /// 4. Stop at the project root or the filesystem root
    pub fn resolve(&self, specifier: &str, context: &Path) -> Result<PathBuf, ResolveError> {
        let (package_name, subpath) = Self::parse_package_specifier(specifier);
        let types_name = Self::types_package_name(package_name);

        for name in [Some(package_name.to_string()), types_name].into_iter().flatten() {
            for dir in self.search_dirs(context) {
                let package_dir = dir.join("node_modules").join(&name);
                if !package_dir.is_dir() {
                    continue;
                }
                if let Some(entry) = self.resolve_package_entry(&package_dir, subpath)? {
                    debug!(specifier, entry = %entry.display(), "resolved package");
                    return Ok(entry);
                }
            }
        }

        Err(ResolveError::NotFound {
            specifier: specifier.to_string(),
            context: context.to_path_buf(),
        })
    }

    fn search_dirs<'a>(&'a self, context: &'a Path) -> impl Iterator<Item = &'a Path> {
        let mut reached_root = false;
        context.ancestors().take_while(move |dir| {
            if reached_root {
                return false;
            }
            reached_root = self.project_root.as_deref() == Some(*dir);
            true
        })
    }

    /// Parse a package specifier into package name and subpath
    ///
    /// Examples:
    /// - "lodash" → ("lodash", None)
    /// - "lodash/fp" → ("lodash", Some("fp"))
    /// - "@types/node" → ("@types/node", None)
    /// - "@types/node/fs" → ("@types/node", Some("fs"))
    fn parse_package_specifier(specifier: &str) -> (&str, Option<&str>) {
        let split_at = if specifier.starts_with('@') {
            // Scoped packages split at the second slash
            specifier
                .match_indices('/')
                .nth(1)
                .map(|(index, _)| index)
        } else {
            specifier.find('/')
        };

        match split_at {
            Some(pos) => (&specifier[..pos], Some(&specifier[pos + 1..])),
            None => (specifier, None),
        }
    }

    /// `@types` package holding the declarations of `package_name`
    ///
    /// `@scope/pkg` maps to `@types/scope__pkg`.
    fn types_package_name(package_name: &str) -> Option<String> {
        if package_name.starts_with("@types/") {
            return None;
        }
        let mangled = match package_name.strip_prefix('@') {
            Some(scoped) => scoped.replacen('/', "__", 1),
            None => package_name.to_string(),
        };
        Some(format!("@types/{mangled}"))
    }

    /// Resolve the entry file for a package
    fn resolve_package_entry(
        &self,
        package_dir: &Path,
        subpath: Option<&str>,
    ) -> Result<Option<PathBuf>, ResolveError> {
        if let Some(sub) = subpath {
            return Ok(probe_file(&package_dir.join(sub)));
        }

        let package_json_path = package_dir.join("package.json");
        if package_json_path.is_file() {
            let pkg = parse_package_json(&package_json_path)?;

            // Priority: types > exports > main
            let exports = pkg.root_export().unwrap_or_default();
            let candidates = [
                pkg.types_entry(),
                exports.types.as_deref(),
                exports.default.as_deref(),
                pkg.main.as_deref(),
            ];
            for field in candidates.into_iter().flatten() {
                if let Some(resolved) = probe_file(&package_dir.join(field)) {
                    return Ok(Some(resolved));
                }
            }
        }

        // Fallback: index files
        Ok(probe_file(&package_dir.join("index")))
    }
}

//! Project config (tsconfig) discovery and loading.

use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use tsincr_diagnostic::paths::normalize_path;
use walkdir::WalkDir;

use crate::options::CompilerOptionsPatch;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },
    #[error("failed to resolve extends '{extends}' from {}", .from.display())]
    ExtendsNotFound { extends: String, from: PathBuf },
    #[error("cycle detected while resolving extends: {}", .path.display())]
    ExtendsCycle { path: PathBuf },
    #[error("referenced project {} does not exist", .path.display())]
    ReferenceNotFound { path: PathBuf },
    #[error("invalid glob pattern '{pattern}': {source}")]
    Glob {
        pattern: String,
        #[source]
        source: globset::Error,
    },
}

impl ConfigError {
    /// The config file the error is about
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigError::Read { path, .. }
            | ConfigError::Parse { path, .. }
            | ConfigError::ExtendsCycle { path }
            | ConfigError::ReferenceNotFound { path } => Some(path),
            ConfigError::ExtendsNotFound { from, .. } => Some(from),
            ConfigError::Glob { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTsConfig {
    #[serde(default)]
    extends: Option<String>,
    #[serde(default)]
    compiler_options: CompilerOptionsPatch,
    #[serde(default)]
    files: Option<Vec<String>>,
    #[serde(default)]
    include: Option<Vec<String>>,
    #[serde(default)]
    exclude: Option<Vec<String>>,
    #[serde(default)]
    references: Option<Vec<RawReference>>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawReference {
    path: String,
}

/// A loaded tsconfig with its `extends` chain applied.
#[derive(Debug, Clone)]
pub struct ProjectConfig {
    pub path: PathBuf,
    pub dir: PathBuf,
    pub compiler_options: CompilerOptionsPatch,
    pub files: Option<Vec<String>>,
    pub include: Option<Vec<String>>,
    pub exclude: Option<Vec<String>>,
    /// Config files of referenced projects
    pub references: Vec<PathBuf>,
}

/// Walk up from `start_dir` looking for a file called `name`; first match wins.
pub fn find_config_file(start_dir: &Path, name: &str) -> Option<PathBuf> {
    start_dir
        .ancestors()
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

/// Locate the config for `file`.
///
/// A bare file name is searched for upwards from the file's directory. A
/// name with a directory component is taken relative to `context`.
pub fn locate_config(file: &Path, context: &Path, name: &str) -> Option<PathBuf> {
    let as_path = Path::new(name);
    if as_path.is_absolute() || as_path.components().count() > 1 {
        let path = normalize_path(&context.join(as_path));
        return path.is_file().then_some(path);
    }
    find_config_file(file.parent()?, name)
}

/// Load the config at `path`, following `extends`.
pub fn load_config(path: &Path) -> Result<ProjectConfig, ConfigError> {
    let path = normalize_path(path);
    let dir = parent_dir(&path);
    let mut visited = HashSet::new();
    let raw = load_raw_config(&path, &mut visited)?;

    let mut references = Vec::new();
    for reference in raw.references.iter().flatten() {
        let target = normalize_path(&dir.join(&reference.path));
        let config = if target.is_dir() {
            target.join("tsconfig.json")
        } else {
            target
        };
        if !config.is_file() {
            return Err(ConfigError::ReferenceNotFound { path: config });
        }
        references.push(config);
    }

    debug!(config = %path.display(), references = references.len(), "loaded project config");
    Ok(ProjectConfig {
        path,
        dir,
        compiler_options: raw.compiler_options,
        files: raw.files,
        include: raw.include,
        exclude: raw.exclude,
        references,
    })
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent().map(Path::to_path_buf).unwrap_or_default()
}

fn load_raw_config(path: &Path, visited: &mut HashSet<PathBuf>) -> Result<RawTsConfig, ConfigError> {
    if !visited.insert(path.to_path_buf()) {
        return Err(ConfigError::ExtendsCycle {
            path: path.to_path_buf(),
        });
    }

    let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut current: RawTsConfig = json5::from_str(&text).map_err(|err| ConfigError::Parse {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;

    let config_dir = parent_dir(path);
    // outDir is relative to the config that declares it
    if let Some(out_dir) = current.compiler_options.out_dir.as_mut() {
        if Path::new(out_dir.as_str()).is_relative() {
            *out_dir = normalize_path(&config_dir.join(&*out_dir))
                .to_string_lossy()
                .into_owned();
        }
    }

    let Some(extends) = current.extends.take() else {
        return Ok(current);
    };
    let extends_path = resolve_extends_path(&config_dir, &extends)?;
    let base = load_raw_config(&extends_path, visited)?;
    Ok(merge_raw_configs(base, current))
}

fn resolve_extends_path(config_dir: &Path, extends: &str) -> Result<PathBuf, ConfigError> {
    let found = if extends.starts_with('.') || Path::new(extends).is_absolute() {
        resolve_extends_file(&config_dir.join(extends))
    } else {
        config_dir
            .ancestors()
            .find_map(|ancestor| resolve_extends_file(&ancestor.join("node_modules").join(extends)))
    };
    found.ok_or_else(|| ConfigError::ExtendsNotFound {
        extends: extends.to_string(),
        from: config_dir.to_path_buf(),
    })
}

fn resolve_extends_file(candidate: &Path) -> Option<PathBuf> {
    let candidate = normalize_path(candidate);
    let mut attempts = vec![candidate.clone()];
    if candidate.extension().and_then(|ext| ext.to_str()) != Some("json") {
        let mut with_json = candidate.clone().into_os_string();
        with_json.push(".json");
        attempts.push(PathBuf::from(with_json));
    }
    attempts.push(candidate.join("tsconfig.json"));
    attempts.into_iter().find(|attempt| attempt.is_file())
}

fn merge_raw_configs(base: RawTsConfig, overlay: RawTsConfig) -> RawTsConfig {
    RawTsConfig {
        extends: None,
        compiler_options: overlay.compiler_options.or(base.compiler_options),
        files: overlay.files.or(base.files),
        include: overlay.include.or(base.include),
        exclude: overlay.exclude.or(base.exclude),
        // references are never inherited
        references: overlay.references,
    }
}

impl ProjectConfig {
    /// Source files of the project: `files` plus everything matched by
    /// `include` and not by `exclude`.
    pub fn source_files(&self) -> Result<BTreeSet<PathBuf>, ConfigError> {
        let mut result: BTreeSet<PathBuf> = self
            .files
            .iter()
            .flatten()
            .map(|file| normalize_path(&self.dir.join(file)))
            .collect();

        if self.files.is_some() && self.include.is_none() {
            return Ok(result);
        }

        let include = self
            .include
            .clone()
            .unwrap_or_else(|| vec!["**/*".to_string()]);
        let exclude = match self.exclude.clone() {
            Some(patterns) => patterns,
            None => {
                let mut defaults = vec![
                    "node_modules".to_string(),
                    "bower_components".to_string(),
                    "jspm_packages".to_string(),
                ];
                if let Some(out_dir) = self.compiler_options.out_dir.as_deref() {
                    if let Ok(relative) = Path::new(out_dir).strip_prefix(&self.dir) {
                        defaults.push(relative.to_string_lossy().into_owned());
                    }
                }
                defaults
            }
        };

        let include_set = build_globset(&include)?;
        let exclude_set = build_globset(&exclude)?;

        for entry in WalkDir::new(&self.dir)
            .follow_links(false)
            .into_iter()
            .filter_map(|entry| entry.ok())
        {
            if !entry.file_type().is_file() || !is_supported_source_file(entry.path()) {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(&self.dir) else {
                continue;
            };
            if include_set.is_match(rel) && !exclude_set.is_match(rel) {
                result.insert(normalize_path(entry.path()));
            }
        }

        Ok(result)
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, ConfigError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let expanded = expand_directory_pattern(pattern.trim().trim_start_matches("./"));
        if expanded.is_empty() {
            continue;
        }
        let glob = Glob::new(&expanded).map_err(|source| ConfigError::Glob {
            pattern: pattern.clone(),
            source,
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|source| ConfigError::Glob {
        pattern: patterns.join(", "),
        source,
    })
}

/// `src` means everything below `src`
fn expand_directory_pattern(pattern: &str) -> String {
    if pattern.is_empty() || pattern.contains(['*', '?', '[', ']']) {
        return pattern.to_string();
    }
    let trimmed = pattern.trim_end_matches('/');
    if trimmed.is_empty() {
        return "**/*".to_string();
    }
    if Path::new(trimmed).extension().is_some() {
        trimmed.to_string()
    } else {
        format!("{trimmed}/**/*")
    }
}

fn is_supported_source_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("ts" | "tsx" | "mts" | "cts")
    )
}

//! Project references: which referenced project owns a file, and where that
//! project wrote the file's output.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};
use tsincr_diagnostic::paths::normalize_path;

use crate::config::{load_config, ConfigError};
use crate::instance::{Instance, ProjectLayout};
use crate::options::{CompilerOptions, CompilerOptionsPatch};

/// A project the instance's config points at through `references`.
#[derive(Debug, Clone)]
pub struct ProjectReference {
    pub config_path: PathBuf,
    /// Directory of `config_path`.
    pub dir: PathBuf,
    pub options: CompilerOptions,
    pub files: BTreeSet<PathBuf>,
}

impl ProjectReference {
    pub fn load(config_path: &Path) -> Result<Self, ConfigError> {
        let config = load_config(config_path)?;
        let options =
            CompilerOptions::resolve(&CompilerOptionsPatch::default(), &config.compiler_options, &config.dir)
                .map_err(|message| ConfigError::Parse {
                    path: config.path.clone(),
                    message,
                })?;
        let files = config.source_files()?;
        debug!(
            config = %config.path.display(),
            files = files.len(),
            "loaded referenced project"
        );

        Ok(Self {
            config_path: config.path,
            dir: config.dir,
            options,
            files,
        })
    }

    pub fn owns(&self, file: &Path) -> bool {
        self.files.contains(&normalize_path(file))
    }
}

/// Load every referenced project, in declaration order.
pub fn load_references(configs: &[PathBuf]) -> Result<Vec<Arc<ProjectReference>>, ConfigError> {
    configs
        .iter()
        .map(|config| ProjectReference::load(config).map(Arc::new))
        .collect()
}

/// The referenced project that owns `file`, if the instance builds against
/// referenced projects at all.
pub fn find_owning_project<'a>(instance: &'a Instance, file: &Path) -> Option<&'a Arc<ProjectReference>> {
    match instance.layout() {
        ProjectLayout::Single => None,
        ProjectLayout::Composite(references) => {
            references.iter().find(|reference| reference.owns(file))
        }
    }
}

/// Where `reference` emitted the JavaScript for `input`.
pub fn output_path_for(input: &Path, reference: &ProjectReference) -> PathBuf {
    reference.options.output_path(input, &reference.dir)
}

/// Warning text when `<js_path>.map` is missing, checked once per
/// referenced project per instance.
pub fn validate_source_map_once(
    instance: &mut Instance,
    js_path: &Path,
    reference: &ProjectReference,
) -> Option<String> {
    if !instance.mark_map_validated(&reference.config_path) {
        return None;
    }

    let mut map_path = js_path.as_os_str().to_owned();
    map_path.push(".map");
    if Path::new(&map_path).is_file() {
        return None;
    }

    let message = format!(
        "Could not find source map file for referenced project output {}. Ensure the 'sourceMap' compiler option is enabled in {} to ensure tsincr can map project references to the appropriate source files.",
        js_path.display(),
        reference.config_path.display()
    );
    warn!("{message}");
    Some(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::JsxEmit;
    use pretty_assertions::assert_eq;

    fn reference(dir: &str, out_dir: Option<&str>, jsx: Option<JsxEmit>) -> ProjectReference {
        ProjectReference {
            config_path: Path::new(dir).join("tsconfig.json"),
            dir: PathBuf::from(dir),
            options: CompilerOptions {
                out_dir: out_dir.map(PathBuf::from),
                jsx,
                ..CompilerOptions::default()
            },
            files: BTreeSet::new(),
        }
    }

    #[test]
    fn test_output_under_out_dir() {
        let reference = reference("/proj", Some("/proj/dist"), None);
        assert_eq!(
            output_path_for(Path::new("/proj/src/a.ts"), &reference),
            PathBuf::from("/proj/dist/src/a.js")
        );
    }

    #[test]
    fn test_output_without_out_dir() {
        let reference = reference("/proj", None, None);
        assert_eq!(
            output_path_for(Path::new("/proj/src/a.ts"), &reference),
            PathBuf::from("/proj/src/a.js")
        );
    }

    #[test]
    fn test_output_extensions() {
        let plain = reference("/proj", Some("/proj/out"), Some(JsxEmit::React));
        let preserve = reference("/proj", Some("/proj/out"), Some(JsxEmit::Preserve));

        assert_eq!(
            output_path_for(Path::new("/proj/data.json"), &plain),
            PathBuf::from("/proj/out/data.json")
        );
        assert_eq!(
            output_path_for(Path::new("/proj/view.tsx"), &plain),
            PathBuf::from("/proj/out/view.js")
        );
        assert_eq!(
            output_path_for(Path::new("/proj/view.tsx"), &preserve),
            PathBuf::from("/proj/out/view.jsx")
        );
    }

    #[test]
    fn test_load_reference_files() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::write(
            root.join("tsconfig.json"),
            r#"{ "compilerOptions": { "composite": true, "outDir": "dist" }, "include": ["src"] }"#,
        )
        .unwrap();
        std::fs::write(root.join("src/a.ts"), "export const a = 1;").unwrap();

        let loaded = ProjectReference::load(&root.join("tsconfig.json")).unwrap();
        assert!(loaded.owns(&root.join("src/a.ts")));
        assert!(loaded.options.declaration);
        assert_eq!(
            output_path_for(&root.join("src/a.ts"), &loaded),
            normalize_path(&root.join("dist/src/a.js"))
        );
    }
}

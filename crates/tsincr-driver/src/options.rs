//! Loader and compiler options.
//!
//! Compiler options are merged once, when an instance is created, with a
//! fixed precedence: loader query, then the project config, then defaults.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tsincr_diagnostic::paths::{normalize_path, relative_path};
use tsincr_diagnostic::ErrorFormatter;

/// ECMAScript language level of the emitted code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum ScriptTarget {
    Es3,
    #[default]
    Es5,
    Es2015,
    Es2016,
    Es2017,
    Es2018,
    Es2019,
    Es2020,
    Es2021,
    Es2022,
    EsNext,
}

impl ScriptTarget {
    pub fn parse(raw: &str) -> Option<Self> {
        let target = match raw.trim().to_ascii_lowercase().as_str() {
            "es3" => ScriptTarget::Es3,
            "es5" => ScriptTarget::Es5,
            "es6" | "es2015" => ScriptTarget::Es2015,
            "es2016" => ScriptTarget::Es2016,
            "es2017" => ScriptTarget::Es2017,
            "es2018" => ScriptTarget::Es2018,
            "es2019" => ScriptTarget::Es2019,
            "es2020" => ScriptTarget::Es2020,
            "es2021" => ScriptTarget::Es2021,
            "es2022" => ScriptTarget::Es2022,
            "esnext" => ScriptTarget::EsNext,
            _ => return None,
        };
        Some(target)
    }
}

/// Module system of the emitted code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ModuleKind {
    None,
    #[default]
    CommonJs,
    Amd,
    Umd,
    System,
    Es2015,
    EsNext,
}

impl ModuleKind {
    pub fn parse(raw: &str) -> Option<Self> {
        let kind = match raw.trim().to_ascii_lowercase().as_str() {
            "none" => ModuleKind::None,
            "commonjs" => ModuleKind::CommonJs,
            "amd" => ModuleKind::Amd,
            "umd" => ModuleKind::Umd,
            "system" => ModuleKind::System,
            "es6" | "es2015" => ModuleKind::Es2015,
            "es2020" | "es2022" | "esnext" => ModuleKind::EsNext,
            _ => return None,
        };
        Some(kind)
    }

    pub fn is_es_module(self) -> bool {
        matches!(self, ModuleKind::Es2015 | ModuleKind::EsNext)
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModuleKind::None => "None",
            ModuleKind::CommonJs => "CommonJS",
            ModuleKind::Amd => "AMD",
            ModuleKind::Umd => "UMD",
            ModuleKind::System => "System",
            ModuleKind::Es2015 => "ES2015",
            ModuleKind::EsNext => "ESNext",
        };
        f.write_str(name)
    }
}

/// How JSX is emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JsxEmit {
    Preserve,
    React,
    ReactNative,
    ReactJsx,
    ReactJsxDev,
}

impl JsxEmit {
    pub fn parse(raw: &str) -> Option<Self> {
        let jsx = match raw.trim().to_ascii_lowercase().as_str() {
            "preserve" => JsxEmit::Preserve,
            "react" => JsxEmit::React,
            "react-native" => JsxEmit::ReactNative,
            "react-jsx" => JsxEmit::ReactJsx,
            "react-jsxdev" => JsxEmit::ReactJsxDev,
            _ => return None,
        };
        Some(jsx)
    }
}

/// Partially specified compiler options, as written in a tsconfig or passed
/// by the host. Later layers only fill what earlier layers left unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilerOptionsPatch {
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub module: Option<String>,
    #[serde(default)]
    pub source_map: Option<bool>,
    #[serde(default)]
    pub out_dir: Option<String>,
    #[serde(default)]
    pub no_lib: Option<bool>,
    #[serde(default)]
    pub jsx: Option<String>,
    #[serde(default)]
    pub declaration: Option<bool>,
    #[serde(default)]
    pub composite: Option<bool>,
}

impl CompilerOptionsPatch {
    /// `self` wins; `base` fills the gaps.
    pub fn or(self, base: CompilerOptionsPatch) -> CompilerOptionsPatch {
        CompilerOptionsPatch {
            target: self.target.or(base.target),
            module: self.module.or(base.module),
            source_map: self.source_map.or(base.source_map),
            out_dir: self.out_dir.or(base.out_dir),
            no_lib: self.no_lib.or(base.no_lib),
            jsx: self.jsx.or(base.jsx),
            declaration: self.declaration.or(base.declaration),
            composite: self.composite.or(base.composite),
        }
    }
}

/// Fully resolved options of one compilation instance.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompilerOptions {
    pub target: ScriptTarget,
    pub module: ModuleKind,
    pub source_map: bool,
    pub out_dir: Option<PathBuf>,
    pub no_lib: bool,
    pub jsx: Option<JsxEmit>,
    pub declaration: bool,
    pub composite: bool,
}

impl CompilerOptions {
    /// Merge `query` over `project` over the defaults. Relative `outDir`
    /// values are taken relative to `base_dir`.
    pub fn resolve(
        query: &CompilerOptionsPatch,
        project: &CompilerOptionsPatch,
        base_dir: &Path,
    ) -> Result<CompilerOptions, String> {
        let merged = query.clone().or(project.clone());
        let mut options = CompilerOptions::default();

        if let Some(raw) = merged.target.as_deref() {
            options.target = ScriptTarget::parse(raw)
                .ok_or_else(|| format!("unknown compilerOptions.target '{raw}'"))?;
        }
        if let Some(raw) = merged.module.as_deref() {
            options.module = ModuleKind::parse(raw)
                .ok_or_else(|| format!("unknown compilerOptions.module '{raw}'"))?;
        }
        if let Some(raw) = merged.jsx.as_deref() {
            options.jsx = Some(
                JsxEmit::parse(raw).ok_or_else(|| format!("unknown compilerOptions.jsx '{raw}'"))?,
            );
        }
        options.source_map = merged.source_map.unwrap_or(false);
        options.no_lib = merged.no_lib.unwrap_or(false);
        options.composite = merged.composite.unwrap_or(false);
        // composite projects always emit declarations
        options.declaration = merged.declaration.unwrap_or(options.composite);
        options.out_dir = merged.out_dir.map(|dir| {
            let dir = Path::new(&dir);
            if dir.is_absolute() {
                dir.to_path_buf()
            } else {
                base_dir.join(dir)
            }
        });

        Ok(options)
    }

    /// Where the JavaScript for `input` is written.
    ///
    /// The input's path relative to `project_dir` is re-rooted under
    /// `outDir` (`project_dir` when unset). `.json` stays `.json`, `.tsx`
    /// becomes `.jsx` with JSX `preserve`, anything else `.js`.
    pub fn output_path(&self, input: &Path, project_dir: &Path) -> PathBuf {
        let input = normalize_path(input);
        let relative = relative_path(project_dir, &input);
        let root = self.out_dir.as_deref().unwrap_or(project_dir);
        let output = normalize_path(&root.join(relative));

        let name = output.to_string_lossy();
        if name.ends_with(".json") {
            return output;
        }
        let extension = if name.ends_with(".tsx") && self.jsx == Some(JsxEmit::Preserve) {
            "jsx"
        } else {
            "js"
        };
        output.with_extension(extension)
    }
}

fn default_instance() -> String {
    "default".to_string()
}

fn default_compiler() -> String {
    crate::builtin::COMPILER_NAME.to_string()
}

fn default_config_file_name() -> String {
    "tsconfig.json".to_string()
}

fn default_colors() -> bool {
    true
}

/// Options the host passes on every build step.
///
/// `target`, `module` and `sourceMap` are shorthands for the matching
/// `compilerOptions` entries and take precedence over them.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoaderOptions {
    #[serde(default = "default_instance")]
    pub instance: String,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub module: Option<String>,
    #[serde(default)]
    pub source_map: Option<bool>,
    #[serde(default)]
    pub silent: bool,
    #[serde(default = "default_compiler")]
    pub compiler: String,
    /// A bare file name is searched for upwards from the compiled file; a
    /// path is taken relative to the build context.
    #[serde(default = "default_config_file_name")]
    pub config_file_name: String,
    #[serde(default)]
    pub compiler_options: CompilerOptionsPatch,
    #[serde(default)]
    pub ignore_diagnostics: Vec<u32>,
    #[serde(default)]
    pub report_files: Vec<String>,
    #[serde(default = "default_colors")]
    pub colors: bool,
    #[serde(skip)]
    pub error_formatter: Option<ErrorFormatter>,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            instance: default_instance(),
            target: None,
            module: None,
            source_map: None,
            silent: false,
            compiler: default_compiler(),
            config_file_name: default_config_file_name(),
            compiler_options: CompilerOptionsPatch::default(),
            ignore_diagnostics: Vec::new(),
            report_files: Vec::new(),
            colors: default_colors(),
            error_formatter: None,
        }
    }
}

impl LoaderOptions {
    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = instance.into();
        self
    }

    /// The query layer of the compiler options.
    pub fn query_patch(&self) -> CompilerOptionsPatch {
        CompilerOptionsPatch {
            target: self.target.clone(),
            module: self.module.clone(),
            source_map: self.source_map,
            ..CompilerOptionsPatch::default()
        }
        .or(self.compiler_options.clone())
    }

    /// Whether two option sets configure an instance identically. The error
    /// formatter is a closure and is not compared.
    pub fn same_settings(&self, other: &LoaderOptions) -> bool {
        let LoaderOptions {
            instance,
            target,
            module,
            source_map,
            silent,
            compiler,
            config_file_name,
            compiler_options,
            ignore_diagnostics,
            report_files,
            colors,
            error_formatter: _,
        } = self;
        *instance == other.instance
            && *target == other.target
            && *module == other.module
            && *source_map == other.source_map
            && *silent == other.silent
            && *compiler == other.compiler
            && *config_file_name == other.config_file_name
            && *compiler_options == other.compiler_options
            && *ignore_diagnostics == other.ignore_diagnostics
            && *report_files == other.report_files
            && *colors == other.colors
    }
}

impl fmt::Debug for LoaderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderOptions")
            .field("instance", &self.instance)
            .field("target", &self.target)
            .field("module", &self.module)
            .field("source_map", &self.source_map)
            .field("silent", &self.silent)
            .field("compiler", &self.compiler)
            .field("config_file_name", &self.config_file_name)
            .field("compiler_options", &self.compiler_options)
            .field("ignore_diagnostics", &self.ignore_diagnostics)
            .field("report_files", &self.report_files)
            .field("colors", &self.colors)
            .field("error_formatter", &self.error_formatter.as_ref().map(|_| ".."))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use tsincr_diagnostic::{ErrorInfo, Palette};

    #[test]
    fn test_defaults() {
        let options = CompilerOptions::resolve(
            &CompilerOptionsPatch::default(),
            &CompilerOptionsPatch::default(),
            Path::new("/proj"),
        )
        .unwrap();

        assert_eq!(options.target, ScriptTarget::Es5);
        assert_eq!(options.module, ModuleKind::CommonJs);
        assert!(!options.source_map);
        assert_eq!(options.out_dir, None);
    }

    #[test]
    fn test_query_beats_project() {
        let loader = LoaderOptions {
            target: Some("es2015".into()),
            compiler_options: CompilerOptionsPatch {
                target: Some("es3".into()),
                module: Some("esnext".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        let project = CompilerOptionsPatch {
            module: Some("amd".into()),
            source_map: Some(true),
            out_dir: Some("dist".into()),
            ..Default::default()
        };

        let options =
            CompilerOptions::resolve(&loader.query_patch(), &project, Path::new("/proj")).unwrap();
        assert_eq!(options.target, ScriptTarget::Es2015);
        assert_eq!(options.module, ModuleKind::EsNext);
        assert!(options.source_map);
        assert_eq!(options.out_dir, Some(PathBuf::from("/proj/dist")));
    }

    #[test]
    fn test_unknown_values_are_errors() {
        let patch = CompilerOptionsPatch {
            target: Some("es1999".into()),
            ..Default::default()
        };
        let err = CompilerOptions::resolve(&patch, &CompilerOptionsPatch::default(), Path::new("/"))
            .unwrap_err();
        assert!(err.contains("es1999"));
    }

    #[test]
    fn test_loader_options_deserialize() {
        let options: LoaderOptions = serde_json::from_str(
            r#"{ "instance": "client", "ignoreDiagnostics": [2307], "reportFiles": ["src/**/*.ts"], "compilerOptions": { "outDir": "out" } }"#,
        )
        .unwrap();

        assert_eq!(options.instance, "client");
        assert_eq!(options.compiler, "tsincr");
        assert_eq!(options.config_file_name, "tsconfig.json");
        assert_eq!(options.ignore_diagnostics, vec![2307]);
        assert_eq!(options.compiler_options.out_dir.as_deref(), Some("out"));
        assert!(options.colors);
    }

    #[test]
    fn test_same_settings_ignores_formatter() {
        let a = LoaderOptions::default();
        let mut b = LoaderOptions::default();
        b.error_formatter = Some(Arc::new(|_: &ErrorInfo, _: &Palette| String::new()));
        assert!(a.same_settings(&b));

        b.silent = true;
        assert!(!a.same_settings(&b));
    }
}

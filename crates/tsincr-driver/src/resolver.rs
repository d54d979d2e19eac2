//! Module resolution for import specifiers and reference directives

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;
use tsincr_diagnostic::paths::normalize_path;

use crate::error::ResolveError;
use crate::npm_resolver::NpmResolver;

/// The resolve capability handed to the engine by the host.
///
/// `context` is the directory of the referencing file. The returned path
/// need not be a TypeScript source; non-TypeScript targets are dropped by
/// the caller.
#[async_trait]
pub trait Resolve: Send + Sync {
    async fn resolve(&self, context: &Path, specifier: &str) -> Result<PathBuf, ResolveError>;
}

/// Prefix of the sentinel path returned for Node built-in modules
pub const BUILTIN_PREFIX: &str = "node:";

/// Extensions tried, in order, when a specifier names no existing file
const EXTENSIONS: &[&str] = &["ts", "tsx", "d.ts", "js", "jsx", "json"];

/// File-system resolver following the TypeScript module resolution rules
#[derive(Debug, Clone)]
pub struct ModuleResolver {
    npm_resolver: NpmResolver,
}

impl ModuleResolver {
    /// Create a resolver whose package lookups stop at the project root
    /// containing `base_dir`, if there is one
    pub fn new(base_dir: &Path) -> Self {
        Self {
            npm_resolver: NpmResolver::new(NpmResolver::find_project_root(base_dir)),
        }
    }

    /// Resolve without a project root bound
    pub fn unbounded() -> Self {
        Self {
            npm_resolver: NpmResolver::new(None),
        }
    }

    /// Resolve an import specifier relative to `context`
    pub fn resolve_sync(&self, context: &Path, specifier: &str) -> Result<PathBuf, ResolveError> {
        if let Some(name) = Self::builtin_name(specifier) {
            return Ok(PathBuf::from(format!("{BUILTIN_PREFIX}{name}")));
        }

        let not_found = || ResolveError::NotFound {
            specifier: specifier.to_string(),
            context: context.to_path_buf(),
        };

        // Relative (./foo, ../bar) and absolute (/foo/bar) specifiers
        if specifier.starts_with("./")
            || specifier.starts_with("../")
            || specifier == "."
            || specifier == ".."
            || Path::new(specifier).is_absolute()
        {
            let target = context.join(specifier);
            let resolved = probe_file(&target)
                .or_else(|| probe_js_to_ts(&target))
                .ok_or_else(not_found)?;
            debug!(specifier, resolved = %resolved.display(), "resolved file");
            return Ok(resolved);
        }

        // Otherwise, it's a package import
        self.npm_resolver.resolve(specifier, context)
    }

    /// Node built-in modules, with or without the `node:` scheme
    fn builtin_name(specifier: &str) -> Option<&str> {
        if let Some(name) = specifier.strip_prefix(BUILTIN_PREFIX) {
            return Some(name);
        }
        let root = specifier.split('/').next().unwrap_or(specifier);
        let builtin = matches!(
            root,
            "fs" | "path" | "http" | "https" | "os" | "process" | "events"
                | "url" | "crypto" | "util" | "stream" | "buffer"
                | "child_process" | "net" | "tls" | "dns" | "querystring"
                | "assert" | "zlib" | "readline" | "worker_threads"
        );
        builtin.then_some(specifier)
    }
}

#[async_trait]
impl Resolve for ModuleResolver {
    /// Probing stats files, so it runs on the blocking pool and concurrent
    /// resolutions do not queue up on the runtime thread.
    async fn resolve(&self, context: &Path, specifier: &str) -> Result<PathBuf, ResolveError> {
        let resolver = self.clone();
        let owned_context = context.to_path_buf();
        let owned_specifier = specifier.to_string();
        tokio::task::spawn_blocking(move || resolver.resolve_sync(&owned_context, &owned_specifier))
            .await
            .map_err(|err| ResolveError::Io {
                path: context.to_path_buf(),
                source: std::io::Error::other(err),
            })?
    }
}

fn with_suffix(target: &Path, ext: &str) -> PathBuf {
    let mut name = OsString::from(target.as_os_str());
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

/// Try `target` with each extension, as-is, then as a directory with an
/// index file. Returns a normalized path.
pub(crate) fn probe_file(target: &Path) -> Option<PathBuf> {
    let target = normalize_path(target);

    let candidates = EXTENSIONS
        .iter()
        .map(|ext| with_suffix(&target, ext))
        .chain(std::iter::once(target.clone()))
        .chain(EXTENSIONS.iter().map(|ext| with_suffix(&target.join("index"), ext)));

    for candidate in candidates {
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

/// `./foo.js` written for an emitted file that is `./foo.ts` in source
fn probe_js_to_ts(target: &Path) -> Option<PathBuf> {
    let name = target.file_name()?.to_str()?;
    let stem = name
        .strip_suffix(".js")
        .or_else(|| name.strip_suffix(".jsx"))?;
    let base = target.with_file_name(stem);
    ["ts", "tsx", "d.ts"]
        .iter()
        .map(|ext| with_suffix(&normalize_path(&base), ext))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_builtin_detection() {
        assert_eq!(ModuleResolver::builtin_name("fs"), Some("fs"));
        assert_eq!(ModuleResolver::builtin_name("node:path"), Some("path"));
        assert_eq!(ModuleResolver::builtin_name("fs/promises"), Some("fs/promises"));
        assert_eq!(ModuleResolver::builtin_name("./local"), None);
        assert_eq!(ModuleResolver::builtin_name("my-package"), None);
    }

    #[test]
    fn test_builtin_sentinel() {
        let resolver = ModuleResolver::unbounded();
        assert_eq!(
            resolver.resolve_sync(Path::new("/proj"), "fs").unwrap(),
            PathBuf::from("node:fs")
        );
    }

    #[test]
    fn test_package_not_found() {
        let temp = tempfile::tempdir().unwrap();
        let resolver = ModuleResolver::new(temp.path());

        match resolver.resolve_sync(temp.path(), "my-package") {
            Err(ResolveError::NotFound { specifier, .. }) => assert_eq!(specifier, "my-package"),
            other => panic!("Expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_relative_resolution() {
        let temp = tempfile::tempdir().unwrap();
        let dir = temp.path();
        fs::write(dir.join("test.ts"), "export const x = 1;").unwrap();
        fs::write(dir.join("types.d.ts"), "export {};").unwrap();
        fs::create_dir_all(dir.join("lib")).unwrap();
        fs::write(dir.join("lib/index.tsx"), "export {};").unwrap();
        fs::write(dir.join("foo.service.ts"), "").unwrap();

        let resolver = ModuleResolver::new(dir);
        let resolve = |s: &str| resolver.resolve_sync(dir, s).unwrap();

        assert_eq!(resolve("./test"), dir.join("test.ts"));
        assert_eq!(resolve("./types"), dir.join("types.d.ts"));
        assert_eq!(resolve("./lib"), dir.join("lib/index.tsx"));
        assert_eq!(resolve("./foo.service"), dir.join("foo.service.ts"));
        assert_eq!(resolve("./test.js"), dir.join("test.ts"));
        assert_eq!(resolve("./sub/../test"), dir.join("test.ts"));
    }

    #[test]
    fn test_ts_wins_over_js() {
        let temp = tempfile::tempdir().unwrap();
        let dir = temp.path();
        fs::write(dir.join("both.js"), "").unwrap();
        fs::write(dir.join("both.ts"), "").unwrap();
        fs::write(dir.join("plain.js"), "").unwrap();

        let resolver = ModuleResolver::unbounded();
        assert_eq!(resolver.resolve_sync(dir, "./both").unwrap(), dir.join("both.ts"));
        assert_eq!(resolver.resolve_sync(dir, "./plain").unwrap(), dir.join("plain.js"));
    }

    #[tokio::test]
    async fn test_concurrent_resolutions() {
        let temp = tempfile::tempdir().unwrap();
        let dir = temp.path();
        for name in ["a", "b", "c"] {
            fs::write(dir.join(format!("{name}.ts")), "").unwrap();
        }

        let resolver = ModuleResolver::new(dir);
        let found = futures::future::try_join_all(
            ["./a", "./b", "./c", "path"].map(|specifier| resolver.resolve(dir, specifier)),
        )
        .await
        .unwrap();

        assert_eq!(
            found,
            vec![dir.join("a.ts"), dir.join("b.ts"), dir.join("c.ts"), PathBuf::from("node:path")]
        );
        assert!(matches!(
            resolver.resolve(dir, "./missing").await,
            Err(ResolveError::NotFound { .. })
        ));
    }
}

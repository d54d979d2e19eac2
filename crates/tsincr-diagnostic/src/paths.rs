//! Path helpers shared by the engine and the diagnostic formatter.
//!
//! Paths are normalized lexically: `.` segments are dropped and `..` pops a
//! segment without escaping the root. Nothing here touches the file system,
//! so symlinks are not resolved.
use std::path::{Component, Path, PathBuf};

/// Collapse `.` and `..` segments of `path`.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    let mut depth = 0usize;
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => {
                out.push(component.as_os_str());
                depth = 0;
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if depth > 0 {
                    out.pop();
                    depth -= 1;
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            Component::Normal(part) => {
                out.push(part);
                depth += 1;
            }
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// `target` expressed relative to `base`, like Node's `path.relative`.
///
/// Falls back to `target` when the two paths do not share a root.
pub fn relative_path(base: &Path, target: &Path) -> PathBuf {
    let base = normalize_path(base);
    let target = normalize_path(target);
    if base.has_root() != target.has_root() {
        return target;
    }

    let base_parts: Vec<Component<'_>> = base.components().collect();
    let target_parts: Vec<Component<'_>> = target.components().collect();
    if let (Some(Component::Prefix(a)), Some(Component::Prefix(b))) =
        (base_parts.first(), target_parts.first())
    {
        if a != b {
            return target;
        }
    }

    let common = base_parts
        .iter()
        .zip(&target_parts)
        .take_while(|(a, b)| a == b)
        .count();

    let mut out = PathBuf::new();
    for part in &base_parts[common..] {
        if !matches!(part, Component::CurDir) {
            out.push("..");
        }
    }
    for part in &target_parts[common..] {
        out.push(part.as_os_str());
    }
    out
}

/// Forward-slashed rendering, used for glob matching and display.
pub fn to_slash(path: &Path) -> String {
    let text = path.to_string_lossy();
    if cfg!(windows) {
        text.replace('\\', "/")
    } else {
        text.into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_dot_segments() {
        assert_eq!(
            normalize_path(Path::new("/proj/src/./lib/../a.ts")),
            PathBuf::from("/proj/src/a.ts")
        );
        assert_eq!(normalize_path(Path::new("/..")), PathBuf::from("/"));
        assert_eq!(normalize_path(Path::new("../x/./y")), PathBuf::from("../x/y"));
        assert_eq!(normalize_path(Path::new("./")), PathBuf::from("."));
    }

    #[test]
    fn relative_between_siblings() {
        assert_eq!(
            relative_path(Path::new("/proj"), Path::new("/proj/src/a.ts")),
            PathBuf::from("src/a.ts")
        );
        assert_eq!(
            relative_path(Path::new("/proj/app"), Path::new("/proj/lib/b.ts")),
            PathBuf::from("../lib/b.ts")
        );
        assert_eq!(relative_path(Path::new("/proj"), Path::new("/proj")), PathBuf::new());
    }

    #[test]
    fn relative_falls_back_without_shared_root() {
        assert_eq!(
            relative_path(Path::new("/proj"), Path::new("src/a.ts")),
            PathBuf::from("src/a.ts")
        );
    }
}

//! Versioned in-memory file texts.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tsincr_diagnostic::paths::normalize_path;

/// A file known to an instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedFile {
    pub path: PathBuf,
    pub text: Arc<str>,
    /// Bumped on every upsert; `(path, version)` keys the service's caches.
    pub version: u64,
    pub is_declaration: bool,
}

/// `.d.ts`, `.d.mts` and `.d.cts` files.
pub fn is_declaration_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|name| name.to_str()).unwrap_or("");
    name.ends_with(".d.ts") || name.ends_with(".d.mts") || name.ends_with(".d.cts")
}

/// Mapping from normalized path to the latest text and version of a file.
#[derive(Debug, Default)]
pub struct FileStore {
    files: HashMap<PathBuf, TrackedFile>,
}

impl FileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &Path) -> Option<&TrackedFile> {
        self.files.get(&normalize_path(path))
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.files.contains_key(&normalize_path(path))
    }

    /// Store `text` for `path` and return the new version: 0 for a new file,
    /// previous + 1 otherwise, even when the text did not change.
    pub fn upsert(&mut self, path: &Path, text: impl Into<Arc<str>>) -> u64 {
        let path = normalize_path(path);
        let text = text.into();
        match self.files.get_mut(&path) {
            Some(file) => {
                file.version += 1;
                file.text = text;
                file.version
            }
            None => {
                self.insert_file(path, text);
                0
            }
        }
    }

    /// Insert `path` at version 0 unless it is already tracked. Returns
    /// whether it was inserted.
    pub(crate) fn insert_new(&mut self, path: &Path, text: impl Into<Arc<str>>) -> bool {
        let path = normalize_path(path);
        if self.files.contains_key(&path) {
            return false;
        }
        self.insert_file(path, text.into());
        true
    }

    pub(crate) fn remove(&mut self, path: &Path) -> Option<TrackedFile> {
        self.files.remove(&normalize_path(path))
    }

    fn insert_file(&mut self, path: PathBuf, text: Arc<str>) {
        let file = TrackedFile {
            is_declaration: is_declaration_file(&path),
            path: path.clone(),
            text,
            version: 0,
        };
        self.files.insert(path, file);
    }

    pub fn all_paths(&self) -> BTreeSet<PathBuf> {
        self.files.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrackedFile> {
        self.files.values()
    }

    pub fn declaration_files(&self) -> impl Iterator<Item = &TrackedFile> {
        self.files.values().filter(|file| file.is_declaration)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_versions() {
        let mut store = FileStore::new();
        let path = Path::new("/proj/a.ts");

        assert_eq!(store.upsert(path, "let a = 1;"), 0);
        assert_eq!(store.upsert(path, "let a = 1;"), 1);
        assert_eq!(store.upsert(path, "let a = 2;"), 2);

        let file = store.get(path).unwrap();
        assert_eq!(file.version, 2);
        assert_eq!(&*file.text, "let a = 2;");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_paths_are_normalized() {
        let mut store = FileStore::new();
        store.upsert(Path::new("/proj/src/../a.ts"), "");

        assert!(store.contains(Path::new("/proj/./a.ts")));
        assert_eq!(
            store.all_paths().into_iter().collect::<Vec<_>>(),
            vec![PathBuf::from("/proj/a.ts")]
        );
    }

    #[test]
    fn test_insert_new_keeps_existing() {
        let mut store = FileStore::new();
        store.upsert(Path::new("/a.ts"), "one");
        store.upsert(Path::new("/a.ts"), "two");

        assert!(!store.insert_new(Path::new("/a.ts"), "three"));
        assert_eq!(store.get(Path::new("/a.ts")).unwrap().version, 1);
        assert!(store.insert_new(Path::new("/b.ts"), "b"));
        assert!(store.remove(Path::new("/b.ts")).is_some());
        assert!(!store.contains(Path::new("/b.ts")));
    }

    #[test]
    fn test_declaration_detection() {
        let mut store = FileStore::new();
        store.upsert(Path::new("/types/globals.d.ts"), "declare const x: number;");
        store.upsert(Path::new("/types/mod.d.mts"), "");
        store.upsert(Path::new("/src/index.ts"), "");

        assert_eq!(store.declaration_files().count(), 2);
        assert!(!store.get(Path::new("/src/index.ts")).unwrap().is_declaration);
    }
}

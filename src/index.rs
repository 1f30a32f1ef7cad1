//! Catalog of every file below a search root.

use crate::error::{Result, TemplateError};
use log::{debug, warn};
use std::collections::HashSet;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// A file known to the index: its absolute path and the components of its
/// path relative to the index root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    path: PathBuf,
    components: Vec<String>,
}

impl FileEntry {
    /// Build an entry for `path`, which must live under `root` for its
    /// components to be meaningful. Paths outside the root keep their full
    /// component list.
    pub fn new(root: &Path, path: PathBuf) -> Self {
        let relative = path.strip_prefix(root).unwrap_or(&path);
        let components = split_components(relative);
        Self { path, components }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[allow(dead_code)]
    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// True when the trailing components of this entry equal `spec`.
    pub fn ends_with(&self, spec: &PathSpec) -> bool {
        if spec.is_absolute() {
            return self.path == Path::new(spec.as_str());
        }
        let n = spec.components().len();
        n <= self.components.len() && self.components[self.components.len() - n..] == *spec.components()
    }
}

/// A user- or template-supplied path fragment such as `file.yaml` or
/// `example/file.yaml`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSpec {
    raw: String,
    components: Vec<String>,
    absolute: bool,
}

impl PathSpec {
    pub fn parse(raw: &str) -> Option<Self> {
        let path = Path::new(raw);
        let components = split_components(path);
        if components.is_empty() {
            return None;
        }
        Some(Self {
            raw: raw.to_string(),
            components,
            absolute: path.is_absolute(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn components(&self) -> &[String] {
        &self.components
    }

    pub fn is_absolute(&self) -> bool {
        self.absolute
    }
}

impl fmt::Display for PathSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn split_components(path: &Path) -> Vec<String> {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().to_string()),
            Component::ParentDir => Some("..".to_string()),
            Component::CurDir | Component::RootDir | Component::Prefix(_) => None,
        })
        .collect()
}

/// Read-only list of files, built once per invocation.
#[derive(Debug, Clone)]
pub struct FileIndex {
    root: PathBuf,
    entries: Vec<FileEntry>,
}

impl FileIndex {
    /// Walk `root` recursively, collecting every regular file.
    ///
    /// Symlinks are followed, but each directory is entered at most once
    /// (keyed by canonical path), so link cycles terminate. Directories whose
    /// name is in `ignore` are skipped entirely.
    pub fn scan(root: &Path, ignore: &[String]) -> Result<Self> {
        let root = root.canonicalize().map_err(|source| TemplateError::Io {
            path: root.to_path_buf(),
            source,
        })?;

        let mut visited: HashSet<PathBuf> = HashSet::new();
        let walker = WalkDir::new(&root)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                if !e.file_type().is_dir() {
                    return true;
                }
                if e.depth() > 0 && ignore.iter().any(|name| e.file_name() == name.as_str()) {
                    debug!("Skipping ignored directory {}", e.path().display());
                    return false;
                }
                match e.path().canonicalize() {
                    Ok(canonical) => {
                        let fresh = visited.insert(canonical);
                        if !fresh {
                            debug!("Skipping already visited directory {}", e.path().display());
                        }
                        fresh
                    }
                    Err(err) => {
                        warn!("Cannot canonicalize {}: {}", e.path().display(), err);
                        false
                    }
                }
            });

        let mut entries = Vec::new();
        for item in walker {
            match item {
                Ok(entry) if entry.file_type().is_file() => {
                    entries.push(FileEntry::new(&root, entry.into_path()));
                }
                Ok(_) => {}
                Err(err) => warn!("Skipping unreadable entry: {}", err),
            }
        }

        debug!("Indexed {} files under {}", entries.len(), root.display());
        Ok(Self { root, entries })
    }

    /// Build an index from paths relative to `root` without touching the
    /// file system. Duplicate paths are collapsed.
    #[allow(dead_code)]
    pub fn from_paths<I, P>(root: &Path, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut seen = HashSet::new();
        let entries = paths
            .into_iter()
            .map(|p| root.join(p))
            .filter(|p| seen.insert(p.clone()))
            .map(|p| FileEntry::new(root, p))
            .collect();
        Self {
            root: root.to_path_buf(),
            entries,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entries(&self) -> &[FileEntry] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn spec(s: &str) -> PathSpec {
        PathSpec::parse(s).unwrap()
    }

    #[test]
    fn test_path_spec_drops_empty_and_dot_components() {
        let s = spec("./example//file.yaml");
        assert_eq!(s.components(), ["example", "file.yaml"]);
        assert!(!s.is_absolute());
    }

    #[test]
    fn test_path_spec_rejects_empty() {
        assert!(PathSpec::parse("").is_none());
        assert!(PathSpec::parse("./").is_none());
    }

    #[test]
    fn test_entry_suffix_is_component_wise() {
        let entry = FileEntry::new(Path::new("/r"), PathBuf::from("/r/an/example/file.yaml"));
        assert!(entry.ends_with(&spec("file.yaml")));
        assert!(entry.ends_with(&spec("example/file.yaml")));
        assert!(entry.ends_with(&spec("an/example/file.yaml")));
        assert!(!entry.ends_with(&spec("ample/file.yaml")));
        assert!(!entry.ends_with(&spec("le.yaml")));
        assert!(!entry.ends_with(&spec("r/an/example/file.yaml")));
    }

    #[test]
    fn test_absolute_spec_requires_exact_path() {
        let entry = FileEntry::new(Path::new("/r"), PathBuf::from("/r/a/file.yaml"));
        assert!(entry.ends_with(&spec("/r/a/file.yaml")));
        assert!(!entry.ends_with(&spec("/a/file.yaml")));
    }

    #[test]
    fn test_from_paths_collapses_duplicates() {
        let index = FileIndex::from_paths(Path::new("/r"), ["a.md", "b/c.md", "a.md"]);
        assert_eq!(index.entries().len(), 2);
        assert_eq!(index.entries()[1].path(), Path::new("/r/b/c.md"));
        assert_eq!(index.entries()[1].components(), ["b", "c.md"]);
    }

    #[test]
    fn test_scan_collects_files_recursively() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a/deep")).unwrap();
        fs::write(dir.path().join("top.md"), "t").unwrap();
        fs::write(dir.path().join("a/deep/file.yaml"), "f").unwrap();

        let index = FileIndex::scan(dir.path(), &[]).unwrap();
        let names: Vec<_> = index.entries().iter().map(|e| e.components().join("/")).collect();
        assert_eq!(names, ["a/deep/file.yaml", "top.md"]);
        assert!(index.entries().iter().all(|e| e.path().is_absolute()));
    }

    #[test]
    fn test_scan_skips_ignored_directories() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join(".git/config"), "x").unwrap();
        fs::write(dir.path().join("config"), "y").unwrap();

        let index = FileIndex::scan(dir.path(), &[".git".to_string()]).unwrap();
        assert_eq!(index.entries().len(), 1);
        assert_eq!(index.entries()[0].components(), ["config"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_scan_survives_symlink_cycle() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a")).unwrap();
        fs::write(dir.path().join("a/file.md"), "x").unwrap();
        std::os::unix::fs::symlink(dir.path(), dir.path().join("a/loop")).unwrap();

        let index = FileIndex::scan(dir.path(), &[]).unwrap();
        assert_eq!(index.entries().len(), 1);
    }
}

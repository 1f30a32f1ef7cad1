//! Where template and include text is read from.

use crate::error::{Result, TemplateError};
use crate::git::GitManager;
use std::fs;
use std::path::Path;

/// Supplies the text of indexed files.
///
/// `Ok(None)` means the file has no content in this source (for example it
/// did not exist at a git revision); the engine renders it as empty text.
pub trait Source {
    fn read(&self, path: &Path) -> Result<Option<String>>;
}

/// The files as they currently are on disk.
pub struct WorkingTree;

impl Source for WorkingTree {
    fn read(&self, path: &Path) -> Result<Option<String>> {
        fs::read_to_string(path).map(Some).map_err(|source| TemplateError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// The files as stored at a git commit.
pub struct GitRevision {
    git: GitManager,
    commit: String,
}

impl GitRevision {
    pub fn new(git: GitManager, commit: impl Into<String>) -> Self {
        Self {
            git,
            commit: commit.into(),
        }
    }
}

impl Source for GitRevision {
    fn read(&self, path: &Path) -> Result<Option<String>> {
        self.git.show_file(&self.commit, path).map_err(|e| TemplateError::Git {
            path: path.to_path_buf(),
            commit: self.commit.clone(),
            message: e.to_string(),
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::tests::{commit_all, init_repo};
    use tempfile::tempdir;

    #[test]
    fn test_working_tree_reads_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.md");
        fs::write(&path, "hello\n").unwrap();
        assert_eq!(WorkingTree.read(&path).unwrap().as_deref(), Some("hello\n"));
    }

    #[test]
    fn test_working_tree_missing_file_is_io_error() {
        let dir = tempdir().unwrap();
        let err = WorkingTree.read(&dir.path().join("nope.md")).unwrap_err();
        assert!(matches!(err, TemplateError::Io { .. }));
    }

    #[test]
    fn test_git_revision_reads_committed_text() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        fs::write(dir.path().join("a.md"), "committed").unwrap();
        commit_all(dir.path(), "initial");
        fs::write(dir.path().join("a.md"), "edited").unwrap();

        let source = GitRevision::new(GitManager::new(dir.path()), "HEAD");
        let path = dir.path().canonicalize().unwrap().join("a.md");
        assert_eq!(source.read(&path).unwrap().as_deref(), Some("committed"));
    }

    #[test]
    fn test_git_revision_outside_repo_is_git_error() {
        let dir = tempdir().unwrap();
        let source = GitRevision::new(GitManager::new(dir.path()), "HEAD");
        let err = source.read(&dir.path().join("a.md")).unwrap_err();
        assert!(matches!(err, TemplateError::Git { .. }));
    }
}

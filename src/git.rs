use eyre::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

pub struct GitManager {
    repo_root: PathBuf,
}

impl GitManager {
    pub fn new(repo_root: &Path) -> Self {
        Self {
            repo_root: repo_root.to_path_buf(),
        }
    }

    /// Check if the working directory is inside a git repository
    pub fn is_repo(&self) -> bool {
        Command::new("git")
            .args(["rev-parse", "--git-dir"])
            .current_dir(&self.repo_root)
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    /// Absolute path of the repository's top-level directory
    pub fn toplevel(&self) -> Result<PathBuf> {
        let output = Command::new("git")
            .args(["rev-parse", "--show-toplevel"])
            .current_dir(&self.repo_root)
            .output()
            .context("Failed to run git rev-parse")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(eyre::eyre!("git rev-parse failed: {}", stderr.trim()));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let toplevel = PathBuf::from(stdout.trim());
        Ok(toplevel.canonicalize().unwrap_or(toplevel))
    }

    /// Check that `commit` names an existing commit
    pub fn has_commit(&self, commit: &str) -> bool {
        Command::new("git")
            .args(["rev-parse", "--verify", "--quiet", &format!("{}^{{commit}}", commit)])
            .current_dir(&self.repo_root)
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    /// Content of `path` as stored at `commit`, or None when the file does not
    /// exist in that commit
    pub fn show_file(&self, commit: &str, path: &Path) -> Result<Option<String>> {
        let toplevel = self.toplevel()?;
        let relative = path
            .strip_prefix(&toplevel)
            .map_err(|_| eyre::eyre!("{} is outside the repository {}", path.display(), toplevel.display()))?;
        let spec = format!(
            "{}:{}",
            commit,
            relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/")
        );

        if !self.has_commit(commit) {
            return Err(eyre::eyre!("{} is not a commit", commit));
        }

        let exists = Command::new("git")
            .args(["cat-file", "-e", &spec])
            .current_dir(&toplevel)
            .output()
            .context("Failed to run git cat-file")?;
        if !exists.status.success() {
            return Ok(None);
        }

        let output = Command::new("git")
            .args(["show", &spec])
            .current_dir(&toplevel)
            .output()
            .context("Failed to run git show")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(eyre::eyre!("git show {} failed: {}", spec, stderr.trim()));
        }

        Ok(Some(String::from_utf8_lossy(&output.stdout).to_string()))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    pub(crate) fn git(dir: &Path, args: &[&str]) {
        let status = Command::new("git").args(args).current_dir(dir).output().unwrap().status;
        assert!(status.success(), "git {:?} failed", args);
    }

    /// Initialize a repository with a committer identity configured
    pub(crate) fn init_repo(dir: &Path) {
        git(dir, &["init", "-q"]);
        git(dir, &["config", "user.email", "test@test.com"]);
        git(dir, &["config", "user.name", "Test"]);
        git(dir, &["config", "commit.gpgsign", "false"]);
    }

    pub(crate) fn commit_all(dir: &Path, message: &str) {
        git(dir, &["add", "-A"]);
        git(dir, &["commit", "-q", "-m", message]);
    }

    #[test]
    fn test_is_repo_false_for_non_repo() {
        let dir = tempdir().unwrap();
        let git = GitManager::new(dir.path());
        assert!(!git.is_repo());
    }

    #[test]
    fn test_is_repo_true_for_repo() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());

        let git = GitManager::new(dir.path());
        assert!(git.is_repo());
        assert!(!git.has_commit("HEAD"));
    }

    #[test]
    fn test_show_file_returns_committed_content() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        fs::create_dir_all(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/a.md"), "old").unwrap();
        commit_all(dir.path(), "initial");
        fs::write(dir.path().join("sub/a.md"), "new").unwrap();

        let git = GitManager::new(dir.path());
        assert!(git.has_commit("HEAD"));
        let path = dir.path().canonicalize().unwrap().join("sub/a.md");
        assert_eq!(git.show_file("HEAD", &path).unwrap().as_deref(), Some("old"));
    }

    #[test]
    fn test_show_file_missing_in_commit_is_none() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        fs::write(dir.path().join("a.md"), "a").unwrap();
        commit_all(dir.path(), "initial");
        fs::write(dir.path().join("b.md"), "b").unwrap();

        let git = GitManager::new(dir.path());
        let path = dir.path().canonicalize().unwrap().join("b.md");
        assert!(git.show_file("HEAD", &path).unwrap().is_none());
    }

    #[test]
    fn test_show_file_missing_directory_in_commit_is_none() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        fs::write(dir.path().join("a.md"), "a").unwrap();
        commit_all(dir.path(), "initial");
        fs::create_dir_all(dir.path().join("new")).unwrap();
        fs::write(dir.path().join("new/b.md"), "b").unwrap();

        let git = GitManager::new(dir.path());
        let path = dir.path().canonicalize().unwrap().join("new/b.md");
        assert!(git.show_file("HEAD", &path).unwrap().is_none());
    }

    #[test]
    fn test_show_file_unknown_commit_is_error() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        fs::write(dir.path().join("a.md"), "a").unwrap();
        commit_all(dir.path(), "initial");

        let git = GitManager::new(dir.path());
        let path = dir.path().canonicalize().unwrap().join("a.md");
        assert!(git.show_file("no-such-branch", &path).is_err());
    }
}

//! Error types for template resolution and rendering.
//!
//! Every variant aborts the render in progress. The messages carry enough
//! detail to fix the template: the candidate list for ambiguous fragments,
//! the variable name, the cycle chain, and the file and line of a bad tag.

use std::fmt::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TemplateError {
    /// A path fragment matched no file under the index root.
    #[error("File '{spec}' not found under {}", .root.display())]
    NotFound { spec: String, root: PathBuf },

    /// A path fragment matched more than one file.
    #[error(
        "Ambiguous reference: multiple files match '{spec}':{}\nSpecify more of the path to disambiguate",
        list_paths(.candidates)
    )]
    Ambiguous { spec: String, candidates: Vec<PathBuf> },

    /// A `template()` chain re-entered a file already being rendered.
    #[error("Cyclic template reference to {}:{}", .path.display(), list_paths(.chain))]
    CyclicReference { path: PathBuf, chain: Vec<PathBuf> },

    #[error("{}:{line}: undefined variable '{name}'", .file.display())]
    UndefinedVariable { name: String, file: PathBuf, line: usize },

    #[error("{}:{line}: syntax error: {message}", .file.display())]
    Syntax { message: String, file: PathBuf, line: usize },

    /// A value of the wrong kind reached an operation (iterating a number,
    /// comparing a string with a list, a non-string file argument).
    #[error("{}:{line}: {message}", .file.display())]
    Type { message: String, file: PathBuf, line: usize },

    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read {} at {commit}: {message}", .path.display())]
    Git { path: PathBuf, commit: String, message: String },
}

impl TemplateError {
    pub fn syntax(file: &Path, line: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            message: message.into(),
            file: file.to_path_buf(),
            line,
        }
    }

    pub fn type_error(file: &Path, line: usize, message: impl Into<String>) -> Self {
        Self::Type {
            message: message.into(),
            file: file.to_path_buf(),
            line,
        }
    }

    pub fn undefined(file: &Path, line: usize, name: impl Into<String>) -> Self {
        Self::UndefinedVariable {
            name: name.into(),
            file: file.to_path_buf(),
            line,
        }
    }
}

fn list_paths(paths: &[PathBuf]) -> String {
    let mut out = String::new();
    for path in paths {
        let _ = write!(out, "\n  {}", path.display());
    }
    out
}

pub type Result<T> = std::result::Result<T, TemplateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ambiguous_lists_every_candidate() {
        let err = TemplateError::Ambiguous {
            spec: "file.yaml".to_string(),
            candidates: vec![PathBuf::from("/r/a/file.yaml"), PathBuf::from("/r/b/file.yaml")],
        };
        let msg = err.to_string();
        assert!(msg.contains("'file.yaml'"));
        assert!(msg.contains("\n  /r/a/file.yaml"));
        assert!(msg.contains("\n  /r/b/file.yaml"));
    }

    #[test]
    fn test_cycle_lists_chain_in_order() {
        let err = TemplateError::CyclicReference {
            path: PathBuf::from("/r/a.md"),
            chain: vec![
                PathBuf::from("/r/a.md"),
                PathBuf::from("/r/b.md"),
                PathBuf::from("/r/a.md"),
            ],
        };
        assert_eq!(
            err.to_string(),
            "Cyclic template reference to /r/a.md:\n  /r/a.md\n  /r/b.md\n  /r/a.md"
        );
    }

    #[test]
    fn test_location_in_message() {
        let err = TemplateError::undefined(Path::new("/r/x.md"), 3, "name");
        assert_eq!(err.to_string(), "/r/x.md:3: undefined variable 'name'");
    }
}

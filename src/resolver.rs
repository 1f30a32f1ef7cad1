use crate::error::{Result, TemplateError};
use crate::index::{FileEntry, FileIndex, PathSpec};
use log::debug;

/// Resolve `spec` to the single entry whose trailing components equal it.
///
/// Zero matches is `NotFound`; more than one is `Ambiguous` with every
/// candidate, in index order, so the caller can pick a longer fragment.
pub fn resolve<'a>(spec: &PathSpec, index: &'a FileIndex) -> Result<&'a FileEntry> {
    let matches: Vec<&FileEntry> = index.entries().iter().filter(|e| e.ends_with(spec)).collect();

    match matches.as_slice() {
        [] => Err(TemplateError::NotFound {
            spec: spec.to_string(),
            root: index.root().to_path_buf(),
        }),
        [only] => {
            debug!("Resolved '{}' to {}", spec, only.path().display());
            Ok(*only)
        }
        many => Err(TemplateError::Ambiguous {
            spec: spec.to_string(),
            candidates: many.iter().map(|e| e.path().to_path_buf()).collect(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};

    fn index() -> FileIndex {
        FileIndex::from_paths(
            Path::new("/repo"),
            ["a/file.yaml", "b/file.yaml", "prompts/review.md", "prompts/nested/example/file.txt"],
        )
    }

    fn spec(s: &str) -> PathSpec {
        PathSpec::parse(s).unwrap()
    }

    #[test]
    fn test_unique_match() {
        let index = index();
        let entry = resolve(&spec("review.md"), &index).unwrap();
        assert_eq!(entry.path(), Path::new("/repo/prompts/review.md"));
    }

    #[test]
    fn test_ambiguous_lists_both() {
        let index = index();
        match resolve(&spec("file.yaml"), &index) {
            Err(TemplateError::Ambiguous { spec, candidates }) => {
                assert_eq!(spec, "file.yaml");
                assert_eq!(
                    candidates,
                    vec![PathBuf::from("/repo/a/file.yaml"), PathBuf::from("/repo/b/file.yaml")]
                );
            }
            other => panic!("expected Ambiguous, got {:?}", other),
        }
    }

    #[test]
    fn test_longer_fragment_disambiguates() {
        let index = index();
        let entry = resolve(&spec("a/file.yaml"), &index).unwrap();
        assert_eq!(entry.path(), Path::new("/repo/a/file.yaml"));
    }

    #[test]
    fn test_not_found() {
        let index = index();
        assert!(matches!(
            resolve(&spec("missing.md"), &index),
            Err(TemplateError::NotFound { .. })
        ));
    }

    #[test]
    fn test_partial_component_does_not_match() {
        let index = index();
        assert!(matches!(
            resolve(&spec("ample/file.txt"), &index),
            Err(TemplateError::NotFound { .. })
        ));
        assert!(resolve(&spec("example/file.txt"), &index).is_ok());
    }

    #[test]
    fn test_every_unique_file_resolves_to_itself() {
        let index = index();
        for entry in index.entries() {
            let full = entry.components().join("/");
            assert_eq!(resolve(&spec(&full), &index).unwrap(), entry);
        }
    }
}

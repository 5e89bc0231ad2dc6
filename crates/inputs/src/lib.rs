//! Glob input resolution.
//!
//! Expands a task's input patterns relative to the workspace root into a
//! concrete, ordered file list. The result is sorted lexicographically on
//! the absolute path and deduplicated, so the downstream fingerprint is
//! independent of pattern order and filesystem iteration order.

use glob::Pattern;
use miette::Diagnostic;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::trace;
use walkdir::WalkDir;

/// Result type for input resolution.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while expanding input patterns.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// A glob pattern failed to compile or the walk failed.
    #[error("input resolution failed for pattern `{pattern}`: {message}")]
    #[diagnostic(code(ordo::inputs::resolution))]
    InputResolution {
        /// The offending pattern, or the walked directory on I/O failure.
        pattern: String,
        /// Underlying cause.
        message: String,
    },
}

/// Directory names never descended into during resolution.
const IGNORED_DIRS: &[&str] = &[".git", ".jj"];

/// Expand `patterns` relative to `root` into a sorted, deduplicated list of
/// absolute file paths.
///
/// Patterns that match nothing contribute no files and are not errors.
/// Symlinks are followed; version-control metadata directories are skipped.
///
/// # Errors
///
/// Returns [`Error::InputResolution`] for unparsable patterns or walk
/// failures other than unreadable leaf entries.
pub fn resolve(patterns: &[String], root: &Path) -> Result<Vec<PathBuf>> {
    if patterns.is_empty() {
        return Ok(Vec::new());
    }

    let compiled = patterns
        .iter()
        .map(|p| {
            Pattern::new(p).map_err(|e| Error::InputResolution {
                pattern: p.clone(),
                message: e.to_string(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut matched: BTreeSet<PathBuf> = BTreeSet::new();
    let walker = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_entry(|entry| !is_ignored_dir(entry));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            // Unreadable subtrees are skipped, like a shell glob would.
            Err(e) => {
                trace!(root = %root.display(), "skipping unreadable entry: {e}");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        if compiled.iter().any(|p| p.matches_path(relative)) {
            matched.insert(entry.path().to_path_buf());
        }
    }

    trace!(
        root = %root.display(),
        patterns = patterns.len(),
        files = matched.len(),
        "resolved input patterns"
    );
    Ok(matched.into_iter().collect())
}

fn is_ignored_dir(entry: &walkdir::DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| IGNORED_DIRS.contains(&name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, rel.as_bytes()).unwrap();
    }

    #[test]
    fn resolves_recursive_globs() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "src/main.go");
        touch(tmp.path(), "src/pkg/util.go");
        touch(tmp.path(), "readme.md");

        let files = resolve(&["**/*.go".into()], tmp.path()).unwrap();
        let rels: Vec<_> = files
            .iter()
            .map(|f| f.strip_prefix(tmp.path()).unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(rels, vec!["src/main.go", "src/pkg/util.go"]);
    }

    #[test]
    fn output_is_sorted_and_deduplicated_across_patterns() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "b.txt");
        touch(tmp.path(), "a.txt");

        // Both patterns match both files; union must not duplicate.
        let files = resolve(&["*.txt".into(), "**/*.txt".into()], tmp.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn unmatched_patterns_are_not_errors() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "main.rs");

        let files = resolve(&["**/*.nothing".into()], tmp.path()).unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn empty_pattern_list_is_empty() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "main.rs");
        assert!(resolve(&[], tmp.path()).unwrap().is_empty());
    }

    #[test]
    fn version_control_metadata_is_skipped() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), ".git/objects/ab/cdef");
        touch(tmp.path(), ".jj/store/file");
        touch(tmp.path(), "src/lib.rs");

        let files = resolve(&["**/*".into()], tmp.path()).unwrap();
        let rels: Vec<_> = files
            .iter()
            .map(|f| f.strip_prefix(tmp.path()).unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(rels, vec!["src/lib.rs"]);
    }

    #[test]
    fn directories_are_not_emitted() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "src/lib.rs");

        let files = resolve(&["src".into(), "src/*".into()], tmp.path()).unwrap();
        let rels: Vec<_> = files
            .iter()
            .map(|f| f.strip_prefix(tmp.path()).unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(rels, vec!["src/lib.rs"]);
    }

    #[test]
    fn invalid_pattern_is_reported() {
        let tmp = TempDir::new().unwrap();
        let err = resolve(&["[".into()], tmp.path()).unwrap_err();
        assert!(matches!(err, Error::InputResolution { pattern, .. } if pattern == "["));
    }

    #[test]
    fn exact_file_patterns_match() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "Cargo.toml");
        touch(tmp.path(), "Cargo.lock");

        let files = resolve(&["Cargo.toml".into()], tmp.path()).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("Cargo.toml"));
    }
}

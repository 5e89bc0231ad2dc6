//! Deterministic input and output fingerprints.
//!
//! Both fingerprints are SHA-256 digests over a canonical byte stream:
//! every variable-length component is length-prefixed, maps are fed in
//! sorted order, and file paths enter relative to the workspace root. The
//! result is stable across runs, across machines with different workspace
//! locations, and independent of file modification times.

use miette::Diagnostic;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::trace;
use walkdir::WalkDir;

/// Result type for fingerprint computation.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while computing fingerprints.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// Reading an input file failed.
    #[error("failed to hash input `{path}`")]
    #[diagnostic(code(ordo::hash::input))]
    InputHashComputation {
        /// The file that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Reading a declared output failed.
    #[error("failed to hash output `{path}`")]
    #[diagnostic(code(ordo::hash::output))]
    OutputHashComputation {
        /// The path that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Fed into the output digest in place of a content hash when a declared
/// output does not exist on disk.
const ABSENT_SENTINEL: &[u8] = b"\0ordo:absent\0";

/// Result of hashing a task's declared outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputDigest {
    /// All declared outputs were present; their combined digest.
    Hash(String),
    /// At least one declared output is missing. Never matches a stored
    /// record, so the caller treats it as cache invalidation.
    Missing,
}

impl OutputDigest {
    /// Whether this digest matches a previously stored hex digest.
    #[must_use]
    pub fn matches(&self, stored: &str) -> bool {
        matches!(self, Self::Hash(h) if h == stored)
    }
}

/// Compute the input fingerprint for a task.
///
/// Covers, in order: the argv sequence (length-prefixed), the sorted
/// task-definition environment entries, and for each resolved input file
/// (already sorted by the resolver) its root-relative path and content
/// digest. The hydrated tool environment is deliberately excluded; it is
/// pinned by commit and already part of the task definition via `tools`.
///
/// # Errors
///
/// Returns [`Error::InputHashComputation`] when an input file cannot be read.
pub fn input_hash(
    command: &[String],
    environment: &BTreeMap<String, String>,
    files: &[PathBuf],
    root: &Path,
) -> Result<String> {
    let mut hasher = Sha256::new();

    feed_len(&mut hasher, command.len());
    for token in command {
        feed_bytes(&mut hasher, token.as_bytes());
    }

    feed_len(&mut hasher, environment.len());
    for (key, value) in environment {
        feed_bytes(&mut hasher, format!("{key}={value}").as_bytes());
    }

    feed_len(&mut hasher, files.len());
    for file in files {
        let relative = file.strip_prefix(root).unwrap_or(file);
        feed_bytes(&mut hasher, path_bytes(relative).as_bytes());
        let digest = file_digest(file).map_err(|source| Error::InputHashComputation {
            path: file.clone(),
            source,
        })?;
        hasher.update(digest);
    }

    let hash = hex::encode(hasher.finalize());
    trace!(files = files.len(), %hash, "computed input fingerprint");
    Ok(hash)
}

/// Compute the output fingerprint for a task's declared outputs.
///
/// Each declared path contributes its root-relative path and content
/// digest, in declaration order. A directory output contributes every file
/// beneath it in sorted order. An absent path feeds a sentinel and makes
/// the overall result [`OutputDigest::Missing`].
///
/// # Errors
///
/// Returns [`Error::OutputHashComputation`] when an existing output cannot
/// be read.
pub fn output_hash(outputs: &[String], root: &Path) -> Result<OutputDigest> {
    let mut hasher = Sha256::new();
    let mut any_missing = false;

    feed_len(&mut hasher, outputs.len());
    for declared in outputs {
        let absolute = root.join(declared);
        feed_bytes(&mut hasher, declared.as_bytes());

        if absolute.is_file() {
            let digest = file_digest(&absolute).map_err(|source| Error::OutputHashComputation {
                path: absolute.clone(),
                source,
            })?;
            hasher.update(digest);
        } else if absolute.is_dir() {
            hash_directory(&mut hasher, &absolute, root)?;
        } else {
            hasher.update(ABSENT_SENTINEL);
            any_missing = true;
        }
    }

    if any_missing {
        return Ok(OutputDigest::Missing);
    }
    Ok(OutputDigest::Hash(hex::encode(hasher.finalize())))
}

fn hash_directory(hasher: &mut Sha256, dir: &Path, root: &Path) -> Result<()> {
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| Error::OutputHashComputation {
            path: dir.to_path_buf(),
            source: e.into(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        feed_bytes(hasher, path_bytes(relative).as_bytes());
        let digest = file_digest(entry.path()).map_err(|source| Error::OutputHashComputation {
            path: entry.path().to_path_buf(),
            source,
        })?;
        hasher.update(digest);
    }
    Ok(())
}

/// Streaming SHA-256 of a file's contents.
fn file_digest(path: &Path) -> std::io::Result<[u8; 32]> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hasher.finalize().into())
}

fn feed_len(hasher: &mut Sha256, len: usize) {
    hasher.update((len as u64).to_le_bytes());
}

fn feed_bytes(hasher: &mut Sha256, bytes: &[u8]) {
    feed_len(hasher, bytes.len());
    hasher.update(bytes);
}

/// Normalise a path to forward-slash form so fingerprints agree across
/// platforms.
fn path_bytes(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

//! Persistent build-info store.
//!
//! Maps each task name to its most recent successful fingerprints. One JSON
//! file per task keeps writes independent across tasks; each write goes
//! through a temp file, fsync, and rename so readers never observe a
//! partial record.

use chrono::Utc;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, Error>;

static TMP_COUNTER: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);

/// Errors raised by the build-info store.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// Reading a record failed.
    #[error("failed to read build info at `{path}`")]
    #[diagnostic(code(ordo::store::read))]
    StoreRead {
        /// Path of the record file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Writing a record failed.
    #[error("failed to write build info at `{path}`")]
    #[diagnostic(
        code(ordo::store::write),
        help("check permissions on the workspace state directory")
    )]
    StoreWrite {
        /// Path of the record file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// The fingerprints recorded for a task after a successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildInfo {
    /// Name of the task this record belongs to.
    pub task_name: String,
    /// Input fingerprint at the time of the run.
    pub input_hash: String,
    /// Output fingerprint produced by the run.
    pub output_hash: String,
    /// Seconds since the Unix epoch when the record was written.
    pub timestamp: i64,
}

impl BuildInfo {
    /// Create a record stamped with the current time.
    #[must_use]
    pub fn new(
        task_name: impl Into<String>,
        input_hash: impl Into<String>,
        output_hash: impl Into<String>,
    ) -> Self {
        Self {
            task_name: task_name.into(),
            input_hash: input_hash.into(),
            output_hash: output_hash.into(),
            timestamp: Utc::now().timestamp(),
        }
    }
}

/// One-file-per-task store rooted at a directory.
#[derive(Debug, Clone)]
pub struct Store {
    dir: PathBuf,
}

impl Store {
    /// Open (and create if needed) a store at `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreWrite`] when the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| Error::StoreWrite {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    /// Fetch the record for a task, if any.
    ///
    /// A corrupt record file is treated as absent (and logged); the next
    /// successful run rewrites it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreRead`] for I/O failures other than the file
    /// not existing.
    pub fn get(&self, task_name: &str) -> Result<Option<BuildInfo>> {
        let path = self.record_path(task_name);
        let contents = match std::fs::read(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(Error::StoreRead { path, source }),
        };
        match serde_json::from_slice(&contents) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!(task = task_name, path = %path.display(), "discarding corrupt build info: {e}");
                Ok(None)
            }
        }
    }

    /// Atomically persist a record, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreWrite`] when serialisation or any filesystem
    /// step fails.
    pub fn put(&self, record: &BuildInfo) -> Result<()> {
        let path = self.record_path(&record.task_name);
        // Uniquified so racing writers never share a temp file; the rename
        // is what makes the record visible.
        let tmp = path.with_extension(format!(
            "json.tmp.{}.{}",
            std::process::id(),
            TMP_COUNTER.fetch_add(1, std::sync::atomic::Ordering::Relaxed)
        ));

        let json = serde_json::to_vec_pretty(record).map_err(|e| Error::StoreWrite {
            path: path.clone(),
            source: std::io::Error::other(e),
        })?;

        let write = |tmp: &Path| -> std::io::Result<()> {
            let mut file = std::fs::File::create(tmp)?;
            file.write_all(&json)?;
            file.sync_all()?;
            Ok(())
        };
        if let Err(source) = write(&tmp) {
            let _ = std::fs::remove_file(&tmp);
            return Err(Error::StoreWrite { path: tmp, source });
        }
        if let Err(source) = std::fs::rename(&tmp, &path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(Error::StoreWrite { path, source });
        }

        debug!(task = %record.task_name, path = %path.display(), "wrote build info");
        Ok(())
    }

    /// Remove a task's record. Removing a non-existent record is not an
    /// error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreWrite`] for filesystem failures other than the
    /// record not existing.
    pub fn delete(&self, task_name: &str) -> Result<()> {
        let path = self.record_path(task_name);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(Error::StoreWrite { path, source }),
        }
    }

    fn record_path(&self, task_name: &str) -> PathBuf {
        self.dir.join(format!("{task_name}.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn put_then_get_roundtrips() {
        let tmp = TempDir::new().unwrap();
        let store = Store::open(tmp.path()).unwrap();

        let record = BuildInfo::new("build", "in-hash", "out-hash");
        store.put(&record).unwrap();

        let fetched = store.get("build").unwrap().unwrap();
        assert_eq!(fetched, record);
    }

    #[test]
    fn get_unknown_task_is_none() {
        let tmp = TempDir::new().unwrap();
        let store = Store::open(tmp.path()).unwrap();
        assert!(store.get("never-ran").unwrap().is_none());
    }

    #[test]
    fn put_overwrites_previous_record() {
        let tmp = TempDir::new().unwrap();
        let store = Store::open(tmp.path()).unwrap();

        store.put(&BuildInfo::new("build", "old-in", "old-out")).unwrap();
        store.put(&BuildInfo::new("build", "new-in", "new-out")).unwrap();

        let fetched = store.get("build").unwrap().unwrap();
        assert_eq!(fetched.input_hash, "new-in");
        assert_eq!(fetched.output_hash, "new-out");
    }

    #[test]
    fn delete_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let store = Store::open(tmp.path()).unwrap();

        store.put(&BuildInfo::new("build", "i", "o")).unwrap();
        store.delete("build").unwrap();
        store.delete("build").unwrap();
        assert!(store.get("build").unwrap().is_none());
    }

    #[test]
    fn corrupt_record_is_treated_as_absent() {
        let tmp = TempDir::new().unwrap();
        let store = Store::open(tmp.path()).unwrap();
        std::fs::write(tmp.path().join("build.json"), b"{not json").unwrap();
        assert!(store.get("build").unwrap().is_none());
    }

    #[test]
    fn namespaced_task_names_get_their_own_files() {
        let tmp = TempDir::new().unwrap();
        let store = Store::open(tmp.path()).unwrap();

        store.put(&BuildInfo::new("api:build", "i1", "o1")).unwrap();
        store.put(&BuildInfo::new("web:build", "i2", "o2")).unwrap();

        assert_eq!(store.get("api:build").unwrap().unwrap().input_hash, "i1");
        assert_eq!(store.get("web:build").unwrap().unwrap().input_hash, "i2");
    }

    #[test]
    fn concurrent_puts_leave_one_complete_record() {
        let tmp = TempDir::new().unwrap();
        let store = Store::open(tmp.path()).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    let record =
                        BuildInfo::new("contended", format!("in-{i}"), format!("out-{i}"));
                    store.put(&record).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // Whatever write won, the file parses as a complete record.
        let record = store.get("contended").unwrap().unwrap();
        assert!(record.input_hash.starts_with("in-"));
        assert!(record.output_hash.starts_with("out-"));
    }

    #[test]
    fn record_timestamp_is_epoch_seconds() {
        let record = BuildInfo::new("t", "i", "o");
        let now = chrono::Utc::now().timestamp();
        assert!((record.timestamp - now).abs() < 5);
    }
}

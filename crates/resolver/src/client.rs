//! HTTP client for the package index, with an on-disk resolution cache.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

/// Default package index endpoint.
pub const DEFAULT_INDEX_URL: &str = "https://search.devbox.sh/v2";

/// How long a single index request may take.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A resolved tool: the nixpkgs commit pinning the requested version and
/// the attribute path to reference inside a generated package expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// The nixpkgs commit hash.
    pub commit: String,
    /// Attribute path within the commit's package set.
    pub attr_path: String,
}

/// Index entry covering every supported system, as served and as cached.
///
/// Caching all systems lets a cache entry produced on one machine serve a
/// different architecture later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Per-system resolution records.
    pub systems: BTreeMap<String, SystemRecord>,
}

/// Resolution record for one system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemRecord {
    /// The flake installable pinning commit and attribute path.
    pub flake_installable: FlakeInstallable,
}

/// A flake reference plus the attribute path to install from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlakeInstallable {
    /// The flake reference carrying the pinned revision.
    #[serde(rename = "ref")]
    pub flake_ref: FlakeRef,
    /// Attribute path within the package set.
    pub attr_path: String,
}

/// The pinned revision of a flake reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlakeRef {
    /// Commit hash of the pinned nixpkgs revision.
    pub rev: String,
}

/// The current host's system string in index notation.
///
/// # Errors
///
/// Returns [`Error::UnsupportedHost`] on architectures the index does not
/// carry.
pub fn current_system() -> Result<&'static str> {
    match (std::env::consts::ARCH, std::env::consts::OS) {
        ("x86_64", "linux") => Ok("x86_64-linux"),
        ("aarch64", "linux") => Ok("aarch64-linux"),
        ("x86_64", "macos") => Ok("x86_64-darwin"),
        ("aarch64", "macos") => Ok("aarch64-darwin"),
        (arch, os) => Err(Error::UnsupportedHost {
            system: format!("{arch}-{os}"),
        }),
    }
}

/// Client for the package index with a best-effort on-disk cache.
#[derive(Debug, Clone)]
pub struct IndexClient {
    http: reqwest::Client,
    base_url: String,
    cache_dir: PathBuf,
}

impl IndexClient {
    /// Create a client against `base_url`, caching resolutions in
    /// `cache_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexRequest`] if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, cache_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_url = base_url.into();
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::IndexRequest {
                alias: String::new(),
                version: String::new(),
                message: format!("failed to construct HTTP client: {e}"),
            })?;
        Ok(Self {
            http,
            base_url,
            cache_dir: cache_dir.into(),
        })
    }

    /// Resolve `alias@version` to a commit and attribute path for the
    /// current system.
    ///
    /// Consults the on-disk cache first; a corrupt cache file is a miss.
    /// Transport failures are never cached.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PackageNotFound`], [`Error::UnsupportedSystem`],
    /// [`Error::IndexRequest`], or [`Error::IndexParse`].
    pub async fn resolve(&self, alias: &str, version: &str) -> Result<Resolution> {
        let system = current_system()?;

        if let Some(entry) = self.read_cache(alias, version) {
            debug!(alias, version, "index cache hit");
            return pick_system(&entry, alias, version, system);
        }

        let entry = self.fetch(alias, version).await?;
        self.write_cache(alias, version, &entry);
        pick_system(&entry, alias, version, system)
    }

    async fn fetch(&self, alias: &str, version: &str) -> Result<IndexEntry> {
        let url = format!(
            "{}/resolve?name={alias}&version={version}",
            self.base_url.trim_end_matches('/')
        );
        debug!(%url, "querying package index");

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::IndexRequest {
                alias: alias.to_string(),
                version: version.to_string(),
                message: e.to_string(),
            })?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::PackageNotFound {
                alias: alias.to_string(),
                version: version.to_string(),
            });
        }
        if !response.status().is_success() {
            return Err(Error::IndexRequest {
                alias: alias.to_string(),
                version: version.to_string(),
                message: format!("index returned status {}", response.status()),
            });
        }

        let body = response.bytes().await.map_err(|e| Error::IndexRequest {
            alias: alias.to_string(),
            version: version.to_string(),
            message: e.to_string(),
        })?;
        serde_json::from_slice(&body).map_err(|source| Error::IndexParse {
            alias: alias.to_string(),
            version: version.to_string(),
            source,
        })
    }

    fn cache_path(&self, alias: &str, version: &str) -> PathBuf {
        let digest = Sha256::digest(format!("{alias}@{version}").as_bytes());
        self.cache_dir.join(format!("{}.json", hex::encode(digest)))
    }

    fn read_cache(&self, alias: &str, version: &str) -> Option<IndexEntry> {
        let path = self.cache_path(alias, version);
        let contents = std::fs::read(&path).ok()?;
        match serde_json::from_slice(&contents) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(path = %path.display(), "discarding corrupt resolver cache entry: {e}");
                None
            }
        }
    }

    /// Best-effort atomic cache write; failures are logged, not surfaced.
    fn write_cache(&self, alias: &str, version: &str, entry: &IndexEntry) {
        let path = self.cache_path(alias, version);
        let result = (|| -> std::io::Result<()> {
            std::fs::create_dir_all(&self.cache_dir)?;
            let tmp = path.with_extension(format!("json.tmp.{}", std::process::id()));
            let json = serde_json::to_vec_pretty(entry).map_err(std::io::Error::other)?;
            std::fs::write(&tmp, json)?;
            std::fs::rename(&tmp, &path)?;
            Ok(())
        })();
        if let Err(e) = result {
            warn!(path = %path.display(), "failed to cache resolution: {e}");
        }
    }
}

fn pick_system(
    entry: &IndexEntry,
    alias: &str,
    version: &str,
    system: &str,
) -> Result<Resolution> {
    let record = entry
        .systems
        .get(system)
        .ok_or_else(|| Error::UnsupportedSystem {
            alias: alias.to_string(),
            version: version.to_string(),
            system: system.to_string(),
        })?;
    Ok(Resolution {
        commit: record.flake_installable.flake_ref.rev.clone(),
        attr_path: record.flake_installable.attr_path.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry_for(systems: &[(&str, &str, &str)]) -> IndexEntry {
        IndexEntry {
            systems: systems
                .iter()
                .map(|(system, rev, attr)| {
                    (
                        (*system).to_string(),
                        SystemRecord {
                            flake_installable: FlakeInstallable {
                                flake_ref: FlakeRef {
                                    rev: (*rev).to_string(),
                                },
                                attr_path: (*attr).to_string(),
                            },
                        },
                    )
                })
                .collect(),
        }
    }

    fn all_systems_entry(rev: &str, attr: &str) -> IndexEntry {
        entry_for(&[
            ("x86_64-linux", rev, attr),
            ("aarch64-linux", rev, attr),
            ("x86_64-darwin", rev, attr),
            ("aarch64-darwin", rev, attr),
        ])
    }

    #[test]
    fn wire_format_decodes() {
        let raw = r#"{
            "systems": {
                "x86_64-linux": {
                    "flake_installable": {
                        "ref": {"rev": "0cbe9f69c234a7700596e943bfae7ef27a31b735"},
                        "attr_path": "go_1_25"
                    }
                }
            }
        }"#;
        let entry: IndexEntry = serde_json::from_str(raw).unwrap();
        let record = &entry.systems["x86_64-linux"];
        assert_eq!(
            record.flake_installable.flake_ref.rev,
            "0cbe9f69c234a7700596e943bfae7ef27a31b735"
        );
        assert_eq!(record.flake_installable.attr_path, "go_1_25");
    }

    #[test]
    fn current_system_is_supported_in_ci() {
        // The four supported systems cover every platform we test on.
        current_system().unwrap();
    }

    #[tokio::test]
    async fn cached_entry_resolves_without_network() {
        let tmp = TempDir::new().unwrap();
        // Base URL points nowhere; a cache hit must not touch it.
        let client = IndexClient::new("http://127.0.0.1:1", tmp.path()).unwrap();

        let entry = all_systems_entry("abc123", "go_1_25");
        let path = client.cache_path("go", "1.25");
        std::fs::create_dir_all(tmp.path()).unwrap();
        std::fs::write(&path, serde_json::to_vec(&entry).unwrap()).unwrap();

        let resolution = client.resolve("go", "1.25").await.unwrap();
        assert_eq!(resolution.commit, "abc123");
        assert_eq!(resolution.attr_path, "go_1_25");
    }

    #[tokio::test]
    async fn cache_entry_missing_current_system_is_unsupported() {
        let tmp = TempDir::new().unwrap();
        let client = IndexClient::new("http://127.0.0.1:1", tmp.path()).unwrap();

        let entry = entry_for(&[("mips64-linux", "abc", "go")]);
        std::fs::write(
            client.cache_path("go", "1.25"),
            serde_json::to_vec(&entry).unwrap(),
        )
        .unwrap();

        let err = client.resolve("go", "1.25").await.unwrap_err();
        assert!(matches!(err, Error::UnsupportedSystem { .. }));
    }

    #[tokio::test]
    async fn corrupt_cache_falls_through_to_the_index() {
        let tmp = TempDir::new().unwrap();
        let client = IndexClient::new("http://127.0.0.1:1", tmp.path()).unwrap();

        std::fs::write(client.cache_path("go", "1.25"), b"{garbage").unwrap();

        // The miss hits the unreachable index and surfaces a transport error.
        let err = client.resolve("go", "1.25").await.unwrap_err();
        assert!(matches!(err, Error::IndexRequest { .. }));
    }

    #[test]
    fn cache_paths_are_keyed_by_alias_and_version() {
        let tmp = TempDir::new().unwrap();
        let client = IndexClient::new(DEFAULT_INDEX_URL, tmp.path()).unwrap();

        let a = client.cache_path("go", "1.25");
        let b = client.cache_path("go", "1.24");
        let c = client.cache_path("gofmt", "1.25");
        assert_ne!(a, b);
        assert_ne!(a, c);
        for path in [&a, &b, &c] {
            // sha256 hex + .json
            assert_eq!(path.file_name().unwrap().to_str().unwrap().len(), 69);
        }
    }
}

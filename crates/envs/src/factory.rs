//! The environment factory: hydration, deduplication, and caching.

use crate::{Error, Result, expr};
use async_trait::async_trait;
use ordo_graph::ToolSpec;
use ordo_resolver::{IndexClient, Resolution, current_system};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Variables never copied out of a materialised shell. These either leak
/// the invoking user's session or are re-pinned by the local overrides.
const DENY_LIST: &[&str] = &[
    "TERM",
    "SHELL",
    "EDITOR",
    "VISUAL",
    "PAGER",
    "LESS",
    "HOME",
    "USER",
    "LOGNAME",
    "PS1",
    "PS2",
    "SHLVL",
    "PWD",
    "OLDPWD",
    "_",
    "TMPDIR",
    "TEMP",
    "TMP",
    "NIX_BUILD_TOP",
    "NIX_BUILD_CORES",
    "NIX_LOG_FD",
];

/// Resolves a tool package and version to a pinned coordinate.
///
/// Implemented by [`IndexClient`]; tests substitute a fixture resolver.
#[async_trait]
pub trait ToolResolver: Send + Sync {
    /// Resolve `package@version` for the current system.
    async fn resolve(&self, package: &str, version: &str) -> ordo_resolver::Result<Resolution>;
}

#[async_trait]
impl ToolResolver for IndexClient {
    async fn resolve(&self, package: &str, version: &str) -> ordo_resolver::Result<Resolution> {
        Self::resolve(self, package, version).await
    }
}

/// Materialises a shell expression and dumps its variables as JSON.
#[async_trait]
pub trait ShellBuilder: Send + Sync {
    /// Evaluate `expression` and return the builder's JSON variable dump.
    async fn dump(&self, expression: &str) -> Result<String>;
}

/// Compute the deterministic identifier of a tool set.
///
/// Two tool maps with identical sorted `(alias, package@version)` pairs
/// share an identifier, and therefore an environment.
#[must_use]
pub fn env_id(tools: &BTreeMap<String, ToolSpec>) -> String {
    let mut hasher = Sha256::new();
    for (alias, spec) in tools {
        hasher.update(alias.as_bytes());
        hasher.update(b"=");
        hasher.update(spec.to_string().as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

/// Hydrates hermetic environments and shares them across tasks.
///
/// Results are cached at three levels: an in-process memo for the run, an
/// on-disk record per environment identifier, and the resolver's own
/// per-tool cache. A per-identifier guard collapses concurrent requests
/// into a single hydration.
pub struct EnvironmentFactory {
    resolver: Arc<dyn ToolResolver>,
    builder: Arc<dyn ShellBuilder>,
    cache_dir: PathBuf,
    memo: RwLock<HashMap<String, Arc<Vec<String>>>>,
    guards: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl EnvironmentFactory {
    /// Create a factory caching environment records under `cache_dir`.
    pub fn new(
        resolver: Arc<dyn ToolResolver>,
        builder: Arc<dyn ShellBuilder>,
        cache_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            resolver,
            builder,
            cache_dir: cache_dir.into(),
            memo: RwLock::new(HashMap::new()),
            guards: Mutex::new(HashMap::new()),
        }
    }

    /// Produce the sorted `KEY=VALUE` environment for a tool set.
    ///
    /// Deterministic: equal-by-sorted-content tool maps yield byte-identical
    /// results irrespective of iteration order. Local overrides
    /// (`GOTOOLCHAIN`, `TMPDIR`, `TEMP`, `TMP`, `GOCACHE`) are applied on
    /// every return path, including cache hits.
    ///
    /// # Errors
    ///
    /// Returns resolver errors and [`Error::EnvironmentHydration`] when the
    /// builder fails.
    pub async fn get_environment(
        &self,
        tools: &BTreeMap<String, ToolSpec>,
    ) -> Result<Arc<Vec<String>>> {
        let id = env_id(tools);

        if let Some(env) = self.memo_get(&id) {
            return Ok(env);
        }

        // At most one hydration per identifier runs at a time; late
        // arrivals find the memo or the disk cache populated.
        let guard = {
            let mut guards = self.guards.lock().await;
            guards.entry(id.clone()).or_default().clone()
        };
        let _held = guard.lock().await;

        if let Some(env) = self.memo_get(&id) {
            return Ok(env);
        }
        if let Some(entries) = self.read_cache(&id) {
            debug!(env_id = %id, "environment cache hit");
            return Ok(self.memo_put(&id, finalize(&entries)));
        }

        let entries = self.hydrate(tools, &id).await?;
        self.write_cache(&id, &entries);
        Ok(self.memo_put(&id, finalize(&entries)))
    }

    /// Resolve every tool, synthesise the pinned expression, and dump the
    /// shell's variables.
    async fn hydrate(&self, tools: &BTreeMap<String, ToolSpec>, id: &str) -> Result<Vec<String>> {
        info!(env_id = %id, tools = tools.len(), "hydrating environment");
        let system = current_system()?;

        let resolutions = futures::future::try_join_all(
            tools
                .values()
                .map(|spec| self.resolver.resolve(&spec.package, &spec.version)),
        )
        .await?;

        let mut commits: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for resolution in resolutions {
            commits
                .entry(resolution.commit)
                .or_default()
                .insert(resolution.attr_path);
        }

        let Some(expression) = expr::shell_expression(&commits, system) else {
            return Ok(Vec::new());
        };
        let output = self.builder.dump(&expression).await?;
        let entries = parse_builder_dump(&output)?;
        debug!(env_id = %id, variables = entries.len(), "environment hydrated");
        Ok(entries)
    }

    fn memo_get(&self, id: &str) -> Option<Arc<Vec<String>>> {
        self.memo
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    fn memo_put(&self, id: &str, entries: Vec<String>) -> Arc<Vec<String>> {
        let env = Arc::new(entries);
        self.memo
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(id.to_string(), env.clone());
        env
    }

    fn cache_path(&self, id: &str) -> PathBuf {
        self.cache_dir.join(format!("{id}.json"))
    }

    fn read_cache(&self, id: &str) -> Option<Vec<String>> {
        let path = self.cache_path(id);
        let contents = std::fs::read(&path).ok()?;
        match serde_json::from_slice(&contents) {
            Ok(entries) => Some(entries),
            Err(e) => {
                warn!(path = %path.display(), "discarding corrupt environment record: {e}");
                None
            }
        }
    }

    /// Best-effort atomic write; a failed cache write only costs a re-hydration.
    fn write_cache(&self, id: &str, entries: &[String]) {
        let path = self.cache_path(id);
        let result = (|| -> std::io::Result<()> {
            std::fs::create_dir_all(&self.cache_dir)?;
            let tmp = path.with_extension(format!("json.tmp.{}", std::process::id()));
            let json = serde_json::to_vec_pretty(entries).map_err(std::io::Error::other)?;
            std::fs::write(&tmp, json)?;
            std::fs::rename(&tmp, &path)?;
            Ok(())
        })();
        if let Err(e) = result {
            warn!(path = %path.display(), "failed to persist environment record: {e}");
        }
    }
}

/// One variable in the builder's JSON dump.
#[derive(Debug, Deserialize)]
struct DumpedVariable {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    value: serde_json::Value,
}

/// The builder's JSON dump: a map of variables keyed by name.
#[derive(Debug, Deserialize)]
struct BuilderDump {
    variables: BTreeMap<String, DumpedVariable>,
}

/// Parse the builder dump into `KEY=VALUE` entries, dropping deny-listed
/// names and joining array values with `:`.
fn parse_builder_dump(output: &str) -> Result<Vec<String>> {
    let dump: BuilderDump = serde_json::from_str(output)
        .map_err(|e| Error::hydration(format!("unreadable builder dump: {e}")))?;

    let mut entries = Vec::new();
    for (name, variable) in dump.variables {
        if DENY_LIST.contains(&name.as_str()) {
            continue;
        }
        let value = match variable.kind.as_str() {
            "exported" | "var" => match variable.value {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            },
            "array" => match variable.value {
                serde_json::Value::Array(items) => items
                    .into_iter()
                    .map(|item| match item {
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(":"),
                other => other.to_string(),
            },
            _ => continue,
        };
        entries.push(format!("{name}={value}"));
    }
    entries.sort();
    Ok(entries)
}

/// Apply the process-local overrides and return the sorted final set.
fn finalize(entries: &[String]) -> Vec<String> {
    let mut merged: BTreeMap<String, String> = entries
        .iter()
        .filter_map(|entry| entry.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    let go_cache = dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("go-build");
    merged.insert("GOTOOLCHAIN".to_string(), "local".to_string());
    merged.insert("TMPDIR".to_string(), "/tmp".to_string());
    merged.insert("TEMP".to_string(), "/tmp".to_string());
    merged.insert("TMP".to_string(), "/tmp".to_string());
    merged.insert("GOCACHE".to_string(), go_cache.to_string_lossy().into_owned());

    merged
        .into_iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect()
}

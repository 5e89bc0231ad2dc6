//! `ordo run`: execute targets and their dependency closure.

use super::{AppError, load_workspace};
use crate::tracer::ConsoleTracer;
use ordo_envs::{EnvironmentFactory, NixShellBuilder};
use ordo_process::ProcessExecutor;
use ordo_resolver::{DEFAULT_INDEX_URL, IndexClient};
use ordo_scheduler::{RunOptions, Scheduler};
use ordo_store::Store;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Environment variable overriding the package index endpoint.
const INDEX_URL_VAR: &str = "ORDO_INDEX_URL";

/// Per-workspace state directory under the root.
const STATE_DIR: &str = ".ordo";

/// Run `targets` with the given parallelism and cache policy.
///
/// # Errors
///
/// Returns configuration errors and the joined run error.
pub async fn run(
    directory: Option<&PathBuf>,
    targets: &[String],
    jobs: usize,
    no_cache: bool,
    cancel: CancellationToken,
) -> Result<(), AppError> {
    let graph = load_workspace(directory)?;
    let state_dir = graph.root().join(STATE_DIR);

    let store = Store::open(state_dir.join("store"))?;
    let index_url =
        std::env::var(INDEX_URL_VAR).unwrap_or_else(|_| DEFAULT_INDEX_URL.to_string());
    let resolver = IndexClient::new(index_url, resolver_cache_dir())?;
    let environments = EnvironmentFactory::new(
        Arc::new(resolver),
        Arc::new(NixShellBuilder::new()),
        state_dir.join("environments"),
    );

    let scheduler = Scheduler::new(
        Arc::new(ProcessExecutor::new()),
        Arc::new(ConsoleTracer),
        Arc::new(store),
        Arc::new(environments),
    );

    let options = RunOptions {
        parallelism: jobs,
        no_cache,
    };
    debug!(root = %graph.root().display(), ?targets, "starting run");
    scheduler.run(&graph, targets, &options, cancel).await?;
    Ok(())
}

/// The user-level cache directory for package index resolutions.
fn resolver_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("ordo/resolver")
}

//! The execution engine: cache checks, environment lookup, dependency
//! ordering, parallel dispatch, and error propagation.

use crate::plan::{self, BuildPlan};
use crate::ports::{BuildInfoStore, EnvironmentSource, Executor, TaskSpan, Tracer};
use crate::status::{StatusBoard, TaskStatus};
use crate::{Error, Result};
use futures::StreamExt;
use ordo_envs::env_id;
use ordo_graph::{RebuildStrategy, Task, TaskGraph, ToolSpec};
use ordo_hash::OutputDigest;
use ordo_intern::Symbol;
use ordo_store::BuildInfo;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Per-run execution options.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Maximum concurrently running tasks. `0` means one per core.
    pub parallelism: usize,
    /// Bypass cache checks for every task in the run.
    pub no_cache: bool,
}

impl RunOptions {
    /// The parallelism level actually applied.
    #[must_use]
    pub fn effective_parallelism(&self) -> usize {
        if self.parallelism == 0 {
            std::thread::available_parallelism()
                .map(std::num::NonZero::get)
                .unwrap_or(1)
        } else {
            self.parallelism
        }
    }
}

/// How a finished task was satisfied.
enum Completion {
    Executed,
    Cached,
}

struct TaskOutcome {
    name: Symbol,
    result: Result<Completion>,
}

/// Drives a validated task graph to completion.
///
/// All collaborators are injected as capability traits; the scheduler owns
/// only the ordering, the cache decisions, and the status book-keeping.
pub struct Scheduler {
    executor: Arc<dyn Executor>,
    tracer: Arc<dyn Tracer>,
    store: Arc<dyn BuildInfoStore>,
    environments: Arc<dyn EnvironmentSource>,
    status: StatusBoard,
}

impl Scheduler {
    /// Create a scheduler from its collaborator ports.
    pub fn new(
        executor: Arc<dyn Executor>,
        tracer: Arc<dyn Tracer>,
        store: Arc<dyn BuildInfoStore>,
        environments: Arc<dyn EnvironmentSource>,
    ) -> Self {
        Self {
            executor,
            tracer,
            store,
            environments,
            status: StatusBoard::default(),
        }
    }

    /// The observable status board for this scheduler.
    #[must_use]
    pub fn status(&self) -> StatusBoard {
        self.status.clone()
    }

    /// Execute the minimal closure of tasks required to satisfy `targets`.
    ///
    /// The literal target `all` expands to every task. Dependents of a
    /// failed task still run; every failure is joined into the returned
    /// error.
    ///
    /// # Errors
    ///
    /// Returns validation, hydration, and joined per-task failures.
    #[tracing::instrument(name = "run", skip_all, fields(targets = ?targets))]
    pub async fn run(
        &self,
        graph: &TaskGraph,
        targets: &[String],
        options: &RunOptions,
        cancel: CancellationToken,
    ) -> Result<()> {
        graph.validate()?;

        let closure = plan::target_closure(graph, targets)?;
        let order: Vec<Symbol> = graph
            .topo_order()?
            .iter()
            .copied()
            .filter(|name| closure.contains(name))
            .collect();
        for &name in &order {
            self.status.set(name, TaskStatus::Pending);
        }

        let build_plan = BuildPlan::new(graph, targets, &order)?;
        self.tracer.plan(&build_plan);
        info!(tasks = order.len(), "resolved target closure");

        let mut env_ids: HashMap<Symbol, String> = HashMap::new();
        for &name in &order {
            let task = graph.get_task(name)?;
            if task.needs_environment() {
                env_ids.insert(name, env_id(&task.tools));
            }
        }

        let environments = Arc::new(self.hydrate_environments(graph, &order, &env_ids).await?);
        self.execution_loop(graph, &order, &env_ids, environments, options, cancel)
            .await
    }

    /// Phase 1: hydrate every unique environment in the closure, bounded
    /// by the core count. Any failure aborts the run.
    async fn hydrate_environments(
        &self,
        graph: &TaskGraph,
        order: &[Symbol],
        env_ids: &HashMap<Symbol, String>,
    ) -> Result<HashMap<String, Arc<Vec<String>>>> {
        let mut unique: BTreeMap<String, BTreeMap<String, ToolSpec>> = BTreeMap::new();
        for &name in order {
            let Some(id) = env_ids.get(&name) else {
                continue;
            };
            if !unique.contains_key(id) {
                unique.insert(id.clone(), graph.get_task(name)?.tools.clone());
            }
        }
        if unique.is_empty() {
            return Ok(HashMap::new());
        }

        info!(environments = unique.len(), "hydrating tool environments");
        let limit = std::thread::available_parallelism()
            .map(std::num::NonZero::get)
            .unwrap_or(1);
        let mut stream = futures::stream::iter(unique.into_iter().map(|(id, tools)| {
            let source = Arc::clone(&self.environments);
            async move { (id, source.get_environment(&tools).await) }
        }))
        .buffer_unordered(limit);

        let mut hydrated = HashMap::new();
        while let Some((id, result)) = stream.next().await {
            hydrated.insert(id, result?);
        }
        Ok(hydrated)
    }

    /// Phase 2: the ready-FIFO loop. Dependent in-degrees are decremented
    /// on success and failure alike so the loop always terminates.
    async fn execution_loop(
        &self,
        graph: &TaskGraph,
        order: &[Symbol],
        env_ids: &HashMap<Symbol, String>,
        environments: Arc<HashMap<String, Arc<Vec<String>>>>,
        options: &RunOptions,
        cancel: CancellationToken,
    ) -> Result<()> {
        let in_closure: HashSet<Symbol> = order.iter().copied().collect();
        let mut in_degree: HashMap<Symbol, usize> = HashMap::with_capacity(order.len());
        for &name in order {
            let deps: HashSet<Symbol> = graph
                .get_task(name)?
                .dependencies
                .iter()
                .copied()
                .filter(|dep| in_closure.contains(dep))
                .collect();
            in_degree.insert(name, deps.len());
        }

        // Seeded in topological order, which makes single-threaded runs
        // fully deterministic.
        let mut ready: VecDeque<Symbol> = order
            .iter()
            .copied()
            .filter(|name| in_degree[name] == 0)
            .collect();
        let parallelism = options.effective_parallelism().max(1);
        let (tx, mut rx) = mpsc::unbounded_channel::<TaskOutcome>();
        let mut active = 0usize;
        let mut errors: Vec<Error> = Vec::new();
        let mut cancelled = cancel.is_cancelled();
        if cancelled {
            errors.push(Error::Cancelled);
        }

        loop {
            while !cancelled && active < parallelism {
                let Some(name) = ready.pop_front() else { break };
                let task = graph.get_task(name)?.clone();
                self.status.set(name, TaskStatus::Running);
                active += 1;
                debug!(task = %name, active, "dispatching task");

                let worker = TaskWorker {
                    task,
                    root: graph.root().to_path_buf(),
                    env_id: env_ids.get(&name).cloned(),
                    environments: Arc::clone(&environments),
                    executor: Arc::clone(&self.executor),
                    tracer: Arc::clone(&self.tracer),
                    store: Arc::clone(&self.store),
                    no_cache: options.no_cache,
                    cancel: cancel.clone(),
                };
                let tx = tx.clone();
                tokio::spawn(async move {
                    let outcome = worker.run().await;
                    let _ = tx.send(outcome);
                });
            }

            if active == 0 && (ready.is_empty() || cancelled) {
                break;
            }

            tokio::select! {
                biased;
                () = cancel.cancelled(), if !cancelled => {
                    warn!("cancellation requested; draining in-flight tasks");
                    cancelled = true;
                    errors.push(Error::Cancelled);
                }
                outcome = rx.recv() => {
                    let Some(outcome) = outcome else { break };
                    active -= 1;
                    match outcome.result {
                        Ok(Completion::Executed) => self.status.set(outcome.name, TaskStatus::Succeeded),
                        Ok(Completion::Cached) => self.status.set(outcome.name, TaskStatus::Cached),
                        Err(error) => {
                            self.status.set(outcome.name, TaskStatus::Failed);
                            errors.push(error);
                        }
                    }
                    for dependent in graph.dependents(outcome.name)? {
                        if !in_closure.contains(&dependent) {
                            continue;
                        }
                        if let Some(remaining) = in_degree.get_mut(&dependent) {
                            *remaining -= 1;
                            if *remaining == 0 {
                                ready.push_back(dependent);
                            }
                        }
                    }
                }
            }
        }

        Error::join(errors)
    }
}

/// Everything one task needs to run on a worker, owned so the worker can
/// outlive the coordinator's borrows.
struct TaskWorker {
    task: Task,
    root: PathBuf,
    env_id: Option<String>,
    environments: Arc<HashMap<String, Arc<Vec<String>>>>,
    executor: Arc<dyn Executor>,
    tracer: Arc<dyn Tracer>,
    store: Arc<dyn BuildInfoStore>,
    no_cache: bool,
    cancel: CancellationToken,
}

impl TaskWorker {
    async fn run(self) -> TaskOutcome {
        let name = self.task.name;
        let span = self.tracer.task_span(name.as_str());
        let result = self.execute(span.as_ref()).await;
        if let Err(error) = &result {
            span.fail(&error.to_string());
        }
        span.finish();
        TaskOutcome {
            name,
            result: result.map_err(|e| Error::for_task(name.as_str(), e)),
        }
    }

    async fn execute(&self, span: &dyn TaskSpan) -> Result<Completion> {
        let name = self.task.name.as_str();
        let files = ordo_inputs::resolve(&self.task.inputs, &self.root)?;
        let input_hash =
            ordo_hash::input_hash(&self.task.command, &self.task.environment, &files, &self.root)?;

        let use_cache = !self.no_cache && self.task.rebuild == RebuildStrategy::OnChange;
        if use_cache
            && let Some(record) = self.store.get(name)?
            && record.input_hash == input_hash
        {
            let digest = ordo_hash::output_hash(&self.task.outputs, &self.root)?;
            if digest.matches(&record.output_hash) {
                debug!(task = name, "cache hit");
                span.mark_cached();
                return Ok(Completion::Cached);
            }
        }

        self.clean_outputs()?;
        let env = self.task_environment()?;

        if !self.task.command.is_empty() {
            let cwd = self
                .task
                .working_dir
                .map_or_else(|| self.root.clone(), |dir| PathBuf::from(dir.as_str()));
            self.executor
                .execute(&self.task, &cwd, &env, span, &self.cancel)
                .await?;
        }

        if !self.task.outputs.is_empty() {
            match ordo_hash::output_hash(&self.task.outputs, &self.root)? {
                OutputDigest::Hash(output_hash) => {
                    let record = BuildInfo::new(name, input_hash, output_hash);
                    if let Err(e) = self.store.put(&record) {
                        warn!(task = name, "failed to record build info: {e}");
                    }
                }
                OutputDigest::Missing => {
                    warn!(task = name, "declared outputs missing after execution; not caching");
                }
            }
        }
        Ok(Completion::Executed)
    }

    /// Remove declared outputs before execution, refusing any path that
    /// normalises outside the workspace root.
    fn clean_outputs(&self) -> Result<()> {
        for declared in &self.task.outputs {
            let Some(absolute) = contain_output(&self.root, declared) else {
                return Err(Error::OutputOutsideRoot {
                    task: self.task.name.to_string(),
                    path: declared.clone(),
                });
            };
            match std::fs::symlink_metadata(&absolute) {
                Ok(meta) => {
                    let removal = if meta.is_dir() {
                        std::fs::remove_dir_all(&absolute)
                    } else {
                        std::fs::remove_file(&absolute)
                    };
                    if let Err(source) = removal
                        && source.kind() != std::io::ErrorKind::NotFound
                    {
                        return Err(Error::OutputClean {
                            path: absolute,
                            source,
                        });
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(Error::OutputClean {
                        path: absolute,
                        source,
                    });
                }
            }
        }
        Ok(())
    }

    /// The child's full environment: the hydrated tool environment (or the
    /// invoking environment for tool-less tasks) with the task's own
    /// overrides applied last.
    fn task_environment(&self) -> Result<Vec<String>> {
        let base: Vec<String> = match &self.env_id {
            Some(id) => {
                let env =
                    self.environments
                        .get(id)
                        .ok_or_else(|| Error::EnvironmentNotCached {
                            task: self.task.name.to_string(),
                            env_id: id.clone(),
                        })?;
                env.as_ref().clone()
            }
            None => std::env::vars().map(|(k, v)| format!("{k}={v}")).collect(),
        };
        Ok(merge_environment(&base, &self.task.environment))
    }
}

fn merge_environment(base: &[String], overrides: &BTreeMap<String, String>) -> Vec<String> {
    let mut merged: BTreeMap<String, String> = base
        .iter()
        .filter_map(|entry| entry.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    for (key, value) in overrides {
        merged.insert(key.clone(), value.clone());
    }
    merged
        .into_iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect()
}

/// Normalise a declared output against the root. Returns `None` when the
/// path escapes the root or resolves to the root itself.
fn contain_output(root: &Path, declared: &str) -> Option<PathBuf> {
    let mut normalized = PathBuf::new();
    for component in Path::new(declared).components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    return None;
                }
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if normalized.as_os_str().is_empty() {
        return None;
    }
    Some(root.join(normalized))
}

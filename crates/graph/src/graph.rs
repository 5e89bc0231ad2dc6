//! The task graph: storage, validation, and ordered traversal.

use crate::{Error, Result, Task};
use ordo_intern::Symbol;
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

/// Directed acyclic graph of tasks rooted at a single workspace directory.
///
/// Mutation happens through `&mut self`; [`TaskGraph::validate`] takes
/// `&self`, caches its result, and freezes the graph. All path attributes
/// on tasks are interpreted relative to [`TaskGraph::root`].
pub struct TaskGraph {
    root: PathBuf,
    tasks: HashMap<Symbol, Task>,
    validated: OnceLock<Validated>,
}

/// Adjacency and ordering computed by a successful validation.
///
/// Edges run dependency → dependent, so outgoing neighbours of a node are
/// its dependents.
struct Validated {
    graph: DiGraph<Symbol, ()>,
    index: HashMap<Symbol, NodeIndex>,
    topo: Vec<Symbol>,
}

impl TaskGraph {
    /// Create an empty graph rooted at `root`, which must be absolute.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            tasks: HashMap::new(),
            validated: OnceLock::new(),
        }
    }

    /// The workspace root all task paths are relative to.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of tasks in the graph.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Whether a task with this name exists.
    #[must_use]
    pub fn contains(&self, name: Symbol) -> bool {
        self.tasks.contains_key(&name)
    }

    /// Add a task to the graph.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateTask`] if the name is already registered
    /// and [`Error::Frozen`] after a successful validation.
    pub fn add_task(&mut self, task: Task) -> Result<()> {
        if self.validated.get().is_some() {
            return Err(Error::Frozen);
        }
        if self.tasks.contains_key(&task.name) {
            return Err(Error::DuplicateTask {
                task_name: task.name.to_string(),
            });
        }
        debug!(task = %task.name, "added task node");
        self.tasks.insert(task.name, task);
        Ok(())
    }

    /// Look up a task by name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskNotFound`] for unknown names.
    pub fn get_task(&self, name: Symbol) -> Result<&Task> {
        self.tasks.get(&name).ok_or_else(|| Error::TaskNotFound {
            task_name: name.to_string(),
        })
    }

    /// Iterate over all tasks in unspecified order.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    /// Validate the graph: name rules, dependency existence, acyclicity.
    ///
    /// Computes and caches a stable topological order (Kahn's algorithm
    /// with lexicographic tie-breaking). Idempotent; after the first
    /// success the graph is frozen.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReservedTaskName`], [`Error::InvalidTaskName`],
    /// [`Error::MissingDependency`], or [`Error::Cycle`].
    pub fn validate(&self) -> Result<()> {
        if self.validated.get().is_some() {
            return Ok(());
        }

        let mut names: Vec<Symbol> = self.tasks.keys().copied().collect();
        names.sort();

        for &name in &names {
            validate_name(name.as_str())?;
        }

        for &name in &names {
            for &dep in &self.tasks[&name].dependencies {
                if !self.tasks.contains_key(&dep) {
                    return Err(Error::MissingDependency {
                        task: name.to_string(),
                        missing_dependency: dep.to_string(),
                    });
                }
            }
        }

        let mut graph = DiGraph::with_capacity(names.len(), names.len());
        let mut index = HashMap::with_capacity(names.len());
        for &name in &names {
            index.insert(name, graph.add_node(name));
        }
        for &name in &names {
            let to = index[&name];
            for &dep in &self.tasks[&name].dependencies {
                graph.add_edge(index[&dep], to, ());
            }
        }

        let topo = stable_topological_order(&graph, &names, &index);
        if topo.len() != names.len() {
            let emitted: std::collections::HashSet<Symbol> = topo.into_iter().collect();
            let remaining = names
                .iter()
                .filter(|n| !emitted.contains(n))
                .map(ToString::to_string)
                .collect();
            return Err(Error::Cycle { remaining });
        }

        debug!(tasks = names.len(), "graph validated");
        let _ = self.validated.set(Validated { graph, index, topo });
        Ok(())
    }

    /// The cached topological order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotValidated`] before a successful [`Self::validate`].
    pub fn topo_order(&self) -> Result<&[Symbol]> {
        self.validated
            .get()
            .map(|v| v.topo.as_slice())
            .ok_or(Error::NotValidated)
    }

    /// Lazy iteration over tasks in topological order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotValidated`] before a successful [`Self::validate`].
    pub fn walk(&self) -> Result<Walk<'_>> {
        let validated = self.validated.get().ok_or(Error::NotValidated)?;
        Ok(Walk {
            tasks: &self.tasks,
            order: validated.topo.iter(),
        })
    }

    /// Tasks that directly depend on `name`, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotValidated`] before validation and
    /// [`Error::TaskNotFound`] for unknown names.
    pub fn dependents(&self, name: Symbol) -> Result<Vec<Symbol>> {
        let validated = self.validated.get().ok_or(Error::NotValidated)?;
        let idx = validated.index.get(&name).ok_or_else(|| Error::TaskNotFound {
            task_name: name.to_string(),
        })?;
        let mut out: Vec<Symbol> = validated
            .graph
            .neighbors_directed(*idx, Direction::Outgoing)
            .map(|i| validated.graph[i])
            .collect();
        out.sort();
        out.dedup();
        Ok(out)
    }
}

impl std::fmt::Debug for TaskGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskGraph")
            .field("root", &self.root)
            .field("tasks", &self.tasks.len())
            .field("validated", &self.validated.get().is_some())
            .finish()
    }
}

/// Kahn's algorithm with a lexicographic min-heap over ready nodes, so the
/// emitted order is a stable total order for equal graphs.
fn stable_topological_order(
    graph: &DiGraph<Symbol, ()>,
    names: &[Symbol],
    index: &HashMap<Symbol, NodeIndex>,
) -> Vec<Symbol> {
    let mut in_degree: HashMap<NodeIndex, usize> = names
        .iter()
        .map(|n| {
            let idx = index[n];
            (
                idx,
                graph.neighbors_directed(idx, Direction::Incoming).count(),
            )
        })
        .collect();

    let mut ready: BinaryHeap<Reverse<Symbol>> = names
        .iter()
        .filter(|n| in_degree[&index[*n]] == 0)
        .map(|&n| Reverse(n))
        .collect();

    let mut topo = Vec::with_capacity(names.len());
    while let Some(Reverse(name)) = ready.pop() {
        topo.push(name);
        for succ in graph.neighbors_directed(index[&name], Direction::Outgoing) {
            if let Some(d) = in_degree.get_mut(&succ) {
                *d -= 1;
                if *d == 0 {
                    ready.push(Reverse(graph[succ]));
                }
            }
        }
    }
    topo
}

fn validate_name(name: &str) -> Result<()> {
    if name == "all" {
        return Err(Error::ReservedTaskName {
            task_name: name.to_string(),
        });
    }
    if name.is_empty() {
        return Err(Error::InvalidTaskName {
            task_name: name.to_string(),
            reason: "name is empty".to_string(),
        });
    }
    if name.contains(':') {
        let mut parts = name.splitn(3, ':');
        let project = parts.next().unwrap_or_default();
        let task = parts.next().unwrap_or_default();
        if project.is_empty() || task.is_empty() || parts.next().is_some() {
            return Err(Error::InvalidTaskName {
                task_name: name.to_string(),
                reason: "`:` is only valid as a single `<project>:<task>` separator".to_string(),
            });
        }
    }
    Ok(())
}

/// Iterator over tasks in topological order.
///
/// Finite and non-restartable; obtained from [`TaskGraph::walk`].
pub struct Walk<'g> {
    tasks: &'g HashMap<Symbol, Task>,
    order: std::slice::Iter<'g, Symbol>,
}

impl<'g> Iterator for Walk<'g> {
    type Item = &'g Task;

    fn next(&mut self) -> Option<Self::Item> {
        self.order.next().map(|name| &self.tasks[name])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ordo_intern::intern;

    fn task(name: &str, deps: &[&str]) -> Task {
        Task::new(name, vec!["true".to_string()])
            .with_dependencies(deps.iter().map(|d| intern(d)).collect())
    }

    fn graph_of(tasks: &[Task]) -> TaskGraph {
        let mut graph = TaskGraph::new("/workspace");
        for t in tasks {
            graph.add_task(t.clone()).unwrap();
        }
        graph
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let mut graph = TaskGraph::new("/workspace");
        graph.add_task(task("build", &[])).unwrap();
        let err = graph.add_task(task("build", &[])).unwrap_err();
        assert!(matches!(err, Error::DuplicateTask { task_name } if task_name == "build"));
    }

    #[test]
    fn missing_dependency_names_the_edge() {
        let graph = graph_of(&[task("a", &["x"])]);
        let err = graph.validate().unwrap_err();
        match err {
            Error::MissingDependency {
                task,
                missing_dependency,
            } => {
                assert_eq!(task, "a");
                assert_eq!(missing_dependency, "x");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn reserved_name_is_rejected() {
        let graph = graph_of(&[task("all", &[])]);
        let err = graph.validate().unwrap_err();
        assert!(matches!(err, Error::ReservedTaskName { task_name } if task_name == "all"));
    }

    #[test]
    fn project_namespaced_names_are_accepted() {
        let graph = graph_of(&[task("api:build", &[])]);
        graph.validate().unwrap();
    }

    #[test]
    fn malformed_colon_names_are_rejected() {
        for bad in [":build", "api:", "a:b:c"] {
            let graph = graph_of(&[task(bad, &[])]);
            assert!(
                matches!(graph.validate(), Err(Error::InvalidTaskName { .. })),
                "expected `{bad}` to be rejected"
            );
        }
    }

    #[test]
    fn cycle_reports_the_remaining_set() {
        let graph = graph_of(&[task("a", &["c"]), task("b", &["a"]), task("c", &["b"])]);
        let err = graph.validate().unwrap_err();
        match err {
            Error::Cycle { remaining } => {
                assert_eq!(remaining, vec!["a", "b", "c"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let graph = graph_of(&[task("loop", &["loop"])]);
        assert!(matches!(graph.validate(), Err(Error::Cycle { .. })));
    }

    #[test]
    fn walk_requires_validation() {
        let graph = graph_of(&[task("a", &[])]);
        assert!(matches!(graph.walk(), Err(Error::NotValidated)));
    }

    #[test]
    fn walk_emits_each_task_once_in_dependency_order() {
        let graph = graph_of(&[
            task("deploy", &["test"]),
            task("test", &["build"]),
            task("build", &[]),
        ]);
        graph.validate().unwrap();

        let order: Vec<&str> = graph.walk().unwrap().map(|t| t.name.as_str()).collect();
        assert_eq!(order, vec!["build", "test", "deploy"]);
    }

    #[test]
    fn independent_tasks_emit_lexicographically() {
        let graph = graph_of(&[task("zeta", &[]), task("mid", &[]), task("alpha", &[])]);
        graph.validate().unwrap();
        let order: Vec<&str> = graph.walk().unwrap().map(|t| t.name.as_str()).collect();
        assert_eq!(order, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn diamond_orders_shared_dependency_first() {
        // a depends on b and c, both depend on d.
        let graph = graph_of(&[
            task("a", &["b", "c"]),
            task("b", &["d"]),
            task("c", &["d"]),
            task("d", &[]),
        ]);
        graph.validate().unwrap();

        let order: Vec<&str> = graph.walk().unwrap().map(|t| t.name.as_str()).collect();
        assert_eq!(order, vec!["d", "b", "c", "a"]);
    }

    #[test]
    fn dependents_are_the_reverse_edges() {
        let graph = graph_of(&[
            task("a", &["b", "c"]),
            task("b", &["d"]),
            task("c", &["d"]),
            task("d", &[]),
        ]);
        graph.validate().unwrap();

        let deps = graph.dependents(intern("d")).unwrap();
        let names: Vec<&str> = deps.iter().map(|s| s.as_str()).collect();
        assert_eq!(names, vec!["b", "c"]);
        assert!(graph.dependents(intern("a")).unwrap().is_empty());
    }

    #[test]
    fn validate_is_idempotent_and_freezes() {
        let mut graph = TaskGraph::new("/workspace");
        graph.add_task(task("a", &[])).unwrap();
        graph.validate().unwrap();
        graph.validate().unwrap();
        assert!(matches!(graph.add_task(task("b", &[])), Err(Error::Frozen)));
    }

    #[test]
    fn empty_graph_validates() {
        let graph = TaskGraph::new("/workspace");
        graph.validate().unwrap();
        assert_eq!(graph.task_count(), 0);
        assert_eq!(graph.walk().unwrap().count(), 0);
    }
}

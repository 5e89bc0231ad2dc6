//! Target closure resolution and the emitted build plan.

#[cfg(test)]
use crate::Error;
use crate::Result;
use ordo_graph::TaskGraph;
use ordo_intern::{Symbol, intern};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

/// The pseudo-target expanding to every task in the graph.
pub const ALL_TARGET: &str = "all";

/// Compute the reachable target closure: the reflexive-transitive set of
/// dependencies of `targets`.
///
/// # Errors
///
/// Returns [`ordo_graph::Error::TaskNotFound`] (wrapped) for unknown
/// targets.
pub fn target_closure(graph: &TaskGraph, targets: &[String]) -> Result<HashSet<Symbol>> {
    if targets.iter().any(|t| t == ALL_TARGET) {
        return Ok(graph.tasks().map(|t| t.name).collect());
    }

    let mut closure = HashSet::new();
    let mut frontier: Vec<Symbol> = Vec::new();
    for target in targets {
        let name = intern(target);
        // Surfaces TaskNotFound for unknown targets.
        graph.get_task(name)?;
        if closure.insert(name) {
            frontier.push(name);
        }
    }

    while let Some(name) = frontier.pop() {
        for &dep in &graph.get_task(name)?.dependencies {
            if closure.insert(dep) {
                frontier.push(dep);
            }
        }
    }
    Ok(closure)
}

/// The ordered execution plan for one run, emitted to the tracer before
/// any task starts.
#[derive(Debug, Clone, Serialize)]
pub struct BuildPlan {
    /// The targets as the caller listed them.
    pub targets: Vec<String>,
    /// Every task in the closure, in the graph's topological order.
    pub tasks: Vec<String>,
    /// Per-task dependencies, restricted to the closure.
    pub dependencies: BTreeMap<String, Vec<String>>,
}

impl BuildPlan {
    /// Build the plan for a closure given in topological order.
    ///
    /// # Errors
    ///
    /// Propagates graph lookup failures.
    pub fn new(graph: &TaskGraph, targets: &[String], order: &[Symbol]) -> Result<Self> {
        let in_closure: HashSet<Symbol> = order.iter().copied().collect();
        let mut dependencies = BTreeMap::new();
        for &name in order {
            let mut deps: Vec<String> = graph
                .get_task(name)?
                .dependencies
                .iter()
                .filter(|d| in_closure.contains(d))
                .map(ToString::to_string)
                .collect();
            deps.sort();
            deps.dedup();
            dependencies.insert(name.to_string(), deps);
        }
        Ok(Self {
            targets: targets.to_vec(),
            tasks: order.iter().map(ToString::to_string).collect(),
            dependencies,
        })
    }
}

//! The task node type and its supporting value types.

use crate::{Error, Result};
use ordo_intern::Symbol;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// When a task is re-executed relative to its cached fingerprints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RebuildStrategy {
    /// Re-run only when the input fingerprint no longer matches the store.
    #[default]
    OnChange,
    /// Re-run on every invocation, ignoring cached fingerprints.
    Always,
}

/// A tool requirement: a package name pinned to a version.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ToolSpec {
    /// Package name in the external index (e.g. `go`, `golangci-lint`).
    pub package: String,
    /// Requested version (e.g. `1.25`, `latest`).
    pub version: String,
}

impl ToolSpec {
    /// Parse a `package@version` spec string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidToolSpec`] when either side of the `@` is
    /// empty or the separator is missing.
    pub fn parse(spec: &str) -> Result<Self> {
        match spec.split_once('@') {
            Some((package, version)) if !package.is_empty() && !version.is_empty() => Ok(Self {
                package: package.to_string(),
                version: version.to_string(),
            }),
            _ => Err(Error::InvalidToolSpec {
                spec: spec.to_string(),
            }),
        }
    }
}

impl fmt::Display for ToolSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.package, self.version)
    }
}

/// A node in the task graph.
///
/// Input patterns and output paths are stored relative to the workspace
/// root. `working_dir` is `None` for tasks that run at the root.
#[derive(Debug, Clone)]
pub struct Task {
    /// Unique task name. Project tasks are namespaced `<project>:<task>`.
    pub name: Symbol,
    /// Argv tokens. An empty command is legal and means "no-op".
    pub command: Vec<String>,
    /// Glob patterns selecting the task's input files, sorted and deduplicated.
    pub inputs: Vec<String>,
    /// Declared output paths, sorted and deduplicated.
    pub outputs: Vec<String>,
    /// Names of tasks that must complete first.
    pub dependencies: Vec<Symbol>,
    /// User-specified environment overrides, applied after tool variables.
    pub environment: BTreeMap<String, String>,
    /// Absolute working directory; `None` runs at the workspace root.
    pub working_dir: Option<Symbol>,
    /// Tool requirements keyed by alias; empty means no hermetic environment.
    pub tools: BTreeMap<String, ToolSpec>,
    /// Cache bypass policy for this task.
    pub rebuild: RebuildStrategy,
}

impl Task {
    /// Create a task with the given name and command, everything else empty.
    #[must_use]
    pub fn new(name: impl Into<Symbol>, command: Vec<String>) -> Self {
        Self {
            name: name.into(),
            command,
            inputs: Vec::new(),
            outputs: Vec::new(),
            dependencies: Vec::new(),
            environment: BTreeMap::new(),
            working_dir: None,
            tools: BTreeMap::new(),
            rebuild: RebuildStrategy::default(),
        }
    }

    /// Set the input patterns, canonicalising to a sorted, deduplicated list.
    #[must_use]
    pub fn with_inputs(mut self, mut inputs: Vec<String>) -> Self {
        inputs.sort();
        inputs.dedup();
        self.inputs = inputs;
        self
    }

    /// Set the output paths, canonicalising to a sorted, deduplicated list.
    #[must_use]
    pub fn with_outputs(mut self, mut outputs: Vec<String>) -> Self {
        outputs.sort();
        outputs.dedup();
        self.outputs = outputs;
        self
    }

    /// Set the dependency list.
    #[must_use]
    pub fn with_dependencies(mut self, deps: Vec<Symbol>) -> Self {
        self.dependencies = deps;
        self
    }

    /// Set the task-level environment overrides.
    #[must_use]
    pub fn with_environment(mut self, env: BTreeMap<String, String>) -> Self {
        self.environment = env;
        self
    }

    /// Set the working directory.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<Symbol>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set the tool requirements.
    #[must_use]
    pub fn with_tools(mut self, tools: BTreeMap<String, ToolSpec>) -> Self {
        self.tools = tools;
        self
    }

    /// Set the rebuild strategy.
    #[must_use]
    pub fn with_rebuild(mut self, rebuild: RebuildStrategy) -> Self {
        self.rebuild = rebuild;
        self
    }

    /// Whether this task requires a hermetic tool environment.
    #[must_use]
    pub fn needs_environment(&self) -> bool {
        !self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_spec_parses_package_and_version() {
        let spec = ToolSpec::parse("go@1.25").unwrap();
        assert_eq!(spec.package, "go");
        assert_eq!(spec.version, "1.25");
        assert_eq!(spec.to_string(), "go@1.25");
    }

    #[test]
    fn tool_spec_rejects_malformed_input() {
        for bad in ["go", "@1.25", "go@", "@"] {
            assert!(
                matches!(ToolSpec::parse(bad), Err(Error::InvalidToolSpec { .. })),
                "expected `{bad}` to be rejected"
            );
        }
    }

    #[test]
    fn tool_spec_version_may_contain_at_free_text() {
        let spec = ToolSpec::parse("node@22.1.0").unwrap();
        assert_eq!(spec.version, "22.1.0");
    }

    #[test]
    fn inputs_are_sorted_and_deduplicated() {
        let task = Task::new("build", vec![]).with_inputs(vec![
            "src/**/*.rs".into(),
            "Cargo.toml".into(),
            "src/**/*.rs".into(),
        ]);
        assert_eq!(task.inputs, vec!["Cargo.toml", "src/**/*.rs"]);
    }

    #[test]
    fn default_rebuild_is_on_change() {
        let task = Task::new("build", vec!["true".into()]);
        assert_eq!(task.rebuild, RebuildStrategy::OnChange);
        assert!(!task.needs_environment());
    }

    #[test]
    fn rebuild_strategy_deserializes_kebab_case() {
        let always: RebuildStrategy = serde_json::from_str("\"always\"").unwrap();
        assert_eq!(always, RebuildStrategy::Always);
        let on_change: RebuildStrategy = serde_json::from_str("\"on-change\"").unwrap();
        assert_eq!(on_change, RebuildStrategy::OnChange);
    }
}

//! Workspace and project file loading.

use crate::{Error, Result};
use ordo_graph::{RebuildStrategy, Task, TaskGraph, ToolSpec};
use ordo_intern::intern;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name of the configuration file at the workspace root and in each
/// project directory.
pub const CONFIG_FILE: &str = "ordo.yaml";

/// The workspace file: a tool catalog, optional project directories, and
/// root-level tasks.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct WorkspaceFile {
    /// Tool catalog: alias to `package@version`.
    #[serde(default)]
    tools: BTreeMap<String, String>,
    /// Relative paths of project directories carrying their own file.
    #[serde(default)]
    projects: Vec<String>,
    /// Tasks defined at the workspace root.
    #[serde(default)]
    tasks: BTreeMap<String, TaskFile>,
}

/// A project file: same shape minus nested projects.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProjectFile {
    /// Additional catalog entries; project entries shadow workspace ones.
    #[serde(default)]
    tools: BTreeMap<String, String>,
    /// Tasks defined by the project, namespaced on load.
    #[serde(default)]
    tasks: BTreeMap<String, TaskFile>,
}

/// One task as written in YAML.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TaskFile {
    #[serde(default)]
    command: Vec<String>,
    #[serde(default)]
    inputs: Vec<String>,
    #[serde(default)]
    outputs: Vec<String>,
    #[serde(default)]
    dependencies: Vec<String>,
    #[serde(default)]
    env: BTreeMap<String, String>,
    #[serde(default)]
    working_dir: Option<String>,
    #[serde(default)]
    tools: Vec<String>,
    #[serde(default)]
    rebuild: RebuildStrategy,
}

/// Walk upwards from `start` to the nearest directory containing
/// [`CONFIG_FILE`].
///
/// # Errors
///
/// Returns [`Error::ConfigNotFound`] when no ancestor carries one.
pub fn find_root(start: &Path) -> Result<PathBuf> {
    for dir in start.ancestors() {
        if dir.join(CONFIG_FILE).is_file() {
            return Ok(dir.to_path_buf());
        }
    }
    Err(Error::ConfigNotFound {
        path: start.join(CONFIG_FILE),
    })
}

/// Load the workspace rooted at `root` into a validated [`TaskGraph`].
///
/// Project tasks are namespaced `<project>:<task>`; their unqualified
/// dependency references, input patterns, output paths, and working
/// directory are re-rooted at the project directory.
///
/// # Errors
///
/// Returns configuration errors for unreadable or unparsable files, wiring
/// errors for tool references, and graph validation errors.
pub fn load(root: &Path) -> Result<TaskGraph> {
    let root = std::fs::canonicalize(root).map_err(|source| Error::ConfigRead {
        path: root.to_path_buf(),
        source,
    })?;
    let workspace: WorkspaceFile = read_file(&root.join(CONFIG_FILE))?;
    let mut graph = TaskGraph::new(&root);

    for (name, task) in &workspace.tasks {
        let task = build_task(name, task, &workspace.tools, &root, None)?;
        graph.add_task(task)?;
    }

    let mut seen_projects: HashSet<String> = HashSet::new();
    for entry in &workspace.projects {
        let project_dir = Path::new(entry);
        let name = project_name(entry)?;
        if !seen_projects.insert(name.to_string()) {
            return Err(Error::DuplicateProjectName {
                name: name.to_string(),
            });
        }

        let path = root.join(project_dir).join(CONFIG_FILE);
        let project: ProjectFile = read_file(&path)?;
        debug!(project = name, tasks = project.tasks.len(), "loaded project");

        // Project catalog entries shadow workspace ones.
        let mut catalog = workspace.tools.clone();
        catalog.extend(project.tools.clone());

        for (task_name, task) in &project.tasks {
            let qualified = format!("{name}:{task_name}");
            let task = build_task(
                &qualified,
                task,
                &catalog,
                &root,
                Some((name, project_dir)),
            )?;
            graph.add_task(task)?;
        }
    }

    graph.validate()?;
    debug!(tasks = graph.task_count(), root = %graph.root().display(), "workspace loaded");
    Ok(graph)
}

fn read_file<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }
        Err(source) => {
            return Err(Error::ConfigRead {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    serde_yaml::from_str(&contents).map_err(|source| Error::ConfigParse {
        path: path.to_path_buf(),
        source,
    })
}

/// The namespace of a project entry is its final path component.
fn project_name(entry: &str) -> Result<&str> {
    let name = Path::new(entry)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if !valid {
        return Err(Error::InvalidProjectName {
            name: entry.to_string(),
        });
    }
    Ok(name)
}

/// Wire one YAML task into a graph task, resolving tool aliases through
/// the catalog and re-rooting paths for project tasks.
fn build_task(
    qualified_name: &str,
    file: &TaskFile,
    catalog: &BTreeMap<String, String>,
    root: &Path,
    project: Option<(&str, &Path)>,
) -> Result<Task> {
    let mut tools = BTreeMap::new();
    for alias in &file.tools {
        let spec = catalog.get(alias).ok_or_else(|| Error::MissingTool {
            task: qualified_name.to_string(),
            alias: alias.clone(),
        })?;
        tools.insert(alias.clone(), ToolSpec::parse(spec)?);
    }

    let dependencies = file
        .dependencies
        .iter()
        .map(|dep| {
            // Unqualified references inside a project stay in the project.
            match project {
                Some((name, _)) if !dep.contains(':') => intern(&format!("{name}:{dep}")),
                _ => intern(dep),
            }
        })
        .collect();

    let prefix = |rel: &str| match project {
        Some((_, dir)) => dir.join(rel).to_string_lossy().into_owned(),
        None => rel.to_string(),
    };
    let inputs = file.inputs.iter().map(|p| prefix(p)).collect();
    let outputs = file.outputs.iter().map(|p| prefix(p)).collect();

    let working_dir = match (&file.working_dir, project) {
        (Some(dir), Some((_, project_dir))) => Some(root.join(project_dir).join(dir)),
        (Some(dir), None) => Some(root.join(dir)),
        (None, Some((_, project_dir))) => Some(root.join(project_dir)),
        (None, None) => None,
    };

    let mut task = Task::new(qualified_name, file.command.clone())
        .with_inputs(inputs)
        .with_outputs(outputs)
        .with_dependencies(dependencies)
        .with_environment(file.env.clone())
        .with_tools(tools)
        .with_rebuild(file.rebuild);
    if let Some(dir) = working_dir {
        task = task.with_working_dir(dir.to_string_lossy().as_ref());
    }
    Ok(task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    #[test]
    fn loads_a_basic_workspace() {
        let tmp = TempDir::new().unwrap();
        write(
            tmp.path(),
            "ordo.yaml",
            r"
tasks:
  build:
    command: [go, build, ./...]
    inputs: ['**/*.go']
    outputs: [bin/app]
    env: {CGO_ENABLED: '0'}
  test:
    command: [go, test, ./...]
    dependencies: [build]
",
        );

        let graph = load(tmp.path()).unwrap();
        assert_eq!(graph.task_count(), 2);

        let build = graph.get_task(intern("build")).unwrap();
        assert_eq!(build.command, vec!["go", "build", "./..."]);
        assert_eq!(build.outputs, vec!["bin/app"]);
        assert_eq!(build.environment["CGO_ENABLED"], "0");
        assert_eq!(build.rebuild, RebuildStrategy::OnChange);

        let test = graph.get_task(intern("test")).unwrap();
        assert_eq!(test.dependencies, vec![intern("build")]);
    }

    #[test]
    fn wires_tool_aliases_through_the_catalog() {
        let tmp = TempDir::new().unwrap();
        write(
            tmp.path(),
            "ordo.yaml",
            r"
tools:
  go: go@1.25
  lint: golangci-lint@1.60
tasks:
  check:
    command: [golangci-lint, run]
    tools: [go, lint]
",
        );

        let graph = load(tmp.path()).unwrap();
        let check = graph.get_task(intern("check")).unwrap();
        assert_eq!(check.tools.len(), 2);
        assert_eq!(check.tools["go"].to_string(), "go@1.25");
        assert_eq!(check.tools["lint"].package, "golangci-lint");
    }

    #[test]
    fn undeclared_tool_alias_is_rejected() {
        let tmp = TempDir::new().unwrap();
        write(
            tmp.path(),
            "ordo.yaml",
            r"
tasks:
  build:
    command: [go, build]
    tools: [go]
",
        );

        let err = load(tmp.path()).unwrap_err();
        assert!(matches!(
            err,
            Error::MissingTool { task, alias } if task == "build" && alias == "go"
        ));
    }

    #[test]
    fn malformed_tool_spec_is_rejected() {
        let tmp = TempDir::new().unwrap();
        write(
            tmp.path(),
            "ordo.yaml",
            r"
tools:
  go: gowithoutversion
tasks:
  build:
    command: [go, build]
    tools: [go]
",
        );

        let err = load(tmp.path()).unwrap_err();
        assert!(matches!(
            err,
            Error::Graph(ordo_graph::Error::InvalidToolSpec { .. })
        ));
    }

    #[test]
    fn namespaces_project_tasks_and_paths() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "ordo.yaml", "projects: [services/api]\n");
        write(
            tmp.path(),
            "services/api/ordo.yaml",
            r"
tasks:
  build:
    command: [go, build]
    inputs: ['**/*.go']
    outputs: [bin/api]
  test:
    command: [go, test]
    dependencies: [build]
",
        );

        let graph = load(tmp.path()).unwrap();
        assert_eq!(graph.task_count(), 2);

        let build = graph.get_task(intern("api:build")).unwrap();
        assert_eq!(build.inputs, vec!["services/api/**/*.go"]);
        assert_eq!(build.outputs, vec!["services/api/bin/api"]);
        assert!(
            build
                .working_dir
                .unwrap()
                .as_str()
                .ends_with("services/api")
        );

        // Unqualified project dependencies resolve within the project.
        let test = graph.get_task(intern("api:test")).unwrap();
        assert_eq!(test.dependencies, vec![intern("api:build")]);
    }

    #[test]
    fn root_tasks_may_depend_on_project_tasks() {
        let tmp = TempDir::new().unwrap();
        write(
            tmp.path(),
            "ordo.yaml",
            r"
projects: [api]
tasks:
  release:
    command: [./release.sh]
    dependencies: ['api:build']
",
        );
        write(
            tmp.path(),
            "api/ordo.yaml",
            r"
tasks:
  build:
    command: [go, build]
",
        );

        let graph = load(tmp.path()).unwrap();
        let release = graph.get_task(intern("release")).unwrap();
        assert_eq!(release.dependencies, vec![intern("api:build")]);
    }

    #[test]
    fn project_catalog_shadows_the_workspace() {
        let tmp = TempDir::new().unwrap();
        write(
            tmp.path(),
            "ordo.yaml",
            r"
tools:
  go: go@1.24
projects: [api]
",
        );
        write(
            tmp.path(),
            "api/ordo.yaml",
            r"
tools:
  go: go@1.25
tasks:
  build:
    command: [go, build]
    tools: [go]
",
        );

        let graph = load(tmp.path()).unwrap();
        let build = graph.get_task(intern("api:build")).unwrap();
        assert_eq!(build.tools["go"].version, "1.25");
    }

    #[test]
    fn duplicate_project_names_are_rejected() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "ordo.yaml", "projects: [a/web, b/web]\n");
        write(tmp.path(), "a/web/ordo.yaml", "tasks: {}\n");
        write(tmp.path(), "b/web/ordo.yaml", "tasks: {}\n");

        let err = load(tmp.path()).unwrap_err();
        assert!(matches!(err, Error::DuplicateProjectName { name } if name == "web"));
    }

    #[test]
    fn invalid_project_name_is_rejected() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "ordo.yaml", "projects: ['bad name']\n");

        let err = load(tmp.path()).unwrap_err();
        assert!(matches!(err, Error::InvalidProjectName { .. }));
    }

    #[test]
    fn missing_dependency_surfaces_from_validation() {
        let tmp = TempDir::new().unwrap();
        write(
            tmp.path(),
            "ordo.yaml",
            r"
tasks:
  a:
    command: ['true']
    dependencies: [x]
",
        );

        let err = load(tmp.path()).unwrap_err();
        assert!(matches!(
            err,
            Error::Graph(ordo_graph::Error::MissingDependency { task, missing_dependency })
                if task == "a" && missing_dependency == "x"
        ));
    }

    #[test]
    fn reserved_task_name_surfaces_from_validation() {
        let tmp = TempDir::new().unwrap();
        write(
            tmp.path(),
            "ordo.yaml",
            r"
tasks:
  all:
    command: ['true']
",
        );

        let err = load(tmp.path()).unwrap_err();
        assert!(matches!(
            err,
            Error::Graph(ordo_graph::Error::ReservedTaskName { task_name }) if task_name == "all"
        ));
    }

    #[test]
    fn missing_config_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let err = load(tmp.path()).unwrap_err();
        assert!(matches!(err, Error::ConfigNotFound { .. }));
    }

    #[test]
    fn invalid_yaml_is_a_parse_error() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "ordo.yaml", "tasks: [not, a, map]\n");

        let err = load(tmp.path()).unwrap_err();
        assert!(matches!(err, Error::ConfigParse { .. }));
    }

    #[test]
    fn unknown_task_fields_are_parse_errors() {
        let tmp = TempDir::new().unwrap();
        write(
            tmp.path(),
            "ordo.yaml",
            r"
tasks:
  build:
    command: ['true']
    depends_on: [other]
",
        );

        let err = load(tmp.path()).unwrap_err();
        assert!(matches!(err, Error::ConfigParse { .. }));
    }

    #[test]
    fn find_root_walks_up_to_the_config() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "ordo.yaml", "tasks: {}\n");
        let nested = tmp.path().join("services/api/internal");
        std::fs::create_dir_all(&nested).unwrap();

        let root = find_root(&nested).unwrap();
        assert_eq!(root, tmp.path());

        let outside = TempDir::new().unwrap();
        assert!(matches!(
            find_root(outside.path()),
            Err(Error::ConfigNotFound { .. })
        ));
    }
}

//! Task model and dependency DAG for ordo.
//!
//! A [`TaskGraph`] holds the workspace's tasks keyed by interned name,
//! validates the dependency relation (existence, acyclicity, naming rules),
//! and exposes a stable topological order for planning and execution.
//!
//! # Example
//!
//! ```
//! use ordo_graph::{Task, TaskGraph};
//! use ordo_intern::intern;
//!
//! let mut graph = TaskGraph::new("/workspace");
//! graph.add_task(Task::new("build", vec!["make".into()]))?;
//! graph.add_task(
//!     Task::new("test", vec!["make".into(), "test".into()])
//!         .with_dependencies(vec![intern("build")]),
//! )?;
//! graph.validate()?;
//!
//! let order: Vec<_> = graph.walk()?.map(|t| t.name).collect();
//! assert_eq!(order, vec![intern("build"), intern("test")]);
//! # Ok::<(), ordo_graph::Error>(())
//! ```

mod error;
mod graph;
mod task;

pub use error::{Error, Result};
pub use graph::{TaskGraph, Walk};
pub use task::{RebuildStrategy, Task, ToolSpec};

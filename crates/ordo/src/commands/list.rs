//! `ordo list`: show every task in execution order.

use super::{AppError, load_workspace};
use ordo_scheduler::Error as RunError;
use std::path::PathBuf;

/// Print each task with its dependencies, one per line, in topological
/// order.
///
/// # Errors
///
/// Returns configuration loading errors.
pub fn list(directory: Option<&PathBuf>) -> Result<(), AppError> {
    let graph = load_workspace(directory)?;
    for task in graph.walk().map_err(RunError::Graph)? {
        if task.dependencies.is_empty() {
            println!("{}", task.name);
        } else {
            let deps: Vec<String> = task.dependencies.iter().map(ToString::to_string).collect();
            println!("{}  <- {}", task.name, deps.join(", "));
        }
    }
    Ok(())
}

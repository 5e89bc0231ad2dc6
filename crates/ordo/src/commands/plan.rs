//! `ordo plan`: print the execution plan without running anything.

use super::{AppError, load_workspace};
use ordo_scheduler::{BuildPlan, target_closure};
use std::path::PathBuf;

/// Print the JSON plan for `targets` to stdout.
///
/// # Errors
///
/// Returns configuration and closure resolution errors.
pub fn plan(directory: Option<&PathBuf>, targets: &[String]) -> Result<(), AppError> {
    let graph = load_workspace(directory)?;
    let closure = target_closure(&graph, targets)?;
    let order: Vec<_> = graph
        .topo_order()
        .map_err(ordo_scheduler::Error::Graph)?
        .iter()
        .copied()
        .filter(|name| closure.contains(name))
        .collect();

    let plan = BuildPlan::new(&graph, targets, &order)?;
    let rendered = serde_json::to_string_pretty(&plan).map_err(AppError::PlanEncode)?;
    println!("{rendered}");
    Ok(())
}

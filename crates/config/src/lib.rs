//! Workspace configuration loading for ordo.
//!
//! Reads the declarative `ordo.yaml` at the workspace root (plus one per
//! project directory), wires tool aliases through the tool catalog, and
//! produces a validated [`ordo_graph::TaskGraph`]. Project tasks are
//! namespaced `<project>:<task>` with their paths re-rooted at the project
//! directory.

mod error;
mod loader;

pub use error::{Error, Result};
pub use loader::{CONFIG_FILE, find_root, load};

//! Hermetic environment hydration for ordo.
//!
//! A task's tool set (`alias -> package@version`) deterministically
//! identifies an environment. The factory resolves every tool to a pinned
//! nixpkgs commit, synthesises a stable shell expression, materialises it
//! through an external builder, and filters the resulting variables into a
//! sorted `KEY=VALUE` record. Records are cached on disk by environment
//! identifier and shared across concurrent requesters via a per-identifier
//! singleflight guard.

mod error;
mod expr;
mod factory;
mod nix;

pub use error::{Error, Result};
pub use expr::shell_expression;
pub use factory::{EnvironmentFactory, ShellBuilder, ToolResolver, env_id};
pub use nix::NixShellBuilder;

//! Shell builder backed by the `nix` CLI.

use crate::factory::ShellBuilder;
use crate::{Error, Result};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Lines of builder stderr retained in a hydration error.
const STDERR_SNIPPET_LINES: usize = 20;

/// Materialises shells with `nix print-dev-env` and dumps their variables
/// as JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct NixShellBuilder;

impl NixShellBuilder {
    /// Create a builder using the `nix` binary on `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ShellBuilder for NixShellBuilder {
    async fn dump(&self, expression: &str) -> Result<String> {
        debug!(bytes = expression.len(), "evaluating shell expression");

        let output = Command::new("nix")
            .args(["print-dev-env", "--impure", "--json", "--expr", expression])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::hydration(format!("failed to run nix: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let snippet = stderr
                .lines()
                .rev()
                .take(STDERR_SNIPPET_LINES)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect::<Vec<_>>()
                .join("\n");
            return Err(Error::hydration(format!(
                "nix print-dev-env exited with {}: {snippet}",
                output.status
            )));
        }

        String::from_utf8(output.stdout)
            .map_err(|e| Error::hydration(format!("builder emitted non-UTF-8 output: {e}")))
    }
}

//! Package expression synthesis.
//!
//! Builds the textual program handed to the external builder. The output
//! must be byte-stable for a given tool set: commits are iterated in sorted
//! order, attribute paths within a commit are sorted, and the first
//! commit's package set hosts the shell construction.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;

/// Render the pinned shell expression for `commits`, a map from nixpkgs
/// commit hash to the attribute paths required from that commit.
///
/// Returns `None` when the map is empty (no tools means no shell).
#[must_use]
pub fn shell_expression(commits: &BTreeMap<String, BTreeSet<String>>, system: &str) -> Option<String> {
    if commits.is_empty() {
        return None;
    }

    let mut expr = String::new();
    let _ = writeln!(expr, "let");
    let _ = writeln!(expr, "  system = \"{system}\";");
    for (i, commit) in commits.keys().enumerate() {
        let _ = writeln!(
            expr,
            "  flake_{i} = builtins.getFlake (\"github:NixOS/nixpkgs/\" + \"{commit}\");"
        );
        let _ = writeln!(expr, "  pkgs_{i} = flake_{i}.legacyPackages.${{system}};");
    }
    let _ = writeln!(expr, "in");

    let inputs = commits
        .values()
        .enumerate()
        .flat_map(|(i, attrs)| attrs.iter().map(move |attr| format!("pkgs_{i}.{attr}")))
        .collect::<Vec<_>>()
        .join(" ");
    let _ = writeln!(expr, "pkgs_0.mkShell {{ buildInputs = [ {inputs} ]; }}");

    Some(expr)
}

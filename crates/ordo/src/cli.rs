//! Command-line surface.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Log output format options.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    /// Human-readable, one event per line.
    Pretty,
    /// One JSON object per event.
    Json,
}

/// Log level options.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    /// Show all events.
    Trace,
    /// Show debug and above.
    Debug,
    /// Show info and above (default).
    Info,
    /// Show warnings and above.
    Warn,
    /// Show errors only.
    Error,
}

impl LogLevel {
    /// The `tracing` level this option maps to.
    #[must_use]
    pub fn as_tracing(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

/// Monorepo build orchestrator with content-addressed caching and hermetic
/// tool environments.
#[derive(Debug, Parser)]
#[command(name = "ordo", version, about)]
pub struct Cli {
    /// Run as if started in this directory.
    #[arg(short = 'C', long = "directory", global = true, value_name = "DIR")]
    pub directory: Option<PathBuf>,

    /// Minimum level of log events to emit.
    #[arg(long, global = true, value_enum, default_value = "info", env = "ORDO_LOG_LEVEL")]
    pub log_level: LogLevel,

    /// How log events are rendered.
    #[arg(long, global = true, value_enum, default_value = "pretty", env = "ORDO_LOG_FORMAT")]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

/// Top-level subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Execute targets and their dependency closure.
    Run {
        /// Targets to build; `all` expands to every task.
        #[arg(default_value = "all")]
        targets: Vec<String>,

        /// Maximum concurrently running tasks (default: one per core).
        #[arg(short = 'j', long, default_value_t = 0)]
        jobs: usize,

        /// Execute everything, ignoring cached fingerprints.
        #[arg(long)]
        no_cache: bool,
    },

    /// Print the execution plan for targets as JSON without running.
    Plan {
        /// Targets to plan; `all` expands to every task.
        #[arg(default_value = "all")]
        targets: Vec<String>,
    },

    /// List every task in the workspace in execution order.
    List,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_run_with_flags() {
        let cli = Cli::try_parse_from(["ordo", "run", "build", "test", "-j", "4", "--no-cache"])
            .unwrap();
        match cli.command {
            Command::Run {
                targets,
                jobs,
                no_cache,
            } => {
                assert_eq!(targets, vec!["build", "test"]);
                assert_eq!(jobs, 4);
                assert!(no_cache);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn run_defaults_to_all() {
        let cli = Cli::try_parse_from(["ordo", "run"]).unwrap();
        match cli.command {
            Command::Run { targets, jobs, no_cache } => {
                assert_eq!(targets, vec!["all"]);
                assert_eq!(jobs, 0);
                assert!(!no_cache);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn verify_cli_assertions() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}

//! ordo CLI — monorepo build orchestrator.
//!
//! Loads the workspace task graph, decides what changed via
//! content-addressed fingerprints, hydrates hermetic tool environments,
//! and executes the minimal closure of tasks in parallel.

mod cli;
mod commands;
mod trace;
mod tracer;

use clap::Parser;
use cli::{Cli, Command};
use tokio_util::sync::CancellationToken;

/// Exit code for SIGINT (128 + signal number 2).
const EXIT_SIGINT: i32 = 130;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    trace::init(cli.log_level, cli.log_format);

    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("internal error: {panic_info}");
        eprintln!("run with RUST_LOG=debug for more detail");
    }));

    // Ctrl-C flips the token; the scheduler stops dispatching, drains
    // in-flight tasks, and surfaces the cancellation in its joined error.
    let cancel = CancellationToken::new();
    let interrupted = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
    {
        let cancel = cancel.clone();
        let interrupted = interrupted.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                interrupted.store(true, std::sync::atomic::Ordering::SeqCst);
                cancel.cancel();
            }
        });
    }

    let result = match &cli.command {
        Command::Run {
            targets,
            jobs,
            no_cache,
        } => commands::run(cli.directory.as_ref(), targets, *jobs, *no_cache, cancel).await,
        Command::Plan { targets } => commands::plan(cli.directory.as_ref(), targets),
        Command::List => commands::list(cli.directory.as_ref()),
    };

    let exit_code = match result {
        Ok(()) => 0,
        Err(error) => {
            let code = if interrupted.load(std::sync::atomic::Ordering::SeqCst) {
                EXIT_SIGINT
            } else {
                error.exit_code()
            };
            eprintln!("{:?}", miette::Report::new(error));
            code
        }
    };
    std::process::exit(exit_code);
}

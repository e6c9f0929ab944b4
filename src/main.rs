use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;

use haven::config::HavenPaths;
use haven::{Cli, logging};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let paths = HavenPaths::from_env();
    let _log_guard = logging::init(cli.verbose, &paths.logs_dir());
    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "haven starting");

    match haven::run(cli).await {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(e) => {
            tracing::debug!(error = ?e, "command failed");
            eprintln!("{} {e:#}", "✗".red());
            ExitCode::FAILURE
        }
    }
}

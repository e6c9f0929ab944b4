pub mod config;
pub mod duration;
pub mod flows;
pub mod logging;
pub mod paths;
pub mod ssh;
pub mod store;
pub mod sync;
pub mod target;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};

use flows::Services;
use flows::connect::ConnectOptions;
use flows::disconnect::DisconnectOptions;
use flows::exec::ExecOptions;
use flows::status::StatusOptions;

/// Command-line interface.
#[derive(Parser, Debug)]
#[command(
    name = "haven",
    version,
    about = "Connect a local directory to a remote dev workspace with continuous file sync"
)]
pub struct Cli {
    /// Verbose logging to stderr (same as HAVEN_LOG=haven=debug)
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Connect a directory to a remote workspace and start syncing
    Connect {
        /// Local directory (defaults to the connected parent, else the current directory)
        path: Option<PathBuf>,

        /// Remote target: host, user@host or user@host:port
        #[arg(long, short)]
        target: Option<String>,

        /// Idle timeout such as 30m or 2h (0 disables)
        #[arg(long)]
        idle_timeout: Option<String>,

        /// Forget the cached host key before connecting
        #[arg(long, default_value_t = false)]
        reset_host_key: bool,
    },
    /// Stop syncing and end the session
    Disconnect {
        /// Local directory (defaults to the connected parent of the current directory)
        path: Option<PathBuf>,
    },
    /// Show connection and sync status
    Status {
        /// Local directory (defaults to the current directory)
        path: Option<PathBuf>,

        /// Machine-readable JSON output
        #[arg(long)]
        json: bool,

        /// Refresh every 2 seconds until interrupted
        #[arg(long)]
        watch: bool,

        /// Probe SSH live and print detailed diagnostics
        #[arg(long, conflicts_with_all = ["json", "watch"])]
        diagnose: bool,
    },
    /// Run a command in the remote counterpart of the current directory
    Exec {
        /// Local directory to mirror remotely (defaults to the current directory)
        #[arg(long)]
        cwd: Option<PathBuf>,

        /// Command and arguments
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        args: Vec<String>,
    },
    /// Generate shell completions to stdout
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate man page to stdout
    Man,
}

/// Run a parsed command. Returns the process exit code on success.
pub async fn run(cli: Cli) -> Result<i32> {
    let cwd = std::env::current_dir().context("reading current directory")?;

    match cli.command {
        Commands::Connect {
            path,
            target,
            idle_timeout,
            reset_host_key,
        } => {
            let services = Services::from_env();
            let opts = ConnectOptions {
                path,
                target,
                idle_timeout,
                reset_host_key,
            };
            flows::connect::connect(&services, &opts, &cwd).await?;
            Ok(0)
        }
        Commands::Disconnect { path } => {
            let services = Services::from_env();
            flows::disconnect::disconnect(&services, &DisconnectOptions { path }, &cwd).await;
            Ok(0)
        }
        Commands::Status {
            path,
            json,
            watch,
            diagnose,
        } => {
            let services = Services::from_env();
            let opts = StatusOptions {
                path,
                json,
                watch,
                diagnose,
            };
            flows::status::status(&services, &opts, &cwd).await?;
            Ok(0)
        }
        Commands::Exec { cwd: dir, args } => {
            let services = Services::from_env();
            let code = flows::exec::exec(&services, &ExecOptions { cwd: dir, args }, &cwd).await?;
            Ok(code)
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "haven", &mut std::io::stdout());
            Ok(0)
        }
        Commands::Man => {
            let man = clap_mangen::Man::new(Cli::command());
            man.render(&mut std::io::stdout())?;
            Ok(0)
        }
    }
}

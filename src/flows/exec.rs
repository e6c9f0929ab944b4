//! `haven exec`: run a command in the remote counterpart of the current
//! directory.

use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{FlowError, Services};
use crate::paths;
use crate::ssh::quote;

#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    /// Local directory to mirror remotely; defaults to the process cwd.
    pub cwd: Option<PathBuf>,
    pub args: Vec<String>,
}

/// Resolved remote invocation, before it is handed to ssh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteInvocation {
    pub alias: String,
    pub remote_cwd: String,
    pub command: String,
}

/// Work out where and what to run without running it.
pub fn plan(services: &Services, opts: &ExecOptions, cwd: &Path) -> Result<RemoteInvocation, FlowError> {
    let local_cwd = services.canonical(opts.cwd.as_deref().unwrap_or(cwd), cwd);
    let (root, config) = services
        .connections
        .find_ancestor(&local_cwd)
        .ok_or_else(|| FlowError::NoConnection(services.display_path(&local_cwd)))?;

    let remote_cwd = paths::map_to_remote(&root, &config.remote_path, &local_cwd);
    let command = quote::in_directory(&remote_cwd, &opts.args);
    Ok(RemoteInvocation {
        alias: config.alias(),
        remote_cwd,
        command,
    })
}

/// Run the command and return its exit code.
pub async fn exec(services: &Services, opts: &ExecOptions, cwd: &Path) -> Result<i32, FlowError> {
    let invocation = plan(services, opts, cwd)?;
    let tty = std::io::stdin().is_terminal() && std::io::stdout().is_terminal();
    debug!(
        alias = %invocation.alias,
        remote_cwd = %invocation.remote_cwd,
        tty,
        "executing remote command"
    );
    Ok(services
        .ssh
        .exec(&invocation.alias, &invocation.command, tty)
        .await?)
}

//! Command flows: connect, disconnect, status and exec.
//!
//! Each flow is an async function over [`Services`], which bundles the stores
//! and the external collaborators. Production wiring comes from
//! [`Services::from_env`]; tests build one with fakes through
//! [`Services::new`].

pub mod connect;
pub mod disconnect;
pub mod exec;
pub mod remediation;
pub mod status;
pub mod ui;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::config::HavenPaths;
use crate::paths;
use crate::ssh::{
    HostConfigError, IdentityError, KeyGenerator, OpenSsh, SshClient, SshError, SshHostConfig,
    SshIdentity, SshKeygen,
};
use crate::store::{ConnectionConfig, ConnectionStore, SessionStore, StoreError};
use crate::sync::{Mutagen, MutagenInstall, SyncEngine, SyncError};

pub use ui::{Prompter, TerminalPrompter};

#[derive(Error, Debug)]
pub enum FlowError {
    // Input
    #[error("invalid connection target '{0}'. Expected: host, user@host, or user@host:port")]
    InvalidTarget(String),

    #[error("path does not exist or is not a directory: {0}")]
    NotADirectory(String),

    #[error("invalid duration '{0}'. Use forms like 30m, 2h, 1h30m or 0 to disable")]
    InvalidDuration(String),

    #[error("no connection found for {0}")]
    NoConnection(String),

    #[error("{0}. Run interactively or pass --target <host, user@host, or user@host:port>")]
    NotInteractive(String),

    #[error("prompt failed: {0}")]
    Prompt(String),

    #[error("cancelled")]
    Cancelled,

    // Identity and host config
    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    HostConfig(#[from] HostConfigError),

    // Auth
    #[error("cannot connect to {target}: {diagnostic}")]
    AuthFailed { target: String, diagnostic: String },

    #[error("host key for {target} changed. If you trust the new key, run: haven connect --reset-host-key")]
    HostKeyChanged { target: String },

    #[error(transparent)]
    Ssh(#[from] SshError),

    // Sync
    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Stores and collaborators shared by all flows.
#[derive(Clone)]
pub struct Services {
    pub paths: HavenPaths,
    pub connections: ConnectionStore,
    pub sessions: SessionStore,
    pub identity: SshIdentity,
    pub host_config: SshHostConfig,
    pub ssh: Arc<dyn SshClient>,
    pub sync: Arc<dyn SyncEngine>,
    pub prompter: Arc<dyn Prompter>,
}

impl Services {
    pub fn new(
        paths: HavenPaths,
        ssh: Arc<dyn SshClient>,
        sync: Arc<dyn SyncEngine>,
        keygen: Arc<dyn KeyGenerator>,
        prompter: Arc<dyn Prompter>,
    ) -> Self {
        Self {
            connections: ConnectionStore::new(paths.connections_file()),
            sessions: SessionStore::new(paths.sessions_dir()),
            identity: SshIdentity::new(&paths.ssh_dir, keygen),
            host_config: SshHostConfig::new(&paths.ssh_dir),
            paths,
            ssh,
            sync,
            prompter,
        }
    }

    /// OpenSSH, mutagen and the controlling terminal.
    pub fn from_env() -> Self {
        let paths = HavenPaths::from_env();
        let known_hosts = paths.ssh_dir.join("known_hosts");
        let install = MutagenInstall::new(&paths.data_dir);
        Self::new(
            paths,
            Arc::new(OpenSsh::new(known_hosts)),
            Arc::new(Mutagen::new(install)),
            Arc::new(SshKeygen),
            Arc::new(TerminalPrompter),
        )
    }

    /// Canonical form of a user-supplied path, relative to `cwd`.
    pub fn canonical(&self, path: &Path, cwd: &Path) -> PathBuf {
        paths::canonicalize_with(&path.to_string_lossy(), &self.paths.home, cwd)
    }

    /// The directory a command acts on and its stored connection, if any.
    ///
    /// An explicit path is used as given. Otherwise the nearest ancestor of
    /// `cwd` with a stored connection wins, falling back to `cwd` itself.
    pub fn resolve_local(
        &self,
        explicit: Option<&Path>,
        cwd: &Path,
    ) -> (PathBuf, Option<ConnectionConfig>) {
        if let Some(path) = explicit {
            let local = self.canonical(path, cwd);
            let config = self.connections.get(&local);
            return (local, config);
        }
        let cwd = self.canonical(cwd, cwd);
        match self.connections.find_ancestor(&cwd) {
            Some((root, config)) => (root, Some(config)),
            None => (cwd, None),
        }
    }

    pub fn display_path(&self, path: &Path) -> String {
        ui::display_path(path, &self.paths.home)
    }
}

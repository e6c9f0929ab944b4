//! Runtime configuration for haven.
//!
//! haven has no configuration file of its own. Everything is derived from
//! XDG-style environment overrides and the user's home directory:
//!
//! | Purpose                         | Override           | Default                 |
//! |---------------------------------|--------------------|-------------------------|
//! | connections.json, sessions/     | `XDG_CONFIG_HOME`  | `~/.config/haven`       |
//! | sync engine binaries, logs      | `XDG_DATA_HOME`    | `~/.local/share/haven`  |
//! | SSH keys and config fragment    | `HAVEN_SSH_DIR`    | `~/.ssh`                |

use std::path::{Path, PathBuf};

/// Directory name used under the XDG config/data roots.
pub const APP_DIR_NAME: &str = "haven";

/// Domain that shorthand targets expand into (`foo` → `ssh-foo.envhaven.app`).
pub const MANAGED_DOMAIN: &str = "envhaven.app";

/// User assumed when a target does not name one.
pub const DEFAULT_USER: &str = "abc";

/// Default SSH port.
pub const DEFAULT_PORT: u16 = 22;

/// Remote directory under which workspaces live.
pub const REMOTE_WORKSPACE_ROOT: &str = "/config/workspace";

/// Remote environment variable carrying the workspace idle timeout.
pub const REMOTE_IDLE_TIMEOUT_VAR: &str = "HAVEN_IDLE_TIMEOUT";

/// Resolved filesystem locations used by every command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HavenPaths {
    /// Home directory, used for `~` expansion and contraction.
    pub home: PathBuf,
    /// Holds `connections.json` and the `sessions/` directory.
    pub config_dir: PathBuf,
    /// Holds downloaded sync engine binaries and log files.
    pub data_dir: PathBuf,
    /// The user's SSH directory.
    pub ssh_dir: PathBuf,
}

impl HavenPaths {
    /// Resolve paths from the process environment.
    pub fn from_env() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/"));
        Self::resolve(
            home,
            env_path("XDG_CONFIG_HOME"),
            env_path("XDG_DATA_HOME"),
            env_path("HAVEN_SSH_DIR"),
        )
    }

    /// Resolve paths from explicit overrides, falling back to home-relative defaults.
    pub fn resolve(
        home: PathBuf,
        xdg_config: Option<PathBuf>,
        xdg_data: Option<PathBuf>,
        ssh_dir: Option<PathBuf>,
    ) -> Self {
        let config_dir = xdg_config
            .map(|p| p.join(APP_DIR_NAME))
            .unwrap_or_else(|| home.join(".config").join(APP_DIR_NAME));
        let data_dir = xdg_data
            .map(|p| p.join(APP_DIR_NAME))
            .unwrap_or_else(|| home.join(".local").join("share").join(APP_DIR_NAME));
        let ssh_dir = ssh_dir.unwrap_or_else(|| home.join(".ssh"));
        Self {
            home,
            config_dir,
            data_dir,
            ssh_dir,
        }
    }

    /// Build a fully self-contained layout under one root (tests, sandboxes).
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            home: root.join("home"),
            config_dir: root.join("config").join(APP_DIR_NAME),
            data_dir: root.join("data").join(APP_DIR_NAME),
            ssh_dir: root.join("home").join(".ssh"),
        }
    }

    pub fn connections_file(&self) -> PathBuf {
        self.config_dir.join("connections.json")
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.config_dir.join("sessions")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }
}

fn env_path(key: &str) -> Option<PathBuf> {
    dotenvy::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
}

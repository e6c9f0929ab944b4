//! Sync engine lifecycle, keyed by local path.
//!
//! Callers address sessions by the local directory only. The adapter turns
//! that into an engine session name (`haven-<hash>`), which never leaves
//! this module.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, info};

use super::SyncError;
use super::ignore::IgnorePatternSet;
use super::install::MutagenInstall;
use crate::paths;
use crate::store::ConnectionConfig;
use crate::store::json::hash_key;

/// Status keyword reported when no session exists for a path.
pub const NOT_RUNNING: &str = "not-running";

/// Snapshot of one sync session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    /// Engine status keyword (`watching`, `scanning`, ...), or `not-running`.
    pub status: String,
    pub conflicts: Vec<String>,
    pub errors: Vec<String>,
}

impl SyncStatus {
    pub fn not_running() -> Self {
        Self {
            status: NOT_RUNNING.to_string(),
            conflicts: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.status != NOT_RUNNING
    }
}

/// Bidirectional file sync between a local directory and a remote path.
#[async_trait]
pub trait SyncEngine: Send + Sync {
    fn is_installed(&self) -> bool;

    /// Install the engine if missing. A no-op once installed.
    async fn ensure_installed(&self) -> Result<(), SyncError>;

    /// Start or resume syncing `local_path` with `alias:<config.remote_path>`.
    async fn start(
        &self,
        local_path: &Path,
        alias: &str,
        config: &ConnectionConfig,
    ) -> Result<(), SyncError>;

    /// Terminate the session for `local_path`.
    async fn stop(&self, local_path: &Path) -> Result<(), SyncError>;

    /// Wait until in-flight changes for `local_path` have been propagated.
    async fn flush(&self, local_path: &Path) -> Result<(), SyncError>;

    async fn status(&self, local_path: &Path) -> Result<SyncStatus, SyncError>;
}

/// Engine session name for a local directory.
pub fn session_name(local_path: &Path) -> String {
    let canonical = paths::canonicalize(local_path);
    let digest = hash_key(&canonical.to_string_lossy());
    format!("haven-{}", &digest[..16])
}

/// [`SyncEngine`] backed by the mutagen CLI.
#[derive(Debug, Clone)]
pub struct Mutagen {
    install: MutagenInstall,
}

impl Mutagen {
    pub fn new(install: MutagenInstall) -> Self {
        Self { install }
    }

    fn binary(&self) -> Result<PathBuf, SyncError> {
        if self.install.is_installed() {
            Ok(self.install.binary_path())
        } else {
            Err(SyncError::NotInstalled)
        }
    }

    async fn run(&self, args: &[String]) -> Result<String, SyncError> {
        let binary = self.binary()?;
        debug!(args = ?args, "running sync engine");
        let output = Command::new(&binary)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| SyncError::Engine {
                command: args.join(" "),
                message: format!("could not run {}: {e}", binary.display()),
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(SyncError::Engine {
                command: args.join(" "),
                message: stderr,
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn list(&self, name: &str) -> Result<Option<Value>, SyncError> {
        let args = sync_args(["list", "--template", "{{json .}}", name]);
        match self.run(&args).await {
            Ok(stdout) => Ok(parse_list_output(&stdout)),
            // The engine exits non-zero when no session matches.
            Err(SyncError::Engine { message, .. }) if is_missing_session(&message) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl SyncEngine for Mutagen {
    fn is_installed(&self) -> bool {
        self.install.is_installed()
    }

    async fn ensure_installed(&self) -> Result<(), SyncError> {
        self.install.ensure().await.map(|_| ())
    }

    async fn start(
        &self,
        local_path: &Path,
        alias: &str,
        config: &ConnectionConfig,
    ) -> Result<(), SyncError> {
        let name = session_name(local_path);
        if let Some(existing) = self.list(&name).await? {
            if targets_endpoint(&existing, local_path, alias, &config.remote_path) {
                info!(session = %name, "resuming existing sync session");
                self.run(&sync_args(["resume", &name])).await?;
                return Ok(());
            }
            info!(
                session = %name,
                remote = %format!("{alias}:{}", config.remote_path),
                "sync session points elsewhere, recreating"
            );
            self.run(&sync_args(["terminate", &name])).await?;
        }

        let ignores = IgnorePatternSet::for_project(local_path);
        let mut args = sync_args(["create", "--name", &name]);
        args.extend(ignores.to_engine_args());
        args.push(local_path.to_string_lossy().into_owned());
        args.push(format!("{alias}:{}", config.remote_path));

        info!(
            session = %name,
            local_path = %local_path.display(),
            remote = %format!("{alias}:{}", config.remote_path),
            ignores = ignores.len(),
            "creating sync session"
        );
        self.run(&args).await?;
        Ok(())
    }

    async fn stop(&self, local_path: &Path) -> Result<(), SyncError> {
        let name = session_name(local_path);
        self.run(&sync_args(["terminate", &name])).await?;
        debug!(session = %name, "sync session terminated");
        Ok(())
    }

    async fn flush(&self, local_path: &Path) -> Result<(), SyncError> {
        let name = session_name(local_path);
        self.run(&sync_args(["flush", &name])).await?;
        Ok(())
    }

    async fn status(&self, local_path: &Path) -> Result<SyncStatus, SyncError> {
        if !self.is_installed() {
            return Ok(SyncStatus::not_running());
        }
        let name = session_name(local_path);
        Ok(self
            .list(&name)
            .await?
            .map(|session| status_from_session(&session))
            .unwrap_or_else(SyncStatus::not_running))
    }
}

fn sync_args<const N: usize>(rest: [&str; N]) -> Vec<String> {
    std::iter::once("sync")
        .chain(rest)
        .map(String::from)
        .collect()
}

fn is_missing_session(stderr: &str) -> bool {
    let lower = stderr.to_ascii_lowercase();
    lower.contains("unable to locate") || lower.contains("no matching") || lower.contains("not found")
}

/// Whether a listed session already syncs `local_path` with `alias:remote_path`.
fn targets_endpoint(session: &Value, local_path: &Path, alias: &str, remote_path: &str) -> bool {
    let endpoint = |side: &str, field: &str| {
        session
            .get(side)
            .and_then(|e| e.get(field))
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string()
    };
    let alpha = endpoint("alpha", "path");
    let alpha_matches = alpha.is_empty()
        || paths::canonicalize(&alpha) == paths::canonicalize(local_path);
    alpha_matches && endpoint("beta", "host") == alias && endpoint("beta", "path") == remote_path
}

/// First session from `sync list --template '{{json .}}'` output.
fn parse_list_output(stdout: &str) -> Option<Value> {
    let value: Value = serde_json::from_str(stdout.trim()).ok()?;
    match value {
        Value::Array(mut sessions) if !sessions.is_empty() => Some(sessions.swap_remove(0)),
        Value::Object(_) => Some(value),
        _ => None,
    }
}

pub(crate) fn status_from_session(session: &Value) -> SyncStatus {
    let paused = session.get("paused").and_then(Value::as_bool).unwrap_or(false);
    let status = if paused {
        "paused".to_string()
    } else {
        session
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string()
    };

    let conflicts = session
        .get("conflicts")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|c| {
                    c.get("root")
                        .and_then(Value::as_str)
                        .unwrap_or("(unknown path)")
                        .to_string()
                })
                .collect()
        })
        .unwrap_or_default();

    let mut errors = Vec::new();
    if let Some(last) = session.get("lastError").and_then(Value::as_str)
        && !last.is_empty()
    {
        errors.push(last.to_string());
    }
    for key in [
        "alphaScanProblems",
        "betaScanProblems",
        "alphaTransitionProblems",
        "betaTransitionProblems",
    ] {
        if let Some(problems) = session.get(key).and_then(Value::as_array) {
            errors.extend(problems.iter().map(|p| {
                let path = p.get("path").and_then(Value::as_str).unwrap_or("");
                let error = p.get("error").and_then(Value::as_str).unwrap_or("unknown error");
                if path.is_empty() {
                    error.to_string()
                } else {
                    format!("{path}: {error}")
                }
            }));
        }
    }

    SyncStatus {
        status,
        conflicts,
        errors,
    }
}

//! Talking to remote hosts through the system OpenSSH client.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

use super::quote;

/// Seconds passed to `ConnectTimeout` for non-interactive round-trips.
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Diagnostic OpenSSH prints when a cached host key no longer matches.
pub const HOST_KEY_FAILURE: &str = "Host key verification failed";

/// Hard ceiling for a probe, covering hangs after the TCP connect.
const PROBE_DEADLINE: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum SshError {
    #[error("could not run {program}: {source}")]
    Spawn {
        program: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} failed: {stderr}")]
    Failed { command: String, stderr: String },
}

/// Outcome of a non-interactive authenticated round-trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Reachable,
    Failed { diagnostic: String },
}

impl ProbeOutcome {
    pub fn is_reachable(&self) -> bool {
        matches!(self, ProbeOutcome::Reachable)
    }

    /// Raw diagnostic text, empty on success.
    pub fn diagnostic(&self) -> &str {
        match self {
            ProbeOutcome::Reachable => "",
            ProbeOutcome::Failed { diagnostic } => diagnostic,
        }
    }

    pub fn is_host_key_mismatch(&self) -> bool {
        self.diagnostic().contains(HOST_KEY_FAILURE)
    }
}

/// Remote operations the flows need. Fakes stand in for it in tests.
#[async_trait]
pub trait SshClient: Send + Sync {
    /// Non-interactive, short-timeout `echo ok` against `alias`.
    async fn probe(&self, alias: &str) -> ProbeOutcome;

    /// One remote environment variable. Errors and absence both yield `None`.
    async fn remote_env(&self, alias: &str, name: &str) -> Option<String>;

    /// Drop the cached host key for `host`/`port` from `known_hosts`.
    async fn forget_host_key(&self, host: &str, port: u16) -> Result<(), SshError>;

    /// Ask a persistent control master for `alias` to exit.
    async fn close_control_master(&self, alias: &str) -> Result<(), SshError>;

    /// Run `command` remotely with inherited stdio, returning its exit code.
    async fn exec(&self, alias: &str, command: &str, tty: bool) -> Result<i32, SshError>;
}

/// [`SshClient`] that shells out to `ssh` and `ssh-keygen`.
#[derive(Debug, Clone)]
pub struct OpenSsh {
    known_hosts: PathBuf,
}

impl OpenSsh {
    pub fn new(known_hosts: impl Into<PathBuf>) -> Self {
        Self {
            known_hosts: known_hosts.into(),
        }
    }

    fn batch_command(alias: &str) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.arg("-o")
            .arg("BatchMode=yes")
            .arg("-o")
            .arg(format!("ConnectTimeout={CONNECT_TIMEOUT_SECS}"))
            .arg(alias)
            .stdin(Stdio::null());
        cmd
    }
}

/// `host` for port 22, `[host]:port` otherwise, as `known_hosts` stores them.
pub fn known_hosts_name(host: &str, port: u16) -> String {
    if port == 22 {
        host.to_string()
    } else {
        format!("[{host}]:{port}")
    }
}

#[async_trait]
impl SshClient for OpenSsh {
    async fn probe(&self, alias: &str) -> ProbeOutcome {
        let mut cmd = Self::batch_command(alias);
        cmd.arg("echo ok").kill_on_drop(true);
        debug!(alias, "probing SSH connectivity");

        let output = match tokio::time::timeout(PROBE_DEADLINE, cmd.output()).await {
            Err(_) => {
                return ProbeOutcome::Failed {
                    diagnostic: format!(
                        "timed out after {}s waiting for {alias}",
                        PROBE_DEADLINE.as_secs()
                    ),
                };
            }
            Ok(Err(e)) => {
                return ProbeOutcome::Failed {
                    diagnostic: format!("could not run ssh: {e}"),
                };
            }
            Ok(Ok(output)) => output,
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        if output.status.success() && stdout.trim() == "ok" {
            debug!(alias, "probe succeeded");
            return ProbeOutcome::Reachable;
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        debug!(alias, status = ?output.status.code(), stderr = %stderr, "probe failed");
        ProbeOutcome::Failed {
            diagnostic: if stderr.is_empty() {
                format!("ssh exited with {}", output.status)
            } else {
                stderr
            },
        }
    }

    async fn remote_env(&self, alias: &str, name: &str) -> Option<String> {
        let mut cmd = Self::batch_command(alias);
        cmd.arg(quote::printenv(name)).kill_on_drop(true);
        let output = tokio::time::timeout(PROBE_DEADLINE, cmd.output())
            .await
            .ok()?
            .ok()?;
        if !output.status.success() {
            debug!(alias, name, "remote variable not set");
            return None;
        }
        let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
        (!value.is_empty()).then_some(value)
    }

    async fn forget_host_key(&self, host: &str, port: u16) -> Result<(), SshError> {
        if !self.known_hosts.exists() {
            debug!(path = %self.known_hosts.display(), "no known_hosts file; nothing to forget");
            return Ok(());
        }
        let name = known_hosts_name(host, port);
        let output = Command::new("ssh-keygen")
            .arg("-R")
            .arg(&name)
            .arg("-f")
            .arg(&self.known_hosts)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| SshError::Spawn {
                program: "ssh-keygen",
                source,
            })?;
        if !output.status.success() {
            return Err(SshError::Failed {
                command: format!("ssh-keygen -R {name}"),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        debug!(host = %name, "removed cached host key");
        Ok(())
    }

    async fn close_control_master(&self, alias: &str) -> Result<(), SshError> {
        let output = Command::new("ssh")
            .arg("-O")
            .arg("exit")
            .arg(alias)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| SshError::Spawn {
                program: "ssh",
                source,
            })?;
        if !output.status.success() {
            // No master running is the common case.
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            debug!(alias, stderr = %stderr, "no control master to close");
        }
        Ok(())
    }

    async fn exec(&self, alias: &str, command: &str, tty: bool) -> Result<i32, SshError> {
        let mut cmd = Command::new("ssh");
        if tty {
            cmd.arg("-t");
        }
        cmd.arg(alias).arg(command);
        debug!(alias, command, tty, "running remote command");
        let status = cmd.status().await.map_err(|source| SshError::Spawn {
            program: "ssh",
            source,
        })?;
        Ok(match status.code() {
            Some(code) => code,
            None => {
                warn!(alias, "remote command terminated by signal");
                255
            }
        })
    }
}

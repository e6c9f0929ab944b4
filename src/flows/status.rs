//! `haven status`: stored connection, session and live sync state.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use super::ui;
use super::{FlowError, Services};
use crate::duration::format_duration;
use crate::sync::SyncStatus;

/// Refresh interval for `--watch`.
pub const WATCH_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Default)]
pub struct StatusOptions {
    pub path: Option<PathBuf>,
    pub json: bool,
    pub watch: bool,
    pub diagnose: bool,
}

/// What `status` reports. Absent fields are omitted from JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflicts: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}

/// Compose the report for the connection enclosing `path` (or `cwd`).
pub async fn collect(
    services: &Services,
    path: Option<&Path>,
    cwd: &Path,
) -> StatusReport {
    let start = services.canonical(path.unwrap_or(cwd), cwd);
    let Some((local_path, config)) = services.connections.find_ancestor(&start) else {
        debug!(start = %start.display(), "no stored connection");
        return StatusReport::default();
    };

    let session = services.sessions.load(&local_path);
    let sync = services.sync.status(&local_path).await.unwrap_or_else(|e| {
        debug!(error = %e, "sync status query failed");
        SyncStatus {
            status: "error".to_string(),
            conflicts: Vec::new(),
            errors: vec![e.to_string()],
        }
    });

    StatusReport {
        connected: session.as_ref().is_some_and(|s| s.connected),
        host: Some(config.host),
        port: Some(config.port),
        local_path: Some(local_path.to_string_lossy().into_owned()),
        remote_path: Some(config.remote_path),
        sync_status: Some(sync.status),
        session_duration: session.map(|s| format_duration(s.elapsed())),
        conflicts: Some(sync.conflicts),
        errors: Some(sync.errors),
    }
}

pub async fn status(services: &Services, opts: &StatusOptions, cwd: &Path) -> Result<(), FlowError> {
    if opts.diagnose {
        return diagnose(services, opts.path.as_deref(), cwd).await;
    }
    if opts.watch {
        return watch(services, opts, cwd).await;
    }
    let report = collect(services, opts.path.as_deref(), cwd).await;
    render(services, &report, opts.json)
}

fn render(services: &Services, report: &StatusReport, json: bool) -> Result<(), FlowError> {
    if json {
        let text = serde_json::to_string_pretty(report)
            .map_err(|e| FlowError::Store(e.into()))?;
        println!("{text}");
    } else {
        print_report(services, report);
    }
    Ok(())
}

pub fn print_report(services: &Services, report: &StatusReport) {
    let (true, Some(host)) = (report.connected, report.host.as_deref()) else {
        ui::disconnected();
        return;
    };
    ui::connected(&format!("{host}:{}", report.port.unwrap_or_default()));
    if let (Some(local), Some(remote)) = (&report.local_path, &report.remote_path) {
        ui::info(&format!(
            "{} ↔ {remote}",
            services.display_path(Path::new(local))
        ));
    }
    if let Some(sync) = &report.sync_status {
        ui::info(&format!("Sync: {}", describe_sync(sync)));
    }
    if let Some(duration) = &report.session_duration {
        ui::info(&format!("Session: {duration}"));
    }
    if let Some(conflicts) = report.conflicts.as_ref().filter(|c| !c.is_empty()) {
        ui::blank();
        ui::warn(&format!("{} sync conflict(s):", conflicts.len()));
        conflicts.iter().for_each(|c| ui::bullet(c));
    }
    if let Some(errors) = report.errors.as_ref().filter(|e| !e.is_empty()) {
        ui::blank();
        ui::warn("Errors:");
        errors.iter().for_each(|e| ui::bullet(e));
    }
}

/// Human wording for engine status keywords.
pub fn describe_sync(status: &str) -> String {
    match status {
        "watching" => "Watching for changes".to_string(),
        "scanning" => "Scanning files".to_string(),
        "reconciling" => "Reconciling changes".to_string(),
        "staging-alpha" | "staging-beta" => "Staging files".to_string(),
        "transitioning" => "Applying changes".to_string(),
        "saving" => "Saving archive".to_string(),
        "connecting-alpha" | "connecting-beta" => "Connecting".to_string(),
        "disconnected" => "Disconnected".to_string(),
        "paused" => "Paused".to_string(),
        crate::sync::NOT_RUNNING => "Not running".to_string(),
        other => other.to_string(),
    }
}

async fn watch(services: &Services, opts: &StatusOptions, cwd: &Path) -> Result<(), FlowError> {
    let interrupted = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            debug!(error = %e, "could not listen for Ctrl+C");
        }
    };
    let refreshes = watch_until(services, opts, cwd, interrupted).await?;
    debug!(refreshes, "watch interrupted");
    Ok(())
}

/// Re-render every [`WATCH_INTERVAL`] until `stop` resolves. Returns the
/// number of refreshes drawn.
pub async fn watch_until(
    services: &Services,
    opts: &StatusOptions,
    cwd: &Path,
    stop: impl Future<Output = ()>,
) -> Result<usize, FlowError> {
    let clear = ui::stdout_is_terminal();
    let mut ticker = tokio::time::interval(WATCH_INTERVAL);
    let mut refreshes = 0;
    tokio::pin!(stop);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = collect(services, opts.path.as_deref(), cwd).await;
                if clear && let Err(e) = console::Term::stdout().clear_screen() {
                    debug!(error = %e, "could not clear screen");
                }
                render(services, &report, opts.json)?;
                if !opts.json {
                    ui::blank();
                    ui::info("Press Ctrl+C to exit");
                }
                refreshes += 1;
            }
            _ = &mut stop => return Ok(refreshes),
        }
    }
}

/// Live SSH and sync check for the connection enclosing a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnosis {
    pub local_path: PathBuf,
    pub remote: String,
    pub alias: String,
    pub fragment_path: PathBuf,
    pub included: bool,
    /// `None` when the probe succeeded, else its diagnostic.
    pub ssh_error: Option<String>,
    pub sync: SyncStatus,
    pub sync_error: Option<String>,
}

impl Diagnosis {
    /// Report lines as printed by `status --diagnose`.
    pub fn lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!("Local path: {}", self.local_path.display()),
            format!("Remote: {}", self.remote),
            format!("SSH alias: {}", self.alias),
            format!(
                "SSH config: {}{}",
                self.fragment_path.display(),
                if self.included {
                    ""
                } else {
                    " (not included from ~/.ssh/config)"
                }
            ),
            String::new(),
            format!(
                "SSH: {}",
                if self.ssh_error.is_none() { "OK" } else { "FAILED" }
            ),
        ];
        if let Some(error) = &self.ssh_error {
            lines.push(format!("Error: {error}"));
        }
        lines.push(String::new());
        if let Some(error) = &self.sync_error {
            lines.push(format!("Sync error: {error}"));
        }
        lines.push(format!("Sync status: {}", self.sync.status));
        if !self.sync.conflicts.is_empty() {
            lines.push(format!("Conflicts: {}", self.sync.conflicts.len()));
            lines.extend(self.sync.conflicts.iter().map(|c| format!("  - {c}")));
        }
        if !self.sync.errors.is_empty() {
            lines.push("Errors:".to_string());
            lines.extend(self.sync.errors.iter().map(|e| format!("  - {e}")));
        }
        lines
    }
}

/// Probe SSH and query sync for the enclosing connection, if there is one.
pub async fn run_diagnosis(services: &Services, path: Option<&Path>, cwd: &Path) -> Option<Diagnosis> {
    let start = services.canonical(path.unwrap_or(cwd), cwd);
    let (local_path, config) = services.connections.find_ancestor(&start)?;
    let alias = config.alias();

    let probe = services.ssh.probe(&alias).await;
    debug!(alias = %alias, reachable = probe.is_reachable(), "diagnostic probe finished");
    let (sync, sync_error) = match services.sync.status(&local_path).await {
        Ok(sync) => (sync, None),
        Err(e) => (SyncStatus::not_running(), Some(e.to_string())),
    };

    Some(Diagnosis {
        remote: format!(
            "{}@{}:{}{}",
            config.user, config.host, config.port, config.remote_path
        ),
        fragment_path: services.host_config.fragment_path(),
        included: services.host_config.is_included(),
        ssh_error: (!probe.is_reachable()).then(|| probe.diagnostic().to_string()),
        local_path,
        alias,
        sync,
        sync_error,
    })
}

async fn diagnose(services: &Services, path: Option<&Path>, cwd: &Path) -> Result<(), FlowError> {
    println!("=== Haven CLI Diagnostics ===");
    ui::blank();
    match run_diagnosis(services, path, cwd).await {
        Some(diagnosis) => diagnosis.lines().iter().for_each(|l| println!("{l}")),
        None => {
            println!("Status: Not connected");
            println!("No connection configuration found for this directory.");
        }
    }
    Ok(())
}

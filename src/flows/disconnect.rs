//! `haven disconnect`: stop syncing and forget the session.
//!
//! Every step is best effort. Failures are reported and logged, and the
//! session record is always removed at the end.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{info, warn};

use super::ui::{self, Step};
use super::Services;
use crate::duration::format_duration;

#[derive(Debug, Clone, Default)]
pub struct DisconnectOptions {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct DisconnectOutcome {
    pub local_path: PathBuf,
    pub had_connection: bool,
    /// How long the removed session had been running.
    pub session_duration: Option<Duration>,
    /// Steps that failed, in order, with their error text.
    pub failures: Vec<String>,
}

/// Never returns an error; the outcome lists what went wrong.
pub async fn disconnect(services: &Services, opts: &DisconnectOptions, cwd: &Path) -> DisconnectOutcome {
    let (local_path, config) = services.resolve_local(opts.path.as_deref(), cwd);
    let session = services.sessions.load(&local_path);
    let mut failures = Vec::new();
    info!(local_path = %local_path.display(), connected = config.is_some(), "disconnecting");

    if config.is_none() {
        ui::warn(&format!(
            "No connection found for {}",
            services.display_path(&local_path)
        ));
    }

    let step = Step::start("Flushing pending changes");
    match services.sync.flush(&local_path).await {
        Ok(()) => step.succeed("Changes flushed"),
        Err(e) => {
            warn!(error = %e, "flush failed");
            step.fail("Flush failed (continuing anyway)");
            failures.push(format!("flush: {e}"));
        }
    }

    let step = Step::start("Stopping sync");
    match services.sync.stop(&local_path).await {
        Ok(()) => step.succeed("Sync stopped"),
        Err(e) => {
            warn!(error = %e, "stop failed");
            step.fail("Stop sync failed (continuing anyway)");
            failures.push(format!("stop: {e}"));
        }
    }

    if let Some(config) = &config {
        let alias = config.alias();
        if let Err(e) = services.ssh.close_control_master(&alias).await {
            warn!(alias = %alias, error = %e, "closing control master failed");
            failures.push(format!("control master: {e}"));
        }
    }

    if let Err(e) = services.sessions.delete(&local_path) {
        warn!(error = %e, "removing session record failed");
        ui::failure(&format!("Could not remove session record: {e}"));
        failures.push(format!("session: {e}"));
    }

    let session_duration = session.map(|s| s.elapsed());
    ui::blank();
    ui::success("Disconnected");
    if let Some(elapsed) = session_duration {
        ui::info(&format!("Session: {}", format_duration(elapsed)));
    }

    DisconnectOutcome {
        local_path,
        had_connection: config.is_some(),
        session_duration,
        failures,
    }
}

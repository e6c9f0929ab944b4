//! `haven connect`: link a local directory to a remote workspace and start
//! syncing it.
//!
//! The flow runs resolve config → ensure identity → write host block → probe
//! (with remediation on failure) → start sync → persist. Every step before
//! persisting is idempotent, so a failed run is fixed by running it again.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use colored::Colorize;
use tracing::{debug, info, warn};

use super::remediation::{
    self, Decision, KeyInventory, RemediationContext, RemediationOption, RemediationPlan,
};
use super::ui::{self, Step};
use super::{FlowError, Services};
use crate::config::{REMOTE_IDLE_TIMEOUT_VAR, REMOTE_WORKSPACE_ROOT};
use crate::duration::{format_duration, parse_duration};
use crate::paths;
use crate::ssh::HostEntry;
use crate::ssh::config::INCLUDE_DIRECTIVE;
use crate::store::{ConnectionConfig, SessionState};
use crate::target::{self, HostSpec};

#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    pub path: Option<PathBuf>,
    /// Host spec overriding any stored connection.
    pub target: Option<String>,
    pub idle_timeout: Option<String>,
    pub reset_host_key: bool,
}

#[derive(Debug, Clone)]
pub struct ConnectOutcome {
    pub local_path: PathBuf,
    pub config: ConnectionConfig,
    pub session: SessionState,
    /// A managed key was generated because no key existed.
    pub generated_key: bool,
}

pub async fn connect(
    services: &Services,
    opts: &ConnectOptions,
    cwd: &Path,
) -> Result<ConnectOutcome, FlowError> {
    let explicit_idle = opts
        .idle_timeout
        .as_deref()
        .map(|raw| parse_duration(raw).ok_or_else(|| FlowError::InvalidDuration(raw.to_string())))
        .transpose()?;

    let (local_path, stored) = services.resolve_local(opts.path.as_deref(), cwd);
    if !paths::is_directory(&local_path) {
        let shown = opts
            .path
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| local_path.display().to_string());
        return Err(FlowError::NotADirectory(shown));
    }

    let mut config = resolve_config(services, &local_path, opts.target.as_deref(), stored)?;
    let alias = config.alias();
    config.ssh_alias = Some(alias.clone());
    info!(
        local_path = %local_path.display(),
        alias = %alias,
        remote_path = %config.remote_path,
        "connecting"
    );

    let workspace_url = target::workspace_url(opts.target.as_deref());
    let generated_key = ensure_identity(services, workspace_url.as_deref()).await?;
    check_include(services);

    if opts.reset_host_key {
        let step = Step::start("Removing old host key");
        match services.ssh.forget_host_key(&config.host, config.port).await {
            Ok(()) => step.succeed("Host key removed"),
            Err(e) => {
                step.fail("Could not remove host key");
                return Err(e.into());
            }
        }
    }

    write_host_config(services, &config)?;
    probe_with_remediation(services, &config, RemediationContext::new(workspace_url)).await?;

    let idle_timeout = match explicit_idle {
        Some(d) => Some(d),
        None => remote_idle_timeout(services, &alias).await,
    };

    start_sync(services, &local_path, &alias, &config).await?;

    config.last_connected = Some(Utc::now());
    services.connections.save(&local_path, &config)?;
    let session = SessionState::started_now(idle_timeout);
    services.sessions.save(&local_path, &session)?;

    ui::blank();
    ui::success(&format!("Connected to {}:{}", config.host, config.port));
    ui::info(&format!("Local:  {}", services.display_path(&local_path)));
    ui::info(&format!("Remote: {}", config.remote_path));
    if let Some(idle) = idle_timeout.filter(|d| !d.is_zero()) {
        ui::info(&format!("Idle timeout: {}", format_duration(idle)));
    }
    ui::blank();
    ui::info("Run commands remotely: haven exec -- <command>");

    Ok(ConnectOutcome {
        local_path,
        config,
        session,
        generated_key,
    })
}

/// `--target` first, then the stored connection, then an interactive prompt.
fn resolve_config(
    services: &Services,
    local_path: &Path,
    target: Option<&str>,
    stored: Option<ConnectionConfig>,
) -> Result<ConnectionConfig, FlowError> {
    let default_remote = default_remote_path(local_path);
    if let Some(target) = target {
        let spec =
            HostSpec::parse(target).ok_or_else(|| FlowError::InvalidTarget(target.to_string()))?;
        return Ok(ConnectionConfig::from_spec(&spec, default_remote));
    }
    if let Some(config) = stored {
        debug!(alias = %config.alias(), "using stored connection");
        return Ok(config);
    }
    if !services.prompter.is_interactive() {
        return Err(FlowError::NotInteractive(format!(
            "no remote target configured for {}",
            services.display_path(local_path)
        )));
    }

    ui::blank();
    println!("No remote target configured for this directory.");
    ui::blank();
    let input = services
        .prompter
        .input("SSH connection (host or user@host[:port])", None)?;
    let spec = HostSpec::parse(&input).ok_or(FlowError::InvalidTarget(input))?;
    let remote_path = services
        .prompter
        .input("Remote path", Some(&default_remote))?;
    let remote_path = if remote_path.is_empty() {
        default_remote
    } else {
        remote_path
    };
    Ok(ConnectionConfig::from_spec(&spec, remote_path))
}

pub fn default_remote_path(local_path: &Path) -> String {
    format!("{REMOTE_WORKSPACE_ROOT}/{}", paths::base_name(local_path))
}

/// Make sure some key exists. Returns whether one was generated.
async fn ensure_identity(
    services: &Services,
    workspace_url: Option<&str>,
) -> Result<bool, FlowError> {
    let ensured = services.identity.ensure().await?;
    if !ensured.generated {
        return Ok(false);
    }
    if let Some(key) = ensured.keys.first() {
        ui::blank();
        println!("🔑 No SSH keys found. Generated a new key for Haven.");
        ui::success(&format!("Created {}", services.display_path(&key.private_key_path)));
        ui::blank();
        ui::framed("Copy this public key:", std::slice::from_ref(&key.public_key));
        ui::blank();
        ui::info(&ui::key_instructions(workspace_url));
        ui::blank();
        pause(services)?;
    }
    Ok(true)
}

fn check_include(services: &Services) {
    if services.host_config.is_included() {
        return;
    }
    warn!(
        config = %services.host_config.main_config_path().display(),
        "main SSH config does not include the haven fragment"
    );
    ui::warn("SSH config may not include Haven configuration.");
    ui::info("Add this line to the TOP of your ~/.ssh/config:");
    ui::blank();
    println!("   {}", INCLUDE_DIRECTIVE.bold());
    ui::blank();
}

fn write_host_config(services: &Services, config: &ConnectionConfig) -> Result<(), FlowError> {
    let alias = config.alias();
    let identity_files = services.identity.key_paths();
    services.host_config.write_alias(&HostEntry {
        alias: &alias,
        host: &config.host,
        port: config.port,
        user: &config.user,
        identity_files: &identity_files,
    })?;
    Ok(())
}

async fn probe_with_remediation(
    services: &Services,
    config: &ConnectionConfig,
    mut ctx: RemediationContext,
) -> Result<(), FlowError> {
    let alias = config.alias();
    let target = format!("{}:{}", config.host, config.port);

    let step = Step::start("Testing connection");
    let mut outcome = services.ssh.probe(&alias).await;
    if outcome.is_reachable() {
        step.succeed("SSH connection successful");
        return Ok(());
    }
    step.fail("Connection failed");
    print_connection_help(&target);

    loop {
        let auth_failed = |diagnostic: &str| FlowError::AuthFailed {
            target: target.clone(),
            diagnostic: diagnostic.to_string(),
        };
        let keys = KeyInventory {
            has_managed_key: services.identity.has_managed_key(),
            has_existing_keys: !services.identity.find_existing().is_empty(),
        };
        let plan = remediation::plan(outcome.diagnostic(), keys, &ctx);
        debug!(?plan, retries_used = ctx.retries_used, "probe failed, remediating");

        match plan {
            RemediationPlan::HostKeyChanged => {
                ui::info("Host key may have changed. Try: haven connect --reset-host-key");
                return Err(FlowError::HostKeyChanged { target });
            }
            RemediationPlan::GiveUp => {
                ui::blank();
                show_managed_key(services, ctx.workspace_url.as_deref());
                return Err(auth_failed(outcome.diagnostic()));
            }
            RemediationPlan::ShowManagedKey => {
                show_managed_key(services, ctx.workspace_url.as_deref());
                ui::blank();
                ui::info("If using passphrase-protected keys, ensure ssh-agent is running:");
                println!("   eval \"$(ssh-agent -s)\" && ssh-add");
                return Err(auth_failed(outcome.diagnostic()));
            }
            RemediationPlan::Choose(options) => {
                if !services.prompter.is_interactive() {
                    ui::info("Run 'haven connect' in a terminal to set up an SSH key.");
                    return Err(auth_failed(outcome.diagnostic()));
                }
                let choice = choose(services, &options)?;
                apply(services, choice, ctx.workspace_url.as_deref()).await?;
                if remediation::decide(choice) == Decision::NoRetry {
                    return Err(auth_failed(outcome.diagnostic()));
                }

                write_host_config(services, config)?;
                ctx = ctx.after_retry();
                let step = Step::start("Retrying connection");
                outcome = services.ssh.probe(&alias).await;
                if outcome.is_reachable() {
                    step.succeed("SSH connection successful");
                    return Ok(());
                }
                step.fail("Connection still failed");
            }
        }
    }
}

fn print_connection_help(target: &str) {
    ui::blank();
    ui::failure(&format!("Cannot connect to {target}"));
    ui::blank();
    ui::bullet("Workspace may be stopped");
    ui::bullet("Network/firewall blocking port");
    ui::bullet("SSH key not added to workspace");
    ui::blank();
}

fn choose(
    services: &Services,
    options: &[RemediationOption],
) -> Result<RemediationOption, FlowError> {
    ui::warn("SSH authentication failed. This usually means:");
    println!("   • Your key isn't authorized on the workspace, OR");
    println!("   • Your key is passphrase-protected without ssh-agent");
    ui::blank();
    let labels: Vec<String> = options.iter().map(|o| o.label().to_string()).collect();
    let index = services.prompter.select("How do you want to fix this?", &labels, 0)?;
    options.get(index).copied().ok_or(FlowError::Cancelled)
}

async fn apply(
    services: &Services,
    choice: RemediationOption,
    workspace_url: Option<&str>,
) -> Result<(), FlowError> {
    match choice {
        RemediationOption::GenerateManagedKey => {
            ui::blank();
            let step = Step::start("Generating Haven key");
            let key = match services.identity.generate_managed().await {
                Ok(key) => key,
                Err(e) => {
                    step.fail("Key generation failed");
                    return Err(e.into());
                }
            };
            step.succeed(&format!("Created {}", services.display_path(&key.private_key_path)));
            ui::blank();
            ui::framed("Copy this public key:", std::slice::from_ref(&key.public_key));
            ui::blank();
            ui::info(&ui::key_instructions(workspace_url));
            ui::blank();
            pause(services)
        }
        RemediationOption::ShowExistingKeys => {
            let keys: Vec<String> = services
                .identity
                .find_existing()
                .into_iter()
                .map(|k| k.public_key)
                .collect();
            ui::blank();
            ui::framed("Your existing public key(s):", &keys);
            ui::blank();
            ui::info(&ui::key_instructions(workspace_url));
            ui::blank();
            pause(services)
        }
        RemediationOption::UseAgent => {
            ui::blank();
            ui::info("Add your key to ssh-agent:");
            ui::blank();
            println!("   eval \"$(ssh-agent -s)\"");
            println!("   ssh-add");
            ui::blank();
            ui::info("Then run 'haven connect' again.");
            Ok(())
        }
    }
}

fn show_managed_key(services: &Services, workspace_url: Option<&str>) {
    match services.identity.managed_key() {
        Some(key) => {
            ui::framed("Your Haven public key (copy this):", std::slice::from_ref(&key.public_key));
            ui::blank();
            ui::info(&ui::key_instructions(workspace_url));
        }
        None => ui::info("Run 'haven connect' again to generate a Haven key."),
    }
}

fn pause(services: &Services) -> Result<(), FlowError> {
    if services.prompter.is_interactive() {
        services.prompter.pause("Press Enter when ready...")?;
    }
    Ok(())
}

async fn remote_idle_timeout(services: &Services, alias: &str) -> Option<Duration> {
    let raw = services.ssh.remote_env(alias, REMOTE_IDLE_TIMEOUT_VAR).await?;
    let parsed = parse_duration(&raw);
    if parsed.is_none() {
        warn!(value = %raw, var = REMOTE_IDLE_TIMEOUT_VAR, "ignoring invalid remote idle timeout");
    }
    parsed
}

async fn start_sync(
    services: &Services,
    local_path: &Path,
    alias: &str,
    config: &ConnectionConfig,
) -> Result<(), FlowError> {
    let step = Step::start("Starting sync");
    if !services.sync.is_installed() {
        step.update("Setting up file sync (one-time)");
    }
    if let Err(e) = services.sync.ensure_installed().await {
        step.fail("Sync setup failed");
        return Err(e.into());
    }
    match services.sync.start(local_path, alias, config).await {
        Ok(()) => {
            step.succeed("Sync started");
            Ok(())
        }
        Err(e) => {
            step.fail("Sync failed");
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_remote_path_uses_base_name() {
        assert_eq!(
            default_remote_path(Path::new("/work/app")),
            "/config/workspace/app"
        );
        assert_eq!(
            default_remote_path(Path::new("/home/me/my project")),
            "/config/workspace/my project"
        );
    }
}

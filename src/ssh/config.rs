//! Managed SSH host-config fragment.
//!
//! haven keeps its `Host` blocks in `~/.ssh/config.d/haven.conf` and never
//! edits the user's main `~/.ssh/config`. The main config has to `Include`
//! the fragment; [`SshHostConfig::is_included`] only checks for that so the
//! caller can print the directive to add.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tracing::debug;

use super::keys::{ensure_private_dir, set_mode};

/// Fragment file name inside `config.d/`.
pub const FRAGMENT_NAME: &str = "haven.conf";

/// The line users add to `~/.ssh/config`.
pub const INCLUDE_DIRECTIVE: &str = "Include ~/.ssh/config.d/*";

static INCLUDE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*Include\s+.*config\.d/(\*|haven\.conf)").expect("valid include regex")
});

#[derive(Error, Debug)]
pub enum HostConfigError {
    #[error("failed to write SSH config {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read SSH config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Connection details rendered into one `Host` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostEntry<'a> {
    pub alias: &'a str,
    pub host: &'a str,
    pub port: u16,
    pub user: &'a str,
    pub identity_files: &'a [PathBuf],
}

/// The managed fragment under an SSH directory.
#[derive(Debug, Clone)]
pub struct SshHostConfig {
    ssh_dir: PathBuf,
}

impl SshHostConfig {
    pub fn new(ssh_dir: impl Into<PathBuf>) -> Self {
        Self {
            ssh_dir: ssh_dir.into(),
        }
    }

    pub fn fragment_dir(&self) -> PathBuf {
        self.ssh_dir.join("config.d")
    }

    pub fn fragment_path(&self) -> PathBuf {
        self.fragment_dir().join(FRAGMENT_NAME)
    }

    pub fn main_config_path(&self) -> PathBuf {
        self.ssh_dir.join("config")
    }

    pub fn known_hosts_path(&self) -> PathBuf {
        self.ssh_dir.join("known_hosts")
    }

    /// Insert or replace the block for `entry.alias`. Other blocks are kept.
    pub fn write_alias(&self, entry: &HostEntry<'_>) -> Result<(), HostConfigError> {
        let path = self.fragment_path();
        let existing = read_optional(&path)?;
        let updated = upsert_block(&existing, entry.alias, &render_block(entry));

        let to_err = |source| HostConfigError::Write {
            path: path.display().to_string(),
            source,
        };
        ensure_private_dir(&self.ssh_dir).map_err(to_err)?;
        ensure_private_dir(&self.fragment_dir()).map_err(to_err)?;
        std::fs::write(&path, updated).map_err(to_err)?;
        set_mode(&path, 0o600).map_err(to_err)?;
        debug!(alias = entry.alias, path = %path.display(), "wrote SSH host block");
        Ok(())
    }

    /// Remove the block for `alias`; deletes the fragment when nothing is left.
    pub fn remove_alias(&self, alias: &str) -> Result<(), HostConfigError> {
        let path = self.fragment_path();
        let existing = read_optional(&path)?;
        if !has_block(&existing, alias) {
            return Ok(());
        }
        let updated = remove_block(&existing, alias);
        let to_err = |source| HostConfigError::Write {
            path: path.display().to_string(),
            source,
        };
        if updated.trim().is_empty() {
            std::fs::remove_file(&path).map_err(to_err)?;
        } else {
            std::fs::write(&path, updated).map_err(to_err)?;
        }
        debug!(alias, "removed SSH host block");
        Ok(())
    }

    pub fn has_alias(&self, alias: &str) -> bool {
        read_optional(&self.fragment_path())
            .map(|content| has_block(&content, alias))
            .unwrap_or(false)
    }

    /// Whether the main SSH config includes the fragment directory.
    pub fn is_included(&self) -> bool {
        std::fs::read_to_string(self.main_config_path())
            .map(|content| content.lines().any(|l| INCLUDE_RE.is_match(l)))
            .unwrap_or(false)
    }
}

pub fn render_block(entry: &HostEntry<'_>) -> String {
    let mut lines = vec![
        format!("Host {}", entry.alias),
        format!("  HostName {}", entry.host),
        format!("  Port {}", entry.port),
        format!("  User {}", entry.user),
    ];
    lines.extend(
        entry
            .identity_files
            .iter()
            .map(|p| format!("  IdentityFile {}", p.display())),
    );
    lines.extend(
        [
            "ForwardAgent no",
            "ForwardX11 no",
            "StrictHostKeyChecking accept-new",
            "ServerAliveInterval 5",
            "ServerAliveCountMax 3",
        ]
        .iter()
        .map(|l| format!("  {l}")),
    );
    lines.join("\n")
}

/// Replace any block for `alias` in `existing` with `block`.
pub fn upsert_block(existing: &str, alias: &str, block: &str) -> String {
    let kept = remove_block(existing, alias);
    let kept = kept.trim();
    if kept.is_empty() {
        format!("{}\n", block.trim())
    } else {
        format!("{kept}\n\n{}\n", block.trim())
    }
}

/// Drop the block for `alias`: its `Host` line up to the next `Host`/`Match`.
pub fn remove_block(existing: &str, alias: &str) -> String {
    let mut out = Vec::new();
    let mut skipping = false;
    for line in existing.lines() {
        if starts_section(line) {
            skipping = is_host_line_for(line, alias);
        }
        if !skipping {
            out.push(line);
        }
    }
    let joined = out.join("\n");
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}\n")
    }
}

pub fn has_block(existing: &str, alias: &str) -> bool {
    existing.lines().any(|l| is_host_line_for(l, alias))
}

fn keyword(line: &str) -> Option<(&str, &str)> {
    let line = line.trim_start();
    let split = line.find(|c: char| c.is_whitespace() || c == '=')?;
    let (word, rest) = line.split_at(split);
    Some((word, rest.trim_start_matches(|c: char| c.is_whitespace() || c == '=')))
}

fn starts_section(line: &str) -> bool {
    keyword(line)
        .map(|(w, _)| w.eq_ignore_ascii_case("host") || w.eq_ignore_ascii_case("match"))
        .unwrap_or(false)
}

fn is_host_line_for(line: &str, alias: &str) -> bool {
    match keyword(line) {
        Some((w, rest)) if w.eq_ignore_ascii_case("host") => rest.trim() == alias,
        _ => false,
    }
}

fn read_optional(path: &Path) -> Result<String, HostConfigError> {
    match std::fs::read_to_string(path) {
        Ok(c) => Ok(c),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
        Err(source) => Err(HostConfigError::Read {
            path: path.display().to_string(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry<'a>(alias: &'a str, host: &'a str, keys: &'a [PathBuf]) -> HostEntry<'a> {
        HostEntry {
            alias,
            host,
            port: 2222,
            user: "alice",
            identity_files: keys,
        }
    }

    #[test]
    fn test_render_block_layout() {
        let keys = vec![
            PathBuf::from("/home/a/.ssh/id_ed25519"),
            PathBuf::from("/home/a/.ssh/haven_ed25519"),
        ];
        let block = render_block(&entry("haven-abc", "10.0.0.5", &keys));
        let lines: Vec<&str> = block.lines().collect();
        assert_eq!(lines[0], "Host haven-abc");
        assert_eq!(lines[1], "  HostName 10.0.0.5");
        assert_eq!(lines[2], "  Port 2222");
        assert_eq!(lines[3], "  User alice");
        assert_eq!(lines[4], "  IdentityFile /home/a/.ssh/id_ed25519");
        assert_eq!(lines[5], "  IdentityFile /home/a/.ssh/haven_ed25519");
        assert!(block.contains("  StrictHostKeyChecking accept-new"));
        assert!(block.contains("  ForwardAgent no"));
        assert!(block.ends_with("  ServerAliveCountMax 3"));
    }

    #[test]
    fn test_upsert_is_idempotent_and_preserves_other_blocks() {
        let tmp = TempDir::new().unwrap();
        let cfg = SshHostConfig::new(tmp.path().join(".ssh"));
        let keys = vec![PathBuf::from("/k/id_ed25519")];

        cfg.write_alias(&entry("haven-other", "other.example.com", &keys))
            .unwrap();
        cfg.write_alias(&entry("haven-abc", "10.0.0.5", &keys)).unwrap();
        let once = std::fs::read_to_string(cfg.fragment_path()).unwrap();
        cfg.write_alias(&entry("haven-abc", "10.0.0.5", &keys)).unwrap();
        let twice = std::fs::read_to_string(cfg.fragment_path()).unwrap();

        assert_eq!(once, twice);
        assert_eq!(twice.matches("Host haven-abc\n").count(), 1);
        assert_eq!(twice.matches("Host haven-other\n").count(), 1);
        assert!(twice.contains("HostName other.example.com"));
    }

    #[test]
    fn test_upsert_replaces_changed_block() {
        let existing = "Host haven-abc\n  HostName old.example.com\n  Port 22\n\nHost keep\n  HostName keep.example.com\n";
        let keys: Vec<PathBuf> = Vec::new();
        let updated = upsert_block(
            existing,
            "haven-abc",
            &render_block(&entry("haven-abc", "new.example.com", &keys)),
        );
        assert!(!updated.contains("old.example.com"));
        assert!(updated.contains("new.example.com"));
        assert!(updated.starts_with("Host keep\n  HostName keep.example.com\n\nHost haven-abc"));
        assert!(updated.ends_with('\n'));
    }

    #[test]
    fn test_alias_prefix_does_not_match() {
        let existing = "Host haven-abcd\n  HostName x\n";
        assert!(!has_block(existing, "haven-abc"));
        assert_eq!(remove_block(existing, "haven-abc"), existing);
    }

    #[test]
    fn test_block_ends_at_match_section() {
        let existing = "Host haven-abc\n  HostName x\nMatch host foo\n  User bob\n";
        assert_eq!(remove_block(existing, "haven-abc"), "Match host foo\n  User bob\n");
    }

    #[test]
    fn test_remove_alias_deletes_empty_file_and_is_noop_when_absent() {
        let tmp = TempDir::new().unwrap();
        let cfg = SshHostConfig::new(tmp.path());
        cfg.remove_alias("haven-missing").unwrap();
        assert!(!cfg.fragment_path().exists());

        cfg.write_alias(&entry("haven-abc", "h.example.com", &[]))
            .unwrap();
        assert!(cfg.has_alias("haven-abc"));
        cfg.remove_alias("haven-abc").unwrap();
        assert!(!cfg.fragment_path().exists());
        assert!(!cfg.has_alias("haven-abc"));
    }

    #[cfg(unix)]
    #[test]
    fn test_fragment_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = TempDir::new().unwrap();
        let cfg = SshHostConfig::new(tmp.path().join(".ssh"));
        cfg.write_alias(&entry("haven-abc", "h.example.com", &[]))
            .unwrap();
        let mode = |p: &Path| std::fs::metadata(p).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode(&cfg.fragment_path()), 0o600);
        assert_eq!(mode(&cfg.fragment_dir()), 0o700);
    }

    #[test]
    fn test_include_detection() {
        let tmp = TempDir::new().unwrap();
        let cfg = SshHostConfig::new(tmp.path());
        assert!(!cfg.is_included());

        std::fs::write(cfg.main_config_path(), "Host foo\n  User x\n").unwrap();
        assert!(!cfg.is_included());

        std::fs::write(
            cfg.main_config_path(),
            "# personal\nHost foo\n  User x\n\ninclude ~/.ssh/config.d/*\n",
        )
        .unwrap();
        assert!(cfg.is_included());

        std::fs::write(cfg.main_config_path(), "Include ~/.ssh/config.d/haven.conf\n").unwrap();
        assert!(cfg.is_included());
    }
}

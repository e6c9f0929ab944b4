//! SSH identity discovery and managed key generation.
//!
//! haven prefers whatever key pairs the user already has. When none exist it
//! generates its own Ed25519 pair (`haven_ed25519`) without a passphrase, so
//! automated remote commands never stop at a passphrase prompt. The only
//! protection for that key at rest is its file mode (0600).

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

/// Conventional key basenames, checked in order.
pub const DEFAULT_KEY_NAMES: [&str; 3] = ["id_ed25519", "id_rsa", "id_ecdsa"];

/// Basename of the key haven generates and manages.
pub const MANAGED_KEY_NAME: &str = "haven_ed25519";

/// Comment embedded in generated public keys.
pub const MANAGED_KEY_COMMENT: &str = "haven-cli";

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("ssh-keygen failed: {0}")]
    KeygenFailed(String),

    #[error("could not run ssh-keygen: {0}")]
    KeygenUnavailable(#[source] std::io::Error),

    #[error("generated key is missing its public half at {0}")]
    MissingPublicKey(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A private/public key pair on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshKeyInfo {
    pub private_key_path: PathBuf,
    pub public_key_path: PathBuf,
    /// Contents of the `.pub` file, trimmed.
    pub public_key: String,
}

/// Result of [`SshIdentity::ensure`].
#[derive(Debug, Clone)]
pub struct EnsuredKeys {
    pub keys: Vec<SshKeyInfo>,
    /// True when no key existed and a managed one was just created.
    pub generated: bool,
}

/// Creates key pairs. The production implementation shells out to `ssh-keygen`.
#[async_trait]
pub trait KeyGenerator: Send + Sync {
    /// Write an Ed25519 pair without passphrase to `private_key_path` and
    /// `private_key_path.pub`.
    async fn generate(&self, private_key_path: &Path, comment: &str) -> Result<(), IdentityError>;
}

/// [`KeyGenerator`] backed by OpenSSH's `ssh-keygen`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SshKeygen;

#[async_trait]
impl KeyGenerator for SshKeygen {
    async fn generate(&self, private_key_path: &Path, comment: &str) -> Result<(), IdentityError> {
        let output = Command::new("ssh-keygen")
            .arg("-t")
            .arg("ed25519")
            .arg("-f")
            .arg(private_key_path)
            .arg("-N")
            .arg("")
            .arg("-C")
            .arg(comment)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(IdentityError::KeygenUnavailable)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(IdentityError::KeygenFailed(stderr.trim().to_string()));
        }
        Ok(())
    }
}

/// Read-only view over the user's SSH keys plus managed key generation.
#[derive(Clone)]
pub struct SshIdentity {
    ssh_dir: PathBuf,
    keygen: Arc<dyn KeyGenerator>,
}

impl SshIdentity {
    pub fn new(ssh_dir: impl Into<PathBuf>, keygen: Arc<dyn KeyGenerator>) -> Self {
        Self {
            ssh_dir: ssh_dir.into(),
            keygen,
        }
    }

    pub fn ssh_dir(&self) -> &Path {
        &self.ssh_dir
    }

    pub fn managed_key_path(&self) -> PathBuf {
        self.ssh_dir.join(MANAGED_KEY_NAME)
    }

    /// Every usable pair: both files present and a non-empty public key.
    pub fn find_existing(&self) -> Vec<SshKeyInfo> {
        DEFAULT_KEY_NAMES
            .iter()
            .chain(std::iter::once(&MANAGED_KEY_NAME))
            .filter_map(|name| read_pair(&self.ssh_dir.join(name)))
            .collect()
    }

    pub fn key_paths(&self) -> Vec<PathBuf> {
        self.find_existing()
            .into_iter()
            .map(|k| k.private_key_path)
            .collect()
    }

    pub fn has_managed_key(&self) -> bool {
        let path = self.managed_key_path();
        path.exists() && public_path(&path).exists()
    }

    pub fn managed_key(&self) -> Option<SshKeyInfo> {
        read_pair(&self.managed_key_path())
    }

    /// Existing keys if any, otherwise a freshly generated managed key.
    pub async fn ensure(&self) -> Result<EnsuredKeys, IdentityError> {
        let existing = self.find_existing();
        if !existing.is_empty() {
            debug!(count = existing.len(), "using existing SSH keys");
            return Ok(EnsuredKeys {
                keys: existing,
                generated: false,
            });
        }
        let key = self.generate_managed().await?;
        Ok(EnsuredKeys {
            keys: vec![key],
            generated: true,
        })
    }

    /// Generate the managed key pair, replacing any half-written leftovers.
    pub async fn generate_managed(&self) -> Result<SshKeyInfo, IdentityError> {
        ensure_private_dir(&self.ssh_dir)?;

        let private = self.managed_key_path();
        let public = public_path(&private);
        for stale in [&private, &public] {
            match std::fs::remove_file(stale) {
                Ok(()) => debug!(path = %stale.display(), "removed stale key file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        self.keygen.generate(&private, MANAGED_KEY_COMMENT).await?;
        set_mode(&private, 0o600)?;
        set_mode(&public, 0o644)?;

        let key = read_pair(&private)
            .ok_or_else(|| IdentityError::MissingPublicKey(public.display().to_string()))?;
        info!(path = %private.display(), "generated managed SSH key");
        Ok(key)
    }
}

fn public_path(private: &Path) -> PathBuf {
    let mut name = private.as_os_str().to_os_string();
    name.push(".pub");
    PathBuf::from(name)
}

fn read_pair(private: &Path) -> Option<SshKeyInfo> {
    let public = public_path(private);
    if !private.exists() || !public.exists() {
        return None;
    }
    let public_key = std::fs::read_to_string(&public).ok()?.trim().to_string();
    if public_key.is_empty() {
        return None;
    }
    Some(SshKeyInfo {
        private_key_path: private.to_path_buf(),
        public_key_path: public,
        public_key,
    })
}

pub(crate) fn ensure_private_dir(dir: &Path) -> std::io::Result<()> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)?;
        set_mode(dir, 0o700)?;
    }
    Ok(())
}

#[cfg(unix)]
pub(crate) fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
pub(crate) fn set_mode(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

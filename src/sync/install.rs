//! One-time download of the sync engine binaries.
//!
//! Releases are fetched from GitHub, unpacked with `tar` into
//! `<data>/mutagen/bin/`, and left there for every later invocation. The
//! archive also carries the agent bundle mutagen copies to remote hosts.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use reqwest::Client;
use tokio::process::Command;
use tracing::{debug, info};

use super::SyncError;
use crate::ssh::keys::set_mode;

/// Pinned engine release.
pub const MUTAGEN_VERSION: &str = "0.17.6";

const HTTP_TIMEOUT_SECS: u64 = 300;

/// Release archive naming for the running platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleasePlatform {
    pub os: &'static str,
    pub arch: &'static str,
}

impl ReleasePlatform {
    /// Map Rust target names onto release names. Only macOS and Linux on
    /// x86_64/aarch64 have builds.
    pub fn detect(os: &str, arch: &str) -> Result<Self, SyncError> {
        let os = match os {
            "macos" => "darwin",
            "linux" => "linux",
            other => {
                return Err(SyncError::UnsupportedPlatform(format!(
                    "{other}: haven supports macOS and Linux only"
                )));
            }
        };
        let arch = match arch {
            "x86_64" => "amd64",
            "aarch64" => "arm64",
            other => {
                return Err(SyncError::UnsupportedPlatform(format!(
                    "{other}: haven supports x86_64 and arm64 only"
                )));
            }
        };
        Ok(Self { os, arch })
    }

    pub fn current() -> Result<Self, SyncError> {
        Self::detect(std::env::consts::OS, std::env::consts::ARCH)
    }

    pub fn download_url(&self, version: &str) -> String {
        format!(
            "https://github.com/mutagen-io/mutagen/releases/download/v{version}/mutagen_{}_{}_v{version}.tar.gz",
            self.os, self.arch
        )
    }
}

/// Location of the engine binaries and how to obtain them.
#[derive(Debug, Clone)]
pub struct MutagenInstall {
    bin_dir: PathBuf,
}

impl MutagenInstall {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            bin_dir: data_dir.join("mutagen").join("bin"),
        }
    }

    pub fn bin_dir(&self) -> &Path {
        &self.bin_dir
    }

    pub fn binary_path(&self) -> PathBuf {
        self.bin_dir.join("mutagen")
    }

    pub fn is_installed(&self) -> bool {
        self.binary_path().exists()
    }

    /// Download and unpack unless the binary is already present.
    pub async fn ensure(&self) -> Result<PathBuf, SyncError> {
        if self.is_installed() {
            debug!(path = %self.binary_path().display(), "sync engine already installed");
            return Ok(self.binary_path());
        }
        let platform = ReleasePlatform::current()?;
        self.install_from(&platform.download_url(MUTAGEN_VERSION)).await?;
        Ok(self.binary_path())
    }

    async fn install_from(&self, url: &str) -> Result<(), SyncError> {
        let tar = which::which("tar")
            .map_err(|_| SyncError::Extract("tar not found on PATH".to_string()))?;
        std::fs::create_dir_all(&self.bin_dir)?;
        info!(url, "downloading sync engine");

        let client = Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .user_agent(concat!("haven/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::Download(e.to_string()))?;
        let response = client
            .get(url)
            .send()
            .await
            .map_err(|e| SyncError::Download(e.to_string()))?;
        if !response.status().is_success() {
            return Err(SyncError::Download(format!(
                "{url} returned {}",
                response.status()
            )));
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| SyncError::Download(e.to_string()))?;

        let mut archive = tempfile::Builder::new()
            .prefix("mutagen-")
            .suffix(".tar.gz")
            .tempfile_in(&self.bin_dir)?;
        archive.write_all(&body)?;
        archive.flush()?;
        debug!(bytes = body.len(), "sync engine archive downloaded");

        let output = Command::new(&tar)
            .arg("-xzf")
            .arg(archive.path())
            .arg("-C")
            .arg(&self.bin_dir)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| SyncError::Extract(format!("could not run tar: {e}")))?;
        if !output.status.success() {
            return Err(SyncError::Extract(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let binary = self.binary_path();
        if !binary.exists() {
            return Err(SyncError::Extract(format!(
                "archive did not contain {}",
                binary.display()
            )));
        }
        set_mode(&binary, 0o755)?;
        info!(path = %binary.display(), "sync engine installed");
        Ok(())
    }
}

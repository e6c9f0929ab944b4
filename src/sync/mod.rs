//! Continuous file sync between a local directory and the remote workspace.

pub mod engine;
pub mod ignore;
pub mod install;

use thiserror::Error;

pub use engine::{Mutagen, NOT_RUNNING, SyncEngine, SyncStatus};
pub use ignore::IgnorePatternSet;
pub use install::MutagenInstall;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("unsupported platform {0}")]
    UnsupportedPlatform(String),

    #[error("failed to download sync engine: {0}")]
    Download(String),

    #[error("failed to extract sync engine: {0}")]
    Extract(String),

    #[error("sync engine is not installed")]
    NotInstalled,

    #[error("sync engine command `{command}` failed: {message}")]
    Engine { command: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

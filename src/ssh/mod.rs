//! SSH identity, host configuration and remote access.

pub mod client;
pub mod config;
pub mod keys;
pub mod quote;

pub use client::{OpenSsh, ProbeOutcome, SshClient, SshError};
pub use config::{HostConfigError, HostEntry, SshHostConfig};
pub use keys::{IdentityError, KeyGenerator, SshIdentity, SshKeyInfo, SshKeygen};

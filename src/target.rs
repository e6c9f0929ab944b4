//! Connection targets: the `user@host[:port]` grammar and SSH alias derivation.

use std::fmt;
use std::hash::Hasher;

use fxhash::FxHasher64;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::{DEFAULT_PORT, DEFAULT_USER, MANAGED_DOMAIN};

static FULL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([^@]+)@([^:]+)(?::(\d+))?$").expect("target regex is valid"));

static SHORTHAND_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9-]+$").expect("shorthand regex is valid"));

static HOSTNAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^([a-zA-Z0-9]([a-zA-Z0-9-]*[a-zA-Z0-9])?\.)*[a-zA-Z0-9]([a-zA-Z0-9-]*[a-zA-Z0-9])?$",
    )
    .expect("hostname regex is valid")
});

/// A parsed connection target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSpec {
    pub user: String,
    pub host: String,
    pub port: u16,
}

impl HostSpec {
    /// Parse a target string.
    ///
    /// Accepted forms:
    /// - `user@host` / `user@host:port`
    /// - a bare token of letters, digits and hyphens (no `@`, `:` or `.`),
    ///   which expands to `ssh-<token>.envhaven.app`
    /// - a bare hostname such as `dev.example.com`
    pub fn parse(input: &str) -> Option<Self> {
        if let Some(caps) = FULL_RE.captures(input) {
            let user = caps.get(1)?.as_str();
            let host = caps.get(2)?.as_str();
            let port = match caps.get(3) {
                Some(p) => p.as_str().parse::<u32>().ok()?,
                None => u32::from(DEFAULT_PORT),
            };
            if user.is_empty() || host.is_empty() || port == 0 || port > 65535 {
                return None;
            }
            return Some(Self {
                user: user.to_string(),
                host: host.to_string(),
                port: u16::try_from(port).ok()?,
            });
        }

        if !input.contains(['@', ':', '.']) && SHORTHAND_RE.is_match(input) {
            return Some(Self {
                user: DEFAULT_USER.to_string(),
                host: format!("ssh-{input}.{MANAGED_DOMAIN}"),
                port: DEFAULT_PORT,
            });
        }

        if HOSTNAME_RE.is_match(input) {
            return Some(Self {
                user: DEFAULT_USER.to_string(),
                host: input.to_string(),
                port: DEFAULT_PORT,
            });
        }

        None
    }

    pub fn alias(&self) -> String {
        derive_alias(&self.host, self.port)
    }
}

/// Renders as `user@host`, with ` -p <port>` for non-default ports.
impl fmt::Display for HostSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", ssh_string(&self.user, &self.host, self.port))
    }
}

pub fn ssh_string(user: &str, host: &str, port: u16) -> String {
    if port == DEFAULT_PORT {
        format!("{user}@{host}")
    } else {
        format!("{user}@{host} -p {port}")
    }
}

/// Derive the SSH config alias for a (host, port) pair.
///
/// FxHash64 of `host:port` in base 36. Bytes are fed one at a time so the
/// result does not depend on the platform's endianness.
pub fn derive_alias(host: &str, port: u16) -> String {
    let mut hasher = FxHasher64::default();
    format!("{host}:{port}")
        .bytes()
        .for_each(|b| hasher.write_u8(b));
    format!("haven-{}", to_base36(hasher.finish()))
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut buf = Vec::with_capacity(13);
    while n > 0 {
        buf.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    buf.reverse();
    String::from_utf8_lossy(&buf).into_owned()
}

/// Browser URL of a managed workspace, when the target names one.
pub fn workspace_url(target: Option<&str>) -> Option<String> {
    let target = target?;
    if !target.contains(['@', '.']) {
        return Some(format!("https://{target}.{MANAGED_DOMAIN}"));
    }
    let suffix = format!(".{MANAGED_DOMAIN}");
    let sub = target.strip_prefix("ssh-")?.strip_suffix(&suffix)?;
    Some(format!("https://{sub}.{MANAGED_DOMAIN}"))
}

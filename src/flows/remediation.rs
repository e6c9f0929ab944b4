//! Decisions for recovering from a failed SSH probe.
//!
//! Everything here is pure: the connect flow feeds in what it observed (probe
//! diagnostic, which keys exist, how many retries were used) and the user's
//! answer, and gets back what to do next. Terminal prompting stays in the
//! flow.

use crate::ssh::client::HOST_KEY_FAILURE;

/// Automatic re-probes allowed after a remediation step.
pub const MAX_RETRIES: u32 = 1;

/// State carried through the remediation loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemediationContext {
    pub retries_used: u32,
    /// Browser URL of the workspace, for "add your key here" hints.
    pub workspace_url: Option<String>,
}

/// What the failed probe tells us about the machine's keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyInventory {
    pub has_managed_key: bool,
    pub has_existing_keys: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemediationOption {
    /// Create the passphrase-less managed key and show it.
    GenerateManagedKey,
    /// Print the user's existing public keys to authorize by hand.
    ShowExistingKeys,
    /// Explain how to load passphrase-protected keys into ssh-agent.
    UseAgent,
}

impl RemediationOption {
    pub fn label(&self) -> &'static str {
        match self {
            RemediationOption::GenerateManagedKey => {
                "Generate a Haven key (recommended: no passphrase, works everywhere)"
            }
            RemediationOption::ShowExistingKeys => {
                "Use an existing key (if you have a passphrase-less key ready)"
            }
            RemediationOption::UseAgent => {
                "Set up ssh-agent (if your keys require a passphrase)"
            }
        }
    }
}

/// Next step after a failed probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemediationPlan {
    /// The cached host key changed. Never cleared automatically.
    HostKeyChanged,
    /// Ask the user to pick one of these, first is the default.
    Choose(Vec<RemediationOption>),
    /// A managed key already exists: print it with instructions and stop.
    ShowManagedKey,
    /// The retry budget is spent.
    GiveUp,
}

/// Whether to probe again after acting on a choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Retry,
    NoRetry,
}

/// Classify a probe failure.
pub fn plan(diagnostic: &str, keys: KeyInventory, ctx: &RemediationContext) -> RemediationPlan {
    if diagnostic.contains(HOST_KEY_FAILURE) {
        return RemediationPlan::HostKeyChanged;
    }
    if ctx.retries_used >= MAX_RETRIES {
        return RemediationPlan::GiveUp;
    }
    if keys.has_managed_key {
        return RemediationPlan::ShowManagedKey;
    }
    let mut options = vec![RemediationOption::GenerateManagedKey];
    if keys.has_existing_keys {
        options.push(RemediationOption::ShowExistingKeys);
    }
    options.push(RemediationOption::UseAgent);
    RemediationPlan::Choose(options)
}

/// Outcome of acting on the user's choice.
pub fn decide(choice: RemediationOption) -> Decision {
    match choice {
        RemediationOption::GenerateManagedKey | RemediationOption::ShowExistingKeys => {
            Decision::Retry
        }
        RemediationOption::UseAgent => Decision::NoRetry,
    }
}

impl RemediationContext {
    pub fn new(workspace_url: Option<String>) -> Self {
        Self {
            retries_used: 0,
            workspace_url,
        }
    }

    /// Context for the next probe attempt.
    pub fn after_retry(&self) -> Self {
        Self {
            retries_used: self.retries_used + 1,
            workspace_url: self.workspace_url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DENIED: &str = "alice@10.0.0.5: Permission denied (publickey).";

    fn keys(has_managed_key: bool, has_existing_keys: bool) -> KeyInventory {
        KeyInventory {
            has_managed_key,
            has_existing_keys,
        }
    }

    #[test]
    fn test_host_key_mismatch_is_terminal() {
        let ctx = RemediationContext::default();
        let diag = "WARNING: REMOTE HOST IDENTIFICATION HAS CHANGED!\nHost key verification failed.";
        assert_eq!(plan(diag, keys(false, true), &ctx), RemediationPlan::HostKeyChanged);
        assert_eq!(plan(diag, keys(true, true), &ctx.after_retry()), RemediationPlan::HostKeyChanged);
    }

    #[test]
    fn test_choice_offered_without_managed_key() {
        let ctx = RemediationContext::default();
        assert_eq!(
            plan(DENIED, keys(false, true), &ctx),
            RemediationPlan::Choose(vec![
                RemediationOption::GenerateManagedKey,
                RemediationOption::ShowExistingKeys,
                RemediationOption::UseAgent,
            ])
        );
        assert_eq!(
            plan(DENIED, keys(false, false), &ctx),
            RemediationPlan::Choose(vec![
                RemediationOption::GenerateManagedKey,
                RemediationOption::UseAgent,
            ])
        );
    }

    #[test]
    fn test_managed_key_shows_instructions_once() {
        let ctx = RemediationContext::default();
        assert_eq!(plan(DENIED, keys(true, true), &ctx), RemediationPlan::ShowManagedKey);
    }

    #[test]
    fn test_single_retry_budget() {
        let ctx = RemediationContext::new(Some("https://demo.envhaven.app".into()));
        let next = ctx.after_retry();
        assert_eq!(next.retries_used, 1);
        assert_eq!(next.workspace_url, ctx.workspace_url);
        assert_eq!(plan(DENIED, keys(false, true), &next), RemediationPlan::GiveUp);
    }

    #[test]
    fn test_decisions() {
        assert_eq!(decide(RemediationOption::GenerateManagedKey), Decision::Retry);
        assert_eq!(decide(RemediationOption::ShowExistingKeys), Decision::Retry);
        assert_eq!(decide(RemediationOption::UseAgent), Decision::NoRetry);
    }
}

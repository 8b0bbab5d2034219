//! Command approval gating.
//!
//! Remote-initiated execute-command requests pass through here before they
//! can reach the executor. A request runs immediately only when the remote
//! waives approval AND the command matches no dangerous pattern; otherwise it
//! parks as a [`PendingCommandApproval`] until the user decides. Rejection
//! never touches the executor.

use log::warn;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::DangerConfig;

/// Commands that force approval regardless of the remote's flag.
static BUILTIN_DANGER_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // Recursive deletion of roots and homes.
        r"\brm\s+(-[a-zA-Z]*\s+)*-?[a-zA-Z]*[rf][a-zA-Z]*\s+(/|/\*|~|~/|\$HOME)(\s|$)",
        // Raw writes to block devices.
        r"\bdd\b.*\bof=/dev/",
        // Filesystem creation.
        r"\bmkfs(\.[a-z0-9]+)?\b",
        // Fork bomb.
        r":\(\)\s*\{\s*:\|:\s*&\s*\}\s*;",
        // Piping a downloaded script straight into a shell.
        r"\b(curl|wget)\b[^|]*\|\s*(ba|z|da)?sh\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("builtin danger pattern"))
    .collect()
});

/// A remote execute-command request waiting for the user's decision.
#[derive(Debug, Clone)]
pub struct PendingCommandApproval {
    pub request_id: String,
    pub command: String,
    pub working_dir: Option<String>,
    /// The remote's own flag; kept for reporting even when the local danger
    /// policy forced the gate.
    pub requires_approval: bool,
}

/// Decision for an inbound execute-command request.
#[derive(Debug, PartialEq, Eq)]
pub enum GateDecision {
    /// Safe to forward to the executor immediately.
    RunNow,
    /// Park and wait for approve/reject.
    RequireApproval,
}

/// Approval gateway state and policy.
pub struct ApprovalGateway {
    pending: Vec<PendingCommandApproval>,
    extra_patterns: Vec<Regex>,
    approve_dangerous_locally: bool,
}

impl ApprovalGateway {
    pub fn new(config: &DangerConfig) -> Self {
        let extra_patterns = config
            .patterns
            .iter()
            .filter_map(|raw| match Regex::new(raw) {
                Ok(regex) => Some(regex),
                Err(e) => {
                    warn!("ignoring invalid danger pattern {raw:?}: {e}");
                    None
                }
            })
            .collect();

        Self {
            pending: Vec::new(),
            extra_patterns,
            approve_dangerous_locally: config.approve_dangerous_locally,
        }
    }

    /// True when the command matches the local danger policy.
    pub fn is_dangerous(&self, command: &str) -> bool {
        BUILTIN_DANGER_PATTERNS
            .iter()
            .chain(&self.extra_patterns)
            .any(|p| p.is_match(command))
    }

    /// Gates one inbound request. A dangerous command is upgraded to
    /// approval-gated even when the remote waives approval, unless the config
    /// opted out of local gating.
    pub fn gate(&self, command: &str, requires_approval: bool) -> GateDecision {
        if requires_approval {
            return GateDecision::RequireApproval;
        }
        if !self.approve_dangerous_locally && self.is_dangerous(command) {
            warn!("dangerous command gated despite remote waiver: {command}");
            return GateDecision::RequireApproval;
        }
        GateDecision::RunNow
    }

    pub fn park(&mut self, approval: PendingCommandApproval) {
        self.pending.push(approval);
    }

    /// Removes and returns the pending approval for `request_id`.
    pub fn take(&mut self, request_id: &str) -> Option<PendingCommandApproval> {
        let idx = self.pending.iter().position(|p| p.request_id == request_id)?;
        Some(self.pending.remove(idx))
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

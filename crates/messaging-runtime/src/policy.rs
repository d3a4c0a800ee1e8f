//! Gate and moderate hooks (spec §4.5 steps 8-9).
//!
//! Gaters and moderators share an identical outcome shape — only their
//! position in the pipeline differs (gate runs before persistence and can
//! deny outright; moderate runs after gate, on the possibly-modified
//! context). Kept as two distinct traits rather than one so a hook can't
//! accidentally be wired into both slots by a type-level mistake.

use async_trait::async_trait;

use crate::ingest::MsgContext;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyOutcome {
    Allow,
    Deny { reason: String },
    Modify { body: String },
    Flag { tag: String },
}

#[async_trait]
pub trait Gater: Send + Sync {
    fn name(&self) -> &str;
    async fn check(&self, ctx: &MsgContext) -> PolicyOutcome;
}

#[async_trait]
pub trait Moderator: Send + Sync {
    fn name(&self) -> &str;
    async fn check(&self, ctx: &MsgContext) -> PolicyOutcome;
}

/// What to do when a gate/moderate hook times out (spec §4.5 step 8,
/// configured via `IngestConfig::gate_timeout_policy`).
pub fn timeout_outcome(policy: messaging_domain::config::TimeoutPolicy) -> PolicyOutcome {
    match policy {
        messaging_domain::config::TimeoutPolicy::Deny => PolicyOutcome::Deny {
            reason: "gate_timeout".into(),
        },
        messaging_domain::config::TimeoutPolicy::AllowWithFlag => PolicyOutcome::Flag {
            tag: "gate_timeout".into(),
        },
    }
}

/// A simple keyword-based gater used in tests and as a ready-made example
/// of the interface (spec §8 scenario 2: `deny("spam")` when body equals a
/// configured string).
pub struct KeywordDenyGater {
    name: String,
    blocked: Vec<String>,
    reason: String,
}

impl KeywordDenyGater {
    pub fn new(name: impl Into<String>, blocked: Vec<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            blocked,
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Gater for KeywordDenyGater {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self, ctx: &MsgContext) -> PolicyOutcome {
        if self.blocked.iter().any(|b| b == &ctx.body) {
            PolicyOutcome::Deny {
                reason: self.reason.clone(),
            }
        } else {
            PolicyOutcome::Allow
        }
    }
}

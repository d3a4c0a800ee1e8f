use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    BestEffort,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailoverPolicy {
    /// Stop at the first bridge that fails terminally; do not try the rest.
    StopOnFailure,
    /// Keep trying remaining bridges in `fallback_order` regardless.
    ContinueOnFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupeScope {
    /// Fingerprint keys are scoped per room.
    Room,
    /// Fingerprint keys are scoped per (channel, bridge_id) globally.
    Bridge,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingPolicy {
    pub room_id: String,
    #[serde(default)]
    pub fallback_order: Vec<String>,
    pub delivery_mode: DeliveryMode,
    #[serde(default = "default_failover")]
    pub failover_policy: FailoverPolicy,
    #[serde(default = "default_dedupe_scope")]
    pub dedupe_scope: DedupeScope,
    pub revision: u64,
}

fn default_failover() -> FailoverPolicy {
    FailoverPolicy::StopOnFailure
}

fn default_dedupe_scope() -> DedupeScope {
    DedupeScope::Room
}

impl RoutingPolicy {
    pub fn new(room_id: impl Into<String>, delivery_mode: DeliveryMode) -> Self {
        Self {
            room_id: room_id.into(),
            fallback_order: Vec::new(),
            delivery_mode,
            failover_policy: default_failover(),
            dedupe_scope: default_dedupe_scope(),
            revision: 0,
        }
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::new_id;
use crate::outbound::OutboundRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadLetterStatus {
    Captured,
    Replaying,
    Replayed,
    Archived,
}

impl DeadLetterStatus {
    /// `replayed -> captured` is the only forbidden transition (spec §3).
    pub fn can_transition_to(self, next: DeadLetterStatus) -> bool {
        !(self == DeadLetterStatus::Replayed && next == DeadLetterStatus::Captured)
    }
}

/// Diagnostics captured alongside a terminal failure (queue occupancy,
/// pressure level, attempt count, etc.) — an open JSON bag since the set of
/// useful diagnostics varies by failure site.
pub type Diagnostics = serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterRecord {
    pub id: String,
    /// Identifies which runtime instance captured this record (useful when
    /// multiple `Instance`s share a backend store).
    pub instance: String,
    pub request: OutboundRequest,
    pub error: String,
    pub diagnostics: Diagnostics,
    pub status: DeadLetterStatus,
    pub replay_attempts: u32,
    pub inserted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeadLetterRecord {
    pub fn new(instance: impl Into<String>, request: OutboundRequest, error: impl Into<String>, diagnostics: Diagnostics) -> Self {
        let now = Utc::now();
        Self {
            id: new_id("dl"),
            instance: instance.into(),
            request,
            error: error.into(),
            diagnostics,
            status: DeadLetterStatus::Captured,
            replay_attempts: 0,
            inserted_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replayed_to_captured_is_forbidden() {
        assert!(!DeadLetterStatus::Replayed.can_transition_to(DeadLetterStatus::Captured));
        assert!(DeadLetterStatus::Captured.can_transition_to(DeadLetterStatus::Replaying));
        assert!(DeadLetterStatus::Replaying.can_transition_to(DeadLetterStatus::Captured));
    }
}

use sha2::{Digest, Sha256};

/// The key by which `Ingest` recognises a duplicate inbound event (spec §3,
/// §4.5 step 1).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(pub String);

impl Fingerprint {
    /// Prefer `(channel, bridge_id, external_message_id)` when the adapter
    /// supplied a stable external id.
    pub fn from_external_id(channel: &str, bridge_id: &str, external_message_id: &str) -> Self {
        Fingerprint(format!("ext:{channel}:{bridge_id}:{external_message_id}"))
    }

    /// Fall back to hashing `(room, sender, timestamp, text)` when no
    /// external id is present.
    pub fn synthesize(room_key: &str, sender_key: &str, timestamp_ms: i64, text: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(room_key.as_bytes());
        hasher.update(b"\0");
        hasher.update(sender_key.as_bytes());
        hasher.update(b"\0");
        hasher.update(timestamp_ms.to_be_bytes());
        hasher.update(b"\0");
        hasher.update(text.as_bytes());
        let digest = hasher.finalize();
        Fingerprint(format!("syn:{}", hex::encode(digest)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn external_id_fingerprint_is_stable() {
        let a = Fingerprint::from_external_id("telegram", "bridge_tg", "msg_100");
        let b = Fingerprint::from_external_id("telegram", "bridge_tg", "msg_100");
        assert_eq!(a, b);
    }

    #[test]
    fn synthesized_fingerprint_is_stable_and_sensitive_to_text() {
        let a = Fingerprint::synthesize("room_1", "user_1", 1000, "hello");
        let b = Fingerprint::synthesize("room_1", "user_1", 1000, "hello");
        let c = Fingerprint::synthesize("room_1", "user_1", 1000, "goodbye");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}

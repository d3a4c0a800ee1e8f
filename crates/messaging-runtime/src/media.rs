//! Media preflight/fallback (spec §4.8 step 2 `send_media`/`edit_media`).

use messaging_domain::Capability;
use serde_json::Value;
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub enum MediaOutcome {
    Ok { payload: Value, metadata: Value },
    FallbackText { text: String, metadata: Value },
    Error { reason: String },
}

pub trait MediaPolicy: Send + Sync {
    /// Enforces size/type/count limits and channel capability before an
    /// outbound media operation, per spec §4.8.
    fn prepare_outbound(&self, payload: &Value, capabilities: &HashSet<Capability>) -> MediaOutcome;
}

/// Reference policy: checks a `type` field against advertised
/// capabilities and a byte-size cap against an optional `size_bytes`
/// field; on rejection it falls back to a configured placeholder text if
/// one is present in the payload's `fallback_text` field.
pub struct DefaultMediaPolicy {
    pub max_bytes: u64,
}

impl Default for DefaultMediaPolicy {
    fn default() -> Self {
        Self { max_bytes: 20 * 1024 * 1024 }
    }
}

fn capability_for(media_type: &str) -> Option<Capability> {
    match media_type {
        "image" => Some(Capability::Image),
        "audio" => Some(Capability::Audio),
        "video" => Some(Capability::Video),
        "file" => Some(Capability::File),
        _ => None,
    }
}

impl MediaPolicy for DefaultMediaPolicy {
    fn prepare_outbound(&self, payload: &Value, capabilities: &HashSet<Capability>) -> MediaOutcome {
        let media_type = payload.get("type").and_then(Value::as_str).unwrap_or("");
        let fallback_text = payload
            .get("fallback_text")
            .and_then(Value::as_str)
            .map(str::to_string);

        let reason = match capability_for(media_type) {
            None => Some("unsupported_type".to_string()),
            Some(cap) if !capabilities.contains(&cap) => Some("unsupported_type".to_string()),
            Some(_) => {
                let size = payload.get("size_bytes").and_then(Value::as_u64).unwrap_or(0);
                if size > self.max_bytes {
                    Some("too_large".to_string())
                } else {
                    None
                }
            }
        };

        match reason {
            None => MediaOutcome::Ok {
                payload: payload.clone(),
                metadata: serde_json::json!({}),
            },
            Some(reason) => match fallback_text {
                Some(text) => MediaOutcome::FallbackText {
                    text,
                    metadata: serde_json::json!({"fallback": true, "fallback_mode": "text_send", "reason": reason}),
                },
                None => MediaOutcome::Error { reason },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_type_falls_back_to_text() {
        let policy = DefaultMediaPolicy::default();
        let payload = serde_json::json!({"type": "image", "fallback_text": "(image omitted)"});
        let outcome = policy.prepare_outbound(&payload, &HashSet::new());
        match outcome {
            MediaOutcome::FallbackText { text, metadata } => {
                assert_eq!(text, "(image omitted)");
                assert_eq!(metadata["fallback_mode"], "text_send");
            }
            other => panic!("expected fallback, got {other:?}"),
        }
    }

    #[test]
    fn unsupported_type_without_fallback_errors() {
        let policy = DefaultMediaPolicy::default();
        let payload = serde_json::json!({"type": "image"});
        let outcome = policy.prepare_outbound(&payload, &HashSet::new());
        assert!(matches!(outcome, MediaOutcome::Error { .. }));
    }

    #[test]
    fn supported_type_within_limits_passes() {
        let policy = DefaultMediaPolicy::default();
        let caps = HashSet::from([Capability::Image]);
        let payload = serde_json::json!({"type": "image", "size_bytes": 100});
        let outcome = policy.prepare_outbound(&payload, &caps);
        assert!(matches!(outcome, MediaOutcome::Ok { .. }));
    }
}

//! The platform-adapter boundary (spec §6.1).
//!
//! A concrete `Adapter` is how this runtime talks to a specific chat
//! platform (Telegram-, Discord-, Slack-like). Concrete adapters are
//! explicitly out of scope (spec §1); this crate only defines the
//! interface every adapter implements plus the typed envelopes that cross
//! it, so the runtime, the ingest pipeline, and the outbound gateway can
//! all be written and tested against it without any real platform SDK.
//!
//! Adapters must be pure with respect to runtime state: they never read or
//! write the `Store` or `ConfigStore` directly.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use messaging_domain::Capability;
use serde::{Deserialize, Serialize};

pub mod fake;

/// Errors an adapter call can surface. Deliberately narrower than
/// `messaging_domain::Error`: adapters only ever produce these few shapes,
/// and the runtime is responsible for folding them into the broader
/// taxonomy (spec §7).
#[derive(Debug, Clone, thiserror::Error)]
pub enum AdapterError {
    #[error("invalid signature")]
    InvalidSignature,
    #[error("invalid event: {0}")]
    InvalidEvent(String),
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("{reason}")]
    Provider { reason: String },
}

impl AdapterError {
    /// Classify this error the way §4.8's retry table does.
    pub fn category(&self) -> messaging_domain::AdapterErrorCategory {
        match self {
            AdapterError::Provider { reason } => {
                messaging_domain::Error::classify_adapter_reason(reason)
            }
            _ => messaging_domain::AdapterErrorCategory::Terminal,
        }
    }

    pub fn reason(&self) -> String {
        match self {
            AdapterError::InvalidSignature => "invalid_signature".into(),
            AdapterError::InvalidEvent(d) => format!("invalid_event: {d}"),
            AdapterError::Unsupported(op) => format!("unsupported_operation: {op}"),
            AdapterError::Provider { reason } => reason.clone(),
        }
    }
}

/// Raw transport-level metadata handed to `VerifyWebhook`/`ParseEvent`.
/// Headers are lower-cased on construction so verification is a pure,
/// case-insensitive function of (headers, body).
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub query: HashMap<String, String>,
}

impl RequestMeta {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            headers: HashMap::new(),
            body: body.into(),
            query: HashMap::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

/// A single inbound media attachment, normalized by `TransformIncoming`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingMedia {
    pub kind: String,
    pub url: Option<String>,
    pub data: Option<serde_json::Value>,
}

/// `Incoming` — the adapter-normalized shape of a raw inbound payload
/// (spec §6.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incoming {
    pub external_room_id: String,
    pub external_user_id: String,
    pub external_message_id: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub media: Vec<IncomingMedia>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    pub chat_type: String,
    pub raw: serde_json::Value,
    /// Mentions the adapter itself was able to detect (merged with the
    /// ingest pipeline's own `MentionsParser` output, spec §4.5 step 6).
    #[serde(default)]
    pub mentions: Vec<AdapterMention>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterMention {
    pub user_id: String,
    pub username: String,
    pub offset: usize,
    pub length: usize,
}

/// `event_type` discriminant carried by an `EventEnvelope`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Message,
    Reaction,
    Edit,
    Delete,
    MemberJoin,
    MemberLeave,
    Other(String),
}

/// A typed, parsed inbound event (spec §4.6, §6.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub adapter: String,
    pub event_type: EventType,
    pub thread_id: Option<String>,
    pub channel_id: String,
    pub message_id: Option<String>,
    pub payload: serde_json::Value,
    pub raw: serde_json::Value,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Outcome of `ParseEvent`: an envelope, an explicit no-op ack, or an
/// error (folded by the caller into the HTTP status table in §4.6/§7).
pub enum ParseOutcome {
    Event(EventEnvelope),
    Noop,
}

/// The canonical result handed to `FormatWebhookResponse`, mirroring the
/// HTTP status table in spec §4.6/§7.
#[derive(Debug, Clone)]
pub enum WebhookResult {
    Ok(serde_json::Value),
    Duplicate,
    Denied { reason: String, stage: String },
    Noop,
    InvalidEvent(String),
    InvalidSignature,
    BridgeNotFound(String),
    BridgeDisabled(String),
    Error(String),
}

impl WebhookResult {
    /// The canonical HTTP status for this outcome, used as the fallback
    /// when the adapter's own formatter fails (spec §4.6 step 7).
    pub fn canonical_status(&self) -> u16 {
        match self {
            WebhookResult::Ok(_) | WebhookResult::Duplicate | WebhookResult::Noop => 200,
            WebhookResult::Denied { .. } => 200,
            WebhookResult::InvalidEvent(_) => 400,
            WebhookResult::InvalidSignature => 401,
            WebhookResult::BridgeNotFound(_) => 404,
            WebhookResult::BridgeDisabled(_) => 503,
            WebhookResult::Error(_) => 500,
        }
    }

    /// A safe JSON body for the fallback path: never panics, never
    /// depends on adapter-specific serialization.
    pub fn safe_body(&self) -> serde_json::Value {
        match self {
            WebhookResult::Ok(v) => v.clone(),
            WebhookResult::Duplicate => serde_json::json!({"status": "duplicate"}),
            WebhookResult::Noop => serde_json::json!({"status": "noop"}),
            WebhookResult::Denied { reason, stage } => {
                serde_json::json!({"status": "denied", "reason": reason, "stage": stage})
            }
            WebhookResult::InvalidEvent(d) => serde_json::json!({"error": "invalid_event", "detail": d}),
            WebhookResult::InvalidSignature => serde_json::json!({"error": "invalid_signature"}),
            WebhookResult::BridgeNotFound(id) => serde_json::json!({"error": "bridge_not_found", "bridge_id": id}),
            WebhookResult::BridgeDisabled(id) => serde_json::json!({"error": "bridge_disabled", "bridge_id": id}),
            WebhookResult::Error(d) => serde_json::json!({"error": "internal", "detail": d}),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WebhookResponse {
    pub status: u16,
    pub body: serde_json::Value,
}

impl WebhookResponse {
    /// The formatter-failure fallback named in spec §4.6 step 7.
    pub fn fallback_for(result: &WebhookResult) -> Self {
        Self {
            status: result.canonical_status(),
            body: result.safe_body(),
        }
    }
}

/// Result of a successful send/edit call against the platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendResult {
    pub message_id: String,
    #[serde(default)]
    pub extra: serde_json::Value,
}

/// A long-lived child worker an adapter wants the runtime to supervise
/// (e.g. a long-poll listener). Concrete behavior lives with the adapter;
/// the runtime only tracks the spec'd name/restart identity.
#[derive(Debug, Clone)]
pub struct ListenerChildSpec {
    pub name: String,
}

/// The platform-adapter interface (spec §6.1). Every method is
/// side-effect-free with respect to runtime state.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Identifies the channel family (`"telegram"`, `"discord"`, …).
    fn channel_type(&self) -> &str;

    fn capabilities(&self) -> std::collections::HashSet<Capability>;

    async fn transform_incoming(&self, raw: serde_json::Value) -> Result<Incoming, AdapterError>;

    /// Signature/token verification. Must be a pure function of headers +
    /// body — no I/O, no runtime state.
    fn verify_webhook(&self, meta: &RequestMeta, opts: &serde_json::Value) -> Result<(), AdapterError>;

    async fn parse_event(
        &self,
        meta: &RequestMeta,
        payload: serde_json::Value,
    ) -> Result<ParseOutcome, AdapterError>;

    fn format_webhook_response(&self, result: &WebhookResult) -> WebhookResponse {
        WebhookResponse::fallback_for(result)
    }

    async fn send_message(
        &self,
        external_room_id: &str,
        text: &str,
        opts: &serde_json::Value,
    ) -> Result<SendResult, AdapterError>;

    async fn edit_message(
        &self,
        external_room_id: &str,
        external_message_id: &str,
        text: &str,
        opts: &serde_json::Value,
    ) -> Result<SendResult, AdapterError>;

    async fn send_media(
        &self,
        external_room_id: &str,
        media: &serde_json::Value,
        opts: &serde_json::Value,
    ) -> Result<SendResult, AdapterError> {
        let _ = (external_room_id, media, opts);
        Err(AdapterError::Unsupported("send_media".into()))
    }

    async fn edit_media(
        &self,
        external_room_id: &str,
        external_message_id: &str,
        media: &serde_json::Value,
        opts: &serde_json::Value,
    ) -> Result<SendResult, AdapterError> {
        let _ = (external_room_id, external_message_id, media, opts);
        Err(AdapterError::Unsupported("edit_media".into()))
    }

    fn listener_child_specs(&self) -> Vec<ListenerChildSpec> {
        Vec::new()
    }
}

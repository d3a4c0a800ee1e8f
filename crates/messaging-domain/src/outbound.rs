use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Send,
    Edit,
    SendMedia,
    EditMedia,
}

impl Operation {
    pub fn requires_external_message_id(self) -> bool {
        matches!(self, Operation::Edit | Operation::EditMedia)
    }

    pub fn is_media(self) -> bool {
        matches!(self, Operation::SendMedia | Operation::EditMedia)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Critical,
}

/// Payload carried by an outbound request. Text operations carry a string;
/// media operations carry an opaque JSON map (the concrete shape is
/// adapter- and `MediaPolicy`-defined).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Text(String),
    Media(serde_json::Value),
}

impl Payload {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(s) => Some(s.as_str()),
            Payload::Media(_) => None,
        }
    }

    pub fn matches_operation(&self, op: Operation) -> bool {
        match (self, op) {
            (Payload::Text(_), Operation::Send | Operation::Edit) => true,
            (Payload::Media(_), Operation::SendMedia | Operation::EditMedia) => true,
            _ => false,
        }
    }
}

/// Caller-facing options for an outbound request. Kept as a typed option
/// struct with documented defaults, per the redesign notes in spec §9
/// ("Dynamic keyword options → typed option structs").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutboundOpts {
    #[serde(default)]
    pub reply_to_external_id: Option<String>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
    #[serde(default)]
    pub extra: serde_json::Value,
}

/// A fully-resolved request submitted to the `OutboundGateway`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundRequest {
    pub operation: Operation,
    pub channel: String,
    pub bridge_id: String,
    pub external_room_id: String,
    pub payload: Payload,
    #[serde(default)]
    pub external_message_id: Option<String>,
    #[serde(default)]
    pub opts: OutboundOpts,
    pub routing_key: String,
    pub priority: Priority,
    #[serde(default)]
    pub idempotency_key: Option<String>,
    /// Set by the `DeadLetter`/`ReplayWorker` path; the gateway must not
    /// re-capture failures from a request that is itself a replay.
    #[serde(default)]
    pub dead_letter_replay: bool,
}

impl OutboundRequest {
    /// Validate the shape described in spec §4.8 ("Validation").
    pub fn validate(&self) -> Result<(), crate::error::Error> {
        if self.external_room_id.trim().is_empty() {
            return Err(crate::error::Error::InvalidRequest {
                field: "external_room_id".into(),
            });
        }
        if !self.payload.matches_operation(self.operation) {
            return Err(crate::error::Error::InvalidRequest {
                field: "payload".into(),
            });
        }
        if self.operation.requires_external_message_id() && self.external_message_id.is_none() {
            return Err(crate::error::Error::MissingExternalMessageId);
        }
        Ok(())
    }
}

/// The classification envelope a terminal outbound failure carries back to
/// the caller (spec §4.8 step 3, §7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundError {
    pub category: crate::error::AdapterErrorCategory,
    pub disposition: Disposition,
    pub operation: Operation,
    pub reason: String,
    pub attempt: u32,
    pub max_attempts: u32,
    pub partition: usize,
    pub routing_key: String,
    pub retryable: bool,
    #[serde(default)]
    pub dead_letter_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    Terminal,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_request() -> OutboundRequest {
        OutboundRequest {
            operation: Operation::Send,
            channel: "telegram".into(),
            bridge_id: "bridge_tg".into(),
            external_room_id: "chat_42".into(),
            payload: Payload::Text("hi".into()),
            external_message_id: None,
            opts: OutboundOpts::default(),
            routing_key: "bridge_tg:chat_42".into(),
            priority: Priority::Normal,
            idempotency_key: None,
            dead_letter_replay: false,
        }
    }

    #[test]
    fn edit_without_external_message_id_is_invalid() {
        let mut req = base_request();
        req.operation = Operation::Edit;
        assert!(matches!(
            req.validate(),
            Err(crate::error::Error::MissingExternalMessageId)
        ));
    }

    #[test]
    fn payload_operation_mismatch_is_invalid() {
        let mut req = base_request();
        req.operation = Operation::SendMedia;
        assert!(req.validate().is_err());
    }

    #[test]
    fn valid_send_passes() {
        assert!(base_request().validate().is_ok());
    }
}

//! A deterministic test double standing in for a real platform SDK.
//!
//! `FakeAdapter` is what the runtime's integration tests wire up instead of
//! a Telegram/Discord/Slack client (spec §8's end-to-end scenarios are all
//! written against it). It is not a teaching example for a real adapter —
//! concrete adapters are out of scope (spec §1) — it exists purely so the
//! ingest pipeline and outbound gateway can be exercised without network
//! I/O.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use messaging_domain::Capability;
use serde_json::Value;

use crate::{
    AdapterError, AdapterMention, EventEnvelope, EventType, Incoming, ParseOutcome, RequestMeta,
    SendResult,
};

/// One scripted outcome for a `send_message`/`edit_message`/`send_media`
/// call.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Ok(SendResult),
    Err(String),
}

#[derive(Default)]
struct State {
    send_script: VecDeque<ScriptedReply>,
    send_calls: Vec<(String, String)>,
    verify_fails: bool,
}

pub struct FakeAdapter {
    channel: String,
    state: Mutex<State>,
}

impl FakeAdapter {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            state: Mutex::new(State::default()),
        }
    }

    /// Queue the next N `send_message` outcomes, consumed in FIFO order.
    /// Once the queue is empty, calls succeed with a synthesized id.
    pub fn script_send(&self, outcomes: Vec<ScriptedReply>) {
        self.state.lock().unwrap().send_script.extend(outcomes);
    }

    pub fn fail_verify(&self) {
        self.state.lock().unwrap().verify_fails = true;
    }

    pub fn sent_calls(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().send_calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().unwrap().send_calls.len()
    }
}

#[async_trait]
impl crate::Adapter for FakeAdapter {
    fn channel_type(&self) -> &str {
        &self.channel
    }

    fn capabilities(&self) -> HashSet<Capability> {
        HashSet::from([Capability::Text, Capability::Image, Capability::MessageEdit])
    }

    async fn transform_incoming(&self, raw: Value) -> Result<Incoming, AdapterError> {
        let obj = raw
            .as_object()
            .ok_or_else(|| AdapterError::InvalidEvent("payload is not an object".into()))?;
        let text = obj.get("text").and_then(Value::as_str).map(str::to_string);
        Ok(Incoming {
            external_room_id: obj
                .get("room")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            external_user_id: obj
                .get("user")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            external_message_id: obj.get("id").and_then(Value::as_str).map(str::to_string),
            text,
            media: Vec::new(),
            username: obj.get("user").and_then(Value::as_str).map(str::to_string),
            display_name: None,
            timestamp: None,
            chat_type: "group".into(),
            raw: raw.clone(),
            mentions: obj
                .get("mentions")
                .and_then(Value::as_array)
                .map(|arr| {
                    arr.iter()
                        .filter_map(|m| {
                            Some(AdapterMention {
                                user_id: m.get("user_id")?.as_str()?.to_string(),
                                username: m.get("username")?.as_str()?.to_string(),
                                offset: m.get("offset").and_then(Value::as_u64).unwrap_or(0) as usize,
                                length: m.get("length").and_then(Value::as_u64).unwrap_or(0) as usize,
                            })
                        })
                        .collect()
                })
                .unwrap_or_default(),
        })
    }

    fn verify_webhook(&self, _meta: &RequestMeta, _opts: &Value) -> Result<(), AdapterError> {
        if self.state.lock().unwrap().verify_fails {
            Err(AdapterError::InvalidSignature)
        } else {
            Ok(())
        }
    }

    async fn parse_event(
        &self,
        _meta: &RequestMeta,
        payload: Value,
    ) -> Result<ParseOutcome, AdapterError> {
        let kind = payload.get("kind").and_then(Value::as_str).unwrap_or("message");
        if kind == "noop" {
            return Ok(ParseOutcome::Noop);
        }
        let event_type = match kind {
            "message" => EventType::Message,
            "reaction" => EventType::Reaction,
            "edit" => EventType::Edit,
            "delete" => EventType::Delete,
            other => EventType::Other(other.to_string()),
        };
        let channel_id = payload
            .get("room")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let message_id = payload.get("id").and_then(Value::as_str).map(str::to_string);
        Ok(ParseOutcome::Event(EventEnvelope {
            adapter: self.channel.clone(),
            event_type,
            thread_id: None,
            channel_id,
            message_id,
            payload: payload.clone(),
            raw: payload,
            metadata: Value::Null,
        }))
    }

    async fn send_message(
        &self,
        external_room_id: &str,
        text: &str,
        _opts: &Value,
    ) -> Result<SendResult, AdapterError> {
        let mut state = self.state.lock().unwrap();
        state
            .send_calls
            .push((external_room_id.to_string(), text.to_string()));
        match state.send_script.pop_front() {
            Some(ScriptedReply::Ok(r)) => Ok(r),
            Some(ScriptedReply::Err(reason)) => Err(AdapterError::Provider { reason }),
            None => Ok(SendResult {
                message_id: format!("fake_{}", state.send_calls.len()),
                extra: Value::Null,
            }),
        }
    }

    async fn edit_message(
        &self,
        external_room_id: &str,
        _external_message_id: &str,
        text: &str,
        opts: &Value,
    ) -> Result<SendResult, AdapterError> {
        self.send_message(external_room_id, text, opts).await
    }
}

//! The ingest pipeline (spec §4.5): fingerprint → dedupe → resolve →
//! normalize → gate → moderate → persist → signal → deliver.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use messaging_adapter::Incoming;
use messaging_domain::{ContentBlock, Message, Participant, Role, Room};
use messaging_store::{ParticipantAttrs, RoomAttrs, Store};
use serde_json::Value;

use crate::command::{self, CommandResult};
use crate::config_store::ConfigStore;
use crate::deduper::{DedupeOutcome, Deduper};
use crate::mentions::{self, Mention, MentionsParser};
use crate::observer::{IngestStageEvent, Observer};
use crate::policy::{timeout_outcome, Gater, Moderator, PolicyOutcome};
use crate::signal::{SignalBus, Topic};

/// Everything downstream stages need to make a decision about one inbound
/// event (spec §4.5 step 5).
#[derive(Debug, Clone)]
pub struct MsgContext {
    pub room: Room,
    pub participant: Participant,
    pub channel: String,
    pub bridge_id: String,
    pub external_room_id: String,
    pub external_user_id: String,
    pub external_message_id: Option<String>,
    pub body: String,
    pub raw: Value,
    pub mentions: Vec<Mention>,
    pub command: CommandResult,
    pub was_mentioned: bool,
}

#[derive(Debug, Clone)]
pub enum IngestOutcome {
    Ok { message: Box<Message>, ctx: Box<MsgContext> },
    Duplicate,
    Denied { reason: String, stage: &'static str },
    Error(String),
}

/// Where a freshly-ingested message is handed off to drive application
/// `on_message` callbacks (spec §4.5 step 12, §4.9). Implemented by the
/// room registry so `Ingest` doesn't need to know how room workers are
/// supervised.
#[async_trait]
pub trait RoomDelivery: Send + Sync {
    async fn deliver(&self, message: Message, ctx: MsgContext);
}

pub struct IngestPipeline {
    pub store: Arc<dyn Store>,
    pub config: Arc<ConfigStore>,
    pub deduper: Arc<Deduper>,
    pub signals: Arc<SignalBus>,
    pub gaters: Vec<Arc<dyn Gater>>,
    pub moderators: Vec<Arc<dyn Moderator>>,
    pub mentions_parser: Option<Arc<dyn MentionsParser>>,
    pub mention_targets: HashSet<String>,
    pub delivery: Arc<dyn RoomDelivery>,
    pub ingest_config: messaging_domain::config::IngestConfig,
    pub observer: Arc<dyn Observer>,
    /// Compiled once at construction (mirrors the teacher's
    /// `denied_command_set`/`approval_command_set` startup-compiled
    /// `Regex`/`RegexSet` fields) rather than lazily inside `command::parse_command`.
    pub command_regex: regex::Regex,
}

impl IngestPipeline {
    #[tracing::instrument(skip_all, fields(bridge_id = %bridge_id, channel = %channel))]
    pub async fn ingest(&self, channel: &str, bridge_id: &str, incoming: Incoming) -> IngestOutcome {
        let start = Instant::now();

        // 1. Fingerprint.
        let fingerprint = match &incoming.external_message_id {
            Some(ext_id) => messaging_domain::Fingerprint::from_external_id(channel, bridge_id, ext_id),
            None => messaging_domain::Fingerprint::synthesize(
                &incoming.external_room_id,
                &incoming.external_user_id,
                incoming.timestamp.map(|t| t.timestamp_millis()).unwrap_or(0),
                incoming.text.as_deref().unwrap_or(""),
            ),
        };

        // 2. Dedupe.
        if self.deduper.check_and_mark(fingerprint.as_str()) == DedupeOutcome::Duplicate {
            self.emit_stage("dedupe", "duplicate", start);
            return IngestOutcome::Duplicate;
        }

        // 3. Resolve room.
        let (room, _created) = match self
            .store
            .get_or_create_room_by_external_binding(
                channel,
                bridge_id,
                &incoming.external_room_id,
                RoomAttrs {
                    room_type: Some(match incoming.chat_type.as_str() {
                        "direct" => messaging_domain::RoomType::Direct,
                        "thread" => messaging_domain::RoomType::Thread,
                        "channel" => messaging_domain::RoomType::Channel,
                        _ => messaging_domain::RoomType::Group,
                    }),
                    name: None,
                    metadata: Value::Null,
                },
            )
            .await
        {
            Ok(r) => r,
            Err(e) => return IngestOutcome::Error(e.to_string()),
        };

        // 4. Resolve participant.
        let (participant, _created) = match self
            .store
            .get_or_create_participant_by_external_id(
                channel,
                &incoming.external_user_id,
                ParticipantAttrs {
                    participant_type: Some(messaging_domain::ParticipantType::Human),
                    username: incoming.username.clone(),
                    display_name: incoming.display_name.clone(),
                },
            )
            .await
        {
            Ok(p) => p,
            Err(e) => return IngestOutcome::Error(e.to_string()),
        };

        let body = incoming.text.clone().unwrap_or_default();

        // 6. Normalize mentions.
        let parser_mentions = self
            .mentions_parser
            .as_ref()
            .map(|p| p.parse(&body))
            .unwrap_or_default();
        let adapter_mentions: Vec<Mention> = incoming.mentions.iter().cloned().map(Mention::from).collect();
        let all_mentions = mentions::merge_mentions(adapter_mentions, parser_mentions);
        let was_mentioned = mentions::was_mentioned(&all_mentions, &self.mention_targets);

        // 7. Normalize command.
        let command = command::parse_command(&body, self.ingest_config.command_max_text_bytes, &self.command_regex);

        // 5. Build MsgContext.
        let mut ctx = MsgContext {
            room: room.clone(),
            participant: participant.clone(),
            channel: channel.to_string(),
            bridge_id: bridge_id.to_string(),
            external_room_id: incoming.external_room_id.clone(),
            external_user_id: incoming.external_user_id.clone(),
            external_message_id: incoming.external_message_id.clone(),
            body,
            raw: incoming.raw.clone(),
            mentions: all_mentions,
            command,
            was_mentioned,
        };

        // 8. Gate.
        for gater in &self.gaters {
            let outcome = tokio::time::timeout(self.ingest_config.gate_timeout, gater.check(&ctx))
                .await
                .unwrap_or_else(|_| timeout_outcome(self.ingest_config.gate_timeout_policy));
            match outcome {
                PolicyOutcome::Allow => {}
                PolicyOutcome::Modify { body } => ctx.body = body,
                PolicyOutcome::Flag { tag } => {
                    tracing::debug!(gater = gater.name(), tag, "gate flagged message");
                }
                PolicyOutcome::Deny { reason } => {
                    self.emit_stage("gate", "denied", start);
                    return IngestOutcome::Denied { reason, stage: "gate" };
                }
            }
        }

        // 9. Moderate.
        for moderator in &self.moderators {
            let outcome = tokio::time::timeout(self.ingest_config.moderate_timeout, moderator.check(&ctx))
                .await
                .unwrap_or_else(|_| timeout_outcome(self.ingest_config.gate_timeout_policy));
            match outcome {
                PolicyOutcome::Allow => {}
                PolicyOutcome::Modify { body } => ctx.body = body,
                PolicyOutcome::Flag { tag } => {
                    tracing::debug!(moderator = moderator.name(), tag, "moderate flagged message");
                }
                PolicyOutcome::Deny { reason } => {
                    self.emit_stage("moderate", "denied", start);
                    return IngestOutcome::Denied { reason, stage: "moderate" };
                }
            }
        }

        // 10. Persist.
        let mut content = vec![ContentBlock::text(ctx.body.clone())];
        for media in &incoming.media {
            content.push(ContentBlock::File {
                url: media.url.clone().unwrap_or_default(),
                filename: None,
            });
        }
        let mut message = Message::new(&room.id, &participant.id, Role::User, content);
        message.status = messaging_domain::MessageStatus::Sent;
        message.external_id = incoming.external_message_id.clone();
        message.metadata = serde_json::json!({"channel": channel, "bridge_id": bridge_id});

        let message = match self.store.save_message(message).await {
            Ok(m) => m,
            Err(e) => return IngestOutcome::Error(e.to_string()),
        };

        // 11. Signal.
        self.signals.publish(
            Topic::MessageReceived,
            serde_json::json!({"message_id": message.id, "room_id": room.id}),
        );
        self.signals.publish(
            Topic::RoomMessageAdded,
            serde_json::json!({"message_id": message.id, "room_id": room.id}),
        );

        self.emit_stage("persist", "ok", start);

        // 12. Deliver to RoomWorker.
        self.delivery.deliver(message.clone(), ctx.clone()).await;

        IngestOutcome::Ok {
            message: Box::new(message),
            ctx: Box::new(ctx),
        }
    }

    fn emit_stage(&self, stage: &str, outcome: &str, start: Instant) {
        let elapsed = start.elapsed();
        self.observer.on_ingest_stage(IngestStageEvent { stage, outcome, elapsed });
    }
}

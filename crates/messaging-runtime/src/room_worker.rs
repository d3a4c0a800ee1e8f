//! `RoomWorker` (spec §4.9): per-room in-memory state (a bounded ring
//! buffer of recent messages and a participant set), driving application
//! `on_message` callbacks and converting `reply` outcomes into outbound
//! requests.
//!
//! Crash isolation is per `room_id`: a panicking `on_message` callback is
//! caught so one misbehaving room never takes down another (spec §4.9,
//! §5 restart table). Restart re-hydrates recent messages from the
//! Store rather than keeping any durable state of its own.

use std::collections::{HashMap, HashSet, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use messaging_domain::{Message, OutboundOpts, Payload, Priority};
use parking_lot::RwLock;

use crate::ingest::{MsgContext, RoomDelivery};
use crate::outbound_router::OutboundRouter;
use crate::signal::{SignalBus, Topic};

/// What an `on_message` handler hands back (spec §4.9).
pub enum HandlerOutcome {
    Reply { text: String, opts: OutboundOpts },
    NoReply,
    Error { reason: String },
}

#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn on_message(&self, message: &Message, ctx: &MsgContext) -> HandlerOutcome;
}

struct State {
    recent: VecDeque<Message>,
    participants: HashSet<String>,
}

pub struct RoomWorker {
    pub room_id: String,
    capacity: usize,
    state: RwLock<State>,
    handler: Arc<dyn MessageHandler>,
    router: Arc<OutboundRouter>,
    signals: Arc<SignalBus>,
}

impl RoomWorker {
    pub fn new(
        room_id: impl Into<String>,
        capacity: usize,
        handler: Arc<dyn MessageHandler>,
        router: Arc<OutboundRouter>,
        signals: Arc<SignalBus>,
    ) -> Self {
        Self {
            room_id: room_id.into(),
            capacity: capacity.max(1),
            state: RwLock::new(State {
                recent: VecDeque::new(),
                participants: HashSet::new(),
            }),
            handler,
            router,
            signals,
        }
    }

    /// Rehydrates `recent` from the Store after a restart (spec §4.9).
    pub fn hydrate(&self, messages: Vec<Message>) {
        let mut state = self.state.write();
        state.recent.clear();
        for message in messages.into_iter().rev().take(self.capacity).rev() {
            state.recent.push_back(message);
        }
    }

    pub fn recent_messages(&self) -> Vec<Message> {
        self.state.read().recent.iter().cloned().collect()
    }

    pub fn participants(&self) -> Vec<String> {
        self.state.read().participants.iter().cloned().collect()
    }

    async fn handle_message(&self, message: Message, ctx: MsgContext) {
        {
            let mut state = self.state.write();
            state.participants.insert(message.sender_id.clone());
            state.recent.push_back(message.clone());
            while state.recent.len() > self.capacity {
                state.recent.pop_front();
            }
        }

        self.signals.publish(
            Topic::RoomMessageAdded,
            serde_json::json!({"room_id": self.room_id, "message_id": message.id}),
        );

        let outcome = AssertUnwindSafe(self.handler.on_message(&message, &ctx))
            .catch_unwind()
            .await;

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::error!(room_id = %self.room_id, "on_message handler panicked, isolating room");
                HandlerOutcome::Error {
                    reason: "handler_panicked".into(),
                }
            }
        };

        match outcome {
            HandlerOutcome::NoReply => {}
            HandlerOutcome::Error { reason } => {
                tracing::warn!(room_id = %self.room_id, reason, "on_message handler declined to reply");
            }
            HandlerOutcome::Reply { text, opts } => {
                if let Err(e) = self
                    .router
                    .route_outbound(&self.room_id, Payload::Text(text), opts, Priority::Normal)
                    .await
                {
                    tracing::warn!(room_id = %self.room_id, error = %e, "reply routing failed");
                }
            }
        }
    }
}

#[async_trait]
impl RoomDelivery for RoomWorker {
    async fn deliver(&self, message: Message, ctx: MsgContext) {
        self.handle_message(message, ctx).await;
    }
}

/// Tracks one `RoomWorker` per active `room_id`, creating them lazily on
/// first delivery (spec §5: "1 RoomWorker per active room (dynamic)").
pub struct RoomRegistry {
    workers: RwLock<HashMap<String, Arc<RoomWorker>>>,
    capacity: usize,
    handler: Arc<dyn MessageHandler>,
    router: Arc<OutboundRouter>,
    signals: Arc<SignalBus>,
}

impl RoomRegistry {
    pub fn new(
        capacity: usize,
        handler: Arc<dyn MessageHandler>,
        router: Arc<OutboundRouter>,
        signals: Arc<SignalBus>,
    ) -> Self {
        Self {
            workers: RwLock::new(HashMap::new()),
            capacity,
            handler,
            router,
            signals,
        }
    }

    pub fn get_or_create(&self, room_id: &str) -> Arc<RoomWorker> {
        if let Some(worker) = self.workers.read().get(room_id) {
            return worker.clone();
        }
        let mut workers = self.workers.write();
        workers
            .entry(room_id.to_string())
            .or_insert_with(|| {
                Arc::new(RoomWorker::new(
                    room_id,
                    self.capacity,
                    self.handler.clone(),
                    self.router.clone(),
                    self.signals.clone(),
                ))
            })
            .clone()
    }

    pub fn get(&self, room_id: &str) -> Option<Arc<RoomWorker>> {
        self.workers.read().get(room_id).cloned()
    }

    pub fn remove(&self, room_id: &str) -> Option<Arc<RoomWorker>> {
        self.workers.write().remove(room_id)
    }

    pub fn active_room_count(&self) -> usize {
        self.workers.read().len()
    }
}

#[async_trait]
impl RoomDelivery for RoomRegistry {
    async fn deliver(&self, message: Message, ctx: MsgContext) {
        let worker = self.get_or_create(&ctx.room.id);
        worker.deliver(message, ctx).await;
    }
}

/// A no-op handler useful as a default when the host application has not
/// wired in its own agent/LLM callback.
pub struct NoopHandler;

#[async_trait]
impl MessageHandler for NoopHandler {
    async fn on_message(&self, _message: &Message, _ctx: &MsgContext) -> HandlerOutcome {
        HandlerOutcome::NoReply
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use messaging_domain::{MessageStatus, Role};

    struct EchoHandler;

    #[async_trait]
    impl MessageHandler for EchoHandler {
        async fn on_message(&self, message: &Message, _ctx: &MsgContext) -> HandlerOutcome {
            HandlerOutcome::Reply {
                text: format!("echo: {}", message.id),
                opts: OutboundOpts::default(),
            }
        }
    }

    struct PanicHandler;

    #[async_trait]
    impl MessageHandler for PanicHandler {
        async fn on_message(&self, _message: &Message, _ctx: &MsgContext) -> HandlerOutcome {
            panic!("boom");
        }
    }

    fn dummy_message(room_id: &str) -> Message {
        let mut message = Message::new(room_id, "participant_1", Role::User, vec![]);
        message.status = MessageStatus::Sent;
        message
    }

    fn empty_router(signals: Arc<SignalBus>) -> Arc<OutboundRouter> {
        let config = Arc::new(crate::config_store::ConfigStore::new());
        let bridges = Arc::new(crate::bridge::BridgeRegistry::new());
        let store: Arc<dyn messaging_store::Store> = Arc::new(messaging_store::InMemoryStore::new());
        let dead_letters = Arc::new(crate::dead_letter::DeadLetterService::new("inst-1", store, signals.clone()));
        let mut cfg = messaging_domain::config::GatewayConfig::default();
        cfg.partition_count = Some(1);
        let gateway = Arc::new(crate::gateway::OutboundGateway::new(
            cfg,
            bridges,
            dead_letters,
            Arc::new(crate::security::DefaultSecurity),
            Arc::new(crate::media::DefaultMediaPolicy::default()),
            signals,
        ));
        Arc::new(OutboundRouter { config, gateway })
    }

    #[tokio::test]
    async fn ring_buffer_caps_at_capacity() {
        let signals = Arc::new(SignalBus::new());
        let router = empty_router(signals.clone());
        let worker = RoomWorker::new("room_1", 2, Arc::new(NoopHandler), router, signals);
        for _ in 0..5 {
            let message = dummy_message("room_1");
            let ctx = test_ctx(&message);
            worker.deliver(message, ctx).await;
        }
        assert_eq!(worker.recent_messages().len(), 2);
    }

    #[tokio::test]
    async fn panicking_handler_is_isolated() {
        let signals = Arc::new(SignalBus::new());
        let router = empty_router(signals.clone());
        let worker = RoomWorker::new("room_1", 10, Arc::new(PanicHandler), router, signals);
        let message = dummy_message("room_1");
        let ctx = test_ctx(&message);
        worker.deliver(message, ctx).await;
        assert_eq!(worker.recent_messages().len(), 1);
    }

    fn test_ctx(message: &Message) -> MsgContext {
        let mut room = messaging_domain::Room::new(messaging_domain::RoomType::Group, None);
        room.id = message.room_id.clone();
        MsgContext {
            room,
            participant: messaging_domain::Participant::new(
                messaging_domain::ParticipantType::Human,
                messaging_domain::Identity::default(),
            ),
            channel: "telegram".into(),
            bridge_id: "bridge_tg".into(),
            external_room_id: "chat_1".into(),
            external_user_id: "user_1".into(),
            external_message_id: None,
            body: "hi".into(),
            raw: serde_json::Value::Null,
            mentions: Vec::new(),
            command: crate::command::parse_command("hi", 2048, &crate::command::compile_command_regex()),
            was_mentioned: false,
        }
    }
}

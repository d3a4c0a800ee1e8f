//! `Instance` (spec §6.3): the composition root a host application
//! constructs once. Everything else in this crate is a focused piece that
//! can be exercised in isolation; `Instance` wires them together behind
//! the public surface the spec names — room/participant/message CRUD,
//! config CRUD, inbound/outbound routing, dead-letter management, and
//! dedupe introspection.
//!
//! `RoomBinding` is tracked in two places (spec §4.3's note on
//! `ConfigStore`): the durable `Store` copy and `ConfigStore`'s fast
//! snapshot `OutboundRouter` reads on every dispatch. Every binding
//! mutation here writes through both so they never drift.

use std::collections::HashSet;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use messaging_adapter::Adapter;
use messaging_domain::config::RuntimeConfig;
use messaging_domain::{
    BridgeConfig, Error, Message, MessageFilter, Participant, Result, Room, RoomBinding, RoomFilter,
    RoutingPolicy,
};
use messaging_store::{DeadLetterFilter, ParticipantAttrs, RoomAttrs, Store};
use tokio::sync::mpsc;

use crate::bridge::{BridgeRegistry, BridgeWorker};
use crate::config_store::ConfigStore;
use crate::dead_letter::DeadLetterService;
use crate::deduper::{DedupeOutcome, Deduper};
use crate::gateway::OutboundGateway;
use crate::inbound_router::{InboundRouter, RouteOutcome};
use crate::ingest::{IngestOutcome, IngestPipeline, RoomDelivery};
use crate::media::{DefaultMediaPolicy, MediaPolicy};
use crate::mentions::MentionsParser;
use crate::observer::Observer;
use crate::policy::{Gater, Moderator};
use crate::replay::{ReplayOpts, ReplayOutcome, ReplayWorkers};
use crate::room_worker::{MessageHandler, NoopHandler, RoomRegistry};
use crate::security::{DefaultSecurity, Security};
use crate::signal::{SignalBus, SignalEvent, Topic};
use crate::supervision::{run_shutdown_sequence, ShutdownReport, Supervisor};

/// Builds the adapter instance backing a `BridgeConfig` (spec §6.1: adapter
/// construction from `adapter_module`/`credentials` is a host concern, not
/// this crate's — concrete adapters live outside it).
pub trait AdapterFactory: Send + Sync {
    fn build(&self, config: &BridgeConfig) -> Result<Arc<dyn Adapter>>;
}

/// Default factory for a host that hasn't wired in real adapters yet:
/// every `PutBridgeConfig` fails loudly instead of silently registering a
/// bridge nothing can ever dispatch through.
struct UnconfiguredAdapterFactory;

impl AdapterFactory for UnconfiguredAdapterFactory {
    fn build(&self, config: &BridgeConfig) -> Result<Arc<dyn Adapter>> {
        Err(Error::Config(format!(
            "no adapter factory registered for adapter_module {:?}",
            config.adapter_module
        )))
    }
}

pub struct InstanceBuilder {
    id: Option<String>,
    config: RuntimeConfig,
    store: Option<Arc<dyn Store>>,
    handler: Arc<dyn MessageHandler>,
    gaters: Vec<Arc<dyn Gater>>,
    moderators: Vec<Arc<dyn Moderator>>,
    mentions_parser: Option<Arc<dyn MentionsParser>>,
    mention_targets: HashSet<String>,
    security: Arc<dyn Security>,
    media_policy: Arc<dyn MediaPolicy>,
    observer: Arc<dyn Observer>,
    adapter_factory: Arc<dyn AdapterFactory>,
}

impl Default for InstanceBuilder {
    fn default() -> Self {
        Self {
            id: None,
            config: RuntimeConfig::default(),
            store: None,
            handler: Arc::new(NoopHandler),
            gaters: Vec::new(),
            moderators: Vec::new(),
            mentions_parser: None,
            mention_targets: HashSet::new(),
            security: Arc::new(DefaultSecurity),
            media_policy: Arc::new(DefaultMediaPolicy::default()),
            observer: Arc::new(crate::observer::TracingObserver),
            adapter_factory: Arc::new(UnconfiguredAdapterFactory),
        }
    }
}

impl InstanceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn message_handler(mut self, handler: Arc<dyn MessageHandler>) -> Self {
        self.handler = handler;
        self
    }

    pub fn gater(mut self, gater: Arc<dyn Gater>) -> Self {
        self.gaters.push(gater);
        self
    }

    pub fn moderator(mut self, moderator: Arc<dyn Moderator>) -> Self {
        self.moderators.push(moderator);
        self
    }

    pub fn mentions_parser(mut self, parser: Arc<dyn MentionsParser>) -> Self {
        self.mentions_parser = Some(parser);
        self
    }

    pub fn mention_targets(mut self, targets: HashSet<String>) -> Self {
        self.mention_targets = targets;
        self
    }

    pub fn security(mut self, security: Arc<dyn Security>) -> Self {
        self.security = security;
        self
    }

    pub fn media_policy(mut self, media_policy: Arc<dyn MediaPolicy>) -> Self {
        self.media_policy = media_policy;
        self
    }

    pub fn observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    pub fn adapter_factory(mut self, factory: Arc<dyn AdapterFactory>) -> Self {
        self.adapter_factory = factory;
        self
    }

    pub fn build(self) -> Instance {
        let id = self.id.unwrap_or_else(|| messaging_domain::ids::new_id("instance"));
        let store = self.store.unwrap_or_else(|| Arc::new(messaging_store::InMemoryStore::new()));
        let config_store = Arc::new(ConfigStore::new());
        let deduper = Arc::new(Deduper::from_config(&self.config.dedupe));
        let signals = Arc::new(SignalBus::new());
        let bridges = Arc::new(BridgeRegistry::new());

        let dead_letters = Arc::new(DeadLetterService::with_observer(
            id.clone(),
            store.clone(),
            signals.clone(),
            self.observer.clone(),
        ));
        let gateway = Arc::new(OutboundGateway::with_observer(
            self.config.gateway.clone(),
            bridges.clone(),
            dead_letters.clone(),
            self.security,
            self.media_policy,
            signals.clone(),
            self.observer.clone(),
        ));
        let outbound = Arc::new(crate::outbound_router::OutboundRouter {
            config: config_store.clone(),
            gateway: gateway.clone(),
        });
        let rooms = Arc::new(RoomRegistry::new(
            self.config.room_worker.recent_messages_capacity,
            self.handler,
            outbound.clone(),
            signals.clone(),
        ));

        let ingest = Arc::new(IngestPipeline {
            store: store.clone(),
            config: config_store.clone(),
            deduper: deduper.clone(),
            signals: signals.clone(),
            gaters: self.gaters,
            moderators: self.moderators,
            mentions_parser: self.mentions_parser,
            mention_targets: self.mention_targets,
            delivery: rooms.clone() as Arc<dyn RoomDelivery>,
            ingest_config: self.config.ingest.clone(),
            observer: self.observer.clone(),
            command_regex: crate::command::compile_command_regex(),
        });

        let inbound = Arc::new(InboundRouter {
            config: config_store.clone(),
            bridges: bridges.clone(),
            ingest: ingest.clone(),
        });

        let replay = Arc::new(ReplayWorkers::new(
            self.config.replay.replay_partitions,
            dead_letters.clone(),
            gateway.clone(),
        ));

        let supervisor = Arc::new(Supervisor::new(&self.config.supervision));

        Instance {
            id,
            config: self.config,
            store,
            config_store,
            deduper,
            signals,
            bridges,
            rooms,
            ingest,
            inbound,
            outbound,
            gateway,
            dead_letters,
            replay,
            supervisor,
            observer: self.observer,
            adapter_factory: self.adapter_factory,
            accepting_ingest: AtomicBool::new(true),
        }
    }
}

/// The public runtime API (spec §6.3). Cloning an `Instance` is cheap
/// (every field is an `Arc`); hosts typically keep one behind an
/// `Arc<Instance>` or a `OnceLock`.
pub struct Instance {
    pub id: String,
    config: RuntimeConfig,
    store: Arc<dyn Store>,
    config_store: Arc<ConfigStore>,
    deduper: Arc<Deduper>,
    signals: Arc<SignalBus>,
    bridges: Arc<BridgeRegistry>,
    rooms: Arc<RoomRegistry>,
    ingest: Arc<IngestPipeline>,
    inbound: Arc<InboundRouter>,
    outbound: Arc<crate::outbound_router::OutboundRouter>,
    gateway: Arc<OutboundGateway>,
    dead_letters: Arc<DeadLetterService>,
    replay: Arc<ReplayWorkers>,
    supervisor: Arc<Supervisor>,
    observer: Arc<dyn Observer>,
    adapter_factory: Arc<dyn AdapterFactory>,
    accepting_ingest: AtomicBool,
}

impl Instance {
    pub fn builder() -> InstanceBuilder {
        InstanceBuilder::new()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn observer(&self) -> &Arc<dyn Observer> {
        &self.observer
    }

    // ── Rooms ──────────────────────────────────────────────────────────

    pub async fn save_room(&self, room: Room) -> Result<Room> {
        Ok(self.store.save_room(room).await?)
    }

    pub async fn get_room(&self, id: &str) -> Result<Room> {
        Ok(self.store.get_room(id).await?)
    }

    pub async fn list_rooms(&self, filter: RoomFilter, limit: usize, offset: usize) -> Result<Vec<Room>> {
        Ok(self.store.list_rooms(filter, limit, offset).await?)
    }

    pub async fn delete_room(&self, id: &str) -> Result<()> {
        Ok(self.store.delete_room(id).await?)
    }

    pub async fn get_or_create_room_by_external_binding(
        &self,
        channel: &str,
        bridge_id: &str,
        external_id: &str,
        attrs: RoomAttrs,
    ) -> Result<(Room, bool)> {
        Ok(self
            .store
            .get_or_create_room_by_external_binding(channel, bridge_id, external_id, attrs)
            .await?)
    }

    pub async fn get_room_by_external_binding(&self, channel: &str, bridge_id: &str, external_id: &str) -> Result<Room> {
        Ok(self.store.get_room_by_external_binding(channel, bridge_id, external_id).await?)
    }

    // ── Participants ─────────────────────────────────────────────────

    pub async fn save_participant(&self, participant: Participant) -> Result<Participant> {
        Ok(self.store.save_participant(participant).await?)
    }

    pub async fn get_participant(&self, id: &str) -> Result<Participant> {
        Ok(self.store.get_participant(id).await?)
    }

    pub async fn get_or_create_participant_by_external_id(
        &self,
        channel: &str,
        external_id: &str,
        attrs: ParticipantAttrs,
    ) -> Result<(Participant, bool)> {
        Ok(self
            .store
            .get_or_create_participant_by_external_id(channel, external_id, attrs)
            .await?)
    }

    // ── Messages ─────────────────────────────────────────────────────

    pub async fn save_message(&self, message: Message) -> Result<Message> {
        Ok(self.store.save_message(message).await?)
    }

    pub async fn get_message(&self, id: &str) -> Result<Message> {
        Ok(self.store.get_message(id).await?)
    }

    pub async fn list_messages(&self, room_id: &str, filter: MessageFilter) -> Result<Vec<Message>> {
        Ok(self.store.list_messages(room_id, filter).await?)
    }

    pub async fn delete_message(&self, id: &str) -> Result<()> {
        Ok(self.store.delete_message(id).await?)
    }

    // ── Room bindings (dual-written to `Store` and `ConfigStore`) ─────

    pub async fn create_room_binding(&self, binding: RoomBinding) -> Result<RoomBinding> {
        let saved = self.store.create_room_binding(binding).await?;
        self.config_store.put_room_binding(saved.clone(), None)?;
        Ok(saved)
    }

    pub async fn list_room_bindings(&self, room_id: &str) -> Result<Vec<RoomBinding>> {
        Ok(self.store.list_room_bindings(room_id).await?)
    }

    pub async fn delete_room_binding(&self, binding_id: &str) -> Result<()> {
        self.store.delete_room_binding(binding_id).await?;
        // Best-effort: the durable delete above is authoritative; a missing
        // `ConfigStore` entry (already evicted, or never synced after a
        // restart that skipped rehydration) is not itself an error.
        let _ = self.config_store.delete_room_binding(binding_id);
        Ok(())
    }

    // ── Bridge config (spins the `BridgeWorker` up/down to match) ─────

    pub fn put_bridge_config(&self, config: BridgeConfig, expected_revision: Option<u64>) -> Result<BridgeConfig> {
        let saved = self.config_store.put_bridge_config(config, expected_revision)?;
        self.sync_bridge_worker(&saved)?;
        Ok(saved)
    }

    fn sync_bridge_worker(&self, config: &BridgeConfig) -> Result<()> {
        let needs_restart = self
            .bridges
            .get(&config.id)
            .map(|w| w.needs_restart_for(&config.adapter_module))
            .unwrap_or(true);

        if needs_restart {
            let adapter = self.adapter_factory.build(config)?;
            let worker = Arc::new(BridgeWorker::new(
                config.id.clone(),
                adapter,
                config.adapter_module.clone(),
                config.enabled,
            ));
            worker.bump_revision(config.revision);
            self.bridges.register(worker);
        } else if let Some(worker) = self.bridges.get(&config.id) {
            worker.set_enabled(config.enabled);
            worker.bump_revision(config.revision);
        }
        Ok(())
    }

    pub fn get_bridge_config(&self, id: &str) -> Result<BridgeConfig> {
        self.config_store.get_bridge_config(id)
    }

    pub fn list_bridge_configs(&self) -> Vec<BridgeConfig> {
        self.config_store.list_bridge_configs()
    }

    pub fn delete_bridge_config(&self, id: &str) -> Result<()> {
        self.config_store.delete_bridge_config(id)?;
        self.bridges.remove(id);
        Ok(())
    }

    pub fn bridge_health(&self) -> Vec<crate::bridge::BridgeHealth> {
        self.bridges.all_health()
    }

    // ── Routing policy ───────────────────────────────────────────────

    pub fn put_routing_policy(&self, policy: RoutingPolicy, expected_revision: Option<u64>) -> Result<RoutingPolicy> {
        self.config_store.put_routing_policy(policy, expected_revision)
    }

    pub fn get_routing_policy(&self, room_id: &str) -> Option<RoutingPolicy> {
        self.config_store.get_routing_policy(room_id)
    }

    pub fn delete_routing_policy(&self, room_id: &str) -> Result<()> {
        self.config_store.delete_routing_policy(room_id)
    }

    // ── Inbound ──────────────────────────────────────────────────────

    pub async fn route_webhook(
        &self,
        bridge_id: &str,
        payload: serde_json::Value,
        request_meta: messaging_adapter::RequestMeta,
    ) -> (messaging_adapter::WebhookResponse, RouteOutcome) {
        if !self.accepting_ingest.load(std::sync::atomic::Ordering::SeqCst) {
            let result = messaging_adapter::WebhookResult::Error("shutting_down".into());
            return (messaging_adapter::WebhookResponse::fallback_for(&result), RouteOutcome::Noop);
        }
        self.inbound.route_webhook(bridge_id, payload, request_meta).await
    }

    pub async fn route_payload(&self, bridge_id: &str, payload: serde_json::Value) -> IngestOutcome {
        if !self.accepting_ingest.load(std::sync::atomic::Ordering::SeqCst) {
            return IngestOutcome::Error("shutting_down".into());
        }
        self.inbound.route_payload(bridge_id, payload).await
    }

    // ── Outbound ─────────────────────────────────────────────────────

    pub fn resolve_outbound_routes(&self, room_id: &str) -> Vec<RoomBinding> {
        self.outbound.resolve_outbound_routes(room_id)
    }

    pub async fn route_outbound(
        &self,
        room_id: &str,
        payload: messaging_domain::Payload,
        opts: messaging_domain::OutboundOpts,
        priority: messaging_domain::Priority,
    ) -> Result<crate::outbound_router::RouteOutboundResult> {
        self.outbound.route_outbound(room_id, payload, opts, priority).await
    }

    pub fn pressure_levels(&self) -> Vec<(usize, crate::gateway::PressureLevel)> {
        self.gateway.pressure_levels()
    }

    // ── Dead letters / replay ────────────────────────────────────────

    pub async fn list_dead_letters(&self, filter: DeadLetterFilter) -> Result<Vec<messaging_domain::DeadLetterRecord>> {
        self.dead_letters.list(filter).await
    }

    pub async fn get_dead_letter(&self, id: &str) -> Result<messaging_domain::DeadLetterRecord> {
        self.dead_letters.get(id).await
    }

    pub async fn replay_dead_letter(&self, id: &str, opts: ReplayOpts) -> Result<ReplayOutcome> {
        self.replay.replay(id, opts).await
    }

    pub async fn archive_dead_letter(&self, id: &str) -> Result<messaging_domain::DeadLetterRecord> {
        self.dead_letters.archive(id).await
    }

    pub async fn purge_dead_letters(&self, filter: DeadLetterFilter) -> Result<usize> {
        self.dead_letters.purge(filter).await
    }

    // ── Dedupe introspection ─────────────────────────────────────────

    pub fn check_dedupe(&self, key: &str) -> DedupeOutcome {
        self.deduper.check_and_mark(key)
    }

    pub fn seen(&self, key: &str) -> bool {
        self.deduper.seen(key)
    }

    pub fn clear_dedupe(&self, key: &str) {
        self.deduper.clear(key)
    }

    // ── Signals ──────────────────────────────────────────────────────

    pub fn subscribe(&self, topic: Topic) -> mpsc::Receiver<SignalEvent> {
        self.signals.subscribe(topic)
    }

    // ── Rooms (dynamic room worker tracking) ──────────────────────────

    pub fn active_room_count(&self) -> usize {
        self.rooms.active_room_count()
    }

    pub fn room_recent_messages(&self, room_id: &str) -> Option<Vec<Message>> {
        self.rooms.get(room_id).map(|w| w.recent_messages())
    }

    // ── Supervision / shutdown ─────────────────────────────────────────

    pub fn supervisor(&self) -> &Arc<Supervisor> {
        &self.supervisor
    }

    /// Runs the graceful-shutdown sequence named in spec §5: stop
    /// accepting ingest, drain outbound up to the configured deadline,
    /// and report how much was left to dead-letter.
    pub async fn shutdown(&self) -> ShutdownReport {
        let gateway = self.gateway.clone();
        run_shutdown_sequence(
            &self.accepting_ingest,
            move || gateway.pending_count(),
            self.supervisor.shutdown_deadline(),
        )
        .await
    }
}

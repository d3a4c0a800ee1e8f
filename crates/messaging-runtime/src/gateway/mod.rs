//! `OutboundGateway` (spec §4.8): partitions outbound intents by routing
//! key across a fixed pool of `Partition` workers, each with its own
//! bounded queue, pressure-derived admission control, idempotency cache,
//! and retry/dead-letter handling.

pub mod partition;

use std::sync::Arc;

use messaging_domain::{config::GatewayConfig, Error, OutboundRequest};

use crate::bridge::BridgeRegistry;
use crate::dead_letter::DeadLetterService;
use crate::media::MediaPolicy;
use crate::observer::Observer;
use crate::security::Security;
use crate::signal::SignalBus;

pub use partition::{hash_key, PressureLevel, SuccessEnvelope};
use partition::Partition;

pub struct OutboundGateway {
    config: GatewayConfig,
    partitions: Vec<Arc<Partition>>,
    signals: Arc<SignalBus>,
}

impl OutboundGateway {
    pub fn new(
        config: GatewayConfig,
        bridges: Arc<BridgeRegistry>,
        dead_letters: Arc<DeadLetterService>,
        security: Arc<dyn Security>,
        media_policy: Arc<dyn MediaPolicy>,
        signals: Arc<SignalBus>,
    ) -> Self {
        Self::with_observer(
            config,
            bridges,
            dead_letters,
            security,
            media_policy,
            signals,
            Arc::new(crate::observer::TracingObserver),
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn with_observer(
        config: GatewayConfig,
        bridges: Arc<BridgeRegistry>,
        dead_letters: Arc<DeadLetterService>,
        security: Arc<dyn Security>,
        media_policy: Arc<dyn MediaPolicy>,
        signals: Arc<SignalBus>,
        observer: Arc<dyn Observer>,
    ) -> Self {
        let partition_count = config.resolved_partition_count().max(1);
        let partitions = (0..partition_count)
            .map(|index| {
                let bridges = bridges.clone();
                Partition::spawn_with_observer(
                    index,
                    config.clone(),
                    move |bridge_id: &str| bridges.adapter_for(bridge_id),
                    dead_letters.clone(),
                    security.clone(),
                    media_policy.clone(),
                    signals.clone(),
                    observer.clone(),
                )
            })
            .collect();

        Self { config, partitions, signals }
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    fn partition_for(&self, routing_key: &str) -> &Arc<Partition> {
        let idx = (hash_key(routing_key) as usize) % self.partitions.len().max(1);
        &self.partitions[idx]
    }

    /// Submits one outbound request to its home partition and awaits the
    /// result. A `shed`/`full` admission rejection and a terminal adapter
    /// failure both surface as `Err`; the dead letter (if any) has already
    /// been captured by the partition before this returns.
    pub async fn submit(&self, request: OutboundRequest) -> Result<serde_json::Value, Error> {
        let partition = self.partition_for(&request.routing_key);
        let envelope = partition.submit(request, &self.signals).await?;
        Ok(serde_json::json!({
            "message_id": envelope.message_id,
            "idempotent": envelope.idempotent,
            "attempts": envelope.attempts,
            "media": envelope.media,
        }))
    }

    pub fn pressure_levels(&self) -> Vec<(usize, PressureLevel)> {
        self.partitions.iter().map(|p| (p.index, p.pressure_level())).collect()
    }

    /// Total requests currently sitting in a partition's FIFO queue
    /// (excluding the one job each partition may have in flight), used by
    /// the shutdown sequence to decide when outbound has drained (spec §5).
    pub fn pending_count(&self) -> usize {
        self.partitions.iter().map(|p| p.occupancy()).sum()
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use messaging_adapter::fake::FakeAdapter;
    use messaging_adapter::Adapter;
    use messaging_domain::{Operation, OutboundOpts, Payload, Priority};
    use messaging_store::InMemoryStore;

    fn test_config() -> GatewayConfig {
        let mut cfg = GatewayConfig::default();
        cfg.parallelism = 1;
        cfg.partition_count = Some(1);
        cfg.queue_capacity = 8;
        cfg.max_attempts = 2;
        cfg.base_backoff = std::time::Duration::from_millis(1);
        cfg.max_backoff = std::time::Duration::from_millis(2);
        cfg.adapter_call_timeout = std::time::Duration::from_millis(200);
        cfg
    }

    fn make_gateway(adapter: Arc<dyn Adapter>) -> Arc<OutboundGateway> {
        let bridges = Arc::new(BridgeRegistry::new());
        bridges.register(Arc::new(crate::bridge::BridgeWorker::new(
            "bridge_tg",
            adapter,
            "telegram_adapter",
            true,
        )));
        let store: Arc<dyn messaging_store::Store> = Arc::new(InMemoryStore::new());
        let signals = Arc::new(SignalBus::new());
        let dead_letters = Arc::new(DeadLetterService::new("inst-1", store, signals.clone()));
        Arc::new(OutboundGateway::new(
            test_config(),
            bridges,
            dead_letters,
            Arc::new(crate::security::DefaultSecurity),
            Arc::new(crate::media::DefaultMediaPolicy::default()),
            signals,
        ))
    }

    fn base_request() -> OutboundRequest {
        OutboundRequest {
            operation: Operation::Send,
            channel: "telegram".into(),
            bridge_id: "bridge_tg".into(),
            external_room_id: "chat_1".into(),
            payload: Payload::Text("hello".into()),
            external_message_id: None,
            opts: OutboundOpts::default(),
            routing_key: "bridge_tg:chat_1".into(),
            priority: Priority::Normal,
            idempotency_key: None,
            dead_letter_replay: false,
        }
    }

    #[tokio::test]
    async fn successful_send_round_trips() {
        let adapter: Arc<dyn Adapter> = Arc::new(FakeAdapter::new("telegram"));
        let gateway = make_gateway(adapter);
        let result = gateway.submit(base_request()).await.unwrap();
        assert!(result["message_id"].as_str().is_some());
    }

    #[tokio::test]
    async fn terminal_failure_is_captured_as_dead_letter() {
        let adapter = FakeAdapter::new("telegram");
        adapter.script_send(vec![messaging_adapter::fake::ScriptedReply::Err(
            "auth failure: forbidden".into(),
        )]);
        let gateway = make_gateway(Arc::new(adapter));
        let result = gateway.submit(base_request()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn bridge_not_found_is_terminal() {
        let adapter: Arc<dyn Adapter> = Arc::new(FakeAdapter::new("telegram"));
        let gateway = make_gateway(adapter);
        let mut req = base_request();
        req.bridge_id = "missing_bridge".into();
        req.routing_key = "missing_bridge:chat_1".into();
        let result = gateway.submit(req).await;
        assert!(result.is_err());
    }
}

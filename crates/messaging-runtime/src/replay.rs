//! `ReplayWorker` pool (spec §4.11): resubmits captured dead letters to
//! the `OutboundGateway` under a derived idempotency key, partitioned by
//! `hash(dead_letter_id) mod replay_partitions` so concurrent replays of
//! the same record serialize through one worker.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use messaging_domain::{DeadLetterStatus, Result};

use crate::dead_letter::DeadLetterService;
use crate::gateway::OutboundGateway;

#[derive(Debug, Clone, Copy, Default)]
pub struct ReplayOpts {
    pub force: bool,
}

#[derive(Debug, Clone)]
pub enum ReplayOutcome {
    Replayed { response: serde_json::Value },
    AlreadyReplayed,
    Failed { reason: String },
}

/// Stateless aside from the partition count: each replay call re-reads
/// the record fresh from the dead-letter service, so there is no worker
/// state to hydrate on restart.
pub struct ReplayWorkers {
    partitions: usize,
    dead_letters: Arc<DeadLetterService>,
    gateway: Arc<OutboundGateway>,
}

fn hash_id(id: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    id.hash(&mut hasher);
    hasher.finish()
}

impl ReplayWorkers {
    pub fn new(partitions: usize, dead_letters: Arc<DeadLetterService>, gateway: Arc<OutboundGateway>) -> Self {
        Self {
            partitions: partitions.max(1),
            dead_letters,
            gateway,
        }
    }

    pub fn partition_for(&self, dead_letter_id: &str) -> usize {
        (hash_id(dead_letter_id) as usize) % self.partitions
    }

    #[tracing::instrument(skip(self), fields(partition = self.partition_for(dead_letter_id)))]
    pub async fn replay(&self, dead_letter_id: &str, opts: ReplayOpts) -> Result<ReplayOutcome> {
        let mut record = self.dead_letters.get(dead_letter_id).await?;

        if record.status == DeadLetterStatus::Replayed && !opts.force {
            return Ok(ReplayOutcome::AlreadyReplayed);
        }

        record.status = DeadLetterStatus::Replaying;
        record.updated_at = chrono::Utc::now();
        let store = self.dead_letters.store();
        record = store.save_dead_letter(record).await?;

        let mut request = record.request.clone();
        request.dead_letter_replay = true;
        request.idempotency_key = Some(
            request
                .idempotency_key
                .clone()
                .unwrap_or_else(|| format!("dead_letter:{dead_letter_id}")),
        );

        match self.gateway.submit(request).await {
            Ok(response) => {
                record.status = DeadLetterStatus::Replayed;
                record.updated_at = chrono::Utc::now();
                store.save_dead_letter(record).await?;
                Ok(ReplayOutcome::Replayed { response })
            }
            Err(e) => {
                record.status = DeadLetterStatus::Captured;
                record.replay_attempts += 1;
                record.updated_at = chrono::Utc::now();
                store.save_dead_letter(record).await?;
                Ok(ReplayOutcome::Failed { reason: e.to_string() })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use messaging_adapter::fake::{FakeAdapter, ScriptedReply};
    use messaging_adapter::Adapter;
    use messaging_domain::{
        config::GatewayConfig, Operation, OutboundOpts, OutboundRequest, Payload, Priority,
    };
    use messaging_store::{InMemoryStore, Store};

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

    async fn harness(adapter: Arc<dyn Adapter>) -> (Arc<DeadLetterService>, Arc<OutboundGateway>, String) {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let signals = Arc::new(crate::signal::SignalBus::new());
        let dead_letters = Arc::new(DeadLetterService::new("inst-1", store.clone(), signals.clone()));
        let bridges = Arc::new(crate::bridge::BridgeRegistry::new());
        bridges.register(Arc::new(crate::bridge::BridgeWorker::new(
            "bridge_tg",
            adapter,
            "telegram_adapter",
            true,
        )));
        let mut cfg = GatewayConfig::default();
        cfg.partition_count = Some(1);
        cfg.max_attempts = 1;
        cfg.base_backoff = std::time::Duration::from_millis(1);
        cfg.max_backoff = std::time::Duration::from_millis(1);
        let gateway = Arc::new(OutboundGateway::new(
            cfg,
            bridges,
            dead_letters.clone(),
            Arc::new(crate::security::DefaultSecurity),
            Arc::new(crate::media::DefaultMediaPolicy::default()),
            signals,
        ));
        let id = dead_letters
            .capture(base_request(), "auth failure: forbidden".into(), serde_json::json!({}))
            .await;
        (dead_letters, gateway, id)
    }

    #[tokio::test]
    async fn successful_replay_marks_record_replayed() {
        let adapter = FakeAdapter::new("telegram");
        adapter.script_send(vec![ScriptedReply::Ok(messaging_adapter::SendResult {
            message_id: "m1".into(),
            extra: serde_json::Value::Null,
        })]);
        let (dead_letters, gateway, id) = harness(Arc::new(adapter)).await;
        let workers = ReplayWorkers::new(2, dead_letters.clone(), gateway);
        let outcome = workers.replay(&id, ReplayOpts::default()).await.unwrap();
        assert!(matches!(outcome, ReplayOutcome::Replayed { .. }));
        let record = dead_letters.get(&id).await.unwrap();
        assert_eq!(record.status, DeadLetterStatus::Replayed);
    }

    #[tokio::test]
    async fn already_replayed_short_circuits_without_force() {
        let adapter = FakeAdapter::new("telegram");
        adapter.script_send(vec![ScriptedReply::Ok(messaging_adapter::SendResult {
            message_id: "m1".into(),
            extra: serde_json::Value::Null,
        })]);
        let (dead_letters, gateway, id) = harness(Arc::new(adapter)).await;
        let workers = ReplayWorkers::new(2, dead_letters, gateway);
        workers.replay(&id, ReplayOpts::default()).await.unwrap();
        let second = workers.replay(&id, ReplayOpts::default()).await.unwrap();
        assert!(matches!(second, ReplayOutcome::AlreadyReplayed));
    }

    #[tokio::test]
    async fn failed_replay_reverts_to_captured_and_bumps_attempts() {
        let adapter = FakeAdapter::new("telegram");
        adapter.script_send(vec![ScriptedReply::Err("auth failure: forbidden".into())]);
        let (dead_letters, gateway, id) = harness(Arc::new(adapter)).await;
        let workers = ReplayWorkers::new(2, dead_letters.clone(), gateway);
        let outcome = workers.replay(&id, ReplayOpts::default()).await.unwrap();
        assert!(matches!(outcome, ReplayOutcome::Failed { .. }));
        let record = dead_letters.get(&id).await.unwrap();
        assert_eq!(record.status, DeadLetterStatus::Captured);
        assert_eq!(record.replay_attempts, 1);
    }
}

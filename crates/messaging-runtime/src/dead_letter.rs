//! `DeadLetterService` (spec §4.9): captures terminal outbound failures and
//! exposes the list/get/archive/purge operations the public API wraps.
//! Replay itself lives in `replay.rs` — this module owns the record's
//! lifecycle up to the point it is handed back for another attempt.

use std::sync::Arc;

use messaging_domain::{
    DeadLetterRecord, DeadLetterStatus, Diagnostics, Error, OutboundRequest, Result, StoreError,
};
use messaging_store::{DeadLetterFilter, Store};

use crate::observer::{DeadLetterEvent, Observer};
use crate::signal::{SignalBus, Topic};

pub struct DeadLetterService {
    instance_id: String,
    store: Arc<dyn Store>,
    signals: Arc<SignalBus>,
    observer: Arc<dyn Observer>,
}

impl DeadLetterService {
    pub fn new(instance_id: impl Into<String>, store: Arc<dyn Store>, signals: Arc<SignalBus>) -> Self {
        Self::with_observer(instance_id, store, signals, Arc::new(crate::observer::TracingObserver))
    }

    pub fn with_observer(
        instance_id: impl Into<String>,
        store: Arc<dyn Store>,
        signals: Arc<SignalBus>,
        observer: Arc<dyn Observer>,
    ) -> Self {
        Self {
            instance_id: instance_id.into(),
            store,
            signals,
            observer,
        }
    }

    /// Persists a captured failure and publishes `DeadLetterCaptured`.
    /// Returns the new record's id.
    pub async fn capture(&self, request: OutboundRequest, error: String, diagnostics: Diagnostics) -> String {
        let record = DeadLetterRecord::new(self.instance_id.clone(), request, error.clone(), diagnostics);
        let id = record.id.clone();
        match self.store.save_dead_letter(record).await {
            Ok(saved) => {
                self.signals.publish(
                    Topic::DeadLetterCaptured,
                    serde_json::json!({"id": saved.id, "routing_key": saved.request.routing_key, "error": error}),
                );
                self.observer.on_dead_letter_captured(DeadLetterEvent {
                    id: &saved.id,
                    routing_key: &saved.request.routing_key,
                });
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to persist dead letter record");
            }
        }
        id
    }

    pub async fn get(&self, id: &str) -> Result<DeadLetterRecord> {
        Ok(self.store.get_dead_letter(id).await?)
    }

    pub async fn list(&self, filter: DeadLetterFilter) -> Result<Vec<DeadLetterRecord>> {
        Ok(self.store.list_dead_letters(filter).await?)
    }

    /// Marks a record `archived`. Forbidden only from `replayed` (spec §3).
    pub async fn archive(&self, id: &str) -> Result<DeadLetterRecord> {
        let mut record = self.store.get_dead_letter(id).await?;
        if !record.status.can_transition_to(DeadLetterStatus::Archived) {
            return Err(Error::Store(StoreError::Invalid(format!(
                "cannot archive dead letter {id} from status {:?}",
                record.status
            ))));
        }
        record.status = DeadLetterStatus::Archived;
        record.updated_at = chrono::Utc::now();
        Ok(self.store.save_dead_letter(record).await?)
    }

    pub async fn purge(&self, filter: DeadLetterFilter) -> Result<usize> {
        let records = self.store.list_dead_letters(filter).await?;
        let count = records.len();
        for record in records {
            self.store.delete_dead_letter(&record.id).await?;
        }
        Ok(count)
    }

    pub(crate) fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }
}

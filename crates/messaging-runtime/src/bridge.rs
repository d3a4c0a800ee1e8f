//! `BridgeRegistry` + `BridgeWorker` (spec §4.10).
//!
//! One `BridgeWorker` per configured `bridge_id`. It owns the adapter
//! instance, starts any listener child specs the adapter declares, and
//! exposes a health snapshot. Config updates that change `adapter_module`
//! or `credentials` force a restart (a fresh adapter instance replaces the
//! old one); revision-only changes are picked up by readers the next time
//! they snapshot `ConfigStore` and need no restart.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use messaging_adapter::Adapter;
use parking_lot::{Mutex, RwLock};

#[derive(Debug, Clone, serde::Serialize)]
pub struct BridgeHealth {
    pub bridge_id: String,
    pub enabled: bool,
    pub revision: u64,
    pub listener_count: usize,
    pub last_ingress_at: Option<DateTime<Utc>>,
    pub last_outbound_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

struct WorkerState {
    adapter_module: String,
    revision: u64,
    listener_count: usize,
    last_ingress_at: Option<DateTime<Utc>>,
    last_outbound_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

/// A supervised subtree for one bridge. Listener child specs the adapter
/// declares are tracked here only by name/count in this reference
/// implementation — running them is an adapter/runtime-host concern
/// outside this crate's scope (spec §1).
pub struct BridgeWorker {
    pub bridge_id: String,
    pub adapter: Arc<dyn Adapter>,
    enabled: std::sync::atomic::AtomicBool,
    ingress_count: AtomicU64,
    outbound_count: AtomicU64,
    state: Mutex<WorkerState>,
}

impl BridgeWorker {
    pub fn new(bridge_id: impl Into<String>, adapter: Arc<dyn Adapter>, adapter_module: impl Into<String>, enabled: bool) -> Self {
        let listener_count = adapter.listener_child_specs().len();
        Self {
            bridge_id: bridge_id.into(),
            adapter,
            enabled: std::sync::atomic::AtomicBool::new(enabled),
            ingress_count: AtomicU64::new(0),
            outbound_count: AtomicU64::new(0),
            state: Mutex::new(WorkerState {
                adapter_module: adapter_module.into(),
                revision: 0,
                listener_count,
                last_ingress_at: None,
                last_outbound_at: None,
                last_error: None,
            }),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn record_ingress(&self) {
        self.ingress_count.fetch_add(1, Ordering::Relaxed);
        self.state.lock().last_ingress_at = Some(Utc::now());
    }

    pub fn record_outbound(&self) {
        self.outbound_count.fetch_add(1, Ordering::Relaxed);
        self.state.lock().last_outbound_at = Some(Utc::now());
    }

    pub fn record_error(&self, error: impl Into<String>) {
        self.state.lock().last_error = Some(error.into());
    }

    /// Returns `true` if this config change requires a fresh adapter
    /// instance (spec §4.10: `adapter_module`/credentials changed).
    pub fn needs_restart_for(&self, new_adapter_module: &str) -> bool {
        self.state.lock().adapter_module != new_adapter_module
    }

    pub fn bump_revision(&self, revision: u64) {
        self.state.lock().revision = revision;
    }

    pub fn health(&self) -> BridgeHealth {
        let state = self.state.lock();
        BridgeHealth {
            bridge_id: self.bridge_id.clone(),
            enabled: self.is_enabled(),
            revision: state.revision,
            listener_count: state.listener_count,
            last_ingress_at: state.last_ingress_at,
            last_outbound_at: state.last_outbound_at,
            last_error: state.last_error.clone(),
        }
    }
}

/// Tracks every running `BridgeWorker`, keyed by `bridge_id`.
#[derive(Default)]
pub struct BridgeRegistry {
    workers: RwLock<HashMap<String, Arc<BridgeWorker>>>,
}

impl BridgeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, worker: Arc<BridgeWorker>) {
        self.workers.write().insert(worker.bridge_id.clone(), worker);
    }

    pub fn get(&self, bridge_id: &str) -> Option<Arc<BridgeWorker>> {
        self.workers.read().get(bridge_id).cloned()
    }

    pub fn remove(&self, bridge_id: &str) -> Option<Arc<BridgeWorker>> {
        self.workers.write().remove(bridge_id)
    }

    pub fn all_health(&self) -> Vec<BridgeHealth> {
        self.workers.read().values().map(|w| w.health()).collect()
    }

    pub fn adapter_for(&self, bridge_id: &str) -> Option<Arc<dyn Adapter>> {
        self.workers.read().get(bridge_id).map(|w| w.adapter.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use messaging_adapter::fake::FakeAdapter;

    #[test]
    fn registry_round_trips_a_worker() {
        let registry = BridgeRegistry::new();
        let adapter: Arc<dyn Adapter> = Arc::new(FakeAdapter::new("telegram"));
        let worker = Arc::new(BridgeWorker::new("bridge_tg", adapter, "telegram_adapter", true));
        registry.register(worker.clone());
        assert!(registry.get("bridge_tg").is_some());
        assert!(registry.adapter_for("bridge_tg").is_some());
        registry.remove("bridge_tg");
        assert!(registry.get("bridge_tg").is_none());
    }

    #[test]
    fn restart_required_only_on_adapter_module_change() {
        let adapter: Arc<dyn Adapter> = Arc::new(FakeAdapter::new("telegram"));
        let worker = BridgeWorker::new("bridge_tg", adapter, "telegram_adapter", true);
        assert!(!worker.needs_restart_for("telegram_adapter"));
        assert!(worker.needs_restart_for("telegram_adapter_v2"));
    }
}

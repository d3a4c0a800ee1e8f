//! Single-writer/many-reader control-plane store (spec §4.3).
//!
//! `ConfigStore` holds the routing-facing view of `BridgeConfig`,
//! `RoomBinding`, and `RoutingPolicy`: a copy-on-write snapshot readers
//! observe without synchronization, mutated one `Put*` at a time by a
//! single writer lock. Each `Put*` bumps `revision` and rejects a
//! caller-supplied stale revision with `conflict`.
//!
//! `RoomBinding` is also a persisted entity the `Store` tracks (it backs
//! the `Room.external_bindings` race-safety contract); `ConfigStore`'s copy
//! is the fast, consistently-snapshotted view `OutboundRouter` reads on
//! every dispatch. The public `Instance` API keeps both in sync (see
//! `instance.rs`).

use std::collections::HashMap;
use std::sync::Arc;

use messaging_domain::{BridgeConfig, Error, Result, RoomBinding, RoutingPolicy};
use parking_lot::{Mutex, RwLock};

#[derive(Debug, Clone, Default)]
struct Snapshot {
    bridge_configs: HashMap<String, BridgeConfig>,
    room_bindings: HashMap<String, RoomBinding>,
    /// Secondary index for `OutboundRouter`: `room_id -> [binding_id]`.
    bindings_by_room: HashMap<String, Vec<String>>,
    routing_policies: HashMap<String, RoutingPolicy>,
}

/// Serializes all mutations; readers only ever touch `snapshot`.
pub struct ConfigStore {
    snapshot: RwLock<Arc<Snapshot>>,
    writer_lock: Mutex<()>,
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore {
    pub fn new() -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(Snapshot::default())),
            writer_lock: Mutex::new(()),
        }
    }

    fn read(&self) -> Arc<Snapshot> {
        self.snapshot.read().clone()
    }

    /// Checks `expected_revision` against the stored value (if any);
    /// `None` supplied by the caller always succeeds (unconditional put).
    fn check_revision(current: Option<u64>, expected: Option<u64>, what: &str) -> Result<()> {
        match (current, expected) {
            (Some(cur), Some(exp)) if cur != exp => Err(Error::Store(
                messaging_domain::StoreError::Conflict(format!(
                    "{what}: revision {exp} does not match stored revision {cur}"
                )),
            )),
            _ => Ok(()),
        }
    }

    // ── BridgeConfig ─────────────────────────────────────────────────

    pub fn put_bridge_config(&self, mut config: BridgeConfig, expected_revision: Option<u64>) -> Result<BridgeConfig> {
        let _guard = self.writer_lock.lock();
        let mut next = (*self.read()).clone();
        let current = next.bridge_configs.get(&config.id).map(|c| c.revision);
        Self::check_revision(current, expected_revision, &format!("bridge_config {}", config.id))?;
        config.revision = current.map(|r| r + 1).unwrap_or(0);
        next.bridge_configs.insert(config.id.clone(), config.clone());
        *self.snapshot.write() = Arc::new(next);
        Ok(config)
    }

    pub fn get_bridge_config(&self, id: &str) -> Result<BridgeConfig> {
        self.read()
            .bridge_configs
            .get(id)
            .cloned()
            .ok_or_else(|| Error::BridgeNotFound(id.to_string()))
    }

    pub fn list_bridge_configs(&self) -> Vec<BridgeConfig> {
        let snap = self.read();
        let mut v: Vec<_> = snap.bridge_configs.values().cloned().collect();
        v.sort_by(|a, b| a.id.cmp(&b.id));
        v
    }

    pub fn delete_bridge_config(&self, id: &str) -> Result<()> {
        let _guard = self.writer_lock.lock();
        let mut next = (*self.read()).clone();
        next.bridge_configs
            .remove(id)
            .ok_or_else(|| Error::BridgeNotFound(id.to_string()))?;
        *self.snapshot.write() = Arc::new(next);
        Ok(())
    }

    // ── RoomBinding ──────────────────────────────────────────────────

    pub fn put_room_binding(&self, mut binding: RoomBinding, expected_revision: Option<u64>) -> Result<RoomBinding> {
        let _guard = self.writer_lock.lock();
        let mut next = (*self.read()).clone();
        let current = next.room_bindings.get(&binding.id).map(|b| b.revision);
        Self::check_revision(current, expected_revision, &format!("room_binding {}", binding.id))?;
        binding.revision = current.map(|r| r + 1).unwrap_or(0);
        next.bindings_by_room
            .entry(binding.room_id.clone())
            .or_default()
            .retain(|id| id != &binding.id);
        next.bindings_by_room
            .entry(binding.room_id.clone())
            .or_default()
            .push(binding.id.clone());
        next.room_bindings.insert(binding.id.clone(), binding.clone());
        *self.snapshot.write() = Arc::new(next);
        Ok(binding)
    }

    pub fn list_room_bindings(&self, room_id: &str) -> Vec<RoomBinding> {
        let snap = self.read();
        snap.bindings_by_room
            .get(room_id)
            .cloned()
            .unwrap_or_default()
            .iter()
            .filter_map(|id| snap.room_bindings.get(id).cloned())
            .collect()
    }

    pub fn delete_room_binding(&self, binding_id: &str) -> Result<()> {
        let _guard = self.writer_lock.lock();
        let mut next = (*self.read()).clone();
        let binding = next
            .room_bindings
            .remove(binding_id)
            .ok_or_else(|| Error::Store(messaging_domain::StoreError::NotFound(binding_id.to_string())))?;
        if let Some(ids) = next.bindings_by_room.get_mut(&binding.room_id) {
            ids.retain(|id| id != binding_id);
        }
        *self.snapshot.write() = Arc::new(next);
        Ok(())
    }

    // ── RoutingPolicy ────────────────────────────────────────────────

    pub fn put_routing_policy(&self, mut policy: RoutingPolicy, expected_revision: Option<u64>) -> Result<RoutingPolicy> {
        let _guard = self.writer_lock.lock();
        let mut next = (*self.read()).clone();
        let current = next.routing_policies.get(&policy.room_id).map(|p| p.revision);
        Self::check_revision(current, expected_revision, &format!("routing_policy {}", policy.room_id))?;
        policy.revision = current.map(|r| r + 1).unwrap_or(0);
        next.routing_policies.insert(policy.room_id.clone(), policy.clone());
        *self.snapshot.write() = Arc::new(next);
        Ok(policy)
    }

    pub fn get_routing_policy(&self, room_id: &str) -> Option<RoutingPolicy> {
        self.read().routing_policies.get(room_id).cloned()
    }

    pub fn delete_routing_policy(&self, room_id: &str) -> Result<()> {
        let _guard = self.writer_lock.lock();
        let mut next = (*self.read()).clone();
        next.routing_policies
            .remove(room_id)
            .ok_or_else(|| Error::Store(messaging_domain::StoreError::NotFound(room_id.to_string())))?;
        *self.snapshot.write() = Arc::new(next);
        Ok(())
    }

    /// Takes a single consistent read of bindings + policy for a room, so
    /// `OutboundRouter` never tears between the two (spec §4.3).
    pub fn snapshot_routing(&self, room_id: &str) -> (Vec<RoomBinding>, Option<RoutingPolicy>) {
        let snap = self.read();
        let bindings = snap
            .bindings_by_room
            .get(room_id)
            .cloned()
            .unwrap_or_default()
            .iter()
            .filter_map(|id| snap.room_bindings.get(id).cloned())
            .collect();
        let policy = snap.routing_policies.get(room_id).cloned();
        (bindings, policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use messaging_domain::Direction;

    #[test]
    fn stale_revision_is_rejected() {
        let store = ConfigStore::new();
        let cfg = store
            .put_bridge_config(BridgeConfig::new("bridge_tg", "telegram"), None)
            .unwrap();
        assert_eq!(cfg.revision, 0);
        let err = store.put_bridge_config(BridgeConfig::new("bridge_tg", "telegram"), Some(5));
        assert!(err.is_err());
        let ok = store.put_bridge_config(BridgeConfig::new("bridge_tg", "telegram"), Some(0));
        assert_eq!(ok.unwrap().revision, 1);
    }

    #[test]
    fn routing_snapshot_is_consistent() {
        let store = ConfigStore::new();
        let binding = RoomBinding::new("room_1", "telegram", "bridge_tg", "chat_42", Direction::Both);
        store.put_room_binding(binding, None).unwrap();
        let (bindings, policy) = store.snapshot_routing("room_1");
        assert_eq!(bindings.len(), 1);
        assert!(policy.is_none());
    }
}

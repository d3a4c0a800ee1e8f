//! Single-process in-memory reference implementation of [`Store`].
//!
//! One [`parking_lot::Mutex`] guards every map (spec §6.4's secondary
//! indexes). That is deliberately coarse: every operation here is pure CPU
//! with no `.await` inside the critical section, so a single lock gives
//! the race-safety contract on `get_or_create_*` for free instead of
//! needing a separate compare-and-swap dance per index.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use messaging_domain::{
    DeadLetterRecord, DeadLetterStatus, Message, MessageFilter, Participant, ParticipantType,
    Room, RoomBinding, RoomFilter, RoomType, StoreError, StoreResult,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::{DeadLetterFilter, ParticipantAttrs, RoomAttrs, Store};

/// One line of the JSONL snapshot format used by
/// [`InMemoryStore::snapshot_to_path`] / [`InMemoryStore::restore_from_path`].
/// Deliberately untagged-union-free: each record carries its own kind so a
/// reader never needs the writer's line ordering.
#[derive(Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum SnapshotRecord {
    Room(Room),
    Participant(Participant),
    Message(Message),
    RoomBinding(RoomBinding),
    DeadLetter(DeadLetterRecord),
}

#[derive(Default)]
struct Inner {
    rooms: HashMap<String, Room>,
    room_external_index: HashMap<(String, String, String), String>,
    participants: HashMap<String, Participant>,
    participant_external_index: HashMap<(String, String), String>,
    messages: HashMap<String, Message>,
    messages_by_external_id: HashMap<(String, String, String), String>,
    room_messages: HashMap<String, Vec<String>>,
    room_bindings: HashMap<String, RoomBinding>,
    room_bindings_by_room: HashMap<String, Vec<String>>,
    dead_letters: HashMap<String, DeadLetterRecord>,
}

#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dumps every entity to a JSONL file, one [`SnapshotRecord`] per line.
    /// Purely additive: nothing in the `Store` contract depends on this,
    /// it exists for local development and test fixtures that want a
    /// durable starting point without a real backing database.
    pub fn snapshot_to_path(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let inner = self.inner.lock();
        let mut file = std::fs::File::create(path)?;
        for room in inner.rooms.values() {
            writeln!(file, "{}", serde_json::to_string(&SnapshotRecord::Room(room.clone()))?)?;
        }
        for participant in inner.participants.values() {
            writeln!(file, "{}", serde_json::to_string(&SnapshotRecord::Participant(participant.clone()))?)?;
        }
        for message in inner.messages.values() {
            writeln!(file, "{}", serde_json::to_string(&SnapshotRecord::Message(message.clone()))?)?;
        }
        for binding in inner.room_bindings.values() {
            writeln!(file, "{}", serde_json::to_string(&SnapshotRecord::RoomBinding(binding.clone()))?)?;
        }
        for record in inner.dead_letters.values() {
            writeln!(file, "{}", serde_json::to_string(&SnapshotRecord::DeadLetter(record.clone()))?)?;
        }
        Ok(())
    }

    /// Loads a store from a JSONL file written by [`Self::snapshot_to_path`],
    /// rebuilding every secondary index exactly as the live `save_*`/`create_*`
    /// methods would. Returns an empty store if `path` does not exist, the
    /// same load-if-exists-else-create shape the rest of the workspace uses
    /// for its own local state files.
    pub fn restore_from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let store = Self::new();
        if !path.exists() {
            return Ok(store);
        }
        let reader = BufReader::new(std::fs::File::open(path)?);
        let mut inner = store.inner.lock();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<SnapshotRecord>(&line)? {
                SnapshotRecord::Room(room) => {
                    for (channel, by_bridge) in &room.external_bindings {
                        for (bridge_id, external_id) in by_bridge {
                            inner.room_external_index.insert(
                                (channel.clone(), bridge_id.clone(), external_id.clone()),
                                room.id.clone(),
                            );
                        }
                    }
                    inner.rooms.insert(room.id.clone(), room);
                }
                SnapshotRecord::Participant(participant) => {
                    for (channel, external_id) in &participant.external_ids {
                        inner
                            .participant_external_index
                            .insert((channel.clone(), external_id.clone()), participant.id.clone());
                    }
                    inner.participants.insert(participant.id.clone(), participant);
                }
                SnapshotRecord::Message(message) => {
                    inner
                        .room_messages
                        .entry(message.room_id.clone())
                        .or_default()
                        .push(message.id.clone());
                    inner.messages.insert(message.id.clone(), message);
                }
                SnapshotRecord::RoomBinding(binding) => {
                    inner
                        .room_bindings_by_room
                        .entry(binding.room_id.clone())
                        .or_default()
                        .push(binding.id.clone());
                    inner.room_bindings.insert(binding.id.clone(), binding);
                }
                SnapshotRecord::DeadLetter(record) => {
                    inner.dead_letters.insert(record.id.clone(), record);
                }
            }
        }
        drop(inner);
        Ok(store)
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn save_room(&self, room: Room) -> StoreResult<Room> {
        let mut inner = self.inner.lock();
        for (channel, by_bridge) in &room.external_bindings {
            for (bridge_id, external_id) in by_bridge {
                inner.room_external_index.insert(
                    (channel.clone(), bridge_id.clone(), external_id.clone()),
                    room.id.clone(),
                );
            }
        }
        inner.rooms.insert(room.id.clone(), room.clone());
        Ok(room)
    }

    async fn get_room(&self, id: &str) -> StoreResult<Room> {
        self.inner
            .lock()
            .rooms
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("room {id}")))
    }

    async fn list_rooms(&self, filter: RoomFilter, limit: usize, offset: usize) -> StoreResult<Vec<Room>> {
        let inner = self.inner.lock();
        let mut rooms: Vec<Room> = inner
            .rooms
            .values()
            .filter(|r| filter.room_type.map_or(true, |t| t == r.room_type))
            .filter(|r| {
                filter
                    .name_contains
                    .as_ref()
                    .map_or(true, |needle| r.name.as_deref().unwrap_or("").contains(needle.as_str()))
            })
            .cloned()
            .collect();
        rooms.sort_by(|a, b| a.inserted_at.cmp(&b.inserted_at));
        Ok(rooms.into_iter().skip(offset).take(limit.max(1)).collect())
    }

    async fn delete_room(&self, id: &str) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        let room = inner
            .rooms
            .remove(id)
            .ok_or_else(|| StoreError::NotFound(format!("room {id}")))?;
        inner
            .room_external_index
            .retain(|_, room_id| room_id != &room.id);
        Ok(())
    }

    async fn get_or_create_room_by_external_binding(
        &self,
        channel: &str,
        bridge_id: &str,
        external_id: &str,
        attrs: RoomAttrs,
    ) -> StoreResult<(Room, bool)> {
        let mut inner = self.inner.lock();
        let key = (channel.to_string(), bridge_id.to_string(), external_id.to_string());

        // Recover from a stale index entry pointing at a deleted room.
        if let Some(existing_id) = inner.room_external_index.get(&key) {
            if let Some(room) = inner.rooms.get(existing_id) {
                return Ok((room.clone(), false));
            }
        }

        let mut room = Room::new(attrs.room_type.unwrap_or(RoomType::Direct), attrs.name);
        room.metadata = attrs.metadata;
        room.bind_external(channel, bridge_id, external_id);
        inner.room_external_index.insert(key, room.id.clone());
        inner.rooms.insert(room.id.clone(), room.clone());
        Ok((room, true))
    }

    async fn get_room_by_external_binding(
        &self,
        channel: &str,
        bridge_id: &str,
        external_id: &str,
    ) -> StoreResult<Room> {
        let inner = self.inner.lock();
        let key = (channel.to_string(), bridge_id.to_string(), external_id.to_string());
        let room_id = inner
            .room_external_index
            .get(&key)
            .ok_or_else(|| StoreError::NotFound("room binding".into()))?;
        inner
            .rooms
            .get(room_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("room {room_id}")))
    }

    async fn save_participant(&self, participant: Participant) -> StoreResult<Participant> {
        let mut inner = self.inner.lock();
        for (channel, external_id) in &participant.external_ids {
            inner
                .participant_external_index
                .insert((channel.clone(), external_id.clone()), participant.id.clone());
        }
        inner
            .participants
            .insert(participant.id.clone(), participant.clone());
        Ok(participant)
    }

    async fn get_participant(&self, id: &str) -> StoreResult<Participant> {
        self.inner
            .lock()
            .participants
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("participant {id}")))
    }

    async fn get_or_create_participant_by_external_id(
        &self,
        channel: &str,
        external_id: &str,
        attrs: ParticipantAttrs,
    ) -> StoreResult<(Participant, bool)> {
        let mut inner = self.inner.lock();
        let key = (channel.to_string(), external_id.to_string());
        if let Some(existing_id) = inner.participant_external_index.get(&key) {
            if let Some(p) = inner.participants.get(existing_id) {
                return Ok((p.clone(), false));
            }
        }
        let mut participant = Participant::new(
            attrs.participant_type.unwrap_or(ParticipantType::Human),
            messaging_domain::Identity {
                username: attrs.username,
                display_name: attrs.display_name,
            },
        );
        participant.bind_external(channel, external_id);
        inner.participant_external_index.insert(key, participant.id.clone());
        inner
            .participants
            .insert(participant.id.clone(), participant.clone());
        Ok((participant, true))
    }

    async fn save_message(&self, message: Message) -> StoreResult<Message> {
        let mut inner = self.inner.lock();
        inner
            .room_messages
            .entry(message.room_id.clone())
            .or_default()
            .push(message.id.clone());
        if let Some(external_id) = &message.external_id {
            let channel = message.metadata.get("channel").and_then(|v| v.as_str()).map(str::to_string);
            let bridge_id = message.metadata.get("bridge_id").and_then(|v| v.as_str()).map(str::to_string);
            if let (Some(channel), Some(bridge_id)) = (channel, bridge_id) {
                inner
                    .messages_by_external_id
                    .insert((channel, bridge_id, external_id.clone()), message.id.clone());
            }
        }
        inner.messages.insert(message.id.clone(), message.clone());
        Ok(message)
    }

    async fn get_message(&self, id: &str) -> StoreResult<Message> {
        self.inner
            .lock()
            .messages
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("message {id}")))
    }

    async fn list_messages(&self, room_id: &str, filter: MessageFilter) -> StoreResult<Vec<Message>> {
        let inner = self.inner.lock();
        let ids = inner.room_messages.get(room_id).cloned().unwrap_or_default();
        let mut messages: Vec<Message> = ids
            .iter()
            .filter_map(|id| inner.messages.get(id).cloned())
            .filter(|m| filter.since.map_or(true, |since| m.inserted_at >= since))
            .filter(|m| filter.role.map_or(true, |role| role == m.role))
            .collect();
        if let Some(limit) = filter.limit {
            let start = messages.len().saturating_sub(limit);
            messages = messages.split_off(start);
        }
        Ok(messages)
    }

    async fn delete_message(&self, id: &str) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        let message = inner
            .messages
            .remove(id)
            .ok_or_else(|| StoreError::NotFound(format!("message {id}")))?;
        if let Some(ids) = inner.room_messages.get_mut(&message.room_id) {
            ids.retain(|m| m != id);
        }
        if let Some(external_id) = &message.external_id {
            inner
                .messages_by_external_id
                .retain(|_, mid| mid != &message.id || external_id.is_empty());
        }
        Ok(())
    }

    async fn update_message_external_id(&self, msg_id: &str, external_id: &str) -> StoreResult<Message> {
        let mut inner = self.inner.lock();
        let message = inner
            .messages
            .get_mut(msg_id)
            .ok_or_else(|| StoreError::NotFound(format!("message {msg_id}")))?;
        message.external_id = Some(external_id.to_string());
        let updated = message.clone();
        // The (channel, bridge_id) scope for the external-id index travels
        // as metadata set by Ingest/Deliver at persist time — Message
        // itself only carries the bare `external_id` field (spec §3).
        let channel = updated.metadata.get("channel").and_then(|v| v.as_str()).map(str::to_string);
        let bridge_id = updated.metadata.get("bridge_id").and_then(|v| v.as_str()).map(str::to_string);
        if let (Some(channel), Some(bridge_id)) = (channel, bridge_id) {
            inner
                .messages_by_external_id
                .insert((channel, bridge_id, external_id.to_string()), msg_id.to_string());
        }
        Ok(updated)
    }

    async fn get_message_by_external_id(
        &self,
        channel: &str,
        bridge_id: &str,
        external_id: &str,
    ) -> StoreResult<Message> {
        let inner = self.inner.lock();
        let key = (channel.to_string(), bridge_id.to_string(), external_id.to_string());
        let msg_id = inner
            .messages_by_external_id
            .get(&key)
            .ok_or_else(|| StoreError::NotFound("message external id".into()))?;
        inner
            .messages
            .get(msg_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("message {msg_id}")))
    }

    async fn create_room_binding(&self, binding: RoomBinding) -> StoreResult<RoomBinding> {
        let mut inner = self.inner.lock();
        inner
            .room_bindings_by_room
            .entry(binding.room_id.clone())
            .or_default()
            .push(binding.id.clone());
        inner.room_bindings.insert(binding.id.clone(), binding.clone());
        Ok(binding)
    }

    async fn get_room_binding(&self, id: &str) -> StoreResult<RoomBinding> {
        self.inner
            .lock()
            .room_bindings
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("room_binding {id}")))
    }

    async fn list_room_bindings(&self, room_id: &str) -> StoreResult<Vec<RoomBinding>> {
        let inner = self.inner.lock();
        Ok(inner
            .room_bindings_by_room
            .get(room_id)
            .cloned()
            .unwrap_or_default()
            .iter()
            .filter_map(|id| inner.room_bindings.get(id).cloned())
            .collect())
    }

    async fn delete_room_binding(&self, binding_id: &str) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        let binding = inner
            .room_bindings
            .remove(binding_id)
            .ok_or_else(|| StoreError::NotFound(format!("room_binding {binding_id}")))?;
        if let Some(ids) = inner.room_bindings_by_room.get_mut(&binding.room_id) {
            ids.retain(|id| id != binding_id);
        }
        // Disabling hides from routing but preserves history (spec §3); a
        // hard delete also removes the room's external-binding lookup so a
        // subsequent inbound event creates a fresh room rather than
        // resurrecting the deleted one under the old id.
        inner.room_external_index.retain(|_, room_id| room_id != &binding.room_id
            || inner.rooms.contains_key(room_id));
        Ok(())
    }

    async fn save_dead_letter(&self, record: DeadLetterRecord) -> StoreResult<DeadLetterRecord> {
        let mut inner = self.inner.lock();
        if let Some(existing) = inner.dead_letters.get(&record.id) {
            if !existing.status.can_transition_to(record.status) {
                return Err(StoreError::Conflict(format!(
                    "dead letter {} cannot transition {:?} -> {:?}",
                    record.id, existing.status, record.status
                )));
            }
        }
        let mut record = record;
        record.updated_at = Utc::now();
        inner.dead_letters.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn get_dead_letter(&self, id: &str) -> StoreResult<DeadLetterRecord> {
        self.inner
            .lock()
            .dead_letters
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("dead_letter {id}")))
    }

    async fn list_dead_letters(&self, filter: DeadLetterFilter) -> StoreResult<Vec<DeadLetterRecord>> {
        let inner = self.inner.lock();
        let mut records: Vec<DeadLetterRecord> = inner
            .dead_letters
            .values()
            .filter(|r| filter.status.map_or(true, |s| s == r.status))
            .cloned()
            .collect();
        records.sort_by(|a, b| a.inserted_at.cmp(&b.inserted_at));
        if let Some(limit) = filter.limit {
            records.truncate(limit);
        }
        Ok(records)
    }

    async fn delete_dead_letter(&self, id: &str) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        inner
            .dead_letters
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("dead_letter {id}")))
    }
}

#[allow(unused)]
fn _assert_status_enum_used() -> DeadLetterStatus {
    DeadLetterStatus::Captured
}

#[cfg(test)]
mod tests {
    use super::*;
    use messaging_domain::{ContentBlock, Role};

    #[tokio::test]
    async fn get_or_create_room_is_idempotent_for_same_key() {
        let store = InMemoryStore::new();
        let (room_a, created_a) = store
            .get_or_create_room_by_external_binding("telegram", "bridge_tg", "chat_42", RoomAttrs::default())
            .await
            .unwrap();
        assert!(created_a);
        let (room_b, created_b) = store
            .get_or_create_room_by_external_binding("telegram", "bridge_tg", "chat_42", RoomAttrs::default())
            .await
            .unwrap();
        assert!(!created_b);
        assert_eq!(room_a.id, room_b.id);
    }

    #[tokio::test]
    async fn concurrent_get_or_create_room_yields_one_room() {
        use std::sync::Arc;
        let store = Arc::new(InMemoryStore::new());
        let mut handles = Vec::new();
        for _ in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .get_or_create_room_by_external_binding(
                        "telegram",
                        "bridge_tg",
                        "chat_race",
                        RoomAttrs::default(),
                    )
                    .await
                    .unwrap()
                    .0
                    .id
            }));
        }
        let mut ids = Vec::new();
        for h in handles {
            ids.push(h.await.unwrap());
        }
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 1);
    }

    #[tokio::test]
    async fn stale_binding_recreates_room() {
        let store = InMemoryStore::new();
        let (room, _) = store
            .get_or_create_room_by_external_binding("telegram", "bridge_tg", "chat_1", RoomAttrs::default())
            .await
            .unwrap();
        store.delete_room(&room.id).await.unwrap();
        let (room2, created) = store
            .get_or_create_room_by_external_binding("telegram", "bridge_tg", "chat_1", RoomAttrs::default())
            .await
            .unwrap();
        assert!(created);
        assert_ne!(room.id, room2.id);
    }

    #[tokio::test]
    async fn binding_round_trip_not_found_after_delete() {
        let store = InMemoryStore::new();
        let (room, _) = store
            .get_or_create_room_by_external_binding("telegram", "bridge_tg", "chat_1", RoomAttrs::default())
            .await
            .unwrap();
        let binding = RoomBinding::new(
            &room.id,
            "telegram",
            "bridge_tg",
            "chat_1",
            messaging_domain::Direction::Both,
        );
        store.create_room_binding(binding.clone()).await.unwrap();
        assert!(store
            .get_room_by_external_binding("telegram", "bridge_tg", "chat_1")
            .await
            .is_ok());
        store.delete_room_binding(&binding.id).await.unwrap();
        store.delete_room(&room.id).await.unwrap();
        assert!(store
            .get_room_by_external_binding("telegram", "bridge_tg", "chat_1")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn snapshot_round_trips_through_disk() {
        let dir = std::env::temp_dir().join(format!("messaging_store_snapshot_{}_{}", std::process::id(), line!()));
        let store = InMemoryStore::new();
        let (room, _) = store
            .get_or_create_room_by_external_binding("telegram", "bridge_tg", "chat_1", RoomAttrs::default())
            .await
            .unwrap();
        let msg = Message::new(&room.id, "participant_1", Role::User, vec![ContentBlock::text("hi")]);
        store.save_message(msg.clone()).await.unwrap();

        store.snapshot_to_path(&dir).unwrap();
        let restored = InMemoryStore::restore_from_path(&dir).unwrap();

        let restored_room = restored.get_room(&room.id).await.unwrap();
        assert_eq!(restored_room.id, room.id);
        let restored_messages = restored.list_messages(&room.id, MessageFilter::default()).await.unwrap();
        assert_eq!(restored_messages.len(), 1);
        assert_eq!(restored_messages[0].id, msg.id);
        assert!(restored
            .get_room_by_external_binding("telegram", "bridge_tg", "chat_1")
            .await
            .is_ok());

        std::fs::remove_file(&dir).unwrap();
    }

    #[tokio::test]
    async fn restore_from_missing_path_yields_empty_store() {
        let missing = std::env::temp_dir().join(format!("messaging_store_missing_{}_{}", std::process::id(), line!()));
        let store = InMemoryStore::restore_from_path(&missing).unwrap();
        assert!(store.list_rooms(RoomFilter::default(), 10, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn save_then_list_messages_includes_new_message() {
        let store = InMemoryStore::new();
        let (room, _) = store
            .get_or_create_room_by_external_binding("telegram", "bridge_tg", "chat_1", RoomAttrs::default())
            .await
            .unwrap();
        let msg = Message::new(&room.id, "participant_1", Role::User, vec![ContentBlock::text("hi")]);
        store.save_message(msg.clone()).await.unwrap();
        let listed = store.list_messages(&room.id, MessageFilter::default()).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, msg.id);
    }
}

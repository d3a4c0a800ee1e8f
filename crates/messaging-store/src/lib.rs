//! Persistence interface (spec §4.1, §6.2) plus an in-memory reference
//! implementation. Concrete external backends are out of scope (spec §1);
//! this crate defines the contract every backend must honor and ships the
//! single-process implementation the reference runtime uses.

pub mod memory;

use async_trait::async_trait;
use messaging_domain::{
    DeadLetterRecord, Message, MessageFilter, Participant, Room, RoomBinding, RoomFilter,
    StoreResult,
};
use serde_json::Value;

pub use memory::InMemoryStore;

/// Attributes supplied when a room or participant is implicitly created by
/// an inbound event that references an unseen external binding.
#[derive(Debug, Clone, Default)]
pub struct RoomAttrs {
    pub room_type: Option<messaging_domain::RoomType>,
    pub name: Option<String>,
    pub metadata: Value,
}

#[derive(Debug, Clone, Default)]
pub struct ParticipantAttrs {
    pub participant_type: Option<messaging_domain::ParticipantType>,
    pub username: Option<String>,
    pub display_name: Option<String>,
}

/// Filter accepted by `ListDeadLetters`.
#[derive(Debug, Clone, Default)]
pub struct DeadLetterFilter {
    pub status: Option<messaging_domain::DeadLetterStatus>,
    pub limit: Option<usize>,
}

/// The persistence contract every backend implements (spec §4.1).
///
/// Every operation returns `StoreResult<T>` — `not_found`, `conflict`,
/// `ambiguous`, or `invalid` per spec §7. `GetOrCreateRoomByExternalBinding`
/// and `GetOrCreateParticipantByExternalID` carry an extra race-safety
/// contract documented on each method: concurrent callers with the same key
/// must observe exactly one created record.
#[async_trait]
pub trait Store: Send + Sync {
    // ── Rooms ────────────────────────────────────────────────────────
    async fn save_room(&self, room: Room) -> StoreResult<Room>;
    async fn get_room(&self, id: &str) -> StoreResult<Room>;
    async fn list_rooms(&self, filter: RoomFilter, limit: usize, offset: usize) -> StoreResult<Vec<Room>>;
    async fn delete_room(&self, id: &str) -> StoreResult<()>;

    /// Race-safe: concurrent callers with the same `(channel, bridge_id,
    /// external_id)` key see exactly one newly-created room. A stale
    /// binding pointing to a deleted room is recovered by creating a
    /// fresh room and updating the index in place.
    async fn get_or_create_room_by_external_binding(
        &self,
        channel: &str,
        bridge_id: &str,
        external_id: &str,
        attrs: RoomAttrs,
    ) -> StoreResult<(Room, bool)>;

    /// Lookup-only counterpart used by the round-trip property
    /// (`CreateRoomBinding -> GetRoomByExternalBinding -> DeleteRoomBinding
    /// -> GetRoomByExternalBinding`); never creates.
    async fn get_room_by_external_binding(
        &self,
        channel: &str,
        bridge_id: &str,
        external_id: &str,
    ) -> StoreResult<Room>;

    // ── Participants ─────────────────────────────────────────────────
    async fn save_participant(&self, participant: Participant) -> StoreResult<Participant>;
    async fn get_participant(&self, id: &str) -> StoreResult<Participant>;

    /// Same race-safety contract as `get_or_create_room_by_external_binding`.
    async fn get_or_create_participant_by_external_id(
        &self,
        channel: &str,
        external_id: &str,
        attrs: ParticipantAttrs,
    ) -> StoreResult<(Participant, bool)>;

    // ── Messages ─────────────────────────────────────────────────────
    async fn save_message(&self, message: Message) -> StoreResult<Message>;
    async fn get_message(&self, id: &str) -> StoreResult<Message>;
    async fn list_messages(&self, room_id: &str, filter: MessageFilter) -> StoreResult<Vec<Message>>;
    async fn delete_message(&self, id: &str) -> StoreResult<()>;
    async fn update_message_external_id(&self, msg_id: &str, external_id: &str) -> StoreResult<Message>;
    async fn get_message_by_external_id(
        &self,
        channel: &str,
        bridge_id: &str,
        external_id: &str,
    ) -> StoreResult<Message>;

    // ── Room bindings ────────────────────────────────────────────────
    async fn create_room_binding(&self, binding: RoomBinding) -> StoreResult<RoomBinding>;
    async fn get_room_binding(&self, id: &str) -> StoreResult<RoomBinding>;
    async fn list_room_bindings(&self, room_id: &str) -> StoreResult<Vec<RoomBinding>>;
    async fn delete_room_binding(&self, binding_id: &str) -> StoreResult<()>;

    // ── Dead letters ─────────────────────────────────────────────────
    async fn save_dead_letter(&self, record: DeadLetterRecord) -> StoreResult<DeadLetterRecord>;
    async fn get_dead_letter(&self, id: &str) -> StoreResult<DeadLetterRecord>;
    async fn list_dead_letters(&self, filter: DeadLetterFilter) -> StoreResult<Vec<DeadLetterRecord>>;
    async fn delete_dead_letter(&self, id: &str) -> StoreResult<()>;
}

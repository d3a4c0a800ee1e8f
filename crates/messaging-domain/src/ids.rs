//! Stable string ids.
//!
//! Every entity in §3 carries a stable string `id` assigned at creation.
//! We mint them from UUIDv4 but expose them as plain `String`s at the API
//! boundary, matching the teacher's session/delivery ids (`Uuid` internally,
//! `String` on the wire).

pub fn new_id(prefix: &str) -> String {
    format!("{prefix}_{}", uuid::Uuid::new_v4())
}

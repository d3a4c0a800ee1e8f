//! Canonical conversation data model for the messaging runtime (spec §3).
//!
//! This crate carries only plain data types and the invariants that are
//! cheap to check locally (status monotonicity, additive binding maps,
//! request validation). Anything that needs concurrency, I/O, or a
//! backend (persistence, dispatch, supervision) lives in `messaging-store`
//! or `messaging-runtime`.

pub mod binding;
pub mod bridge_config;
pub mod capability;
pub mod config;
pub mod dead_letter;
pub mod error;
pub mod fingerprint;
pub mod ids;
pub mod message;
pub mod outbound;
pub mod participant;
pub mod room;
pub mod routing_policy;

pub use binding::{Direction, RoomBinding};
pub use bridge_config::BridgeConfig;
pub use capability::Capability;
pub use config::RuntimeConfig;
pub use dead_letter::{DeadLetterRecord, DeadLetterStatus, Diagnostics};
pub use error::{AdapterErrorCategory, Error, Result, StoreError, StoreResult};
pub use fingerprint::Fingerprint;
pub use message::{ContentBlock, Message, MessageFilter, MessageStatus, Role};
pub use outbound::{Disposition, Operation, OutboundError, OutboundOpts, OutboundRequest, Payload, Priority};
pub use participant::{Identity, Participant, ParticipantType};
pub use room::{ExternalBindings, Room, RoomFilter, RoomType};
pub use routing_policy::{DedupeScope, DeliveryMode, FailoverPolicy, RoutingPolicy};

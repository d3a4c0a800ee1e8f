//! The messaging runtime: ingest, routing, outbound dispatch, dead
//! letters/replay, and supervision wired around `messaging-store` and
//! `messaging-adapter` (spec §§4-6).
//!
//! `instance::Instance` is the composition root a host application
//! constructs once and calls into; every other module is a focused
//! piece of that composition and can be used standalone for testing.

pub mod bridge;
pub mod command;
pub mod config_store;
pub mod dead_letter;
pub mod deduper;
pub mod gateway;
pub mod inbound_router;
pub mod ingest;
pub mod instance;
pub mod media;
pub mod mentions;
pub mod observer;
pub mod outbound_router;
pub mod policy;
pub mod replay;
pub mod room_worker;
pub mod security;
pub mod signal;
pub mod supervision;

pub use gateway::OutboundGateway;
pub use instance::{Instance, InstanceBuilder};
pub use signal::{SignalBus, SignalEvent, Topic};

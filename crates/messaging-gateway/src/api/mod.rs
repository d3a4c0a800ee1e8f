//! The HTTP surface (spec §4.6): one webhook endpoint per bridge plus a
//! small admin surface for dead-letter inspection/replay, mirroring the
//! teacher's `api::router`/`AdminGuard` split.

mod admin_guard;
mod dead_letters;
mod webhook;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/webhooks/:bridge_id", post(webhook::handle))
        .route("/dead-letters", get(dead_letters::list))
        .route("/dead-letters/:id", get(dead_letters::get_one))
        .route("/dead-letters/:id/replay", post(dead_letters::replay))
        .route("/dead-letters/:id/archive", post(dead_letters::archive))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

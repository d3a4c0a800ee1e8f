//! Dead-letter inspection/replay (spec §4.11), gated behind `AdminGuard`.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use messaging_runtime::replay::ReplayOpts;
use messaging_store::DeadLetterFilter;
use serde::Deserialize;

use super::admin_guard::AdminGuard;
use crate::state::AppState;

#[derive(Debug, Deserialize, Default)]
pub struct ListQuery {
    status: Option<String>,
    limit: Option<usize>,
}

fn err(status: StatusCode, detail: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({"error": detail.into()}))).into_response()
}

pub async fn list(State(state): State<AppState>, Query(q): Query<ListQuery>, _guard: AdminGuard) -> Response {
    let status = match q.status.as_deref() {
        None => None,
        Some("captured") => Some(messaging_domain::DeadLetterStatus::Captured),
        Some("replaying") => Some(messaging_domain::DeadLetterStatus::Replaying),
        Some("replayed") => Some(messaging_domain::DeadLetterStatus::Replayed),
        Some("archived") => Some(messaging_domain::DeadLetterStatus::Archived),
        Some(other) => return err(StatusCode::BAD_REQUEST, format!("unknown status: {other}")),
    };
    let filter = DeadLetterFilter { status, limit: q.limit };
    match state.instance.list_dead_letters(filter).await {
        Ok(records) => Json(records).into_response(),
        Err(e) => err(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

pub async fn get_one(State(state): State<AppState>, Path(id): Path<String>, _guard: AdminGuard) -> Response {
    match state.instance.get_dead_letter(&id).await {
        Ok(record) => Json(record).into_response(),
        Err(_) => err(StatusCode::NOT_FOUND, format!("dead letter {id} not found")),
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct ReplayBody {
    #[serde(default)]
    force: bool,
}

pub async fn replay(
    State(state): State<AppState>,
    Path(id): Path<String>,
    _guard: AdminGuard,
    body: Option<Json<ReplayBody>>,
) -> Response {
    let force = body.map(|b| b.force).unwrap_or(false);
    match state.instance.replay_dead_letter(&id, ReplayOpts { force }).await {
        Ok(outcome) => Json(serde_json::json!({"outcome": format!("{outcome:?}")})).into_response(),
        Err(e) => err(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

pub async fn archive(State(state): State<AppState>, Path(id): Path<String>, _guard: AdminGuard) -> Response {
    match state.instance.archive_dead_letter(&id).await {
        Ok(record) => Json(record).into_response(),
        Err(_) => err(StatusCode::NOT_FOUND, format!("dead letter {id} not found")),
    }
}

//! `POST /webhooks/:bridge_id` — the one HTTP entry point for inbound
//! traffic (spec §4.6). Builds a `RequestMeta` from the raw request and
//! hands off to `Instance::route_webhook`; the adapter's own
//! `FormatWebhookResponse` (falling back to the canonical status table)
//! decides what goes back over the wire.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use messaging_adapter::RequestMeta;

use crate::state::AppState;

pub async fn handle(
    State(state): State<AppState>,
    Path(bridge_id): Path<String>,
    headers: HeaderMap,
    query: axum::extract::RawQuery,
    body: Bytes,
) -> Response {
    let payload: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(_) if body.is_empty() => serde_json::Value::Null,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": "invalid_event", "detail": e.to_string()})),
            )
                .into_response();
        }
    };

    let mut request_meta = RequestMeta::new(body.to_vec());
    for (name, value) in headers.iter() {
        if let Ok(v) = value.to_str() {
            request_meta = request_meta.with_header(name.as_str(), v);
        }
    }
    if let Some(qs) = query.0 {
        for pair in qs.split('&').filter(|s| !s.is_empty()) {
            let mut parts = pair.splitn(2, '=');
            if let Some(key) = parts.next() {
                request_meta.query.insert(key.to_string(), parts.next().unwrap_or("").to_string());
            }
        }
    }

    let (response, outcome) = state.instance.route_webhook(&bridge_id, payload, request_meta).await;
    tracing::info!(bridge_id = %bridge_id, status = response.status, outcome = ?outcome, "webhook routed");

    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(response.body)).into_response()
}

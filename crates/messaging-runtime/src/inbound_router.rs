//! `InboundRouter` (spec §4.6): accepts a raw webhook/payload plus
//! `bridge_id`, delegates verify/parse to the adapter, and routes
//! `message` events into `Ingest`. Non-message events are returned
//! untouched to the caller.

use std::sync::Arc;

use messaging_adapter::{AdapterError, EventEnvelope, ParseOutcome, RequestMeta, WebhookResponse, WebhookResult};
use serde_json::Value;

use crate::bridge::BridgeRegistry;
use crate::config_store::ConfigStore;
use crate::ingest::{IngestOutcome, IngestPipeline};

/// What `RouteWebhook`/`RoutePayload` hand back to the caller for a
/// non-message event, or the ingest outcome for a message event.
#[derive(Debug, Clone)]
pub enum RouteOutcome {
    Message(IngestOutcome),
    Event(EventEnvelope),
    Noop,
}

pub struct InboundRouter {
    pub config: Arc<ConfigStore>,
    pub bridges: Arc<BridgeRegistry>,
    pub ingest: Arc<IngestPipeline>,
}

impl InboundRouter {
    #[tracing::instrument(skip_all, fields(bridge_id = %bridge_id))]
    pub async fn route_webhook(
        &self,
        bridge_id: &str,
        payload: Value,
        request_meta: RequestMeta,
    ) -> (WebhookResponse, RouteOutcome) {
        let bridge_config = match self.config.get_bridge_config(bridge_id) {
            Ok(c) => c,
            Err(_) => {
                let result = WebhookResult::BridgeNotFound(bridge_id.to_string());
                return (WebhookResponse::fallback_for(&result), RouteOutcome::Noop);
            }
        };

        if !bridge_config.enabled {
            let result = WebhookResult::BridgeDisabled(bridge_id.to_string());
            return (WebhookResponse::fallback_for(&result), RouteOutcome::Noop);
        }

        let Some(adapter) = self.bridges.adapter_for(bridge_id) else {
            let result = WebhookResult::BridgeNotFound(bridge_id.to_string());
            return (WebhookResponse::fallback_for(&result), RouteOutcome::Noop);
        };

        if let Err(AdapterError::InvalidSignature) = adapter.verify_webhook(&request_meta, &bridge_config.opts) {
            let result = WebhookResult::InvalidSignature;
            return (adapter.format_webhook_response(&result), RouteOutcome::Noop);
        }

        let envelope = match adapter.parse_event(&request_meta, payload).await {
            Ok(ParseOutcome::Noop) => {
                let result = WebhookResult::Noop;
                return (adapter.format_webhook_response(&result), RouteOutcome::Noop);
            }
            Ok(ParseOutcome::Event(env)) => env,
            Err(AdapterError::InvalidEvent(detail)) => {
                let result = WebhookResult::InvalidEvent(detail);
                return (adapter.format_webhook_response(&result), RouteOutcome::Noop);
            }
            Err(other) => {
                let result = WebhookResult::Error(other.reason());
                return (adapter.format_webhook_response(&result), RouteOutcome::Noop);
            }
        };

        if envelope.event_type != messaging_adapter::EventType::Message {
            let result = WebhookResult::Ok(serde_json::json!({"event_type": "non_message"}));
            return (adapter.format_webhook_response(&result), RouteOutcome::Event(envelope));
        }

        let incoming = match adapter.transform_incoming(envelope.payload.clone()).await {
            Ok(incoming) => incoming,
            Err(e) => {
                let result = WebhookResult::Error(e.reason());
                return (adapter.format_webhook_response(&result), RouteOutcome::Noop);
            }
        };

        let channel = adapter.channel_type().to_string();
        let outcome = self.ingest.ingest(&channel, bridge_id, incoming).await;

        if let Some(worker) = self.bridges.get(bridge_id) {
            worker.record_ingress();
        }

        let result = match &outcome {
            IngestOutcome::Ok { .. } => WebhookResult::Ok(serde_json::json!({"status": "ok"})),
            IngestOutcome::Duplicate => WebhookResult::Duplicate,
            IngestOutcome::Denied { reason, stage } => WebhookResult::Denied {
                reason: reason.clone(),
                stage: stage.to_string(),
            },
            IngestOutcome::Error(e) => WebhookResult::Error(e.clone()),
        };

        (adapter.format_webhook_response(&result), RouteOutcome::Message(outcome))
    }

    /// Skips `VerifyWebhook`/`ParseEvent`; goes straight through
    /// `TransformIncoming` (spec §4.6's `RoutePayload`).
    pub async fn route_payload(&self, bridge_id: &str, payload: Value) -> IngestOutcome {
        let bridge_config = match self.config.get_bridge_config(bridge_id) {
            Ok(c) => c,
            Err(_) => return IngestOutcome::Error(format!("bridge_not_found: {bridge_id}")),
        };
        if !bridge_config.enabled {
            return IngestOutcome::Error(format!("bridge_disabled: {bridge_id}"));
        }
        let Some(adapter) = self.bridges.adapter_for(bridge_id) else {
            return IngestOutcome::Error(format!("bridge_not_found: {bridge_id}"));
        };
        let incoming = match adapter.transform_incoming(payload).await {
            Ok(i) => i,
            Err(e) => return IngestOutcome::Error(e.reason()),
        };
        let channel = adapter.channel_type().to_string();
        self.ingest.ingest(&channel, bridge_id, incoming).await
    }
}

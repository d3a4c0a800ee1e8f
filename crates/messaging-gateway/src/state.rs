use std::sync::Arc;

use messaging_runtime::Instance;

/// Shared state handed to every axum handler.
#[derive(Clone)]
pub struct AppState {
    pub instance: Arc<Instance>,
    /// SHA-256 of the configured webhook bearer token, or `None` when
    /// auth is disabled (dev mode). Compared in constant time against
    /// the incoming `Authorization` header.
    pub webhook_token_hash: Option<Vec<u8>>,
}

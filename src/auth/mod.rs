/// Pluggable authentication.
///
/// The executor asks the provider for fresh headers before every outbound
/// call and consults it once after a 401/403. Token-refresh logic, if any,
/// belongs inside an implementation — the interface stays minimal.
use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;

/// What the upstream said when it rejected the call.
#[derive(Debug, Clone)]
pub struct AuthFailure {
    pub status: u16,
    pub message: String,
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Headers to merge into the outbound request. Called fresh before
    /// every attempt, so implementations may rotate tokens here.
    async fn auth_headers(&self) -> Result<HashMap<String, String>>;

    /// Decide whether a 401/403 is worth one retry (e.g. after refreshing
    /// a token). The executor never retries more than once per call.
    async fn handle_auth_error(&self, failure: &AuthFailure) -> Result<bool> {
        let _ = failure;
        Ok(false)
    }
}

/// The trivial provider: a fixed header map, no retry.
pub struct StaticAuthProvider {
    headers: HashMap<String, String>,
}

impl StaticAuthProvider {
    pub fn new(headers: HashMap<String, String>) -> Self {
        Self { headers }
    }
}

// Header values are secrets; keep them out of Debug output
impl std::fmt::Debug for StaticAuthProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.headers.keys().collect();
        f.debug_struct("StaticAuthProvider")
            .field("headers", &names)
            .finish()
    }
}

#[async_trait]
impl AuthProvider for StaticAuthProvider {
    async fn auth_headers(&self) -> Result<HashMap<String, String>> {
        Ok(self.headers.clone())
    }
}

use serde::{Deserialize, Serialize};

use crate::client::ChatClient;
use crate::error::Result;
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    /// Per-service detail, passed through untouched.
    #[serde(default)]
    pub services: Option<serde_json::Value>,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

impl ChatClient {
    /// Single health probe, no retries.
    pub async fn health(&self) -> Result<HealthStatus> {
        self.reconnect(&RetryPolicy::none()).await
    }
}

//! Additional configuration types

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connection pool limits for pooled backends (SQL, document store)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Maximum number of open connections (default: 10)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_open: Option<u32>,

    /// Connections kept warm while idle (default: 1)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_idle: Option<u32>,

    /// Maximum lifetime of a connection in seconds (default: 1800)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_lifetime_secs: Option<u64>,

    /// Connection acquire timeout in seconds (default: 30)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acquire_timeout_secs: Option<u64>,

    /// Idle connection timeout in seconds (default: 600)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_timeout_secs: Option<u64>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_open: Some(10),
            max_idle: Some(1),
            max_lifetime_secs: Some(1800),
            acquire_timeout_secs: Some(30),
            idle_timeout_secs: Some(600),
        }
    }
}

impl PoolConfig {
    /// Get max open connections with default fallback
    pub fn max_open(&self) -> u32 {
        self.max_open.unwrap_or(10).max(1)
    }

    /// Get max idle connections with default fallback, never above `max_open`
    pub fn max_idle(&self) -> u32 {
        self.max_idle.unwrap_or(1).min(self.max_open())
    }

    /// Get max lifetime with default fallback
    pub fn max_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_lifetime_secs.unwrap_or(1800))
    }

    /// Get acquire timeout with default fallback
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs.unwrap_or(30))
    }

    /// Get idle timeout with default fallback
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs.unwrap_or(600))
    }
}

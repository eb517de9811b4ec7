//! Per-queue configuration handed to the broker on declaration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::queue::RetryPolicy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// How long a dispatch waits for settlement before answering 202.
    pub timeout: Duration,

    /// Total deliveries a job gets unless its processor says otherwise.
    pub max_attempts: u32,

    pub retry: RetryPolicy,

    /// Broker-specific settings, passed through untouched.
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl QueueConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_attempts: 5,
            retry: RetryPolicy::default(),
            extra: serde_json::Map::new(),
        }
    }
}

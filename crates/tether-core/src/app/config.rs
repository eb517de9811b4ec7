//! Bridge configuration: in-code options and the serde file form.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::processor::JobHandler;
use super::reconciler::{DefaultReconciler, Reconciler};
use crate::domain::QueueConfig;
use crate::queue::RetryPolicy;

/// Bridge-wide defaults. Every field can be overridden per route through
/// [`QueueOptions`].
#[derive(Clone)]
pub struct BridgeOptions {
    /// Namespace joined in front of every queue name.
    pub prefix: String,

    /// Derive the queue name from the request path instead of a fixed name.
    pub name_from_path: bool,

    /// Replaces the replaying job processor on the worker side.
    pub processor: Option<Arc<dyn JobHandler>>,

    pub reconciler: Arc<dyn Reconciler>,

    pub queue: QueueConfig,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            name_from_path: false,
            processor: None,
            reconciler: Arc::new(DefaultReconciler),
            queue: QueueConfig::default(),
        }
    }
}

/// Per-route overrides for [`crate::app::Bridge::queue`].
#[derive(Clone, Default)]
pub struct QueueOptions {
    pub name_from_path: Option<bool>,
    pub processor: Option<Arc<dyn JobHandler>>,
    pub reconciler: Option<Arc<dyn Reconciler>>,
    pub queue: Option<QueueConfig>,
}

impl QueueOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name_from_path(mut self, enabled: bool) -> Self {
        self.name_from_path = Some(enabled);
        self
    }

    pub fn processor(mut self, processor: Arc<dyn JobHandler>) -> Self {
        self.processor = Some(processor);
        self
    }

    pub fn reconciler(mut self, reconciler: Arc<dyn Reconciler>) -> Self {
        self.reconciler = Some(reconciler);
        self
    }

    pub fn queue(mut self, config: QueueConfig) -> Self {
        self.queue = Some(config);
        self
    }
}

/// Which broker a bridge builds for itself when none is handed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BrokerSettings {
    Memory,
}

/// File form of the bridge configuration.
///
/// ```json
/// { "prefix": "api", "timeout_ms": 5000, "broker": { "kind": "memory" } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeSettings {
    pub prefix: String,
    pub name_from_path: bool,
    pub timeout_ms: u64,
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter: bool,

    /// Consumers per queue.
    pub workers: usize,

    /// `null` leaves the bridge without a broker source.
    pub broker: Option<BrokerSettings>,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            name_from_path: false,
            timeout_ms: 30_000,
            max_attempts: 5,
            backoff_base_ms: 2_000,
            backoff_multiplier: 2.0,
            jitter: false,
            workers: 1,
            broker: Some(BrokerSettings::Memory),
        }
    }
}

impl BridgeSettings {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig::default()
            .with_timeout(Duration::from_millis(self.timeout_ms))
            .with_max_attempts(self.max_attempts)
            .with_retry(RetryPolicy {
                base_delay: Duration::from_millis(self.backoff_base_ms),
                multiplier: self.backoff_multiplier,
                jitter: self.jitter,
            })
    }
}

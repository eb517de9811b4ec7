//! Queue registry: one binding per queue name, owned by one bridge.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::{Mutex, broadcast};

use super::processor::JobHandler;
use crate::domain::{QueueConfig, QueueName};
use crate::error::DispatchError;
use crate::ports::Broker;

const ANNOUNCE_CAPACITY: usize = 64;

struct QueueBinding {
    name: QueueName,
    config: QueueConfig,
    processor: Option<Arc<dyn JobHandler>>,
}

/// Handle to an asserted queue. Clones share the binding.
#[derive(Clone)]
pub struct Queue(Arc<QueueBinding>);

impl Queue {
    pub(crate) fn new(
        name: QueueName,
        config: QueueConfig,
        processor: Option<Arc<dyn JobHandler>>,
    ) -> Self {
        Self(Arc::new(QueueBinding {
            name,
            config,
            processor,
        }))
    }

    pub fn name(&self) -> &QueueName {
        &self.0.name
    }

    pub fn config(&self) -> &QueueConfig {
        &self.0.config
    }

    /// Processor override for this queue, if one was configured.
    pub fn processor(&self) -> Option<&Arc<dyn JobHandler>> {
        self.0.processor.as_ref()
    }

    /// Whether both handles point at the same binding.
    pub fn ptr_eq(a: &Queue, b: &Queue) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }
}

impl fmt::Debug for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("name", &self.0.name)
            .field("config", &self.0.config)
            .field("processor", &self.0.processor.is_some())
            .finish()
    }
}

pub struct QueueRegistry {
    broker: Arc<dyn Broker>,
    queues: Mutex<HashMap<QueueName, Queue>>,
    announce: broadcast::Sender<Queue>,
}

impl QueueRegistry {
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        let (announce, _) = broadcast::channel(ANNOUNCE_CAPACITY);
        Self {
            broker,
            queues: Mutex::new(HashMap::new()),
            announce,
        }
    }

    pub fn broker(&self) -> &Arc<dyn Broker> {
        &self.broker
    }

    /// Returns the binding for `name`, declaring it on the broker first if
    /// this is the first assertion.
    ///
    /// The map lock is held across the broker declaration, so racing first
    /// assertions of one name produce a single binding. A later assertion
    /// with a different config gets the existing binding.
    pub async fn assert_queue(
        &self,
        name: QueueName,
        config: QueueConfig,
        processor: Option<Arc<dyn JobHandler>>,
    ) -> Result<Queue, DispatchError> {
        let mut queues = self.queues.lock().await;
        if let Some(existing) = queues.get(&name) {
            if existing.config() != &config {
                tracing::debug!(queue = %name, "queue already bound, ignoring differing config");
            }
            return Ok(existing.clone());
        }

        self.broker
            .assert_queue(&name, &config)
            .await
            .map_err(|source| DispatchError::Declare {
                queue: name.to_string(),
                source,
            })?;

        let queue = Queue::new(name.clone(), config, processor);
        queues.insert(name.clone(), queue.clone());
        // no worker pool listening yet is fine
        let _ = self.announce.send(queue.clone());

        tracing::info!(queue = %name, "queue asserted");
        Ok(queue)
    }

    pub async fn get(&self, name: &QueueName) -> Option<Queue> {
        self.queues.lock().await.get(name).cloned()
    }

    pub async fn names(&self) -> Vec<QueueName> {
        let mut names: Vec<_> = self.queues.lock().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Current bindings plus a receiver for every binding asserted afterwards.
    pub async fn subscribe(&self) -> (Vec<Queue>, broadcast::Receiver<Queue>) {
        let queues = self.queues.lock().await;
        // subscribe under the lock so no assertion falls between the two
        let receiver = self.announce.subscribe();
        (queues.values().cloned().collect(), receiver)
    }
}

//! Bridge construction and per-route queue middleware.

use std::sync::Arc;

use super::config::{BridgeOptions, BridgeSettings, BrokerSettings, QueueOptions};
use super::dispatcher::Dispatcher;
use super::middleware::{QueueMiddleware, QueueTarget};
use super::processor::{JobHandler, ReplayProcessor};
use super::reconciler::Reconciler;
use super::registry::QueueRegistry;
use crate::domain::{BridgeId, NamingMode, QueueConfig, resolve_name};
use crate::error::{BridgeError, ConfigurationError};
use crate::pipeline::Pipeline;
use crate::ports::Broker;
use crate::queue::InMemoryBroker;

/// One bridge instance: a registry, a dispatcher and their configuration.
///
/// ```ignore
/// let bridge = Bridge::builder().prefix("api").in_memory_broker().build()?;
/// let orders = bridge.queue("orders", QueueOptions::new()).await?;
/// let pipeline = Arc::new(Pipeline::new(OrdersEndpoint).layer(orders));
/// let workers = WorkerPool::start(&bridge, Arc::clone(&pipeline), 2).await;
/// ```
pub struct Bridge {
    id: BridgeId,
    options: BridgeOptions,
    registry: Arc<QueueRegistry>,
    dispatcher: Arc<Dispatcher>,
}

impl Bridge {
    pub fn builder() -> BridgeBuilder {
        BridgeBuilder::new()
    }

    pub fn id(&self) -> BridgeId {
        self.id
    }

    pub fn options(&self) -> &BridgeOptions {
        &self.options
    }

    pub fn broker(&self) -> Arc<dyn Broker> {
        Arc::clone(self.registry.broker())
    }

    pub fn registry(&self) -> &Arc<QueueRegistry> {
        &self.registry
    }

    /// Builds the middleware for one route.
    ///
    /// With a static name the queue is asserted here. With path-derived
    /// naming `name` is ignored and each request path gets its own queue
    /// on first use.
    pub async fn queue(
        &self,
        name: &str,
        options: QueueOptions,
    ) -> Result<QueueMiddleware, BridgeError> {
        let name_from_path = options
            .name_from_path
            .unwrap_or(self.options.name_from_path);
        let config = options
            .queue
            .unwrap_or_else(|| self.options.queue.clone());
        let processor = options.processor.or_else(|| self.options.processor.clone());
        let reconciler = options
            .reconciler
            .unwrap_or_else(|| Arc::clone(&self.options.reconciler));

        let target = if name_from_path {
            QueueTarget::PathDerived {
                prefix: self.options.prefix.clone(),
                config,
                processor,
            }
        } else {
            if name.trim().is_empty() {
                return Err(ConfigurationError::EmptyQueueName.into());
            }
            let queue_name = resolve_name(
                &NamingMode::Static(name.to_string()),
                &self.options.prefix,
                "",
            );
            let queue = self
                .registry
                .assert_queue(queue_name, config, processor)
                .await?;
            QueueTarget::Bound(queue)
        };

        Ok(QueueMiddleware::new(
            target,
            Arc::clone(&self.registry),
            Arc::clone(&self.dispatcher),
            reconciler,
        ))
    }

    /// Processor used for queues without their own override.
    pub fn default_processor(&self, pipeline: Arc<Pipeline>) -> Arc<dyn JobHandler> {
        match &self.options.processor {
            Some(processor) => Arc::clone(processor),
            None => Arc::new(ReplayProcessor::new(pipeline)),
        }
    }

    /// Closes the broker; waiting leases return and workers wind down.
    pub async fn close(&self) {
        tracing::info!(bridge = %self.id, "closing bridge");
        self.registry.broker().close().await;
    }
}

/// Builder for [`Bridge`].
///
/// A broker source is required: either a shared handle via
/// [`BridgeBuilder::broker`], or broker settings from which one is built.
/// A shared handle wins when both are given.
#[derive(Default)]
pub struct BridgeBuilder {
    options: BridgeOptions,
    broker: Option<Arc<dyn Broker>>,
    broker_settings: Option<BrokerSettings>,
}

impl BridgeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.options.prefix = prefix.into();
        self
    }

    pub fn name_from_path(mut self, enabled: bool) -> Self {
        self.options.name_from_path = enabled;
        self
    }

    pub fn broker(mut self, broker: Arc<dyn Broker>) -> Self {
        self.broker = Some(broker);
        self
    }

    pub fn in_memory_broker(mut self) -> Self {
        self.broker_settings = Some(BrokerSettings::Memory);
        self
    }

    pub fn processor(mut self, processor: Arc<dyn JobHandler>) -> Self {
        self.options.processor = Some(processor);
        self
    }

    pub fn reconciler(mut self, reconciler: Arc<dyn Reconciler>) -> Self {
        self.options.reconciler = reconciler;
        self
    }

    pub fn queue_config(mut self, config: QueueConfig) -> Self {
        self.options.queue = config;
        self
    }

    /// Applies file settings: naming, queue defaults and broker source.
    pub fn settings(mut self, settings: &BridgeSettings) -> Self {
        self.options.prefix = settings.prefix.clone();
        self.options.name_from_path = settings.name_from_path;
        self.options.queue = settings.queue_config();
        self.broker_settings = settings.broker;
        self
    }

    pub fn build(self) -> Result<Bridge, ConfigurationError> {
        let broker: Arc<dyn Broker> = match (self.broker, self.broker_settings) {
            (Some(broker), _) => broker,
            (None, Some(BrokerSettings::Memory)) => Arc::new(InMemoryBroker::new()),
            (None, None) => return Err(ConfigurationError::MissingBroker),
        };

        let id = BridgeId::generate();
        tracing::info!(
            bridge = %id,
            prefix = %self.options.prefix,
            name_from_path = self.options.name_from_path,
            "bridge ready"
        );

        Ok(Bridge {
            id,
            options: self.options,
            registry: Arc::new(QueueRegistry::new(Arc::clone(&broker))),
            dispatcher: Arc::new(Dispatcher::new(broker)),
        })
    }
}

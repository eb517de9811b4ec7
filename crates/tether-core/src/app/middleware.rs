//! Queue middleware: the live side dispatches, the replay side passes through.

use std::sync::Arc;

use async_trait::async_trait;

use super::dispatcher::Dispatcher;
use super::processor::JobHandler;
use super::reconciler::{Reconciler, reconcile};
use super::registry::{Queue, QueueRegistry};
use crate::domain::{Failure, NamingMode, QueueConfig, RequestSnapshot, resolve_name};
use crate::error::{DispatchError, PipelineError};
use crate::pipeline::{Context, Middleware, Next};

/// Where a middleware sends its requests.
#[derive(Clone)]
pub(crate) enum QueueTarget {
    /// Asserted when the middleware was built.
    Bound(Queue),
    /// Asserted on first use of each request path.
    PathDerived {
        prefix: String,
        config: QueueConfig,
        processor: Option<Arc<dyn JobHandler>>,
    },
}

/// Built by [`crate::app::Bridge::queue`].
///
/// Live requests are captured, dispatched and answered from the job's
/// outcome; the layers after this one never see them. Replayed requests
/// skip dispatch and run the rest of the chain, with any error parked on
/// the context for the job processor.
pub struct QueueMiddleware {
    target: QueueTarget,
    registry: Arc<QueueRegistry>,
    dispatcher: Arc<Dispatcher>,
    reconciler: Arc<dyn Reconciler>,
}

impl QueueMiddleware {
    pub(crate) fn new(
        target: QueueTarget,
        registry: Arc<QueueRegistry>,
        dispatcher: Arc<Dispatcher>,
        reconciler: Arc<dyn Reconciler>,
    ) -> Self {
        Self {
            target,
            registry,
            dispatcher,
            reconciler,
        }
    }

    /// The queue this middleware was bound to, for static names.
    pub fn queue(&self) -> Option<&Queue> {
        match &self.target {
            QueueTarget::Bound(queue) => Some(queue),
            QueueTarget::PathDerived { .. } => None,
        }
    }

    async fn resolve_queue(&self, path: &str) -> Result<Queue, DispatchError> {
        match &self.target {
            QueueTarget::Bound(queue) => Ok(queue.clone()),
            QueueTarget::PathDerived {
                prefix,
                config,
                processor,
            } => {
                let name = resolve_name(&NamingMode::PathDerived, prefix, path);
                self.registry
                    .assert_queue(name, config.clone(), processor.clone())
                    .await
            }
        }
    }
}

#[async_trait]
impl Middleware for QueueMiddleware {
    async fn handle(&self, cx: &mut Context, next: Next<'_>) -> Result<(), PipelineError> {
        if let Some(state) = cx.replay().map(|replay| replay.state().clone()) {
            cx.state = state;
            if let Err(err) = next.run(cx).await {
                cx.capture_error(err);
            }
            return Ok(());
        }

        let queue = match self.resolve_queue(cx.request.path()).await {
            Ok(queue) => queue,
            Err(err) => {
                tracing::warn!(path = cx.request.path(), error = %err, "queue resolution failed");
                self.reconciler.on_error(cx, &Failure::from(err));
                return Ok(());
            }
        };

        let snapshot = RequestSnapshot::capture(cx);
        let outcome = self.dispatcher.dispatch(&queue, snapshot).await;
        reconcile(self.reconciler.as_ref(), cx, &outcome);
        Ok(())
    }
}

//! Worker pool: consumes every queue a bridge asserts.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::builder::Bridge;
use super::processor::JobHandler;
use super::registry::{Queue, QueueRegistry};
use crate::domain::QueueName;
use crate::pipeline::Pipeline;
use crate::ports::Broker;

/// Handle to the running consumers of one bridge.
///
/// Queues asserted after `start` (path-derived names) are picked up as they
/// appear. Shutdown stops taking new leases; a job already running is
/// finished first.
pub struct WorkerPool {
    shutdown_tx: watch::Sender<bool>,
    supervisor: JoinHandle<()>,
}

impl WorkerPool {
    /// Starts `concurrency` consumers per queue.
    pub async fn start(bridge: &Bridge, pipeline: Arc<Pipeline>, concurrency: usize) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let registry = Arc::clone(bridge.registry());
        let (existing, announcements) = registry.subscribe().await;

        let consumers = Consumers {
            broker: bridge.broker(),
            default_handler: bridge.default_processor(pipeline),
            concurrency: concurrency.max(1),
            shutdown_rx: shutdown_rx.clone(),
            running: HashSet::new(),
            joins: Vec::new(),
        };

        let supervisor = tokio::spawn(supervise(
            registry,
            consumers,
            existing,
            announcements,
            shutdown_rx,
        ));

        Self {
            shutdown_tx,
            supervisor,
        }
    }

    pub fn request_shutdown(&self) {
        // receivers may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        if let Err(err) = self.supervisor.await {
            tracing::error!(error = %err, "worker supervisor panicked");
        }
    }
}

struct Consumers {
    broker: Arc<dyn Broker>,
    default_handler: Arc<dyn JobHandler>,
    concurrency: usize,
    shutdown_rx: watch::Receiver<bool>,
    running: HashSet<QueueName>,
    joins: Vec<JoinHandle<()>>,
}

impl Consumers {
    fn spawn(&mut self, queue: Queue) {
        if !self.running.insert(queue.name().clone()) {
            return;
        }

        let handler = queue
            .processor()
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.default_handler));

        for worker_id in 0..self.concurrency {
            let join = tokio::spawn(consume(
                worker_id,
                queue.clone(),
                Arc::clone(&self.broker),
                Arc::clone(&handler),
                self.shutdown_rx.clone(),
            ));
            self.joins.push(join);
        }
        tracing::info!(queue = %queue.name(), workers = self.concurrency, "consumers started");
    }

    async fn join_all(self) {
        for join in self.joins {
            let _ = join.await;
        }
    }
}

async fn supervise(
    registry: Arc<QueueRegistry>,
    mut consumers: Consumers,
    existing: Vec<Queue>,
    mut announcements: broadcast::Receiver<Queue>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    for queue in existing {
        consumers.spawn(queue);
    }

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            received = announcements.recv() => match received {
                Ok(queue) => consumers.spawn(queue),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "missed queue announcements, resyncing");
                    let (current, receiver) = registry.subscribe().await;
                    announcements = receiver;
                    for queue in current {
                        consumers.spawn(queue);
                    }
                }
                Err(RecvError::Closed) => {
                    // registry gone; keep the running consumers until shutdown
                    let _ = shutdown_rx.wait_for(|stop| *stop).await;
                    break;
                }
            },
        }
    }

    consumers.join_all().await;
}

async fn consume(
    worker_id: usize,
    queue: Queue,
    broker: Arc<dyn Broker>,
    handler: Arc<dyn JobHandler>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let lease = tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            lease = broker.lease(queue.name()) => lease,
        };

        let Some(lease) = lease else {
            tracing::debug!(queue = %queue.name(), worker_id, "broker closed, consumer stopping");
            break;
        };

        let job_id = lease.id();
        let handler = Arc::clone(&handler);
        // own task, so a panicking job does not take the consumer with it
        let run = tokio::spawn(async move { handler.process(lease).await });

        match run.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::warn!(queue = %queue.name(), %job_id, error = %err, "failed to settle job");
            }
            Err(err) => {
                tracing::error!(queue = %queue.name(), %job_id, error = %err, "job task panicked");
            }
        }
    }
}

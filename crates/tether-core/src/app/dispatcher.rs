//! Job dispatcher: publish a snapshot and wait for its single outcome.

use std::sync::Arc;

use super::registry::Queue;
use crate::domain::{Failure, JobBody, JobOutcome, OutcomeCell, RequestSnapshot};
use crate::error::DispatchError;
use crate::ports::Broker;

pub struct Dispatcher {
    broker: Arc<dyn Broker>,
}

impl Dispatcher {
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self { broker }
    }

    /// Enqueues `snapshot` on `queue` and waits for the job's outcome, at
    /// most `queue.config().timeout`.
    ///
    /// The wait ends with whichever lands first in the job's reply cell:
    /// the broker's settlement or our own `Timeout`. The job keeps running
    /// after a timeout; its eventual settlement is dropped by the cell.
    pub async fn dispatch(&self, queue: &Queue, snapshot: RequestSnapshot) -> JobOutcome {
        let cell = Arc::new(OutcomeCell::new());
        let body = JobBody::new(snapshot);

        let job_id = match self
            .broker
            .publish(queue.name(), body, Arc::clone(&cell))
            .await
        {
            Ok(job_id) => job_id,
            Err(source) => {
                let err = DispatchError::Enqueue {
                    queue: queue.name().to_string(),
                    source,
                };
                tracing::warn!(error = %err, "dispatch failed");
                return JobOutcome::Error(Failure::from(err));
            }
        };

        tracing::debug!(queue = %queue.name(), %job_id, "job dispatched");

        let timeout = queue.config().timeout;
        tokio::select! {
            biased;
            outcome = cell.settled() => outcome,
            _ = tokio::time::sleep(timeout) => {
                let timed_out = JobOutcome::Timeout { after: timeout };
                if cell.settle(timed_out.clone()) {
                    tracing::debug!(queue = %queue.name(), %job_id, ?timeout, "dispatch timed out");
                    timed_out
                } else {
                    // settled between the timer firing and our settle
                    cell.get().cloned().unwrap_or(timed_out)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{QueueConfig, QueueName, Reply};
    use crate::error::BrokerError;
    use crate::pipeline::{Context, Request};
    use crate::queue::{InMemoryBroker, JobState};
    use std::time::Duration;

    fn snapshot() -> RequestSnapshot {
        RequestSnapshot::capture(&Context::new(Request::post("/orders").with_body("{}")))
    }

    async fn setup(timeout: Duration) -> (Arc<InMemoryBroker>, Dispatcher, Queue) {
        let broker = Arc::new(InMemoryBroker::new());
        let config = QueueConfig::default().with_timeout(timeout);
        let name = QueueName::join("api", "orders");
        broker.assert_queue(&name, &config).await.unwrap();
        let dispatcher = Dispatcher::new(broker.clone());
        (broker, dispatcher, Queue::new(name, config, None))
    }

    #[tokio::test]
    async fn returns_success_settled_by_worker() {
        let (broker, dispatcher, queue) = setup(Duration::from_secs(5)).await;

        let worker = tokio::spawn({
            let broker = broker.clone();
            let name = queue.name().clone();
            async move {
                let lease = broker.lease(&name).await.unwrap();
                lease
                    .resolve(Reply::new().with_status(201).with_body("ok"))
                    .await
                    .unwrap();
            }
        });

        let outcome = dispatcher.dispatch(&queue, snapshot()).await;
        worker.await.unwrap();

        assert_eq!(
            outcome,
            JobOutcome::Success(Reply::new().with_status(201).with_body("ok"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_when_nobody_settles() {
        let (_broker, dispatcher, queue) = setup(Duration::from_millis(50)).await;

        let outcome = dispatcher.dispatch(&queue, snapshot()).await;

        assert_eq!(
            outcome,
            JobOutcome::Timeout {
                after: Duration::from_millis(50)
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn late_settlement_is_accepted_by_broker_but_ignored() {
        let (broker, dispatcher, queue) = setup(Duration::from_millis(50)).await;

        let outcome = dispatcher.dispatch(&queue, snapshot()).await;
        assert!(outcome.is_timeout());

        let lease = broker.lease(queue.name()).await.unwrap();
        let job_id = lease.id();
        lease.resolve(Reply::new().with_body("late")).await.unwrap();

        assert_eq!(
            broker.job_status(job_id).await.unwrap().state,
            JobState::Resolved
        );
    }

    #[tokio::test]
    async fn publish_failure_becomes_error_outcome() {
        let broker = Arc::new(InMemoryBroker::new());
        let dispatcher = Dispatcher::new(broker);
        let undeclared = Queue::new(QueueName::join("api", "ghost"), QueueConfig::default(), None);

        let outcome = dispatcher.dispatch(&undeclared, snapshot()).await;

        let expected = DispatchError::Enqueue {
            queue: "api.ghost".to_string(),
            source: BrokerError::UnknownQueue("api.ghost".to_string()),
        };
        assert_eq!(outcome, JobOutcome::Error(Failure::new(expected.to_string())));
    }
}

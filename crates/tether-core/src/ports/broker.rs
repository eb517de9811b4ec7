//! Broker port: the durable job queue the bridge dispatches to.
//!
//! Storage, delivery and redelivery belong to the broker. The bridge only
//! declares queues, publishes job bodies with a reply cell, and leases jobs
//! back out to workers.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{
    Failure, JobBody, JobId, JobStatus, OutcomeCell, QueueConfig, QueueName, Reply,
    RetryDirective,
};
use crate::error::BrokerError;
use crate::observability::QueueCounts;

/// A job handed to one worker. The worker must `resolve` or `reject` it.
#[async_trait]
pub trait JobLease: Send {
    fn id(&self) -> JobId;

    fn queue(&self) -> &QueueName;

    fn body(&self) -> &JobBody;

    /// 1-based delivery attempt.
    fn attempt(&self) -> u32;

    /// Overrides redelivery for a following `reject`.
    fn retry(&mut self, directive: RetryDirective);

    async fn resolve(self: Box<Self>, reply: Reply) -> Result<(), BrokerError>;

    /// Fails this delivery. Whether the job comes back is decided by the
    /// broker from the retry directive and the queue's attempt budget.
    async fn reject(self: Box<Self>, failure: Failure) -> Result<(), BrokerError>;
}

#[async_trait]
pub trait Broker: Send + Sync {
    /// Declares a queue. Declaring an existing queue is a no-op.
    async fn assert_queue(&self, name: &QueueName, config: &QueueConfig)
    -> Result<(), BrokerError>;

    /// Enqueues a job. `reply` is settled when the job reaches a terminal state.
    async fn publish(
        &self,
        name: &QueueName,
        body: JobBody,
        reply: Arc<OutcomeCell>,
    ) -> Result<JobId, BrokerError>;

    /// Waits for the next runnable job on `name`; `None` once closed.
    async fn lease(&self, name: &QueueName) -> Option<Box<dyn JobLease>>;

    async fn job_status(&self, id: JobId) -> Result<JobStatus, BrokerError>;

    async fn counts(&self, name: &QueueName) -> Result<QueueCounts, BrokerError>;

    /// Stops handing out leases.
    async fn close(&self);
}

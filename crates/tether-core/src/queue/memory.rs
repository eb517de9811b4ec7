//! In-memory broker.
//!
//! One mutex guards every queue and job; each queue has its own `Notify` so
//! publishing on one queue only wakes that queue's consumers. Nothing
//! survives a restart. Finished jobs are kept for status lookups up to a
//! retention cap, oldest dropped first.

use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use super::{JobRecord, JobState};
use crate::domain::{
    Failure, JobBody, JobId, JobOutcome, JobStatus, OutcomeCell, QueueConfig, QueueName, Reply,
    RetryDirective,
};
use crate::error::BrokerError;
use crate::observability::QueueCounts;
use crate::ports::{Broker, JobLease};

/// Upper bound on a single redelivery delay.
const MAX_REDELIVERY_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Finished jobs kept by default.
pub const DEFAULT_RETAINED_JOBS: usize = 1024;

/// Delayed redelivery entry; reversed ordering makes the heap a min-heap.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ScheduledJob {
    next_run_at: Instant,
    job_id: JobId,
}

impl PartialOrd for ScheduledJob {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledJob {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .next_run_at
            .cmp(&self.next_run_at)
            .then_with(|| other.job_id.cmp(&self.job_id))
    }
}

struct QueueSlot {
    config: QueueConfig,
    ready: VecDeque<JobId>,
    scheduled: BinaryHeap<ScheduledJob>,
    notify: Arc<Notify>,
}

impl QueueSlot {
    fn new(config: QueueConfig) -> Self {
        Self {
            config,
            ready: VecDeque::new(),
            scheduled: BinaryHeap::new(),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Moves redeliveries whose backoff has elapsed onto the ready list.
    fn promote_due(&mut self, now: Instant, jobs: &mut HashMap<JobId, JobRecord>) {
        while let Some(entry) = self.scheduled.peek() {
            if entry.next_run_at > now {
                break;
            }
            let Some(entry) = self.scheduled.pop() else {
                break;
            };
            if let Some(record) = jobs.get_mut(&entry.job_id)
                && record.state.is_runnable()
            {
                record.requeue();
                self.ready.push_back(entry.job_id);
            }
        }
    }
}

struct BrokerState {
    queues: HashMap<QueueName, QueueSlot>,
    jobs: HashMap<JobId, JobRecord>,
    /// Resolved or rejected jobs, oldest first.
    finished: VecDeque<JobId>,
    retained: usize,
    closed: bool,
}

impl BrokerState {
    fn new(retained: usize) -> Self {
        Self {
            queues: HashMap::new(),
            jobs: HashMap::new(),
            finished: VecDeque::new(),
            retained,
            closed: false,
        }
    }

    /// Records a terminal transition and drops the oldest finished jobs
    /// beyond the retention cap.
    fn finish(&mut self, id: JobId) {
        self.finished.push_back(id);
        while self.finished.len() > self.retained {
            if let Some(expired) = self.finished.pop_front() {
                self.jobs.remove(&expired);
            }
        }
    }

    fn counts(&self, name: &QueueName) -> QueueCounts {
        let mut counts = QueueCounts::default();
        for record in self.jobs.values().filter(|record| &record.queue == name) {
            match record.state {
                JobState::Pending => counts.pending += 1,
                JobState::Processing => counts.processing += 1,
                JobState::Resolved => counts.resolved += 1,
                JobState::Rejected => counts.rejected += 1,
            }
        }
        counts
    }
}

#[derive(Clone)]
pub struct InMemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_RETAINED_JOBS)
    }

    /// Keeps at most `retained` finished jobs; `job_status` on an older
    /// one returns `UnknownJob`.
    pub fn with_retention(retained: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(BrokerState::new(retained))),
        }
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn assert_queue(
        &self,
        name: &QueueName,
        config: &QueueConfig,
    ) -> Result<(), BrokerError> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(BrokerError::Closed);
        }
        state
            .queues
            .entry(name.clone())
            .or_insert_with(|| QueueSlot::new(config.clone()));
        Ok(())
    }

    async fn publish(
        &self,
        name: &QueueName,
        body: JobBody,
        reply: Arc<OutcomeCell>,
    ) -> Result<JobId, BrokerError> {
        let (job_id, notify) = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            if state.closed {
                return Err(BrokerError::Closed);
            }
            let slot = state
                .queues
                .get_mut(name)
                .ok_or_else(|| BrokerError::UnknownQueue(name.to_string()))?;

            let job_id = JobId::generate();
            let record = JobRecord::new(
                job_id,
                name.clone(),
                body,
                slot.config.max_attempts,
                reply,
            );
            state.jobs.insert(job_id, record);
            slot.ready.push_back(job_id);
            (job_id, Arc::clone(&slot.notify))
        };

        notify.notify_one();
        Ok(job_id)
    }

    async fn lease(&self, name: &QueueName) -> Option<Box<dyn JobLease>> {
        loop {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            if state.closed {
                return None;
            }
            let Some(slot) = state.queues.get_mut(name) else {
                tracing::warn!(queue = %name, "lease requested on undeclared queue");
                return None;
            };

            slot.promote_due(Instant::now(), &mut state.jobs);

            while let Some(job_id) = slot.ready.pop_front() {
                let Some(record) = state.jobs.get_mut(&job_id) else {
                    continue;
                };
                if !record.state.is_runnable() {
                    continue;
                }
                record.start_attempt();
                let lease: Box<dyn JobLease> = Box::new(InMemoryLease {
                    id: job_id,
                    queue: name.clone(),
                    body: record.body.clone(),
                    attempt: record.attempts,
                    retry: None,
                    state: Arc::clone(&self.state),
                });
                return Some(lease);
            }

            let notify = Arc::clone(&slot.notify);
            let next_wake = slot.scheduled.peek().map(|entry| entry.next_run_at);

            // registered while still locked, so a publish or close right
            // after the unlock is not missed
            let notified = notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            drop(guard);

            match next_wake {
                Some(wake_at) => {
                    tokio::select! {
                        _ = &mut notified => {},
                        _ = tokio::time::sleep_until(wake_at) => {},
                    }
                }
                None => notified.await,
            }
        }
    }

    async fn job_status(&self, id: JobId) -> Result<JobStatus, BrokerError> {
        let state = self.state.lock().await;
        state
            .jobs
            .get(&id)
            .map(JobRecord::status)
            .ok_or(BrokerError::UnknownJob(id))
    }

    async fn counts(&self, name: &QueueName) -> Result<QueueCounts, BrokerError> {
        let state = self.state.lock().await;
        if !state.queues.contains_key(name) {
            return Err(BrokerError::UnknownQueue(name.to_string()));
        }
        Ok(state.counts(name))
    }

    async fn close(&self) {
        let mut state = self.state.lock().await;
        state.closed = true;
        for slot in state.queues.values() {
            slot.notify.notify_waiters();
        }
    }
}

struct InMemoryLease {
    id: JobId,
    queue: QueueName,
    body: JobBody,
    attempt: u32,
    retry: Option<RetryDirective>,
    state: Arc<Mutex<BrokerState>>,
}

#[async_trait]
impl JobLease for InMemoryLease {
    fn id(&self) -> JobId {
        self.id
    }

    fn queue(&self) -> &QueueName {
        &self.queue
    }

    fn body(&self) -> &JobBody {
        &self.body
    }

    fn attempt(&self) -> u32 {
        self.attempt
    }

    fn retry(&mut self, directive: RetryDirective) {
        self.retry = Some(directive);
    }

    async fn resolve(self: Box<Self>, reply: Reply) -> Result<(), BrokerError> {
        let mut state = self.state.lock().await;
        let record = state
            .jobs
            .get_mut(&self.id)
            .ok_or(BrokerError::UnknownJob(self.id))?;
        if record.state != JobState::Processing {
            return Err(BrokerError::NotProcessing(self.id));
        }

        record.mark_resolved();
        if !record.reply.settle(JobOutcome::Success(reply)) {
            tracing::debug!(job_id = %self.id, "job resolved after its request stopped waiting");
        }
        state.finish(self.id);
        Ok(())
    }

    async fn reject(self: Box<Self>, failure: Failure) -> Result<(), BrokerError> {
        let notify = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            let record = state
                .jobs
                .get_mut(&self.id)
                .ok_or(BrokerError::UnknownJob(self.id))?;
            if record.state != JobState::Processing {
                return Err(BrokerError::NotProcessing(self.id));
            }
            if self.retry.is_some() {
                record.retry = self.retry;
            }

            if record.should_redeliver() {
                let slot = state
                    .queues
                    .get_mut(&self.queue)
                    .ok_or_else(|| BrokerError::UnknownQueue(self.queue.to_string()))?;
                let delay = slot
                    .config
                    .retry
                    .next_delay(record.attempts)
                    .min(MAX_REDELIVERY_DELAY);
                let next_run_at = Instant::now() + delay;

                tracing::debug!(
                    job_id = %self.id,
                    attempt = record.attempts,
                    ?delay,
                    error = %failure.message,
                    "job scheduled for redelivery"
                );
                record.schedule_retry(next_run_at, failure.message);
                slot.scheduled.push(ScheduledJob {
                    next_run_at,
                    job_id: self.id,
                });
                Some(Arc::clone(&slot.notify))
            } else {
                record.mark_rejected(failure.message.clone());
                if !record.reply.settle(JobOutcome::Error(failure)) {
                    tracing::debug!(job_id = %self.id, "job rejected after its request stopped waiting");
                }
                state.finish(self.id);
                None
            }
        };

        // wake a consumer so it re-arms its timer for the new redelivery
        if let Some(notify) = notify {
            notify.notify_one();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RequestSnapshot;
    use crate::pipeline::{Context, Request};
    use crate::queue::RetryPolicy;

    fn body(path: &str) -> JobBody {
        let cx = Context::new(Request::get(path));
        JobBody::new(RequestSnapshot::capture(&cx))
    }

    async fn broker_with(config: QueueConfig) -> (InMemoryBroker, QueueName) {
        let broker = InMemoryBroker::new();
        let name = QueueName::join("test", "jobs");
        broker.assert_queue(&name, &config).await.unwrap();
        (broker, name)
    }

    fn fast_retry() -> QueueConfig {
        QueueConfig::default()
            .with_max_attempts(3)
            .with_retry(RetryPolicy::fixed(Duration::from_millis(10)))
    }

    #[tokio::test]
    async fn publish_requires_declared_queue() {
        let broker = InMemoryBroker::new();
        let err = broker
            .publish(
                &QueueName::join("nope", ""),
                body("/"),
                Arc::new(OutcomeCell::new()),
            )
            .await
            .unwrap_err();

        assert_eq!(err, BrokerError::UnknownQueue("nope".to_string()));
    }

    #[tokio::test]
    async fn lease_transitions_to_processing() {
        let (broker, name) = broker_with(QueueConfig::default()).await;
        broker
            .publish(&name, body("/a"), Arc::new(OutcomeCell::new()))
            .await
            .unwrap();

        let lease = tokio::time::timeout(Duration::from_millis(100), broker.lease(&name))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(lease.body().snapshot.path, "/a");
        assert_eq!(lease.attempt(), 1);
        let counts = broker.counts(&name).await.unwrap();
        assert_eq!(counts.pending, 0);
        assert_eq!(counts.processing, 1);
    }

    #[tokio::test]
    async fn resolve_settles_reply_cell() {
        let (broker, name) = broker_with(QueueConfig::default()).await;
        let cell = Arc::new(OutcomeCell::new());
        let job_id = broker
            .publish(&name, body("/"), Arc::clone(&cell))
            .await
            .unwrap();

        let lease = broker.lease(&name).await.unwrap();
        lease
            .resolve(Reply::new().with_status(201).with_body("ok"))
            .await
            .unwrap();

        assert_eq!(
            cell.get(),
            Some(&JobOutcome::Success(Reply::new().with_status(201).with_body("ok")))
        );
        let status = broker.job_status(job_id).await.unwrap();
        assert_eq!(status.state, JobState::Resolved);
        assert_eq!(status.attempts, 1);
    }

    #[tokio::test]
    async fn reject_without_retry_is_terminal() {
        let (broker, name) = broker_with(fast_retry()).await;
        let cell = Arc::new(OutcomeCell::new());
        broker
            .publish(&name, body("/"), Arc::clone(&cell))
            .await
            .unwrap();

        let mut lease = broker.lease(&name).await.unwrap();
        lease.retry(RetryDirective::Enabled(false));
        lease
            .reject(Failure::new("bad").with_status(400))
            .await
            .unwrap();

        assert_eq!(
            cell.get(),
            Some(&JobOutcome::Error(Failure::new("bad").with_status(400)))
        );
        let counts = broker.counts(&name).await.unwrap();
        assert_eq!(counts.rejected, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reject_with_retry_redelivers_after_backoff() {
        let (broker, name) = broker_with(fast_retry()).await;
        let cell = Arc::new(OutcomeCell::new());
        let job_id = broker
            .publish(&name, body("/"), Arc::clone(&cell))
            .await
            .unwrap();

        let lease = broker.lease(&name).await.unwrap();
        lease.reject(Failure::new("flaky")).await.unwrap();
        assert!(!cell.is_settled());

        let started = Instant::now();
        let lease = broker.lease(&name).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(10));
        assert_eq!(lease.id(), job_id);
        assert_eq!(lease.attempt(), 2);

        let status = broker.job_status(job_id).await.unwrap();
        assert_eq!(status.last_error.as_deref(), Some("flaky"));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_attempts_settle_error() {
        let (broker, name) = broker_with(fast_retry()).await;
        let cell = Arc::new(OutcomeCell::new());
        broker
            .publish(&name, body("/"), Arc::clone(&cell))
            .await
            .unwrap();

        for _ in 0..3 {
            let lease = broker.lease(&name).await.unwrap();
            lease.reject(Failure::new("still failing")).await.unwrap();
        }

        assert_eq!(
            cell.get(),
            Some(&JobOutcome::Error(Failure::new("still failing")))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn attempt_count_directive_overrides_queue_budget() {
        let (broker, name) = broker_with(fast_retry().with_max_attempts(1)).await;
        let cell = Arc::new(OutcomeCell::new());
        broker
            .publish(&name, body("/"), Arc::clone(&cell))
            .await
            .unwrap();

        let mut lease = broker.lease(&name).await.unwrap();
        lease.retry(RetryDirective::Attempts(2));
        lease.reject(Failure::new("once more")).await.unwrap();
        assert!(!cell.is_settled());

        let lease = broker.lease(&name).await.unwrap();
        assert_eq!(lease.attempt(), 2);
    }

    #[tokio::test]
    async fn reasserting_queue_keeps_first_config() {
        let (broker, name) = broker_with(QueueConfig::default().with_max_attempts(7)).await;
        broker
            .assert_queue(&name, &QueueConfig::default().with_max_attempts(1))
            .await
            .unwrap();

        let job_id = broker
            .publish(&name, body("/"), Arc::new(OutcomeCell::new()))
            .await
            .unwrap();

        let state = broker.state.lock().await;
        assert_eq!(state.jobs[&job_id].max_attempts, 7);
    }

    #[tokio::test]
    async fn close_ends_leases() {
        let (broker, name) = broker_with(QueueConfig::default()).await;

        let waiter = tokio::spawn({
            let broker = broker.clone();
            let name = name.clone();
            async move { broker.lease(&name).await.is_none() }
        });
        tokio::task::yield_now().await;
        broker.close().await;

        assert!(waiter.await.unwrap());
        assert_eq!(
            broker
                .publish(&name, body("/"), Arc::new(OutcomeCell::new()))
                .await
                .unwrap_err(),
            BrokerError::Closed
        );
    }

    #[tokio::test]
    async fn finished_jobs_beyond_retention_are_dropped() {
        let broker = InMemoryBroker::with_retention(2);
        let name = QueueName::join("test", "jobs");
        broker.assert_queue(&name, &QueueConfig::default()).await.unwrap();

        let mut ids = Vec::new();
        for i in 0..5 {
            let job_id = broker
                .publish(&name, body(&format!("/{i}")), Arc::new(OutcomeCell::new()))
                .await
                .unwrap();
            broker
                .lease(&name)
                .await
                .unwrap()
                .resolve(Reply::new())
                .await
                .unwrap();
            ids.push(job_id);
        }

        assert_eq!(broker.state.lock().await.jobs.len(), 2);
        assert_eq!(broker.counts(&name).await.unwrap().resolved, 2);
        assert_eq!(
            broker.job_status(ids[0]).await.unwrap_err(),
            BrokerError::UnknownJob(ids[0])
        );
        assert_eq!(
            broker.job_status(ids[4]).await.unwrap().state,
            JobState::Resolved
        );
    }

    #[tokio::test]
    async fn retention_leaves_unfinished_jobs_alone() {
        let broker = InMemoryBroker::with_retention(0);
        let name = QueueName::join("test", "jobs");
        broker.assert_queue(&name, &QueueConfig::default()).await.unwrap();
        let waiting = broker
            .publish(&name, body("/wait"), Arc::new(OutcomeCell::new()))
            .await
            .unwrap();
        let failed = broker
            .publish(&name, body("/failed"), Arc::new(OutcomeCell::new()))
            .await
            .unwrap();

        let first = broker.lease(&name).await.unwrap();
        assert_eq!(first.id(), waiting);
        let mut second = broker.lease(&name).await.unwrap();
        second.retry(RetryDirective::Enabled(false));
        second.reject(Failure::new("no")).await.unwrap();

        assert!(broker.job_status(failed).await.is_err());
        assert_eq!(
            broker.job_status(waiting).await.unwrap().state,
            JobState::Processing
        );
        first.resolve(Reply::new()).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn close_right_after_lease_starts_waiting_is_not_missed() {
        for _ in 0..200 {
            let (broker, name) = broker_with(QueueConfig::default()).await;
            let waiter = tokio::spawn({
                let broker = broker.clone();
                let name = name.clone();
                async move { broker.lease(&name).await.is_none() }
            });
            broker.close().await;

            let closed = tokio::time::timeout(Duration::from_secs(1), waiter)
                .await
                .unwrap()
                .unwrap();
            assert!(closed);
        }
    }
}

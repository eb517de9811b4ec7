//! Job record: payload + delivery bookkeeping.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use super::JobState;
use crate::domain::{JobBody, JobId, JobStatus, OutcomeCell, QueueName, RetryDirective};

/// Single source of truth for one job inside the in-memory broker.
/// Ready/scheduled lists hold `JobId`s only; every transition happens here.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: JobId,
    pub queue: QueueName,
    pub body: JobBody,
    pub state: JobState,

    /// Deliveries so far, including the current one while Processing.
    pub attempts: u32,
    pub max_attempts: u32,

    /// Redelivery instruction from the latest failed attempt.
    pub retry: Option<RetryDirective>,

    pub last_error: Option<String>,
    pub next_run_at: Option<Instant>,

    /// Where the waiting request picks up the outcome.
    pub reply: Arc<OutcomeCell>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn new(
        id: JobId,
        queue: QueueName,
        body: JobBody,
        max_attempts: u32,
        reply: Arc<OutcomeCell>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            queue,
            body,
            state: JobState::Pending,
            attempts: 0,
            max_attempts,
            retry: None,
            last_error: None,
            next_run_at: None,
            reply,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn start_attempt(&mut self) {
        self.state = JobState::Processing;
        self.attempts += 1;
        self.retry = None;
        self.updated_at = Utc::now();
    }

    pub fn mark_resolved(&mut self) {
        self.state = JobState::Resolved;
        self.updated_at = Utc::now();
    }

    pub fn mark_rejected(&mut self, error: String) {
        self.state = JobState::Rejected;
        self.last_error = Some(error);
        self.updated_at = Utc::now();
    }

    pub fn schedule_retry(&mut self, next_run_at: Instant, error: String) {
        self.state = JobState::Pending;
        self.next_run_at = Some(next_run_at);
        self.last_error = Some(error);
        self.updated_at = Utc::now();
    }

    pub fn requeue(&mut self) {
        self.next_run_at = None;
        self.updated_at = Utc::now();
    }

    /// Whether a failed attempt earns another delivery.
    pub fn should_redeliver(&self) -> bool {
        match self.retry {
            Some(RetryDirective::Enabled(false)) => false,
            Some(RetryDirective::Attempts(limit)) => self.attempts < limit,
            Some(RetryDirective::Enabled(true)) | None => self.attempts < self.max_attempts,
        }
    }

    pub fn status(&self) -> JobStatus {
        JobStatus {
            job_id: self.id,
            queue: self.queue.clone(),
            state: self.state,
            attempts: self.attempts,
            last_error: self.last_error.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

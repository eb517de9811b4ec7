//! Worker-side job processing.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;

use crate::domain::{Failure, Reply, RetryDirective};
use crate::error::BrokerError;
use crate::pipeline::{Pipeline, ReplayContext};
use crate::ports::JobLease;

/// Consumes one leased job. Must resolve or reject it before returning; a
/// job whose handler panics stays in processing.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn process(&self, job: Box<dyn JobLease>) -> Result<(), BrokerError>;
}

/// Default processor: replays the captured request through the pipeline
/// that produced it and reports the result to the broker.
///
/// A panic in the pipeline counts as a retryable failure.
pub struct ReplayProcessor {
    pipeline: Arc<Pipeline>,
}

impl ReplayProcessor {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self { pipeline }
    }
}

#[async_trait]
impl JobHandler for ReplayProcessor {
    async fn process(&self, mut job: Box<dyn JobLease>) -> Result<(), BrokerError> {
        let body = job.body().clone();
        let request = body.snapshot.to_request();
        let replay = ReplayContext::new(job.id(), job.attempt(), body.state);

        let replayed = AssertUnwindSafe(self.pipeline.replay(request, replay))
            .catch_unwind()
            .await;
        let mut cx = match replayed {
            Ok(cx) => cx,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(job_id = %job.id(), attempt = job.attempt(), %message, "job panicked");
                job.retry(RetryDirective::Enabled(true));
                return job
                    .reject(Failure::new(format!("job panicked: {message}")))
                    .await;
            }
        };

        match cx.take_error() {
            None => {
                tracing::debug!(job_id = %job.id(), attempt = job.attempt(), "job replayed");
                job.resolve(Reply::capture(&cx.response)).await
            }
            Some(err) => {
                let retry = err.retry().unwrap_or(RetryDirective::Enabled(true));
                tracing::info!(
                    job_id = %job.id(),
                    attempt = job.attempt(),
                    error = %err,
                    ?retry,
                    "job failed"
                );
                job.retry(retry);
                job.reject(Failure::from(&err)).await
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

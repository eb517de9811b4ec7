use http::StatusCode;
use thiserror::Error;

use crate::domain::{JobId, RetryDirective};

/// Bridge construction failures. Fatal for the owning service.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("unable to find a broker source")]
    MissingBroker,

    #[error("queue name must not be empty")]
    EmptyQueueName,
}

/// Failures reported by a broker implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    #[error("queue not declared: {0}")]
    UnknownQueue(String),

    #[error("job not found: {0}")]
    UnknownJob(JobId),

    #[error("job {0} is not being processed")]
    NotProcessing(JobId),

    #[error("broker is closed")]
    Closed,
}

/// Broker-level failure while getting a request onto a queue.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to declare queue {queue}: {source}")]
    Declare {
        queue: String,
        #[source]
        source: BrokerError,
    },

    #[error("failed to enqueue job on {queue}: {source}")]
    Enqueue {
        queue: String,
        #[source]
        source: BrokerError,
    },
}

/// Errors returned by [`crate::app::Bridge::queue`].
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// Business-logic failure raised inside the request pipeline.
///
/// `status` and `retry` are hints: the live error handler uses `status`, the
/// job processor forwards `retry` to the broker (absent means retry).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct PipelineError {
    status: Option<StatusCode>,
    message: String,
    retry: Option<RetryDirective>,
}

impl PipelineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
            retry: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(message).with_status(StatusCode::BAD_REQUEST)
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_retry(mut self, retry: RetryDirective) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn retry(&self) -> Option<RetryDirective> {
        self.retry
    }
}

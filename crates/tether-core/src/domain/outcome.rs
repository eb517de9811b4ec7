//! Outcome model: what a dispatched job settles to.
//!
//! A job settles exactly once into a [`JobOutcome`]. `Reply` and `Failure`
//! travel through the broker, so both serialize; `Timeout` is only ever
//! produced on the waiting side.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DispatchError, PipelineError};
use crate::pipeline::Response;

/// Redelivery instruction for a rejected job (`bool | count`).
///
/// Serialized untagged, so `true`, `false` and `3` are all valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RetryDirective {
    /// Redeliver (bounded by the queue's `max_attempts`) or give up.
    Enabled(bool),
    /// Redeliver while the job has made fewer than this many attempts.
    Attempts(u32),
}

impl Default for RetryDirective {
    fn default() -> Self {
        RetryDirective::Enabled(true)
    }
}

/// Response captured from a replayed request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl Reply {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads status, headers and body off a finished response.
    ///
    /// The status is the one the response would be sent with, so an empty
    /// response captures 404. Repeated headers are joined with `", "`.
    pub fn capture(response: &Response) -> Self {
        Self {
            status: Some(response.effective_status().as_u16()),
            headers: response.header_map(),
            body: response.body().map(str::to_string),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// Why a job failed, as reported back to the waiting request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,

    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryDirective>,
}

impl Failure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
            retry: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_retry(mut self, retry: RetryDirective) -> Self {
        self.retry = Some(retry);
        self
    }
}

impl From<&PipelineError> for Failure {
    fn from(err: &PipelineError) -> Self {
        Self {
            status: err.status().map(|status| status.as_u16()),
            message: err.message().to_string(),
            retry: err.retry(),
        }
    }
}

impl From<DispatchError> for Failure {
    fn from(err: DispatchError) -> Self {
        Failure::new(err.to_string())
    }
}

/// Settled result of one dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobOutcome {
    Success(Reply),
    Timeout { after: Duration },
    Error(Failure),
}

impl JobOutcome {
    pub fn is_timeout(&self) -> bool {
        matches!(self, JobOutcome::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;

    #[test]
    fn retry_directive_accepts_bool_or_count() {
        let enabled: RetryDirective = serde_json::from_str("false").unwrap();
        let attempts: RetryDirective = serde_json::from_str("3").unwrap();

        assert_eq!(enabled, RetryDirective::Enabled(false));
        assert_eq!(attempts, RetryDirective::Attempts(3));
    }

    #[test]
    fn failure_keeps_pipeline_hints() {
        let err = PipelineError::new("bad")
            .with_status(StatusCode::BAD_REQUEST)
            .with_retry(RetryDirective::Enabled(false));

        let failure = Failure::from(&err);

        assert_eq!(failure.status, Some(400));
        assert_eq!(failure.message, "bad");
        assert_eq!(failure.retry, Some(RetryDirective::Enabled(false)));
    }

    #[test]
    fn reply_without_status_omits_field() {
        let reply = Reply::new().with_body("ok");
        let v = serde_json::to_value(&reply).unwrap();

        assert!(v.get("status").is_none());
        assert_eq!(v["body"], "ok");
    }

    #[test]
    fn capture_records_the_status_that_would_be_sent() {
        let mut response = Response::new();
        assert_eq!(Reply::capture(&response).status, Some(404));

        response.set_body("hi");
        assert_eq!(Reply::capture(&response).status, Some(200));

        response.set_status(StatusCode::CREATED);
        assert_eq!(Reply::capture(&response).status, Some(201));
    }

    #[test]
    fn outcome_is_tagged_by_kind() {
        let v = serde_json::to_value(JobOutcome::Error(Failure::new("boom"))).unwrap();
        assert_eq!(v["kind"], "error");
        assert_eq!(v["message"], "boom");
    }
}

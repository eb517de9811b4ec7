//! Per-request context: request, response, application state, and the
//! replay marker for worker-built requests.

use http::StatusCode;
use serde_json::Value;

use super::{Request, Response};
use crate::domain::JobId;
use crate::error::PipelineError;

/// Marker attached to requests rebuilt from a job.
///
/// It lives on the [`Context`] beside the request and is never mutated.
/// Its presence alone means "already dispatched, run business logic".
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayContext {
    job_id: JobId,
    attempt: u32,
    state: Value,
}

impl ReplayContext {
    pub fn new(job_id: JobId, attempt: u32, state: Value) -> Self {
        Self {
            job_id,
            attempt,
            state,
        }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// 1-based delivery attempt.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Application state captured with the original request.
    pub fn state(&self) -> &Value {
        &self.state
    }
}

#[derive(Debug)]
pub struct Context {
    pub request: Request,
    pub response: Response,
    /// Application-visible state shared between middleware layers.
    pub state: Value,
    replay: Option<ReplayContext>,
    error: Option<PipelineError>,
}

impl Context {
    pub fn new(request: Request) -> Self {
        Self {
            request,
            response: Response::new(),
            state: Value::Object(Default::default()),
            replay: None,
            error: None,
        }
    }

    pub fn replayed(request: Request, replay: ReplayContext) -> Self {
        Self {
            replay: Some(replay),
            ..Self::new(request)
        }
    }

    pub fn replay(&self) -> Option<&ReplayContext> {
        self.replay.as_ref()
    }

    pub fn is_replay(&self) -> bool {
        self.replay.is_some()
    }

    /// Parks a failure out-of-band for the job processor. First error wins.
    pub fn capture_error(&mut self, err: PipelineError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    pub fn error(&self) -> Option<&PipelineError> {
        self.error.as_ref()
    }

    pub fn take_error(&mut self) -> Option<PipelineError> {
        self.error.take()
    }

    /// Live-traffic error handling: write the error as the response.
    pub(crate) fn respond_with_error(&mut self, err: &PipelineError) {
        self.response = Response::new();
        self.response
            .set_status(err.status().unwrap_or(StatusCode::INTERNAL_SERVER_ERROR));
        self.response.set_body(err.message());
    }
}

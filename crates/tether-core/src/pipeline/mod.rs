//! Request-handling pipeline shared by live traffic and replayed jobs.
//!
//! A [`Pipeline`] is an ordered list of [`Middleware`] in front of one
//! [`Endpoint`]. Each middleware decides whether to call the rest of the
//! chain through [`Next::run`].
//!
//! Errors escaping the chain are handled at the pipeline boundary: for live
//! requests they become a response (status from the error, else 500); for
//! replayed requests they are parked in the context's error slot so the job
//! processor can reject the job instead of resolving a generic error page.

mod context;
mod request;
mod response;

pub use self::context::{Context, ReplayContext};
pub use self::request::Request;
pub use self::response::Response;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::PipelineError;

#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, cx: &mut Context, next: Next<'_>) -> Result<(), PipelineError>;
}

/// Terminal business logic.
#[async_trait]
pub trait Endpoint: Send + Sync {
    async fn call(&self, cx: &mut Context) -> Result<(), PipelineError>;
}

/// The remainder of the chain after the current middleware.
pub struct Next<'a> {
    middleware: &'a [Arc<dyn Middleware>],
    endpoint: &'a dyn Endpoint,
}

impl Next<'_> {
    pub async fn run(self, cx: &mut Context) -> Result<(), PipelineError> {
        match self.middleware.split_first() {
            Some((head, rest)) => {
                let next = Next {
                    middleware: rest,
                    endpoint: self.endpoint,
                };
                head.handle(cx, next).await
            }
            None => self.endpoint.call(cx).await,
        }
    }
}

pub struct Pipeline {
    middleware: Vec<Arc<dyn Middleware>>,
    endpoint: Arc<dyn Endpoint>,
}

impl Pipeline {
    pub fn new(endpoint: impl Endpoint + 'static) -> Self {
        Self {
            middleware: Vec::new(),
            endpoint: Arc::new(endpoint),
        }
    }

    /// Appends a middleware; earlier layers run first.
    pub fn layer(mut self, middleware: impl Middleware + 'static) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    pub fn layer_arc(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Runs a live request.
    pub async fn handle(&self, request: Request) -> Context {
        self.run(Context::new(request)).await
    }

    /// Runs a request rebuilt from a job.
    pub async fn replay(&self, request: Request, replay: ReplayContext) -> Context {
        self.run(Context::replayed(request, replay)).await
    }

    async fn run(&self, mut cx: Context) -> Context {
        let next = Next {
            middleware: &self.middleware,
            endpoint: self.endpoint.as_ref(),
        };

        if let Err(err) = next.run(&mut cx).await {
            if cx.is_replay() {
                cx.capture_error(err);
            } else {
                tracing::warn!(
                    method = %cx.request.method(),
                    path = cx.request.path(),
                    error = %err,
                    "request failed"
                );
                cx.respond_with_error(&err);
            }
        }
        cx
    }
}

//! Outcome reconciler: writes a settled outcome onto the waiting response.

use std::time::Duration;

use http::StatusCode;

use crate::domain::{Failure, JobOutcome, Reply};
use crate::pipeline::Context;

/// One hook per outcome class. Implementations own the response shape.
pub trait Reconciler: Send + Sync {
    fn on_success(&self, cx: &mut Context, reply: &Reply);

    fn on_timeout(&self, cx: &mut Context, after: Duration);

    fn on_error(&self, cx: &mut Context, failure: &Failure);
}

/// Job status/headers/body on success, 202 on timeout, status or 500 with
/// the message as body on error.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultReconciler;

impl Reconciler for DefaultReconciler {
    fn on_success(&self, cx: &mut Context, reply: &Reply) {
        cx.response
            .set_status(status_or(reply.status, StatusCode::OK));
        for (name, value) in &reply.headers {
            if let Err(err) = cx.response.set_header(name, value) {
                tracing::warn!(header = %name, error = %err, "dropping invalid reply header");
            }
        }
        if let Some(body) = &reply.body {
            cx.response.set_body(body.clone());
        }
    }

    fn on_timeout(&self, cx: &mut Context, _after: Duration) {
        cx.response.set_status(StatusCode::ACCEPTED);
    }

    fn on_error(&self, cx: &mut Context, failure: &Failure) {
        cx.response
            .set_status(status_or(failure.status, StatusCode::INTERNAL_SERVER_ERROR));
        cx.response.set_body(failure.message.clone());
    }
}

fn status_or(code: Option<u16>, fallback: StatusCode) -> StatusCode {
    match code.map(StatusCode::from_u16) {
        Some(Ok(status)) => status,
        Some(Err(_)) => {
            tracing::warn!(?code, fallback = %fallback, "invalid status code in job outcome");
            fallback
        }
        None => fallback,
    }
}

/// Routes `outcome` to the matching hook.
pub fn reconcile(reconciler: &dyn Reconciler, cx: &mut Context, outcome: &JobOutcome) {
    match outcome {
        JobOutcome::Success(reply) => reconciler.on_success(cx, reply),
        JobOutcome::Timeout { after } => reconciler.on_timeout(cx, *after),
        JobOutcome::Error(failure) => reconciler.on_error(cx, failure),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Request;
    use rstest::rstest;

    fn cx() -> Context {
        Context::new(Request::get("/orders"))
    }

    #[test]
    fn success_copies_reply() {
        let mut cx = cx();
        let reply = Reply::new()
            .with_status(201)
            .with_header("x-a", "1")
            .with_body("ok");

        reconcile(&DefaultReconciler, &mut cx, &JobOutcome::Success(reply));

        assert_eq!(cx.response.status(), Some(StatusCode::CREATED));
        assert_eq!(cx.response.header_map().get("x-a").map(String::as_str), Some("1"));
        assert_eq!(cx.response.body(), Some("ok"));
    }

    #[test]
    fn success_without_status_defaults_to_ok() {
        let mut cx = cx();

        reconcile(&DefaultReconciler, &mut cx, &JobOutcome::Success(Reply::new()));

        assert_eq!(cx.response.status(), Some(StatusCode::OK));
        assert_eq!(cx.response.body(), None);
    }

    #[test]
    fn invalid_reply_header_is_skipped() {
        let mut cx = cx();
        let reply = Reply::new().with_header("bad header", "1").with_header("x-b", "2");

        reconcile(&DefaultReconciler, &mut cx, &JobOutcome::Success(reply));

        let headers = cx.response.header_map();
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("x-b").map(String::as_str), Some("2"));
    }

    #[test]
    fn timeout_is_accepted() {
        let mut cx = cx();

        reconcile(
            &DefaultReconciler,
            &mut cx,
            &JobOutcome::Timeout {
                after: Duration::from_secs(30),
            },
        );

        assert_eq!(cx.response.status(), Some(StatusCode::ACCEPTED));
    }

    #[rstest]
    #[case::explicit(Some(400), StatusCode::BAD_REQUEST)]
    #[case::missing(None, StatusCode::INTERNAL_SERVER_ERROR)]
    #[case::out_of_range(Some(1000), StatusCode::INTERNAL_SERVER_ERROR)]
    fn error_status(#[case] status: Option<u16>, #[case] expected: StatusCode) {
        let mut cx = cx();
        let mut failure = Failure::new("bad");
        failure.status = status;

        reconcile(&DefaultReconciler, &mut cx, &JobOutcome::Error(failure));

        assert_eq!(cx.response.status(), Some(expected));
        assert_eq!(cx.response.body(), Some("bad"));
    }
}

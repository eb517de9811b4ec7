//! RequestSnapshot: the transportable copy of an inbound request.
//!
//! A snapshot is taken once per dispatched request and never mutated. It
//! holds owned copies only (no socket, no references into the live
//! connection), so it can be serialized onto any broker.

use std::collections::BTreeMap;

use http::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::pipeline::{Context, Request};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestSnapshot {
    pub url: String,
    pub method: String,
    pub protocol: String,
    pub origin: String,
    pub href: String,
    pub path: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub query: BTreeMap<String, String>,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    #[serde(default)]
    pub state: Value,
    /// Whether the original connection was TLS.
    #[serde(default)]
    pub socket_encrypted: bool,
}

impl RequestSnapshot {
    /// Copies the transportable fields of `cx` (request plus app state).
    pub fn capture(cx: &Context) -> Self {
        let request = &cx.request;
        Self {
            url: request.url().to_string(),
            method: request.method().as_str().to_string(),
            protocol: request.protocol().to_string(),
            origin: request.origin(),
            href: request.href(),
            path: request.path().to_string(),
            headers: request.header_map(),
            body: request.body().to_string(),
            query: request.query().clone(),
            params: request.params().clone(),
            state: cx.state.clone(),
            socket_encrypted: request.is_encrypted(),
        }
    }

    /// Rebuilds a synthetic request for replay.
    ///
    /// `url`, `method`, `headers`, `body`, `query` and `params` come back
    /// unchanged; protocol, origin and href are derived again from the
    /// encrypted flag and the `host` header.
    pub fn to_request(&self) -> Request {
        let method = Method::from_bytes(self.method.as_bytes()).unwrap_or_else(|_| {
            tracing::warn!(method = %self.method, "unknown method in snapshot, using GET");
            Method::GET
        });

        let mut request = Request::new(method, self.url.clone())
            .with_body(self.body.clone())
            .with_query(self.query.clone())
            .with_params(self.params.clone())
            .encrypted(self.socket_encrypted);
        for (name, value) in &self.headers {
            request.insert_header(name, value);
        }
        request
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_context() -> Context {
        let request = Request::post("/orders/42?expand=items&dry_run=1")
            .with_header("host", "shop.test")
            .with_header("content-type", "application/json")
            .with_header("x-a", "1")
            .with_body(r#"{"sku":"A-1"}"#)
            .with_param("id", "42")
            .encrypted(true);
        let mut cx = Context::new(request);
        cx.state = json!({"user": "ada"});
        cx
    }

    #[test]
    fn capture_copies_listed_fields() {
        let snapshot = RequestSnapshot::capture(&sample_context());

        assert_eq!(snapshot.url, "/orders/42?expand=items&dry_run=1");
        assert_eq!(snapshot.method, "POST");
        assert_eq!(snapshot.protocol, "https");
        assert_eq!(snapshot.origin, "https://shop.test");
        assert_eq!(snapshot.href, "https://shop.test/orders/42?expand=items&dry_run=1");
        assert_eq!(snapshot.path, "/orders/42");
        assert_eq!(snapshot.headers.get("x-a").map(String::as_str), Some("1"));
        assert_eq!(snapshot.params.get("id").map(String::as_str), Some("42"));
        assert_eq!(snapshot.state, json!({"user": "ada"}));
        assert!(snapshot.socket_encrypted);
    }

    #[test]
    fn synthetic_request_matches_snapshot() {
        let snapshot = RequestSnapshot::capture(&sample_context());

        let request = snapshot.to_request();

        assert_eq!(request.url(), snapshot.url);
        assert_eq!(request.method().as_str(), snapshot.method);
        assert_eq!(request.header_map(), snapshot.headers);
        assert_eq!(request.body(), snapshot.body);
        assert_eq!(request.query(), &snapshot.query);
        assert_eq!(request.params(), &snapshot.params);
        assert_eq!(request.href(), snapshot.href);
    }

    #[test]
    fn snapshot_survives_transport() {
        let snapshot = RequestSnapshot::capture(&sample_context());

        let wire = serde_json::to_string(&snapshot).unwrap();
        let back: RequestSnapshot = serde_json::from_str(&wire).unwrap();

        assert_eq!(back, snapshot);
    }

    #[test]
    fn query_map_is_carried_over_verbatim() {
        let mut snapshot = RequestSnapshot::capture(&sample_context());
        snapshot.query.insert("injected".into(), "yes".into());

        let request = snapshot.to_request();

        assert_eq!(request.query().get("injected").map(String::as_str), Some("yes"));
    }
}

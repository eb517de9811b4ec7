//! Response capture written by the pipeline.

use std::collections::BTreeMap;

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};

use super::request::flatten_headers;

/// Mutable response under construction. Nothing is sent until the owner
/// converts it with [`Response::into_http`].
#[derive(Debug, Clone, Default)]
pub struct Response {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: Option<String>,
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    /// Status set by the pipeline, `None` if nothing set one.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn header_map(&self) -> BTreeMap<String, String> {
        flatten_headers(&self.headers)
    }

    /// Sets (replaces) a header.
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<(), http::Error> {
        let name = HeaderName::from_bytes(name.as_bytes())?;
        let value = HeaderValue::from_str(value)?;
        self.headers.insert(name, value);
        Ok(())
    }

    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    pub fn set_body(&mut self, body: impl Into<String>) {
        self.body = Some(body.into());
    }

    /// Final status: the explicit one, else 200 with a body, else 404.
    pub fn effective_status(&self) -> StatusCode {
        match (self.status, &self.body) {
            (Some(status), _) => status,
            (None, Some(_)) => StatusCode::OK,
            (None, None) => StatusCode::NOT_FOUND,
        }
    }

    pub fn into_http(self) -> http::Response<Bytes> {
        let status = self.effective_status();
        let mut response = http::Response::new(Bytes::from(self.body.unwrap_or_default()));
        *response.status_mut() = status;
        *response.headers_mut() = self.headers;
        response
    }
}

//! Request as seen by the pipeline, live or replayed.

use std::collections::BTreeMap;

use bytes::Bytes;
use http::header::{HOST, HeaderName, HeaderValue};
use http::{HeaderMap, Method};

#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    url: String,
    headers: HeaderMap,
    body: String,
    query: BTreeMap<String, String>,
    params: BTreeMap<String, String>,
    encrypted: bool,
}

impl Request {
    /// `url` is the origin-form target (`/path?query`); the query map is
    /// parsed from it. A repeated query key keeps its last value; the full
    /// string stays available through [`Request::url`].
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        let url = url.into();
        let query = parse_query(&url);
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: String::new(),
            query,
            params: BTreeMap::new(),
            encrypted: false,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    /// Builds a request from an `http` request whose body was already
    /// collected. Non UTF-8 body bytes are replaced.
    pub fn from_http(request: http::Request<Bytes>, encrypted: bool) -> Self {
        let (parts, body) = request.into_parts();
        let url = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());

        let mut request = Self::new(parts.method, url);
        request.headers = parts.headers;
        request.body = String::from_utf8_lossy(&body).into_owned();
        request.encrypted = encrypted;
        request
    }

    /// Adds a header. Invalid names or values are skipped with a warning.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.insert_header(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn with_query(mut self, query: BTreeMap<String, String>) -> Self {
        self.query = query;
        self
    }

    pub fn with_params(mut self, params: BTreeMap<String, String>) -> Self {
        self.params = params;
        self
    }

    pub fn encrypted(mut self, encrypted: bool) -> Self {
        self.encrypted = encrypted;
        self
    }

    pub(crate) fn insert_header(&mut self, name: &str, value: &str) {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            _ => tracing::warn!(header = name, "skipping invalid request header"),
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// URL without the query string.
    pub fn path(&self) -> &str {
        match self.url.split_once('?') {
            Some((path, _)) => path,
            None => &self.url,
        }
    }

    pub fn protocol(&self) -> &'static str {
        if self.encrypted { "https" } else { "http" }
    }

    pub fn host(&self) -> &str {
        self.headers
            .get(HOST)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
    }

    pub fn origin(&self) -> String {
        format!("{}://{}", self.protocol(), self.host())
    }

    pub fn href(&self) -> String {
        format!("{}{}", self.origin(), self.url)
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Headers as a name -> value map; repeated headers are joined with `", "`.
    pub fn header_map(&self) -> BTreeMap<String, String> {
        flatten_headers(&self.headers)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn query(&self) -> &BTreeMap<String, String> {
        &self.query
    }

    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    pub fn is_encrypted(&self) -> bool {
        self.encrypted
    }
}

fn parse_query(url: &str) -> BTreeMap<String, String> {
    match url.split_once('?') {
        Some((_, query)) => url::form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect(),
        None => BTreeMap::new(),
    }
}

pub(crate) fn flatten_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .keys()
        .map(|name| {
            let joined = headers
                .get_all(name)
                .iter()
                .filter_map(|value| value.to_str().ok())
                .collect::<Vec<_>>()
                .join(", ");
            (name.as_str().to_string(), joined)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_is_parsed_from_url() {
        let req = Request::get("/search?q=rust%20lang&page=2");

        assert_eq!(req.path(), "/search");
        assert_eq!(req.query().get("q").map(String::as_str), Some("rust lang"));
        assert_eq!(req.query().get("page").map(String::as_str), Some("2"));
    }

    #[test]
    fn repeated_query_key_keeps_last_value() {
        let req = Request::get("/tags?t=a&t=b");

        assert_eq!(req.query().get("t").map(String::as_str), Some("b"));
        assert_eq!(req.url(), "/tags?t=a&t=b");
    }

    #[test]
    fn origin_and_href_follow_host_and_encryption() {
        let req = Request::get("/a?b=1")
            .with_header("host", "example.test")
            .encrypted(true);

        assert_eq!(req.protocol(), "https");
        assert_eq!(req.origin(), "https://example.test");
        assert_eq!(req.href(), "https://example.test/a?b=1");
    }

    #[test]
    fn repeated_headers_are_joined() {
        let req = Request::get("/")
            .with_header("accept", "text/html")
            .with_header("accept", "application/json");

        assert_eq!(
            req.header_map().get("accept").map(String::as_str),
            Some("text/html, application/json")
        );
    }

    #[test]
    fn invalid_header_is_skipped() {
        let req = Request::get("/").with_header("bad header", "x");
        assert!(req.headers().is_empty());
    }

    #[test]
    fn from_http_keeps_target_and_body() {
        let http_req = http::Request::builder()
            .method(Method::PUT)
            .uri("http://example.test/items/7?force=true")
            .header("x-trace", "abc")
            .body(Bytes::from_static(b"{\"n\":1}"))
            .unwrap();

        let req = Request::from_http(http_req, false);

        assert_eq!(*req.method(), Method::PUT);
        assert_eq!(req.url(), "/items/7?force=true");
        assert_eq!(req.header("x-trace"), Some("abc"));
        assert_eq!(req.body(), "{\"n\":1}");
        assert_eq!(req.query().get("force").map(String::as_str), Some("true"));
    }
}

//! Per-request input handed to every check.
//!
//! The host adapter builds one [`RequestContext`] per request from the
//! method, URI, headers, socket address and buffered body. Checks never reach
//! for ambient state.

use axum::body::Bytes;
use axum::http::{HeaderMap, Method, Uri};
use serde_json::{Map, Value};
use std::net::IpAddr;

/// Request body after preparation.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedBody {
    Empty,
    Json(Value),
    /// `application/x-www-form-urlencoded` pairs; repeated keys keep the last
    /// value.
    Form(Map<String, Value>),
    /// Anything else, kept verbatim.
    Raw(Bytes),
}

impl ParsedBody {
    /// Number of top-level parameters.
    pub fn param_count(&self) -> usize {
        match self {
            ParsedBody::Json(Value::Object(map)) | ParsedBody::Form(map) => map.len(),
            ParsedBody::Json(Value::Array(items)) => items.len(),
            ParsedBody::Json(_) => 1,
            ParsedBody::Empty | ParsedBody::Raw(_) => 0,
        }
    }

    /// Structured view of the body, if it has one.
    pub fn as_value(&self) -> Option<Value> {
        match self {
            ParsedBody::Json(value) => Some(value.clone()),
            ParsedBody::Form(map) => Some(Value::Object(map.clone())),
            ParsedBody::Empty | ParsedBody::Raw(_) => None,
        }
    }

    /// Look up a top-level string field.
    pub fn field(&self, name: &str) -> Option<&str> {
        match self {
            ParsedBody::Json(Value::Object(map)) | ParsedBody::Form(map) => {
                map.get(name).and_then(Value::as_str)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    /// Socket peer address.
    pub remote_addr: Option<IpAddr>,
    pub query: Map<String, Value>,
    pub body: ParsedBody,
    /// Size of the raw body in bytes.
    pub body_len: usize,
    /// `section-module-package-handler` style key of the matched route.
    pub route_key: String,
    pub https: bool,
    pub server_port: Option<u16>,
}

impl RequestContext {
    /// A context with no headers, query or body.
    pub fn new(method: Method, uri: Uri) -> Self {
        let query = parse_query(uri.query().unwrap_or(""));
        let route_key = route_key_for_path(uri.path());
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            remote_addr: None,
            query,
            body: ParsedBody::Empty,
            body_len: 0,
            route_key,
            https: false,
            server_port: None,
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_remote_addr(mut self, addr: IpAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    pub fn with_body(mut self, body: ParsedBody, body_len: usize) -> Self {
        self.body = body;
        self.body_len = body_len;
        self
    }

    pub fn with_route_key(mut self, route_key: impl Into<String>) -> Self {
        self.route_key = route_key.into();
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Query parameters plus top-level body parameters.
    pub fn param_count(&self) -> usize {
        self.query.len() + self.body.param_count()
    }

    /// Query and structured body as one JSON value for the detectors.
    pub fn inputs(&self) -> Value {
        let mut inputs = vec![Value::Object(self.query.clone())];
        if let Some(body) = self.body.as_value() {
            inputs.push(body);
        }
        Value::Array(inputs)
    }

    /// Unstructured body bytes, if the body was not JSON or a form.
    pub fn raw_body(&self) -> Option<&[u8]> {
        match &self.body {
            ParsedBody::Raw(bytes) => Some(bytes.as_ref()),
            _ => None,
        }
    }
}

/// Decode a query string into a flat map of strings.
pub fn parse_query(query: &str) -> Map<String, Value> {
    url::form_urlencoded::parse(query.as_bytes())
        .map(|(key, value)| (key.into_owned(), Value::String(value.into_owned())))
        .collect()
}

/// `/account/profile/update` → `account-profile-update`.
pub fn route_key_for_path(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_parses_query_and_route() {
        let uri: Uri = "/api/account/profile/update?lang=en&q=a%20b".parse().unwrap();
        let ctx = RequestContext::new(Method::POST, uri);
        assert_eq!(ctx.route_key, "api-account-profile-update");
        assert_eq!(ctx.query.get("q"), Some(&json!("a b")));
        assert_eq!(ctx.param_count(), 2);
    }

    #[test]
    fn test_body_views() {
        let body = ParsedBody::Json(json!({"name": "Jane", "csrf_token": "abc"}));
        assert_eq!(body.param_count(), 2);
        assert_eq!(body.field("csrf_token"), Some("abc"));
        assert_eq!(ParsedBody::Raw(Bytes::from_static(b"x")).as_value(), None);
    }

    #[test]
    fn test_inputs_merge_query_and_body() {
        let uri: Uri = "/search?term=books".parse().unwrap();
        let ctx = RequestContext::new(Method::POST, uri)
            .with_body(ParsedBody::Json(json!({"page": 2})), 10);
        assert_eq!(ctx.inputs(), json!([{"term": "books"}, {"page": 2}]));
    }

    #[test]
    fn test_root_route_key_is_empty() {
        assert_eq!(route_key_for_path("/"), "");
        assert_eq!(route_key_for_path("//a//b/"), "a-b");
    }
}

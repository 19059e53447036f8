//! Response transforms.
//!
//! Every transform runs on handler responses and on rejections alike.
//! Compression rewrites the body into bytes no other transform can read, so
//! configuration validation keeps it last.

use axum::body::Bytes;
use axum::http::{header, HeaderValue, Response};
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::Value;
use std::io::Write;

use crate::config::{ShieldConfig, TransformKind};
use crate::pipeline::{RequestContext, ResponseTransform};
use crate::security::headers::SecurityHeaders;

pub fn build_transform(kind: TransformKind, config: &ShieldConfig) -> Box<dyn ResponseTransform> {
    match kind {
        TransformKind::Headers => Box::new(HeadersTransform {
            headers: SecurityHeaders::new(&config.header, &config.cors),
        }),
        TransformKind::Escape => Box::new(EscapeTransform),
        TransformKind::Compress => Box::new(CompressTransform {
            min_size: config.compress.min_size_bytes,
            level: config.compress.level.min(9),
        }),
    }
}

pub struct HeadersTransform {
    headers: SecurityHeaders,
}

impl ResponseTransform for HeadersTransform {
    fn name(&self) -> &'static str {
        TransformKind::Headers.as_str()
    }

    fn process(&self, _ctx: &RequestContext, mut response: Response<Bytes>) -> Response<Bytes> {
        self.headers.apply(response.headers_mut());
        response
    }
}

/// Replace `<` and `>` in JSON string values with HTML entities.
pub struct EscapeTransform;

impl ResponseTransform for EscapeTransform {
    fn name(&self) -> &'static str {
        TransformKind::Escape.as_str()
    }

    fn process(&self, _ctx: &RequestContext, response: Response<Bytes>) -> Response<Bytes> {
        if !is_json(&response) {
            return response;
        }
        let Ok(mut value) = serde_json::from_slice::<Value>(response.body()) else {
            return response;
        };
        if !escape_value(&mut value) {
            return response;
        }
        let Ok(encoded) = serde_json::to_vec(&value) else {
            return response;
        };
        let (mut parts, _) = response.into_parts();
        parts.headers.remove(header::CONTENT_LENGTH);
        Response::from_parts(parts, Bytes::from(encoded))
    }
}

fn is_json(response: &Response<Bytes>) -> bool {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.to_ascii_lowercase().contains("json"))
}

/// Escape in place. Returns whether anything changed.
fn escape_value(value: &mut Value) -> bool {
    match value {
        Value::String(text) if text.contains(|c: char| c == '<' || c == '>') => {
            *text = text.replace('<', "&lt;").replace('>', "&gt;");
            true
        }
        Value::Array(items) => items.iter_mut().fold(false, |changed, item| escape_value(item) | changed),
        Value::Object(map) => map
            .values_mut()
            .fold(false, |changed, item| escape_value(item) | changed),
        _ => false,
    }
}

/// gzip for clients that accept it.
pub struct CompressTransform {
    min_size: usize,
    level: u32,
}

impl CompressTransform {
    fn gzip(&self, body: &[u8]) -> std::io::Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::new(self.level));
        encoder.write_all(body)?;
        encoder.finish()
    }
}

impl ResponseTransform for CompressTransform {
    fn name(&self) -> &'static str {
        TransformKind::Compress.as_str()
    }

    fn process(&self, ctx: &RequestContext, response: Response<Bytes>) -> Response<Bytes> {
        let accepts_gzip = ctx
            .header(header::ACCEPT_ENCODING.as_str())
            .is_some_and(|value| value.to_ascii_lowercase().contains("gzip"));
        if !accepts_gzip
            || response.body().len() < self.min_size
            || response.headers().contains_key(header::CONTENT_ENCODING)
        {
            return response;
        }

        let compressed = match self.gzip(response.body()) {
            Ok(compressed) => compressed,
            Err(e) => {
                tracing::error!(error = %e, "gzip failed, sending uncompressed body");
                return response;
            }
        };
        let (mut parts, _) = response.into_parts();
        parts.headers.remove(header::CONTENT_LENGTH);
        parts
            .headers
            .insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        parts
            .headers
            .append(header::VARY, HeaderValue::from_static("Accept-Encoding"));
        Response::from_parts(parts, Bytes::from(compressed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, Method, Uri};
    use flate2::read::GzDecoder;
    use serde_json::json;
    use std::io::Read;

    fn json_response(value: Value) -> Response<Bytes> {
        let mut response = Response::new(Bytes::from(value.to_string()));
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        response
    }

    fn ctx(accept_encoding: Option<&'static str>) -> RequestContext {
        let mut headers = HeaderMap::new();
        if let Some(value) = accept_encoding {
            headers.insert(header::ACCEPT_ENCODING, HeaderValue::from_static(value));
        }
        RequestContext::new(Method::GET, Uri::from_static("/")).with_headers(headers)
    }

    #[test]
    fn test_escape_string_values_only() {
        let response = json_response(json!({
            "title": "<b>Tom & \"Jerry\"</b>",
            "items": [{"html": "a>b"}, 3],
            "<key>": true
        }));
        let escaped = EscapeTransform.process(&ctx(None), response);
        let body: Value = serde_json::from_slice(escaped.body()).unwrap();
        assert_eq!(
            body,
            json!({
                "title": "&lt;b&gt;Tom & \"Jerry\"&lt;/b&gt;",
                "items": [{"html": "a&gt;b"}, 3],
                "<key>": true
            })
        );
    }

    #[test]
    fn test_escape_ignores_non_json() {
        let mut response = Response::new(Bytes::from_static(b"<p>hi</p>"));
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html"));
        let out = EscapeTransform.process(&ctx(None), response);
        assert_eq!(out.body().as_ref(), b"<p>hi</p>");
    }

    #[test]
    fn test_compress_when_accepted_and_large_enough() {
        let transform = CompressTransform { min_size: 16, level: 6 };
        let payload = "a".repeat(200);
        let response = Response::new(Bytes::from(payload.clone()));

        let out = transform.process(&ctx(Some("gzip, deflate")), response);
        assert_eq!(out.headers()[header::CONTENT_ENCODING], "gzip");
        assert_eq!(out.headers()[header::VARY], "Accept-Encoding");

        let mut decoded = String::new();
        GzDecoder::new(out.body().as_ref())
            .read_to_string(&mut decoded)
            .unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_compress_skips_small_or_unaccepted() {
        let transform = CompressTransform { min_size: 16, level: 6 };
        let small = transform.process(&ctx(Some("gzip")), Response::new(Bytes::from_static(b"tiny")));
        assert!(!small.headers().contains_key(header::CONTENT_ENCODING));

        let big = Response::new(Bytes::from("b".repeat(100)));
        let plain = transform.process(&ctx(Some("br")), big);
        assert!(!plain.headers().contains_key(header::CONTENT_ENCODING));
    }

    #[test]
    fn test_build_from_config() {
        let config = ShieldConfig::default();
        let headers = build_transform(TransformKind::Headers, &config);
        let out = headers.process(&ctx(None), Response::new(Bytes::new()));
        assert_eq!(out.headers()[header::X_FRAME_OPTIONS], "DENY");
    }
}

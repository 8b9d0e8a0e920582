use std::sync::Arc;

use http::{HeaderName, HeaderValue, StatusCode};
use serde::Serialize;
use serde_json::Value;
use smallvec::SmallVec;

use super::context::RequestContext;
use crate::error::ApiError;

/// Maximum number of response headers stored inline before spilling to the heap.
pub const MAX_INLINE_HEADERS: usize = 16;

/// Response header storage: `(name, value)` pairs, names compared
/// case-insensitively.
pub type HeaderVec = SmallVec<[(Arc<str>, String); MAX_INLINE_HEADERS]>;

/// What a handler (or a whole middleware chain) produces.
pub type HandlerResult = Result<HandlerResponse, ApiError>;

/// A request handler.
///
/// Implemented for every `Fn(&mut RequestContext) -> HandlerResult` closure, so
/// plain closures register directly:
///
/// ```rust,ignore
/// router.get("/health", |_: &mut RequestContext| Ok(HandlerResponse::ok(json!({"ok": true}))))?;
/// ```
pub trait Handler: Send + Sync + 'static {
    fn call(&self, ctx: &mut RequestContext) -> HandlerResult;
}

impl<F> Handler for F
where
    F: Fn(&mut RequestContext) -> HandlerResult + Send + Sync + 'static,
{
    #[inline]
    fn call(&self, ctx: &mut RequestContext) -> HandlerResult {
        self(ctx)
    }
}

/// A shared, type-erased handler. Compiled chains are stored in this form.
pub type BoxedHandler = Arc<dyn Handler>;

/// Box a closure as a [`BoxedHandler`].
///
/// Mostly useful inside middleware, where the closure signature cannot be
/// inferred from a generic bound.
pub fn handler_fn<F>(f: F) -> BoxedHandler
where
    F: Fn(&mut RequestContext) -> HandlerResult + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Response produced by a handler: status, headers and a JSON body.
///
/// A `Value::Null` body means "no body". A `Value::String` body is written as
/// `text/plain` unless a content type was set explicitly.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HandlerResponse {
    #[serde(serialize_with = "serialize_status")]
    pub status: StatusCode,
    #[serde(skip_serializing)]
    pub headers: HeaderVec,
    pub body: Value,
}

fn serialize_status<S: serde::Serializer>(status: &StatusCode, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u16(status.as_u16())
}

impl HandlerResponse {
    #[must_use]
    pub fn new(status: StatusCode, headers: HeaderVec, body: Value) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// JSON response with a `content-type: application/json` header.
    #[must_use]
    pub fn json(status: StatusCode, body: Value) -> Self {
        let mut headers = HeaderVec::new();
        headers.push((Arc::from("content-type"), "application/json".to_string()));
        Self::new(status, headers, body)
    }

    #[must_use]
    pub fn ok(body: Value) -> Self {
        Self::json(StatusCode::OK, body)
    }

    #[must_use]
    pub fn created(body: Value) -> Self {
        Self::json(StatusCode::CREATED, body)
    }

    #[must_use]
    pub fn no_content() -> Self {
        Self::new(StatusCode::NO_CONTENT, HeaderVec::new(), Value::Null)
    }

    /// Plain `{"error": message}` body. Prefer [`ApiError`] for handler errors.
    #[must_use]
    pub fn error(status: StatusCode, message: &str) -> Self {
        Self::json(status, serde_json::json!({ "error": message }))
    }

    #[inline]
    #[must_use]
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Add or replace a header.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((Arc::from(name), value.into()));
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_header(name, value);
        self
    }

    /// Encode the body and convert into an [`http::Response`].
    ///
    /// Header pairs that are not valid HTTP names or values are skipped.
    #[must_use]
    pub fn into_http(self) -> http::Response<Vec<u8>> {
        let has_content_type = self.get_header("content-type").is_some();
        let (body, default_type) = match self.body {
            Value::Null => (Vec::new(), None),
            Value::String(text) => (text.into_bytes(), Some("text/plain; charset=utf-8")),
            other => (
                serde_json::to_vec(&other).unwrap_or_default(),
                Some("application/json"),
            ),
        };

        let mut response = http::Response::new(body);
        *response.status_mut() = self.status;
        let headers = response.headers_mut();
        for (name, value) in &self.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.append(name, value);
            }
        }
        if let (false, Some(content_type)) = (has_content_type, default_type) {
            headers.insert(
                http::header::CONTENT_TYPE,
                HeaderValue::from_static(content_type),
            );
        }
        response
    }
}

impl From<ApiError> for HandlerResponse {
    fn from(err: ApiError) -> Self {
        err.to_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_sets_content_type() {
        let resp = HandlerResponse::ok(serde_json::json!({"a": 1}));
        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(resp.get_header("Content-Type"), Some("application/json"));
    }

    #[test]
    fn test_set_header_replaces_case_insensitively() {
        let mut resp = HandlerResponse::no_content();
        resp.set_header("X-Thing", "1");
        resp.set_header("x-thing", "2");
        assert_eq!(resp.headers.len(), 1);
        assert_eq!(resp.get_header("X-THING"), Some("2"));
    }

    #[test]
    fn test_into_http_json_body() {
        let http = HandlerResponse::created(serde_json::json!({"id": 7})).into_http();
        assert_eq!(http.status(), StatusCode::CREATED);
        assert_eq!(http.headers()["content-type"], "application/json");
        let body: Value = serde_json::from_slice(http.body()).unwrap();
        assert_eq!(body["id"], 7);
    }

    #[test]
    fn test_into_http_text_and_empty() {
        let text = HandlerResponse::new(StatusCode::OK, HeaderVec::new(), Value::String("hi".into())).into_http();
        assert_eq!(text.body(), b"hi");
        assert!(text.headers()["content-type"].to_str().unwrap().starts_with("text/plain"));

        let empty = HandlerResponse::no_content().into_http();
        assert!(empty.body().is_empty());
        assert!(empty.headers().get("content-type").is_none());
    }

    #[test]
    fn test_into_http_skips_invalid_headers() {
        let http = HandlerResponse::no_content()
            .with_header("bad header", "x")
            .with_header("x-ok", "y")
            .into_http();
        assert_eq!(http.headers().len(), 1);
        assert_eq!(http.headers()["x-ok"], "y");
    }
}

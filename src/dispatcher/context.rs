//! Per-request state handed to handlers and middleware.
//!
//! A [`Request`] is what the host hands to [`Router::dispatch`]. The router
//! moves it into a [`RequestContext`], which additionally carries the matched
//! route, extracted path parameters, a typed key/value store for middleware to
//! pass data downstream, and response headers that are merged into whatever
//! response the chain produces.
//!
//! Contexts are recycled through [`ContextPool`](super::ContextPool). Every
//! field is reset before reuse; nothing from one request is observable in the
//! next.
//!
//! [`Router::dispatch`]: crate::Router::dispatch

use std::any::Any;
use std::borrow::Cow;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::de::DeserializeOwned;

use super::core::HeaderVec;
use crate::error::ApiError;
use crate::router::{ParamVec, Route};

/// An inbound request as seen by the router.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub path: String,
    /// Raw query string without the leading `?`.
    pub query: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
    pub remote_addr: Option<SocketAddr>,
}

impl Request {
    /// Build a request from a method and a target such as `/users/1?full=true`.
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, query),
            None => (target, ""),
        };
        Self {
            method,
            path: path.to_string(),
            query: query.to_string(),
            headers: HeaderMap::new(),
            body: Vec::new(),
            remote_addr: None,
        }
    }

    pub fn get(target: &str) -> Self {
        Self::new(Method::GET, target)
    }

    pub fn post(target: &str) -> Self {
        Self::new(Method::POST, target)
    }

    /// Add a header. Invalid names or values are ignored.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Serialize `value` as the JSON body and set `content-type`.
    #[must_use]
    pub fn with_json<T: serde::Serialize>(self, value: &T) -> Self {
        let body = serde_json::to_vec(value).unwrap_or_default();
        self.with_header("content-type", "application/json")
            .with_body(body)
    }

    #[must_use]
    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }
}

impl From<http::Request<Vec<u8>>> for Request {
    fn from(req: http::Request<Vec<u8>>) -> Self {
        let (parts, body) = req.into_parts();
        Self {
            path: parts.uri.path().to_string(),
            query: parts.uri.query().unwrap_or_default().to_string(),
            method: parts.method,
            headers: parts.headers,
            body,
            remote_addr: parts.extensions.get::<SocketAddr>().copied(),
        }
    }
}

type Values = HashMap<Cow<'static, str>, Box<dyn Any + Send + Sync>>;

/// Mutable per-request state threaded through a middleware chain.
pub struct RequestContext {
    method: Method,
    path: String,
    query: String,
    headers: HeaderMap,
    body: Vec<u8>,
    remote_addr: Option<SocketAddr>,
    params: ParamVec,
    route: Option<Arc<Route>>,
    values: Values,
    response_headers: HeaderVec,
    deadline: Option<Instant>,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self {
            method: Method::GET,
            path: String::new(),
            query: String::new(),
            headers: HeaderMap::new(),
            body: Vec::new(),
            remote_addr: None,
            params: ParamVec::new(),
            route: None,
            values: HashMap::new(),
            response_headers: HeaderVec::new(),
            deadline: None,
        }
    }
}

impl RequestContext {
    /// A fresh context holding `request`. Used directly in tests; the router
    /// obtains contexts from its pool.
    #[must_use]
    pub fn new(request: Request) -> Self {
        let mut ctx = Self::default();
        ctx.load(request);
        ctx
    }

    pub(crate) fn load(&mut self, request: Request) {
        self.method = request.method;
        self.path = if request.path.is_empty() {
            "/".to_string()
        } else {
            request.path
        };
        self.query = request.query;
        self.headers = request.headers;
        self.body = request.body;
        self.remote_addr = request.remote_addr;
    }

    pub(crate) fn bind(&mut self, route: Arc<Route>, params: ParamVec) {
        self.route = Some(route);
        self.params = params;
    }

    pub(crate) fn take_response_headers(&mut self) -> HeaderVec {
        std::mem::take(&mut self.response_headers)
    }

    /// Clear all request state so the context can serve another request.
    ///
    /// Collections whose capacity grew beyond `max_capacity` are dropped and
    /// replaced with empty ones so a single large request does not pin memory
    /// in the pool.
    pub(crate) fn reset(&mut self, max_capacity: usize) {
        self.method = Method::GET;
        self.path.clear();
        self.query.clear();
        self.headers.clear();
        self.body.clear();
        self.remote_addr = None;
        self.route = None;
        self.deadline = None;

        if self.params.spilled() && self.params.capacity() > max_capacity {
            self.params = ParamVec::new();
        } else {
            self.params.clear();
        }
        if self.values.capacity() > max_capacity {
            self.values = HashMap::new();
        } else {
            self.values.clear();
        }
        if self.response_headers.capacity() > max_capacity {
            self.response_headers = HeaderVec::new();
        } else {
            self.response_headers.clear();
        }
        if self.body.capacity() > max_capacity.saturating_mul(1024) {
            self.body = Vec::new();
        }
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// The matched route, or `None` while the not-found chain runs.
    #[must_use]
    pub fn route(&self) -> Option<&Arc<Route>> {
        self.route.as_ref()
    }

    // ---- path parameters ------------------------------------------------

    /// A path parameter by name. If a pattern binds the same name twice the
    /// last occurrence wins.
    #[inline]
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .rfind(|(k, _)| &**k == name)
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn params(&self) -> &ParamVec {
        &self.params
    }

    // ---- query ----------------------------------------------------------

    /// The raw query string, without `?`.
    #[must_use]
    pub fn query_string(&self) -> &str {
        &self.query
    }

    /// A percent-decoded query parameter. Repeated keys resolve to the last
    /// occurrence.
    #[must_use]
    pub fn query(&self, name: &str) -> Option<Cow<'_, str>> {
        query_pairs(&self.query)
            .filter(|(k, _)| *k == name)
            .last()
            .map(|(_, v)| v)
    }

    /// All decoded query pairs in order.
    #[must_use]
    pub fn query_params(&self) -> Vec<(Cow<'_, str>, Cow<'_, str>)> {
        query_pairs(&self.query).collect()
    }

    // ---- headers & body -------------------------------------------------

    /// A request header as a string, if present and valid UTF-8.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Decode the body as JSON, failing with 400.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_slice(&self.body)
            .map_err(|e| ApiError::bad_request(format!("invalid JSON body: {e}")))
    }

    // ---- key/value store ------------------------------------------------

    /// Store a value for handlers further down the chain.
    pub fn set<T: Any + Send + Sync>(&mut self, key: impl Into<Cow<'static, str>>, value: T) {
        self.values.insert(key.into(), Box::new(value));
    }

    /// Fetch a stored value if it exists and has type `T`.
    #[must_use]
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<&T> {
        self.values.get(key).and_then(|v| v.downcast_ref::<T>())
    }

    /// Convenience for string values stored as `String`.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get::<String>(key).map(String::as_str)
    }

    pub fn remove(&mut self, key: &str) -> Option<Box<dyn Any + Send + Sync>> {
        self.values.remove(key)
    }

    // ---- response headers -----------------------------------------------

    /// Set a header on the eventual response, replacing any previous value.
    ///
    /// Headers set here are applied after the chain returns, so they also
    /// reach error responses.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.response_headers
            .retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.response_headers.push((Arc::from(name), value.into()));
    }

    #[must_use]
    pub fn response_headers(&self) -> &HeaderVec {
        &self.response_headers
    }

    // ---- deadline -------------------------------------------------------

    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Set a deadline. An earlier existing deadline is kept.
    pub fn set_deadline(&mut self, deadline: Instant) {
        self.deadline = Some(match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        });
    }

    /// True once the deadline, if any, has passed. Long-running handlers can
    /// poll this to give up early.
    #[must_use]
    pub fn deadline_exceeded(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

fn query_pairs(raw: &str) -> impl Iterator<Item = (Cow<'_, str>, Cow<'_, str>)> {
    raw.split('&').filter(|s| !s.is_empty()).map(|pair| {
        let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
        (decode_component(k), decode_component(v))
    })
}

/// Percent-decode a query component, treating `+` as a space. Invalid escapes
/// are passed through untouched.
fn decode_component(raw: &str) -> Cow<'_, str> {
    if raw.contains('+') {
        let spaced = raw.replace('+', " ");
        match urlencoding::decode(&spaced) {
            Ok(decoded) => Cow::Owned(decoded.into_owned()),
            Err(_) => Cow::Owned(spaced),
        }
    } else {
        urlencoding::decode(raw).unwrap_or(Cow::Borrowed(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_new_splits_query() {
        let req = Request::get("/search?q=rust&page=2");
        assert_eq!(req.path, "/search");
        assert_eq!(req.query, "q=rust&page=2");
    }

    #[test]
    fn test_query_decoding() {
        let ctx = RequestContext::new(Request::get("/s?q=hello+world&tag=a%2Fb&tag=c&flag"));
        assert_eq!(ctx.query("q").as_deref(), Some("hello world"));
        assert_eq!(ctx.query("tag").as_deref(), Some("c"));
        assert_eq!(ctx.query("flag").as_deref(), Some(""));
        assert!(ctx.query("missing").is_none());
        assert_eq!(ctx.query_params().len(), 4);
    }

    #[test]
    fn test_empty_path_becomes_root() {
        let ctx = RequestContext::new(Request::new(Method::GET, ""));
        assert_eq!(ctx.path(), "/");
    }

    #[test]
    fn test_value_store_is_typed() {
        let mut ctx = RequestContext::default();
        ctx.set("request_id", "abc".to_string());
        ctx.set("count", 3_u32);
        assert_eq!(ctx.get_str("request_id"), Some("abc"));
        assert_eq!(ctx.get::<u32>("count"), Some(&3));
        assert!(ctx.get::<u64>("count").is_none());
        assert!(ctx.remove("count").is_some());
        assert!(ctx.get::<u32>("count").is_none());
    }

    #[test]
    fn test_param_last_occurrence_wins() {
        let mut ctx = RequestContext::default();
        ctx.params.push((Arc::from("id"), "org".to_string()));
        ctx.params.push((Arc::from("id"), "user".to_string()));
        assert_eq!(ctx.param("id"), Some("user"));
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut ctx = RequestContext::new(
            Request::post("/a?b=c")
                .with_header("x-test", "1")
                .with_body("payload"),
        );
        ctx.set("k", 1_i32);
        ctx.set_header("x-out", "1");
        ctx.set_deadline(Instant::now());
        ctx.params.push((Arc::from("p"), "v".to_string()));

        ctx.reset(64);
        assert_eq!(ctx.method(), Method::GET);
        assert!(ctx.path().is_empty());
        assert!(ctx.query_string().is_empty());
        assert!(ctx.headers().is_empty());
        assert!(ctx.body().is_empty());
        assert!(ctx.params().is_empty());
        assert!(ctx.get::<i32>("k").is_none());
        assert!(ctx.response_headers().is_empty());
        assert!(ctx.deadline().is_none());
    }

    #[test]
    fn test_reset_reallocates_oversized_maps() {
        let mut ctx = RequestContext::default();
        for i in 0..100 {
            ctx.set(format!("k{i}"), i);
        }
        assert!(ctx.values.capacity() >= 100);
        ctx.reset(16);
        assert_eq!(ctx.values.capacity(), 0);

        ctx.set("small", 1_i32);
        let cap = ctx.values.capacity();
        ctx.reset(16);
        assert_eq!(ctx.values.capacity(), cap);
    }

    #[test]
    fn test_deadline_keeps_earliest() {
        let mut ctx = RequestContext::default();
        let now = Instant::now();
        ctx.set_deadline(now + std::time::Duration::from_secs(10));
        ctx.set_deadline(now + std::time::Duration::from_secs(20));
        assert_eq!(ctx.deadline(), Some(now + std::time::Duration::from_secs(10)));
        ctx.set_deadline(now);
        assert!(ctx.deadline_exceeded());
    }

    #[test]
    fn test_bind_without_params_stays_inline() {
        let handler = crate::dispatcher::handler_fn(|_: &mut RequestContext| {
            Ok(crate::dispatcher::HandlerResponse::no_content())
        });
        let route = Arc::new(Route::new(
            crate::router::RouteId(1),
            Method::GET,
            Arc::from("/health"),
            Vec::new(),
            Arc::clone(&handler),
            handler,
            None,
        ));
        let mut ctx = RequestContext::new(Request::get("/health"));
        ctx.bind(route, ParamVec::new());
        assert!(ctx.params().is_empty());
        assert!(!ctx.params().spilled());
        assert_eq!(ctx.params().capacity(), crate::router::MAX_INLINE_PARAMS);
        assert_eq!(ctx.route().map(|r| r.pattern()), Some("/health"));
    }

    #[test]
    fn test_json_body() {
        #[derive(Debug, serde::Deserialize)]
        struct Body {
            name: String,
        }
        let ctx = RequestContext::new(Request::post("/").with_json(&serde_json::json!({"name": "n"})));
        let body: Body = ctx.json().unwrap();
        assert_eq!(body.name, "n");
        let bad = RequestContext::new(Request::post("/").with_body("{"));
        assert_eq!(bad.json::<Body>().unwrap_err().status(), http::StatusCode::BAD_REQUEST);
    }
}

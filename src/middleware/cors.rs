use std::sync::Arc;

use http::{Method, StatusCode};

use super::Middleware;
use crate::dispatcher::{handler_fn, BoxedHandler, HandlerResponse, RequestContext};

/// Invalid CORS configuration, returned by [`CorsMiddlewareBuilder::build`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CorsConfigError {
    #[error("cannot use wildcard origin (*) with credentials; list exact origins")]
    WildcardWithCredentials,
    #[error("cannot allow credentials with an empty origin list")]
    EmptyOriginsWithCredentials,
    #[error("invalid origin {origin:?}; expected scheme://host[:port]")]
    InvalidOriginFormat { origin: String },
}

#[derive(Debug, Clone)]
struct CorsPolicy {
    allowed_origins: Vec<String>,
    allowed_methods: String,
    allowed_headers: String,
    expose_headers: Option<String>,
    allow_credentials: bool,
    max_age: Option<u32>,
}

impl CorsPolicy {
    /// The `Access-Control-Allow-Origin` value for a request origin, if
    /// that origin is allowed.
    fn allow_origin(&self, origin: Option<&str>) -> Option<String> {
        if self.allowed_origins.iter().any(|o| o == "*") {
            return Some("*".to_string());
        }
        let origin = origin?;
        self.allowed_origins
            .iter()
            .any(|o| o.eq_ignore_ascii_case(origin))
            .then(|| origin.to_string())
    }
}

/// Cross-origin resource sharing.
///
/// Adds CORS headers for allowed origins and answers preflight `OPTIONS`
/// requests (those carrying `Access-Control-Request-Method`) with 204 without
/// calling the rest of the chain.
#[derive(Debug, Clone)]
pub struct CorsMiddleware {
    policy: Arc<CorsPolicy>,
}

impl Default for CorsMiddleware {
    /// Permissive policy: any origin, common methods, `Content-Type` and
    /// `Authorization` headers. Restrict origins in production.
    fn default() -> Self {
        let built = CorsMiddlewareBuilder::new().allowed_origins(&["*"]).build();
        built.unwrap_or_else(|_| Self::from_builder(CorsMiddlewareBuilder::new()))
    }
}

impl CorsMiddleware {
    #[must_use]
    pub fn builder() -> CorsMiddlewareBuilder {
        CorsMiddlewareBuilder::new()
    }

    fn from_builder(b: CorsMiddlewareBuilder) -> Self {
        let methods: Vec<&str> = b.allowed_methods.iter().map(Method::as_str).collect();
        Self {
            policy: Arc::new(CorsPolicy {
                allowed_origins: b.allowed_origins,
                allowed_methods: methods.join(", "),
                allowed_headers: b.allowed_headers.join(", "),
                expose_headers: (!b.expose_headers.is_empty()).then(|| b.expose_headers.join(", ")),
                allow_credentials: b.allow_credentials,
                max_age: b.max_age,
            }),
        }
    }
}

impl Middleware for CorsMiddleware {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        let policy = Arc::clone(&self.policy);
        handler_fn(move |ctx: &mut RequestContext| {
            let allowed = policy.allow_origin(ctx.header("origin"));
            let preflight = ctx.method() == Method::OPTIONS
                && ctx.header("access-control-request-method").is_some();

            if let Some(origin) = allowed {
                if origin != "*" {
                    ctx.set_header("Vary", "Origin");
                }
                ctx.set_header("Access-Control-Allow-Origin", origin);
                if policy.allow_credentials {
                    ctx.set_header("Access-Control-Allow-Credentials", "true");
                }
                if let Some(expose) = &policy.expose_headers {
                    ctx.set_header("Access-Control-Expose-Headers", expose.clone());
                }
                if preflight {
                    ctx.set_header("Access-Control-Allow-Methods", policy.allowed_methods.clone());
                    ctx.set_header("Access-Control-Allow-Headers", policy.allowed_headers.clone());
                    if let Some(max_age) = policy.max_age {
                        ctx.set_header("Access-Control-Max-Age", max_age.to_string());
                    }
                }
            }

            if preflight {
                return Ok(HandlerResponse::new(
                    StatusCode::NO_CONTENT,
                    Default::default(),
                    serde_json::Value::Null,
                ));
            }
            next.call(ctx)
        })
    }
}

/// Fluent configuration for [`CorsMiddleware`].
///
/// ```rust,ignore
/// let cors = CorsMiddleware::builder()
///     .allowed_origins(&["https://example.com"])
///     .allowed_methods(&[Method::GET, Method::POST])
///     .allow_credentials(true)
///     .expose_headers(&["X-Total-Count"])
///     .max_age(3600)
///     .build()?;
/// ```
#[derive(Debug, Clone)]
pub struct CorsMiddlewareBuilder {
    allowed_origins: Vec<String>,
    allowed_headers: Vec<String>,
    allowed_methods: Vec<Method>,
    allow_credentials: bool,
    expose_headers: Vec<String>,
    max_age: Option<u32>,
}

impl Default for CorsMiddlewareBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CorsMiddlewareBuilder {
    /// No origins, common methods and headers, no credentials, no caching.
    #[must_use]
    pub fn new() -> Self {
        Self {
            allowed_origins: Vec::new(),
            allowed_headers: vec!["Content-Type".into(), "Authorization".into()],
            allowed_methods: vec![
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ],
            allow_credentials: false,
            expose_headers: Vec::new(),
            max_age: None,
        }
    }

    #[must_use]
    pub fn allowed_origins(mut self, origins: &[&str]) -> Self {
        self.allowed_origins = origins.iter().map(|s| s.to_string()).collect();
        self
    }

    #[must_use]
    pub fn allowed_methods(mut self, methods: &[Method]) -> Self {
        self.allowed_methods = methods.to_vec();
        self
    }

    #[must_use]
    pub fn allowed_headers(mut self, headers: &[&str]) -> Self {
        self.allowed_headers = headers.iter().map(|s| s.to_string()).collect();
        self
    }

    #[must_use]
    pub fn allow_credentials(mut self, allow: bool) -> Self {
        self.allow_credentials = allow;
        self
    }

    #[must_use]
    pub fn expose_headers(mut self, headers: &[&str]) -> Self {
        self.expose_headers = headers.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Seconds browsers may cache a preflight response.
    #[must_use]
    pub fn max_age(mut self, seconds: u32) -> Self {
        self.max_age = Some(seconds);
        self
    }

    pub fn build(self) -> Result<CorsMiddleware, CorsConfigError> {
        if self.allow_credentials {
            if self.allowed_origins.is_empty() {
                return Err(CorsConfigError::EmptyOriginsWithCredentials);
            }
            if self.allowed_origins.iter().any(|o| o == "*") {
                return Err(CorsConfigError::WildcardWithCredentials);
            }
        }
        for origin in self.allowed_origins.iter().filter(|o| *o != "*") {
            let valid = origin
                .split_once("://")
                .is_some_and(|(scheme, host)| !scheme.is_empty() && !host.is_empty() && !host.contains('/'));
            if !valid {
                return Err(CorsConfigError::InvalidOriginFormat {
                    origin: origin.clone(),
                });
            }
        }
        Ok(CorsMiddleware::from_builder(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::Request;

    fn ok() -> BoxedHandler {
        handler_fn(|_: &mut RequestContext| Ok(HandlerResponse::ok(serde_json::json!("ok"))))
    }

    fn header<'a>(ctx: &'a RequestContext, name: &str) -> Option<&'a str> {
        ctx.response_headers()
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_preflight_short_circuits() {
        let chain = CorsMiddleware::default().wrap(handler_fn(|_: &mut RequestContext| {
            Err(crate::ApiError::internal("handler must not run"))
        }));
        let mut ctx = RequestContext::new(
            Request::new(Method::OPTIONS, "/x")
                .with_header("origin", "https://a.example")
                .with_header("access-control-request-method", "POST"),
        );
        let resp = chain.call(&mut ctx).unwrap();
        assert_eq!(resp.status, StatusCode::NO_CONTENT);
        assert_eq!(header(&ctx, "access-control-allow-origin"), Some("*"));
        assert!(header(&ctx, "access-control-allow-methods").unwrap().contains("POST"));
    }

    #[test]
    fn test_allowed_origin_is_echoed() {
        let cors = CorsMiddleware::builder()
            .allowed_origins(&["https://a.example"])
            .allow_credentials(true)
            .expose_headers(&["X-Total-Count"])
            .build()
            .unwrap();
        let chain = cors.wrap(ok());
        let mut ctx = RequestContext::new(Request::get("/").with_header("origin", "https://a.example"));
        chain.call(&mut ctx).unwrap();
        assert_eq!(header(&ctx, "access-control-allow-origin"), Some("https://a.example"));
        assert_eq!(header(&ctx, "access-control-allow-credentials"), Some("true"));
        assert_eq!(header(&ctx, "access-control-expose-headers"), Some("X-Total-Count"));
        assert_eq!(header(&ctx, "vary"), Some("Origin"));
    }

    #[test]
    fn test_disallowed_origin_gets_no_headers() {
        let cors = CorsMiddleware::builder()
            .allowed_origins(&["https://a.example"])
            .build()
            .unwrap();
        let chain = cors.wrap(ok());
        let mut ctx = RequestContext::new(Request::get("/").with_header("origin", "https://evil.example"));
        assert!(chain.call(&mut ctx).is_ok());
        assert!(header(&ctx, "access-control-allow-origin").is_none());
    }

    #[test]
    fn test_plain_options_reaches_handler() {
        let chain = CorsMiddleware::default().wrap(ok());
        let mut ctx = RequestContext::new(Request::new(Method::OPTIONS, "/"));
        assert_eq!(chain.call(&mut ctx).unwrap().status, StatusCode::OK);
    }

    #[test]
    fn test_builder_validation() {
        assert_eq!(
            CorsMiddleware::builder()
                .allowed_origins(&["*"])
                .allow_credentials(true)
                .build()
                .unwrap_err(),
            CorsConfigError::WildcardWithCredentials
        );
        assert_eq!(
            CorsMiddleware::builder().allow_credentials(true).build().unwrap_err(),
            CorsConfigError::EmptyOriginsWithCredentials
        );
        assert!(matches!(
            CorsMiddleware::builder().allowed_origins(&["example.com"]).build(),
            Err(CorsConfigError::InvalidOriginFormat { .. })
        ));
    }
}

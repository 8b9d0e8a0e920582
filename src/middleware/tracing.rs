use std::sync::Arc;
use std::time::Instant;

use tracing::{field, info, info_span, warn};

use super::{Middleware, REQUEST_ID_KEY};
use crate::dispatcher::{handler_fn, BoxedHandler, RequestContext};

#[derive(Debug, Clone, Default)]
struct Settings {
    skip_paths: Vec<String>,
    log_headers: Vec<String>,
    log_remote_addr: bool,
}

/// Request logging.
///
/// Runs the rest of the chain inside an `info_span!("request")` and emits one
/// event per request with method, path, matched pattern, status and latency.
/// 5xx outcomes are logged at `warn`. Place it after
/// [`RequestIdMiddleware`](super::RequestIdMiddleware) to include the request
/// id.
#[derive(Debug, Clone, Default)]
pub struct TracingMiddleware {
    settings: Arc<Settings>,
}

impl TracingMiddleware {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything logged, nothing skipped, no extra fields.
    #[must_use]
    pub fn development() -> Self {
        Self::new()
    }

    /// Skips health and metrics probes; records client address and user agent.
    #[must_use]
    pub fn production() -> Self {
        Self::new()
            .skip_path("/health")
            .skip_path("/metrics")
            .log_remote_addr(true)
            .log_header("user-agent")
    }

    /// Method, path, status and latency only; probes and favicon skipped.
    #[must_use]
    pub fn minimal() -> Self {
        Self::new()
            .skip_path("/health")
            .skip_path("/metrics")
            .skip_path("/favicon.ico")
    }

    /// Every request with address and common content headers.
    #[must_use]
    pub fn verbose() -> Self {
        ["content-type", "accept", "user-agent", "x-forwarded-for"]
            .into_iter()
            .fold(Self::new().log_remote_addr(true), |m, h| m.log_header(h))
    }

    /// Do not log requests to `path` (exact match), e.g. health checks.
    #[must_use]
    pub fn skip_path(mut self, path: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.settings).skip_paths.push(path.into());
        self
    }

    /// Include a request header in the span.
    #[must_use]
    pub fn log_header(mut self, name: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.settings).log_headers.push(name.into().to_lowercase());
        self
    }

    #[must_use]
    pub fn log_remote_addr(mut self, enabled: bool) -> Self {
        Arc::make_mut(&mut self.settings).log_remote_addr = enabled;
        self
    }
}

impl Middleware for TracingMiddleware {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        let settings = Arc::clone(&self.settings);
        handler_fn(move |ctx: &mut RequestContext| {
            if settings.skip_paths.iter().any(|p| p == ctx.path()) {
                return next.call(ctx);
            }

            let span = info_span!(
                "request",
                method = %ctx.method(),
                path = %ctx.path(),
                pattern = field::Empty,
                request_id = field::Empty,
                remote_addr = field::Empty,
                headers = field::Empty,
            );
            if let Some(route) = ctx.route() {
                span.record("pattern", route.pattern());
            }
            if let Some(id) = ctx.get_str(REQUEST_ID_KEY) {
                span.record("request_id", id);
            }
            if settings.log_remote_addr {
                if let Some(addr) = ctx.remote_addr() {
                    span.record("remote_addr", field::display(addr));
                }
            }
            if !settings.log_headers.is_empty() {
                let captured: Vec<String> = settings
                    .log_headers
                    .iter()
                    .filter_map(|name| ctx.header(name).map(|v| format!("{name}={v}")))
                    .collect();
                span.record("headers", field::display(captured.join(" ")));
            }

            let start = Instant::now();
            let outcome = span.in_scope(|| next.call(ctx));
            let duration_us = start.elapsed().as_micros() as u64;

            let _entered = span.enter();
            match &outcome {
                Ok(resp) if resp.status.is_server_error() => {
                    warn!(status = resp.status.as_u16(), duration_us, "request completed")
                }
                Ok(resp) => info!(status = resp.status.as_u16(), duration_us, "request completed"),
                Err(err) if err.status().is_server_error() => warn!(
                    status = err.status().as_u16(),
                    error = %err,
                    duration_us,
                    "request failed"
                ),
                Err(err) => info!(
                    status = err.status().as_u16(),
                    error = err.code(),
                    duration_us,
                    "request failed"
                ),
            }
            outcome
        })
    }
}

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use http::StatusCode;

use super::Middleware;
use crate::dispatcher::{handler_fn, BoxedHandler, RequestContext};

#[derive(Default)]
struct Counters {
    requests: AtomicU64,
    total_latency_ns: AtomicU64,
    client_errors: AtomicU64,
    server_errors: AtomicU64,
    auth_failures: AtomicU64,
    per_route: DashMap<String, AtomicU64>,
}

/// Request counters and latency, collected with relaxed atomics.
///
/// Cloning shares the same counters, so keep a clone to read them after
/// installing the middleware:
///
/// ```rust,ignore
/// let metrics = MetricsMiddleware::new();
/// router.use_middleware([Arc::new(metrics.clone()) as SharedMiddleware]);
/// // ...
/// println!("{} requests", metrics.request_count());
/// ```
#[derive(Clone, Default)]
pub struct MetricsMiddleware {
    counters: Arc<Counters>,
}

impl MetricsMiddleware {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn request_count(&self) -> u64 {
        self.counters.requests.load(Ordering::Relaxed)
    }

    /// Mean latency over every observed request; zero before the first.
    #[must_use]
    pub fn average_latency(&self) -> Duration {
        let count = self.request_count();
        if count == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(self.counters.total_latency_ns.load(Ordering::Relaxed) / count)
        }
    }

    /// Responses with a 4xx status.
    #[must_use]
    pub fn client_errors(&self) -> u64 {
        self.counters.client_errors.load(Ordering::Relaxed)
    }

    /// Responses with a 5xx status.
    #[must_use]
    pub fn server_errors(&self) -> u64 {
        self.counters.server_errors.load(Ordering::Relaxed)
    }

    /// 401 responses.
    #[must_use]
    pub fn auth_failures(&self) -> u64 {
        self.counters.auth_failures.load(Ordering::Relaxed)
    }

    /// Requests seen for a route, keyed as `"METHOD pattern"`. Unmatched
    /// requests are counted under `"METHOD <unmatched>"`.
    #[must_use]
    pub fn route_count(&self, key: &str) -> u64 {
        self.counters
            .per_route
            .get(key)
            .map_or(0, |c| c.load(Ordering::Relaxed))
    }

    fn observe(&self, route_key: String, status: StatusCode, latency: Duration) {
        let c = &self.counters;
        c.requests.fetch_add(1, Ordering::Relaxed);
        c.total_latency_ns
            .fetch_add(latency.as_nanos() as u64, Ordering::Relaxed);
        if status.is_client_error() {
            c.client_errors.fetch_add(1, Ordering::Relaxed);
        }
        if status.is_server_error() {
            c.server_errors.fetch_add(1, Ordering::Relaxed);
        }
        if status == StatusCode::UNAUTHORIZED {
            c.auth_failures.fetch_add(1, Ordering::Relaxed);
        }
        c.per_route
            .entry(route_key)
            .or_default()
            .fetch_add(1, Ordering::Relaxed);
    }
}

impl Middleware for MetricsMiddleware {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        let metrics = self.clone();
        handler_fn(move |ctx: &mut RequestContext| {
            let start = Instant::now();
            let outcome = next.call(ctx);
            let status = match &outcome {
                Ok(resp) => resp.status,
                Err(err) => err.status(),
            };
            let route_key = match ctx.route() {
                Some(route) => format!("{} {}", route.method(), route.pattern()),
                None => format!("{} <unmatched>", ctx.method()),
            };
            metrics.observe(route_key, status, start.elapsed());
            outcome
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::{HandlerResponse, Request};
    use crate::error::ApiError;

    #[test]
    fn test_counts_by_status_class() {
        let metrics = MetricsMiddleware::new();
        let chain = metrics.wrap(handler_fn(|ctx: &mut RequestContext| match ctx.path() {
            "/ok" => Ok(HandlerResponse::no_content()),
            "/auth" => Err(ApiError::unauthorized("no")),
            _ => Err(ApiError::internal("boom")),
        }));
        let ok: Vec<bool> = ["/ok", "/ok", "/auth", "/fail"]
            .iter()
            .map(|path| chain.call(&mut RequestContext::new(Request::get(path))).is_ok())
            .collect();
        assert_eq!(ok, [true, true, false, false]);
        assert_eq!(metrics.request_count(), 4);
        assert_eq!(metrics.client_errors(), 1);
        assert_eq!(metrics.auth_failures(), 1);
        assert_eq!(metrics.server_errors(), 1);
        assert_eq!(metrics.route_count("GET <unmatched>"), 4);
    }

    #[test]
    fn test_average_latency_zero_before_requests() {
        assert_eq!(MetricsMiddleware::new().average_latency(), Duration::ZERO);
    }
}

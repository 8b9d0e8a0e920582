use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::warn;

use super::Middleware;
use crate::dispatcher::{BoxedHandler, Handler, HandlerResult, RequestContext};
use crate::error::ApiError;

/// Bounds how long the rest of the chain may take.
///
/// Handlers run synchronously on the caller's thread and cannot be
/// preempted. This middleware therefore sets a deadline on the context, which
/// cooperative handlers can poll through
/// [`RequestContext::deadline_exceeded`], and replaces the outcome of a chain
/// that overran with 504.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutMiddleware {
    timeout: Duration,
}

impl TimeoutMiddleware {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Middleware for TimeoutMiddleware {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(Deadline {
            next,
            timeout: self.timeout,
        })
    }
}

struct Deadline {
    next: BoxedHandler,
    timeout: Duration,
}

impl Handler for Deadline {
    fn call(&self, ctx: &mut RequestContext) -> HandlerResult {
        let start = Instant::now();
        ctx.set_deadline(start + self.timeout);
        let outcome = self.next.call(ctx);
        let elapsed = start.elapsed();
        if elapsed > self.timeout {
            warn!(
                method = %ctx.method(),
                path = %ctx.path(),
                elapsed_ms = elapsed.as_millis() as u64,
                timeout_ms = self.timeout.as_millis() as u64,
                "request exceeded timeout"
            );
            return Err(ApiError::gateway_timeout());
        }
        outcome
    }
}

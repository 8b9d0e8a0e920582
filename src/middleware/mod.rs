//! Middleware and the chain compiler.
//!
//! A middleware wraps the next handler and returns a new one. Chains are
//! compiled once at registration time with [`compile_chain`]: the first
//! middleware in the list becomes the outermost layer, so for `[a, b]` a
//! request runs a's pre-processing, then b's, then the handler, then b's
//! post-processing, then a's.
//!
//! The library below covers the usual cross-cutting concerns:
//!
//! - [`RecoveryMiddleware`]: turn handler panics into 500 responses
//! - [`RequestIdMiddleware`]: propagate or mint an `X-Request-ID`
//! - [`TracingMiddleware`]: one span and one log event per request
//! - [`CorsMiddleware`]: CORS headers and preflight handling
//! - [`AuthMiddleware`]: bearer-token authentication
//! - [`RateLimitMiddleware`]: per-client token buckets
//! - [`TimeoutMiddleware`]: request deadlines
//! - [`MetricsMiddleware`]: request counters and latency

mod auth;
mod core;
mod cors;
mod metrics;
mod rate_limit;
mod recovery;
mod request_id;
mod timeout;
mod tracing;

pub use auth::{AuthMiddleware, USER_KEY};
pub use core::{compile_chain, middleware_fn, Middleware, SharedMiddleware};
pub use cors::{CorsConfigError, CorsMiddleware, CorsMiddlewareBuilder};
pub use metrics::MetricsMiddleware;
pub use rate_limit::{Decision, KeySource, RateLimitMiddleware, RateLimiter};
pub use recovery::RecoveryMiddleware;
pub(crate) use recovery::panic_message;
pub use request_id::{RequestId, RequestIdMiddleware, REQUEST_ID_HEADER, REQUEST_ID_KEY};
pub use timeout::TimeoutMiddleware;
pub use tracing::TracingMiddleware;

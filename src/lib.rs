//! # nimbus
//!
//! **nimbus** is an embeddable HTTP request router built around a
//! copy-on-write radix tree. Reads never lock; routes can be added while
//! requests are being dispatched, and every request sees one consistent
//! routing table from start to finish.
//!
//! ## Overview
//!
//! The crate maps `(method, path)` to a handler, binds `:param` and
//! `*wildcard` segments, and runs the handler inside a middleware chain that
//! was compiled when the route was registered. It does not own a socket:
//! transports build a [`Request`], call [`Router::dispatch`] and write the
//! returned [`HandlerResponse`] (convertible into `http::Response<Vec<u8>>`).
//!
//! ## Architecture
//!
//! - **[`router`]** - routing tables, the radix tree, registration, groups and
//!   the dispatch entry point
//! - **[`dispatcher`]** - the handler contract, request context, responses and
//!   the context pool
//! - **[`middleware`]** - the middleware contract, chain compiler and a library
//!   of common middleware
//! - **[`typed`]** - handlers over deserialized, validated inputs
//! - **[`error`]** - registration errors and the request error type
//! - **[`runtime_config`]** - router tuning from `NIMBUS_*` environment
//!   variables
//! - **[`telemetry`]** - `tracing` subscriber setup
//!
//! ### Request flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant T as Transport
//!     participant R as Router
//!     participant S as RoutingTable (snapshot)
//!     participant C as Compiled chain
//!     participant H as Handler
//!
//!     T->>R: dispatch(Request)
//!     R->>S: load current table
//!     S->>S: exact index, then radix tree
//!     alt route found
//!         S-->>R: Route + params
//!         R->>C: call(ctx)
//!         C->>H: middleware pre-processing, then handler
//!         H-->>C: Result<HandlerResponse, ApiError>
//!         C-->>R: post-processing applied
//!     else no route
//!         R->>C: not-found chain (global middleware + 404)
//!     end
//!     R-->>T: HandlerResponse
//! ```
//!
//! ### Concurrency model
//!
//! The current [`RoutingTable`] sits behind an `ArcSwap`. Dispatch loads it
//! once per request. Registration takes a writer lock, builds a new table
//! that copies only the tree path it changes, and publishes it in a single
//! swap. Tables are never edited after publication, so a request that
//! started on an older table finishes on it.
//!
//! ## Quick start
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use nimbus::prelude::*;
//! use serde_json::json;
//!
//! # fn main() -> Result<(), nimbus::RouteError> {
//! let router = Router::new();
//! router.use_middleware([
//!     Arc::new(RecoveryMiddleware::new()) as SharedMiddleware,
//!     Arc::new(RequestIdMiddleware::new()) as SharedMiddleware,
//! ]);
//!
//! router.get("/posts/:postId/comments/:commentId", |ctx: &mut RequestContext| {
//!     Ok(HandlerResponse::ok(json!({
//!         "post": ctx.param("postId"),
//!         "comment": ctx.param("commentId"),
//!     })))
//! })?;
//!
//! let resp = router.dispatch(Request::get("/posts/42/comments/7"));
//! assert_eq!(resp.status, 200);
//! assert_eq!(resp.body["comment"], "7");
//! assert!(resp.get_header("X-Request-ID").is_some());
//!
//! let missing = router.dispatch(Request::get("/nope"));
//! assert_eq!(missing.status, 404);
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration
//!
//! [`RouterConfig::from_env`] reads:
//!
//! | Variable | Default | Effect |
//! |----------|---------|--------|
//! | `NIMBUS_STRICT_PARAMS` | `false` | reject conflicting parameter names instead of renaming |
//! | `NIMBUS_POOL_CAPACITY` | `64` | request contexts kept per thread (0 disables pooling) |
//! | `NIMBUS_MAX_POOLED_MAP_CAPACITY` | `32` | larger context maps are dropped on release |
//! | `NIMBUS_SLOW_MATCH_US` | `1000` | log route lookups slower than this |
//!
//! Logging is configured separately through [`telemetry::LogConfig`].

pub mod dispatcher;
pub mod error;
pub mod middleware;
pub mod router;
pub mod runtime_config;
pub mod telemetry;
pub mod typed;

pub use dispatcher::{
    handler_fn, BoxedHandler, Handler, HandlerResponse, HandlerResult, Request, RequestContext,
};
pub use error::{ApiError, ErrorResponse, RouteError, SuccessResponse};
pub use middleware::{compile_chain, middleware_fn, Middleware, SharedMiddleware};
pub use router::{
    Group, ParamPolicy, Route, RouteDef, RouteDoc, RouteId, RouteInfo, RouteMatch,
    RouteRegistrar, Router, RoutingTable,
};
pub use runtime_config::RouterConfig;
pub use typed::{TypedHandler, TypedRequest, Validator};

/// Everything a typical application needs in one import.
pub mod prelude {
    pub use crate::dispatcher::{
        handler_fn, BoxedHandler, Handler, HandlerResponse, HandlerResult, Request,
        RequestContext,
    };
    pub use crate::error::{ApiError, RouteError, SuccessResponse};
    pub use crate::middleware::{
        middleware_fn, AuthMiddleware, CorsMiddleware, MetricsMiddleware, Middleware,
        RateLimitMiddleware, RecoveryMiddleware, RequestIdMiddleware, SharedMiddleware,
        TimeoutMiddleware, TracingMiddleware,
    };
    pub use crate::router::{Group, RouteDef, RouteRegistrar, Router};
    pub use crate::runtime_config::RouterConfig;
    pub use crate::typed::{TypedHandler, TypedRequest, Validator};
    pub use http::{Method, StatusCode};
}

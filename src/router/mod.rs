//! # Router Module
//!
//! Path matching and route resolution.
//!
//! ## Architecture
//!
//! Routing state lives in an immutable [`RoutingTable`]. Each table holds,
//! per HTTP method:
//!
//! 1. an **exact-match index** of fully literal paths, checked first with a
//!    single hash lookup
//! 2. a **radix tree** for patterns with `:param` and `*wildcard` segments
//!
//! plus a registry of every [`Route`] with the middleware chain compiled for
//! it when it was registered.
//!
//! The [`Router`] publishes tables through an `ArcSwap`. Dispatch loads the
//! current table once and never blocks; registration builds a new table that
//! shares all untouched structure with the old one and swaps it in.
//!
//! ## Example
//!
//! ```rust,ignore
//! use nimbus::{HandlerResponse, Request, RequestContext, RouteRegistrar, Router};
//!
//! let router = Router::new();
//! router.get("/posts/:postId/comments/:commentId", |ctx: &mut RequestContext| {
//!     let post = ctx.param("postId").unwrap_or_default().to_string();
//!     Ok(HandlerResponse::ok(serde_json::json!({ "post": post })))
//! })?;
//!
//! let resp = router.dispatch(Request::get("/posts/42/comments/7"));
//! assert_eq!(resp.status, 200);
//! ```
//!
//! ## Matching rules
//!
//! - static text beats `:param`, which beats `*wildcard`, at every position
//! - `:param` binds one non-empty segment
//! - `*wildcard` must end the pattern and binds the non-empty rest of the path
//! - a dead end falls back to the next alternative at the same position

mod core;
mod group;
mod pattern;
mod radix;
mod registrar;
mod route;
mod table;
#[cfg(test)]
mod performance_tests;

pub use core::Router;
pub use group::Group;
pub use radix::{ParamPolicy, ParamVec, MAX_INLINE_PARAMS};
pub use registrar::{RouteDef, RouteRegistrar};
pub use route::{Route, RouteDoc, RouteId, RouteInfo};
pub use table::{RouteMatch, RoutingTable};

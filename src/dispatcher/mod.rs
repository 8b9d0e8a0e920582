//! # Dispatcher Module
//!
//! Types that sit between the router and application code: the [`Handler`]
//! contract, the [`Request`] a host feeds in, the [`RequestContext`] a handler
//! works against, and the [`HandlerResponse`] it returns.
//!
//! ## Handler contract
//!
//! A handler receives `&mut RequestContext` and returns
//! `Result<HandlerResponse, ApiError>`. Successful responses carry their own
//! status; errors carry theirs too, so middleware can inspect either outcome
//! and the router can render an error that reaches the top of a chain.
//!
//! ```rust,ignore
//! use nimbus::{HandlerResponse, RequestContext};
//! use serde_json::json;
//!
//! let show_user = |ctx: &mut RequestContext| {
//!     let id = ctx.param("id").unwrap_or_default();
//!     Ok(HandlerResponse::ok(json!({ "id": id })))
//! };
//! ```
//!
//! ## Context reuse
//!
//! [`ContextPool`] keeps a bounded per-thread free list of contexts. A
//! released context is reset completely before it can be handed out again.
//!
//! [`ApiError`]: crate::ApiError

mod context;
mod core;
mod pool;

pub use context::{Request, RequestContext};
pub use core::{
    handler_fn, BoxedHandler, Handler, HandlerResponse, HandlerResult, HeaderVec,
    MAX_INLINE_HEADERS,
};
pub use pool::ContextPool;

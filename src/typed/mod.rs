//! # Typed handlers
//!
//! Route handlers that receive deserialized, validated inputs instead of a raw
//! [`RequestContext`](crate::dispatcher::RequestContext).
//!
//! A [`TypedHandler`] wraps a function of
//! `(&mut RequestContext, TypedRequest<P, B, Q>)` and is registered like any
//! other handler. Each of the three input slots is opt-in:
//!
//! - `with_params` deserializes path parameters into `P`
//! - `with_body` deserializes the JSON body into `B`
//! - `with_query` deserializes the query string into `Q`
//!
//! Path and query values are text; numeric, boolean and unit-enum fields are
//! parsed from it. Every slot is checked by a [`Validator`] built once when
//! the handler is constructed, so per-request work is just the field checks.
//! Any extraction or validation failure ends the request with 400 and a list
//! of field errors under `details`.
//!
//! ```rust,ignore
//! #[derive(Deserialize)]
//! struct CreateUser { name: String, email: String }
//!
//! let create = TypedHandler::new(|_ctx: &mut RequestContext, req: TypedRequest<(), CreateUser, ()>| {
//!     let user = req.body.ok_or_else(|| ApiError::bad_request("missing body"))?;
//!     Ok((StatusCode::CREATED, json!({ "name": user.name })))
//! })
//! .with_body(
//!     Validator::new()
//!         .required("name", |u: &CreateUser| u.name.as_str())
//!         .email("email", |u: &CreateUser| u.email.as_str()),
//! );
//! router.post("/users", create)?;
//! ```

mod core;
mod extract;

pub use core::{FieldError, TypedHandler, TypedRequest, ValidationErrors, Validator};

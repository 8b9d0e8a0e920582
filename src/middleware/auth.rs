use std::any::Any;
use std::sync::Arc;

use super::Middleware;
use crate::dispatcher::{handler_fn, BoxedHandler, RequestContext};
use crate::error::ApiError;

/// Context key under which the authenticated principal is stored.
pub const USER_KEY: &str = "user";

type Validate<T> = dyn Fn(&str) -> Result<T, String> + Send + Sync;

/// Bearer-token authentication.
///
/// Reads `Authorization: Bearer <token>`, hands the token to the validator
/// and stores the principal it returns under [`USER_KEY`]. A missing,
/// malformed or rejected token ends the request with 401.
///
/// ```rust,ignore
/// let auth = AuthMiddleware::new(|token| match token {
///     "secret" => Ok(User { name: "admin".into() }),
///     _ => Err("unknown token".into()),
/// });
/// router.group("/admin", [Arc::new(auth) as SharedMiddleware]);
/// ```
pub struct AuthMiddleware<T> {
    validate: Arc<Validate<T>>,
}

impl<T> Clone for AuthMiddleware<T> {
    fn clone(&self) -> Self {
        Self {
            validate: Arc::clone(&self.validate),
        }
    }
}

impl<T: Any + Send + Sync> AuthMiddleware<T> {
    pub fn new<F>(validate: F) -> Self
    where
        F: Fn(&str) -> Result<T, String> + Send + Sync + 'static,
    {
        Self {
            validate: Arc::new(validate),
        }
    }
}

impl AuthMiddleware<String> {
    /// Accept exactly one static token; the principal is the token itself.
    #[must_use]
    pub fn static_token(expected: impl Into<String>) -> Self {
        let expected = expected.into();
        Self::new(move |token| {
            if token == expected {
                Ok(token.to_string())
            } else {
                Err("invalid token".to_string())
            }
        })
    }
}

fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

impl<T: Any + Send + Sync> Middleware for AuthMiddleware<T> {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        let validate = Arc::clone(&self.validate);
        handler_fn(move |ctx: &mut RequestContext| {
            let Some(header) = ctx.header("authorization") else {
                return Err(ApiError::unauthorized("Missing authorization header"));
            };
            let Some(token) = bearer_token(header) else {
                return Err(ApiError::unauthorized("Invalid authorization header format"));
            };
            let principal = validate(token).map_err(|reason| {
                tracing::debug!(path = %ctx.path(), %reason, "token rejected");
                ApiError::unauthorized("Invalid token")
            })?;
            ctx.set(USER_KEY, principal);
            next.call(ctx)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::{HandlerResponse, Request};
    use http::StatusCode;

    #[derive(Debug, PartialEq)]
    struct User {
        name: String,
    }

    fn whoami() -> BoxedHandler {
        handler_fn(|ctx: &mut RequestContext| {
            let name = ctx.get::<User>(USER_KEY).map(|u| u.name.clone());
            Ok(HandlerResponse::ok(serde_json::json!({ "name": name })))
        })
    }

    fn auth() -> AuthMiddleware<User> {
        AuthMiddleware::new(|token| match token {
            "good" => Ok(User { name: "alice".into() }),
            _ => Err("unknown".into()),
        })
    }

    fn call(header: Option<&str>) -> Result<HandlerResponse, ApiError> {
        let mut req = Request::get("/me");
        if let Some(h) = header {
            req = req.with_header("authorization", h);
        }
        let chain = auth().wrap(whoami());
        chain.call(&mut RequestContext::new(req))
    }

    #[test]
    fn test_valid_token_stores_principal() {
        let resp = call(Some("Bearer good")).unwrap();
        assert_eq!(resp.body["name"], "alice");
    }

    #[test]
    fn test_scheme_is_case_insensitive() {
        assert!(call(Some("bearer good")).is_ok());
    }

    #[test]
    fn test_rejections_are_401() {
        for header in [None, Some("Basic abc"), Some("Bearer "), Some("Bearer bad")] {
            let err = call(header).unwrap_err();
            assert_eq!(err.status(), StatusCode::UNAUTHORIZED, "header {header:?}");
        }
    }

    #[test]
    fn test_static_token() {
        let chain = AuthMiddleware::static_token("s3cret").wrap(handler_fn(|ctx: &mut RequestContext| {
            Ok(HandlerResponse::ok(serde_json::json!(ctx.get_str(USER_KEY))))
        }));
        let mut ctx = RequestContext::new(Request::get("/").with_header("authorization", "Bearer s3cret"));
        assert_eq!(chain.call(&mut ctx).unwrap().body, "s3cret");
    }
}

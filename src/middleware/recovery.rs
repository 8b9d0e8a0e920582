use std::any::Any;
use std::backtrace::Backtrace;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::error;

use super::Middleware;
use crate::dispatcher::{BoxedHandler, Handler, HandlerResult, RequestContext};
use crate::error::ApiError;

/// Turns a panic anywhere below it in the chain into a 500 response.
///
/// Register it first (outermost) so it also covers other middleware. The
/// generic variant hides the panic payload from clients; [`detailed`] echoes
/// it, which is only appropriate in development.
///
/// [`detailed`]: RecoveryMiddleware::detailed
#[derive(Debug, Clone, Copy, Default)]
pub struct RecoveryMiddleware {
    detailed: bool,
}

impl RecoveryMiddleware {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Include the panic message in the response body.
    #[must_use]
    pub fn detailed() -> Self {
        Self { detailed: true }
    }
}

impl Middleware for RecoveryMiddleware {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(Recover {
            next,
            detailed: self.detailed,
        })
    }
}

struct Recover {
    next: BoxedHandler,
    detailed: bool,
}

impl Handler for Recover {
    fn call(&self, ctx: &mut RequestContext) -> HandlerResult {
        let next = &self.next;
        match catch_unwind(AssertUnwindSafe(|| next.call(ctx))) {
            Ok(outcome) => outcome,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(
                    method = %ctx.method(),
                    path = %ctx.path(),
                    request_id = ctx.get_str(super::REQUEST_ID_KEY).unwrap_or("-"),
                    panic = %message,
                    backtrace = %Backtrace::force_capture(),
                    "handler panicked"
                );
                let body = if self.detailed {
                    format!("Panic recovered: {message}")
                } else {
                    "An unexpected error occurred".to_string()
                };
                Err(ApiError::internal(body))
            }
        }
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::{handler_fn, Request};
    use http::StatusCode;

    fn panicking() -> BoxedHandler {
        handler_fn(|_: &mut RequestContext| -> HandlerResult { panic!("boom") })
    }

    #[test]
    fn test_recovery_generic_hides_message() {
        let chain = RecoveryMiddleware::new().wrap(panicking());
        let mut ctx = RequestContext::new(Request::get("/"));
        let err = chain.call(&mut ctx).unwrap_err();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.message().contains("boom"));
    }

    #[test]
    fn test_recovery_detailed_includes_message() {
        let chain = RecoveryMiddleware::detailed().wrap(panicking());
        let mut ctx = RequestContext::new(Request::get("/"));
        let err = chain.call(&mut ctx).unwrap_err();
        assert_eq!(err.message(), "Panic recovered: boom");
    }

    #[test]
    fn test_recovery_passes_through_errors() {
        let inner = handler_fn(|_: &mut RequestContext| Err(ApiError::bad_request("nope")));
        let chain = RecoveryMiddleware::new().wrap(inner);
        let mut ctx = RequestContext::new(Request::get("/"));
        assert_eq!(chain.call(&mut ctx).unwrap_err().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_panic_message_variants() {
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(owned.as_ref()), "owned");
        let other: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(other.as_ref()), "unknown panic");
    }
}

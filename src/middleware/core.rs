use std::sync::Arc;

use crate::dispatcher::BoxedHandler;

/// Cross-cutting behaviour wrapped around a handler.
///
/// `wrap` is called once per route when the route is registered, never per
/// request. The returned handler decides whether and when to call `next`; it
/// must call it at most once.
pub trait Middleware: Send + Sync + 'static {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler;
}

impl<F> Middleware for F
where
    F: Fn(BoxedHandler) -> BoxedHandler + Send + Sync + 'static,
{
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        self(next)
    }
}

/// Shared middleware, as stored in global and group lists.
pub type SharedMiddleware = Arc<dyn Middleware>;

/// Share a closure as middleware.
pub fn middleware_fn<F>(f: F) -> SharedMiddleware
where
    F: Fn(BoxedHandler) -> BoxedHandler + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Compose `middleware` around `terminal`.
///
/// The first entry is outermost: `[a, b]` produces `a(b(terminal))`, so `a`
/// sees the request first and the response last. An empty list returns
/// `terminal` unchanged.
#[must_use]
pub fn compile_chain(terminal: BoxedHandler, middleware: &[SharedMiddleware]) -> BoxedHandler {
    middleware
        .iter()
        .rev()
        .fold(terminal, |next, mw| mw.wrap(next))
}

use std::sync::Arc;

use http::Method;

use super::route::{Route, RouteDoc};
use crate::dispatcher::{BoxedHandler, Handler};
use crate::error::RouteError;
use crate::middleware::SharedMiddleware;

/// Everything needed to register one route.
pub struct RouteDef {
    pub method: Method,
    pub pattern: String,
    pub handler: BoxedHandler,
    /// Route-specific middleware, innermost relative to global and group
    /// middleware.
    pub middleware: Vec<SharedMiddleware>,
    pub doc: Option<RouteDoc>,
}

impl RouteDef {
    pub fn new<H: Handler>(method: Method, pattern: impl Into<String>, handler: H) -> Self {
        Self {
            method,
            pattern: pattern.into(),
            handler: Arc::new(handler),
            middleware: Vec::new(),
            doc: None,
        }
    }

    #[must_use]
    pub fn middleware(mut self, middleware: impl IntoIterator<Item = SharedMiddleware>) -> Self {
        self.middleware.extend(middleware);
        self
    }

    #[must_use]
    pub fn doc(mut self, doc: RouteDoc) -> Self {
        self.doc = Some(doc);
        self
    }
}

/// Route registration shared by [`Router`](super::Router) and
/// [`Group`](super::Group).
///
/// Only [`register`](Self::register) is required; the verb helpers build a
/// [`RouteDef`] and forward to it.
pub trait RouteRegistrar {
    /// Register a route and publish a new routing table.
    fn register(&self, def: RouteDef) -> Result<Arc<Route>, RouteError>;

    fn add_route<H: Handler>(
        &self,
        method: Method,
        pattern: &str,
        handler: H,
        middleware: &[SharedMiddleware],
    ) -> Result<Arc<Route>, RouteError> {
        self.register(RouteDef::new(method, pattern, handler).middleware(middleware.iter().cloned()))
    }

    fn get<H: Handler>(&self, pattern: &str, handler: H) -> Result<Arc<Route>, RouteError> {
        self.add_route(Method::GET, pattern, handler, &[])
    }

    fn post<H: Handler>(&self, pattern: &str, handler: H) -> Result<Arc<Route>, RouteError> {
        self.add_route(Method::POST, pattern, handler, &[])
    }

    fn put<H: Handler>(&self, pattern: &str, handler: H) -> Result<Arc<Route>, RouteError> {
        self.add_route(Method::PUT, pattern, handler, &[])
    }

    fn patch<H: Handler>(&self, pattern: &str, handler: H) -> Result<Arc<Route>, RouteError> {
        self.add_route(Method::PATCH, pattern, handler, &[])
    }

    fn delete<H: Handler>(&self, pattern: &str, handler: H) -> Result<Arc<Route>, RouteError> {
        self.add_route(Method::DELETE, pattern, handler, &[])
    }

    fn head<H: Handler>(&self, pattern: &str, handler: H) -> Result<Arc<Route>, RouteError> {
        self.add_route(Method::HEAD, pattern, handler, &[])
    }

    fn options<H: Handler>(&self, pattern: &str, handler: H) -> Result<Arc<Route>, RouteError> {
        self.add_route(Method::OPTIONS, pattern, handler, &[])
    }
}

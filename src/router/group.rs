use std::sync::Arc;

use super::core::Router;
use super::registrar::{RouteDef, RouteRegistrar};
use super::route::Route;
use crate::error::RouteError;
use crate::middleware::SharedMiddleware;

/// A registration scope: a path prefix plus middleware applied to every route
/// registered through it.
///
/// Groups only exist while routes are being registered. The effective chain
/// for a route is global middleware, then each enclosing group's middleware
/// from outermost to innermost, then the route's own.
///
/// ```rust,ignore
/// let api = router.group("/api/v1", [auth]);
/// let admin = api.group("/admin", [audit]);
/// admin.delete("/users/:id", delete_user)?; // DELETE /api/v1/admin/users/:id
/// ```
#[derive(Clone)]
pub struct Group<'r> {
    router: &'r Router,
    prefix: String,
    middleware: Vec<SharedMiddleware>,
}

impl<'r> Group<'r> {
    pub(crate) fn new(router: &'r Router, prefix: &str, middleware: Vec<SharedMiddleware>) -> Self {
        Self {
            router,
            prefix: prefix.trim_end_matches('/').to_string(),
            middleware,
        }
    }

    /// A nested group. Its prefix and middleware are appended to this one's.
    #[must_use]
    pub fn group(
        &self,
        prefix: &str,
        middleware: impl IntoIterator<Item = SharedMiddleware>,
    ) -> Group<'r> {
        let mut combined = self.middleware.clone();
        combined.extend(middleware);
        Group::new(self.router, &join(&self.prefix, prefix), combined)
    }

    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

fn join(prefix: &str, pattern: &str) -> String {
    match (prefix.is_empty(), pattern) {
        (true, _) => pattern.to_string(),
        (false, "") => prefix.to_string(),
        (false, p) if p.starts_with('/') => format!("{prefix}{p}"),
        (false, p) => format!("{prefix}/{p}"),
    }
}

impl RouteRegistrar for Group<'_> {
    fn register(&self, mut def: RouteDef) -> Result<Arc<Route>, RouteError> {
        def.pattern = join(&self.prefix, &def.pattern);
        let mut middleware = self.middleware.clone();
        middleware.append(&mut def.middleware);
        def.middleware = middleware;
        self.router.register_scoped(def)
    }
}

//! Router core: lock-free dispatch over an atomically published table.
//!
//! Readers call `ArcSwap::load_full` once per request and work against that
//! snapshot for the whole dispatch. Writers serialize on a single mutex,
//! derive a new table from the current one and `store` it. A dispatch that
//! started before a registration finishes against the old table; the next one
//! sees the new table. Nothing on the read path blocks.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::group::Group;
use super::pattern;
use super::registrar::{RouteDef, RouteRegistrar};
use super::route::{Route, RouteId, RouteInfo};
use super::table::RoutingTable;
use crate::dispatcher::{handler_fn, BoxedHandler, ContextPool, HandlerResponse, Request, RequestContext};
use crate::error::{ApiError, RouteError};
use crate::middleware::{compile_chain, SharedMiddleware};
use crate::runtime_config::RouterConfig;

type Cleanup = Box<dyn FnOnce() + Send>;

/// Writer-side state, guarded by one mutex so registrations are totally
/// ordered.
struct Registry {
    global: Vec<SharedMiddleware>,
    next_route_id: u64,
}

/// An HTTP request router.
///
/// Share it behind an `Arc` across serving threads. Routes can be added at
/// any time, including while requests are being dispatched.
///
/// ```rust,ignore
/// use nimbus::{HandlerResponse, RequestContext, Request, RouteRegistrar, Router};
///
/// let router = Router::new();
/// router.get("/users/:id", |ctx: &mut RequestContext| {
///     Ok(HandlerResponse::ok(serde_json::json!({ "id": ctx.param("id") })))
/// })?;
/// let response = router.dispatch(Request::get("/users/42"));
/// ```
pub struct Router {
    table: ArcSwap<RoutingTable>,
    registry: Mutex<Registry>,
    cleanups: Mutex<Vec<Cleanup>>,
    shut_down: AtomicBool,
    pool: ContextPool,
    config: RouterConfig,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

fn default_not_found() -> BoxedHandler {
    handler_fn(|_: &mut RequestContext| Err(ApiError::not_found()))
}

impl Router {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RouterConfig::default())
    }

    #[must_use]
    pub fn with_config(config: RouterConfig) -> Self {
        Self {
            table: ArcSwap::from_pointee(RoutingTable::new(default_not_found())),
            registry: Mutex::new(Registry {
                global: Vec::new(),
                next_route_id: 1,
            }),
            cleanups: Mutex::new(Vec::new()),
            shut_down: AtomicBool::new(false),
            pool: ContextPool::new(config.pool_capacity, config.max_pooled_map_capacity),
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// The table currently published. Holding it keeps that version alive.
    #[must_use]
    pub fn snapshot(&self) -> Arc<RoutingTable> {
        self.table.load_full()
    }

    /// Append global middleware.
    ///
    /// Applies to routes registered afterwards and, immediately, to the
    /// not-found chain. Routes that already exist keep the chain they were
    /// compiled with.
    pub fn use_middleware(&self, middleware: impl IntoIterator<Item = SharedMiddleware>) {
        let mut registry = self.registry.lock();
        let before = registry.global.len();
        registry.global.extend(middleware);

        let not_found = compile_chain(default_not_found(), &registry.global);
        let next = self.table.load().with_not_found(not_found);
        self.table.store(Arc::new(next));
        info!(
            added = registry.global.len() - before,
            total = registry.global.len(),
            "global middleware updated"
        );
    }

    /// A registration scope that prefixes patterns with `prefix` and wraps
    /// its routes in `middleware` (inside any global middleware).
    #[must_use]
    pub fn group(&self, prefix: &str, middleware: impl IntoIterator<Item = SharedMiddleware>) -> Group<'_> {
        Group::new(self, prefix, middleware.into_iter().collect())
    }

    /// Register `def`, whose middleware list already holds any group
    /// middleware ahead of the route's own.
    pub(crate) fn register_scoped(&self, def: RouteDef) -> Result<Arc<Route>, RouteError> {
        let parsed = pattern::parse(&def.pattern)?;
        let mut registry = self.registry.lock();

        let middleware: Vec<SharedMiddleware> = registry
            .global
            .iter()
            .chain(def.middleware.iter())
            .cloned()
            .collect();
        let chain = compile_chain(Arc::clone(&def.handler), &middleware);

        let id = RouteId(registry.next_route_id);
        let route = Arc::new(Route::new(
            id,
            def.method,
            Arc::clone(&parsed.normalized),
            parsed.param_names(),
            def.handler,
            chain,
            def.doc,
        ));

        let current = self.table.load_full();
        let (next, replaced) =
            current.with_route(Arc::clone(&route), &parsed, self.config.param_policy())?;
        registry.next_route_id += 1;

        let version = next.version();
        self.table.store(Arc::new(next));
        drop(registry);

        match &replaced {
            Some(old) => warn!(
                pattern = %parsed.normalized,
                route_id = %id,
                replaced_id = %old.id(),
                version,
                "route replaced"
            ),
            None => info!(
                pattern = %parsed.normalized,
                route_id = %id,
                middleware = middleware.len(),
                version,
                "route registered"
            ),
        }

        Ok(route)
    }

    /// Resolve and run one request.
    ///
    /// Never fails: a miss runs the not-found chain and an error that escapes
    /// the chain is rendered through [`ApiError::to_response`]. Headers the
    /// chain set on the context are applied to the final response.
    pub fn dispatch(&self, request: Request) -> HandlerResponse {
        let table = self.table.load_full();
        let mut ctx = self.pool.acquire(request);

        let start = Instant::now();
        let resolved = table.lookup(ctx.method(), ctx.path());
        let elapsed = start.elapsed();
        if elapsed.as_micros() > u128::from(self.config.slow_match_threshold_us) {
            warn!(
                method = %ctx.method(),
                path = %ctx.path(),
                duration_us = elapsed.as_micros() as u64,
                "slow route match"
            );
        }

        let chain = match resolved {
            Some(hit) => {
                debug!(
                    method = %ctx.method(),
                    path = %ctx.path(),
                    pattern = %hit.route.pattern(),
                    params = hit.params.len(),
                    "route matched"
                );
                let chain = Arc::clone(hit.route.chain());
                ctx.bind(Arc::clone(hit.route), hit.params);
                chain
            }
            None => {
                debug!(method = %ctx.method(), path = %ctx.path(), "no route matched");
                Arc::clone(table.not_found())
            }
        };

        let mut response = match chain.call(&mut ctx) {
            Ok(response) => response,
            Err(err) => {
                if err.status().is_server_error() {
                    error!(
                        method = %ctx.method(),
                        path = %ctx.path(),
                        status = err.status().as_u16(),
                        error = %err,
                        "request failed"
                    );
                }
                err.to_response()
            }
        };
        for (name, value) in ctx.take_response_headers() {
            response.set_header(&name, value);
        }

        self.pool.release(ctx);
        response
    }

    /// Resolve without running anything.
    #[must_use]
    pub fn resolve(&self, method: &http::Method, path: &str) -> Option<(Arc<Route>, crate::router::ParamVec)> {
        let table = self.table.load();
        table
            .lookup(method, path)
            .map(|hit| (Arc::clone(hit.route), hit.params))
    }

    /// Every registered route, ordered by method then pattern.
    #[must_use]
    pub fn routes(&self) -> Vec<Arc<Route>> {
        self.table.load().routes()
    }

    /// Serializable route summaries for documentation tooling.
    #[must_use]
    pub fn route_infos(&self) -> Vec<RouteInfo> {
        self.routes().iter().map(|r| RouteInfo::from(&**r)).collect()
    }

    /// Log the current routes and tree layout at `info`.
    pub fn dump_routes(&self) {
        let table = self.table.load();
        info!(
            version = table.version(),
            routes = table.len(),
            nodes = table.tree_node_count(),
            "routing table\n{}",
            table.dump()
        );
    }

    /// Register a callback to run once at [`shutdown`](Self::shutdown).
    ///
    /// After shutdown has started the callback runs immediately on the
    /// calling thread.
    pub fn register_cleanup<F>(&self, cleanup: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut cleanups = self.cleanups.lock();
        if self.shut_down.load(Ordering::Acquire) {
            drop(cleanups);
            run_cleanup(Box::new(cleanup));
            return;
        }
        cleanups.push(Box::new(cleanup));
    }

    /// Run every registered cleanup exactly once, in registration order.
    ///
    /// Safe to call repeatedly and from several threads; only the first call
    /// does anything. A panicking cleanup is logged and does not stop the
    /// others.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        let cleanups = std::mem::take(&mut *self.cleanups.lock());
        info!(count = cleanups.len(), "router shutting down");
        for cleanup in cleanups {
            run_cleanup(cleanup);
        }
    }

    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }
}

fn run_cleanup(cleanup: Cleanup) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(cleanup)) {
        let message = crate::middleware::panic_message(panic.as_ref());
        error!(panic = %message, "cleanup callback panicked");
    }
}

impl RouteRegistrar for Router {
    fn register(&self, def: RouteDef) -> Result<Arc<Route>, RouteError> {
        self.register_scoped(def)
    }
}

impl Drop for Router {
    fn drop(&mut self) {
        self.shutdown();
    }
}

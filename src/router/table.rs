//! Immutable routing snapshots.
//!
//! A [`RoutingTable`] is never modified after it is built. Registration
//! derives a new table from the current one with [`RoutingTable::with_route`],
//! copying only what changes:
//!
//! - a literal pattern copies that method's exact-match index (one hash map)
//! - a dynamic pattern copies the spine of that method's radix tree
//! - every other method's index and tree is shared with the previous table

use std::collections::HashMap;
use std::sync::Arc;

use http::Method;

use super::pattern::{ParsedPattern, Piece};
use super::radix::{self, Node, ParamPolicy, ParamVec};
use super::route::Route;
use crate::dispatcher::BoxedHandler;
use crate::error::RouteError;

const STANDARD_METHODS: usize = 9;

fn standard_slot(method: &Method) -> Option<usize> {
    match *method {
        Method::GET => Some(0),
        Method::POST => Some(1),
        Method::PUT => Some(2),
        Method::DELETE => Some(3),
        Method::PATCH => Some(4),
        Method::HEAD => Some(5),
        Method::OPTIONS => Some(6),
        Method::CONNECT => Some(7),
        Method::TRACE => Some(8),
        _ => None,
    }
}

/// Per-method storage with an array fast path for the standard methods.
/// Extension methods fall back to a short linear list.
#[derive(Clone)]
pub(crate) struct MethodMap<T> {
    standard: [Option<T>; STANDARD_METHODS],
    extension: Vec<(Method, T)>,
}

impl<T> Default for MethodMap<T> {
    fn default() -> Self {
        Self {
            standard: std::array::from_fn(|_| None),
            extension: Vec::new(),
        }
    }
}

impl<T> MethodMap<T> {
    #[inline]
    pub(crate) fn get(&self, method: &Method) -> Option<&T> {
        match standard_slot(method) {
            Some(i) => self.standard[i].as_ref(),
            None => self
                .extension
                .iter()
                .find(|(m, _)| m == method)
                .map(|(_, v)| v),
        }
    }

    pub(crate) fn insert(&mut self, method: &Method, value: T) {
        match standard_slot(method) {
            Some(i) => self.standard[i] = Some(value),
            None => match self.extension.iter_mut().find(|(m, _)| m == method) {
                Some((_, slot)) => *slot = value,
                None => self.extension.push((method.clone(), value)),
            },
        }
    }

    pub(crate) fn values(&self) -> impl Iterator<Item = &T> {
        self.standard
            .iter()
            .flatten()
            .chain(self.extension.iter().map(|(_, v)| v))
    }
}

type ExactIndex = HashMap<Box<str>, Arc<Route>>;

#[derive(Clone, PartialEq, Eq, Hash)]
struct RouteKey {
    method: Method,
    pattern: Arc<str>,
}

/// A resolved route plus the parameters bound by the request path.
#[derive(Debug)]
pub struct RouteMatch<'t> {
    pub route: &'t Arc<Route>,
    pub params: ParamVec,
}

impl RouteMatch<'_> {
    /// A bound parameter by name, last occurrence winning.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .rfind(|(k, _)| &**k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// One published version of the routing state.
#[derive(Clone)]
pub struct RoutingTable {
    version: u64,
    exact: MethodMap<Arc<ExactIndex>>,
    trees: MethodMap<Arc<Node>>,
    registry: Arc<HashMap<RouteKey, Arc<Route>>>,
    not_found: BoxedHandler,
}

impl RoutingTable {
    pub(crate) fn new(not_found: BoxedHandler) -> Self {
        Self {
            version: 0,
            exact: MethodMap::default(),
            trees: MethodMap::default(),
            registry: Arc::new(HashMap::new()),
            not_found,
        }
    }

    /// Derive a table that also contains `route`.
    ///
    /// Returns the new table and the route it displaced, if the same method
    /// and pattern were already registered. `self` is unchanged.
    pub(crate) fn with_route(
        &self,
        route: Arc<Route>,
        pattern: &ParsedPattern,
        policy: ParamPolicy,
    ) -> Result<(Self, Option<Arc<Route>>), RouteError> {
        let method = route.method().clone();
        let mut next = self.clone();

        let replaced = if pattern.is_static() {
            let mut index = self
                .exact
                .get(&method)
                .map(|idx| ExactIndex::clone(idx))
                .unwrap_or_default();
            let replaced = index.insert(Box::from(route.pattern()), Arc::clone(&route));
            next.exact.insert(&method, Arc::new(index));
            replaced
        } else {
            let empty = Node::root();
            let root = self.trees.get(&method).map_or(&empty, |r| &**r);
            let pieces: &[Piece] = &pattern.pieces;
            let (root, replaced) =
                radix::insert_replacing(root, pieces, Arc::clone(&route), policy)?;
            next.trees.insert(&method, Arc::new(root));
            replaced
        };

        // A renamed parameter can displace a route registered under a
        // different spelling of the same pattern; drop its stale key.
        let mut registry = HashMap::clone(&self.registry);
        if let Some(old) = &replaced {
            registry.remove(&RouteKey {
                method: method.clone(),
                pattern: Arc::clone(old.pattern_arc()),
            });
        }
        registry.insert(
            RouteKey {
                method,
                pattern: Arc::clone(route.pattern_arc()),
            },
            route,
        );
        next.registry = Arc::new(registry);
        next.version = self.version + 1;
        Ok((next, replaced))
    }

    /// Derive a table with a different not-found chain.
    pub(crate) fn with_not_found(&self, not_found: BoxedHandler) -> Self {
        let mut next = self.clone();
        next.not_found = not_found;
        next.version = self.version + 1;
        next
    }

    /// Resolve a request path: exact index first, then the method's tree.
    #[must_use]
    pub fn lookup(&self, method: &Method, path: &str) -> Option<RouteMatch<'_>> {
        if let Some(route) = self.exact.get(method).and_then(|idx| idx.get(path)) {
            return Some(RouteMatch {
                route,
                params: ParamVec::new(),
            });
        }
        let root = self.trees.get(method)?;
        let mut params = ParamVec::new();
        radix::search(root, path, &mut params).map(|route| RouteMatch { route, params })
    }

    /// The compiled chain that runs when nothing matches.
    #[must_use]
    pub fn not_found(&self) -> &BoxedHandler {
        &self.not_found
    }

    /// A registered route by method and pattern.
    #[must_use]
    pub fn route(&self, method: &Method, pattern: &str) -> Option<&Arc<Route>> {
        let key = RouteKey {
            method: method.clone(),
            pattern: Arc::from(super::pattern::normalize(pattern)),
        };
        self.registry.get(&key)
    }

    /// Every registered route, ordered by method then pattern.
    #[must_use]
    pub fn routes(&self) -> Vec<Arc<Route>> {
        let mut routes: Vec<Arc<Route>> = self.registry.values().cloned().collect();
        routes.sort_by(|a, b| {
            (a.method().as_str(), a.pattern()).cmp(&(b.method().as_str(), b.pattern()))
        });
        routes
    }

    /// Increases by one with every derived table.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Total radix nodes across all methods.
    #[must_use]
    pub fn tree_node_count(&self) -> usize {
        self.trees.values().map(|root| root.node_count()).sum()
    }

    /// Routes reachable through an index or a tree.
    pub(crate) fn reachable_routes(&self) -> Vec<Arc<Route>> {
        let mut out: Vec<Arc<Route>> = self
            .exact
            .values()
            .flat_map(|idx| idx.values().cloned())
            .collect();
        for root in self.trees.values() {
            root.collect_routes(&mut out);
        }
        out
    }

    pub(crate) fn dump(&self) -> String {
        let mut out = String::new();
        for route in self.routes() {
            out.push_str(&format!("{:<7} {}\n", route.method().as_str(), route.pattern()));
        }
        for root in self.trees.values() {
            out.push_str(&format!("{root:?}"));
        }
        out
    }
}

impl std::fmt::Debug for RoutingTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingTable")
            .field("version", &self.version)
            .field("routes", &self.registry.len())
            .finish_non_exhaustive()
    }
}

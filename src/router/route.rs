use std::fmt;
use std::sync::Arc;

use http::Method;
use serde::{Deserialize, Serialize};

use crate::dispatcher::BoxedHandler;

/// Process-unique identity of a registered route.
///
/// Re-registering the same method and pattern yields a fresh id, which is how
/// callers can tell a replacement from the route it displaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RouteId(pub(crate) u64);

impl RouteId {
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "route-{}", self.0)
    }
}

/// Documentation attached to a route for doc generators.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteDoc {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl RouteDoc {
    pub fn summary(summary: impl Into<String>) -> Self {
        Self {
            summary: Some(summary.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

/// An immutable registered route.
///
/// Holds both the bare terminal handler and the chain that was compiled for it
/// at registration time. Dispatch only ever calls [`Route::chain`].
pub struct Route {
    id: RouteId,
    method: Method,
    pattern: Arc<str>,
    param_names: Vec<Arc<str>>,
    handler: BoxedHandler,
    chain: BoxedHandler,
    doc: Option<RouteDoc>,
}

impl Route {
    pub(crate) fn new(
        id: RouteId,
        method: Method,
        pattern: Arc<str>,
        param_names: Vec<Arc<str>>,
        handler: BoxedHandler,
        chain: BoxedHandler,
        doc: Option<RouteDoc>,
    ) -> Self {
        Self {
            id,
            method,
            pattern,
            param_names,
            handler,
            chain,
            doc,
        }
    }

    #[must_use]
    pub fn id(&self) -> RouteId {
        self.id
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The normalized pattern this route was registered under.
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    #[must_use]
    pub fn param_names(&self) -> &[Arc<str>] {
        &self.param_names
    }

    /// The terminal handler without any middleware.
    #[must_use]
    pub fn handler(&self) -> &BoxedHandler {
        &self.handler
    }

    /// The compiled middleware chain ending in the terminal handler.
    #[must_use]
    pub fn chain(&self) -> &BoxedHandler {
        &self.chain
    }

    #[must_use]
    pub fn doc(&self) -> Option<&RouteDoc> {
        self.doc.as_ref()
    }

    pub(crate) fn pattern_arc(&self) -> &Arc<str> {
        &self.pattern
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("pattern", &self.pattern)
            .field("param_names", &self.param_names)
            .field("doc", &self.doc)
            .finish_non_exhaustive()
    }
}

/// Serializable summary of a route, as returned by
/// [`Router::route_infos`](crate::Router::route_infos).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteInfo {
    pub id: RouteId,
    pub method: String,
    pub pattern: String,
    pub params: Vec<String>,
    #[serde(flatten)]
    pub doc: RouteDoc,
}

impl From<&Route> for RouteInfo {
    fn from(route: &Route) -> Self {
        Self {
            id: route.id,
            method: route.method.as_str().to_string(),
            pattern: route.pattern.to_string(),
            params: route.param_names.iter().map(|n| n.to_string()).collect(),
            doc: route.doc.clone().unwrap_or_default(),
        }
    }
}

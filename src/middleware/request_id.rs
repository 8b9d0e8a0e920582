use std::fmt;
use std::sync::Arc;

use super::Middleware;
use crate::dispatcher::{handler_fn, BoxedHandler, RequestContext};

/// Context key under which the request id is stored as a `String`.
pub const REQUEST_ID_KEY: &str = "request_id";

/// Default header carrying the request id in both directions.
pub const REQUEST_ID_HEADER: &str = "X-Request-ID";

const MAX_INBOUND_LEN: usize = 128;

/// Request identifier backed by a ULID: sortable by creation time and
/// unique without coordination.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub struct RequestId(ulid::Ulid);

impl RequestId {
    #[must_use]
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RequestId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ulid::Ulid::from_string(s).map(Self)
    }
}

/// Propagates or assigns a request id.
///
/// An inbound id in the configured header is kept if it is short printable
/// ASCII; otherwise a new ULID is generated. The id is stored in the context
/// under [`REQUEST_ID_KEY`] and echoed on the response.
#[derive(Debug, Clone)]
pub struct RequestIdMiddleware {
    header: Arc<str>,
}

impl Default for RequestIdMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestIdMiddleware {
    #[must_use]
    pub fn new() -> Self {
        Self::with_header(REQUEST_ID_HEADER)
    }

    #[must_use]
    pub fn with_header(header: &str) -> Self {
        Self {
            header: Arc::from(header),
        }
    }
}

fn acceptable(id: &str) -> bool {
    !id.is_empty() && id.len() <= MAX_INBOUND_LEN && id.bytes().all(|b| b.is_ascii_graphic())
}

impl Middleware for RequestIdMiddleware {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        let header = Arc::clone(&self.header);
        handler_fn(move |ctx: &mut RequestContext| {
            let id = match ctx.header(&header) {
                Some(inbound) if acceptable(inbound) => inbound.to_string(),
                _ => RequestId::new().to_string(),
            };
            ctx.set_header(&header, id.clone());
            ctx.set(REQUEST_ID_KEY, id);
            next.call(ctx)
        })
    }
}

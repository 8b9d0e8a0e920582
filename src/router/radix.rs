//! Copy-on-write radix tree for dynamic route matching.
//!
//! Each HTTP method gets its own tree. Trees are never modified once a
//! routing table has been published: [`insert`] returns a new root that shares
//! every untouched subtree with the old one through `Arc`, so a reader holding
//! the previous table keeps a complete, consistent view.
//!
//! ## Node layout
//!
//! - **Static** nodes hold a byte prefix. Prefixes may span `/`, so routes
//!   under `/api/v1/` share a single node for that text.
//! - Every node has at most one **parameter** child (`:name`, one non-empty
//!   segment) and at most one **wildcard** child (`*name`, the non-empty rest
//!   of the path).
//! - Static siblings always start with different bytes, so picking the static
//!   child to descend into is a single byte comparison.
//!
//! ## Matching order
//!
//! At every node static children are tried first, then the parameter child,
//! then the wildcard child. A branch that dead-ends falls back to the next
//! alternative at the same node, so `/users/new` and `/users/:id/edit` can
//! coexist and `/users/new/edit` still reaches the parameter route.
//!
//! ## Insertion
//!
//! Static text is inserted by longest common prefix against the child that
//! shares the first byte:
//!
//! - no child shares the first byte: a new leaf is appended
//! - the child's prefix is fully contained: descend with the suffix
//! - partial overlap: an intermediate node takes the common prefix and the
//!   old child is re-parented under it with its remaining suffix
//!
//! Only nodes on the path from the root to the change are copied.

use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;
use tracing::warn;

use super::pattern::Piece;
use super::route::Route;
use crate::error::RouteError;

/// Maximum number of path parameters stored inline before spilling to the heap.
pub const MAX_INLINE_PARAMS: usize = 8;

/// Extracted path parameters, in path order.
///
/// Inline storage means a lookup that binds nothing (or up to eight values)
/// never allocates for the container itself.
pub type ParamVec = SmallVec<[(Arc<str>, String); MAX_INLINE_PARAMS]>;

/// What to do when a pattern names a parameter differently from the one
/// already occupying the same tree position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParamPolicy {
    /// The newer name wins for every route below that position.
    #[default]
    LastWriteWins,
    /// Registration fails with [`RouteError::ParamConflict`].
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeKind {
    Static,
    Param,
    Wildcard,
}

#[derive(Clone)]
pub(crate) struct Node {
    kind: NodeKind,
    prefix: Box<[u8]>,
    name: Option<Arc<str>>,
    route: Option<Arc<Route>>,
    children: Vec<Arc<Node>>,
    param_child: Option<Arc<Node>>,
    wildcard_child: Option<Arc<Node>>,
}

impl Node {
    /// An empty root.
    pub(crate) fn root() -> Self {
        Self::with_prefix(&[])
    }

    fn with_prefix(prefix: &[u8]) -> Self {
        Self {
            kind: NodeKind::Static,
            prefix: prefix.into(),
            name: None,
            route: None,
            children: Vec::new(),
            param_child: None,
            wildcard_child: None,
        }
    }

    fn dynamic(kind: NodeKind, name: &Arc<str>) -> Self {
        Self {
            kind,
            prefix: Box::default(),
            name: Some(Arc::clone(name)),
            route: None,
            children: Vec::new(),
            param_child: None,
            wildcard_child: None,
        }
    }

    /// Number of nodes in this subtree, including `self`.
    pub(crate) fn node_count(&self) -> usize {
        1 + self.children.iter().map(|c| c.node_count()).sum::<usize>()
            + self.param_child.as_ref().map_or(0, |c| c.node_count())
            + self.wildcard_child.as_ref().map_or(0, |c| c.node_count())
    }

    /// Collect every route stored in this subtree.
    pub(crate) fn collect_routes(&self, out: &mut Vec<Arc<Route>>) {
        if let Some(route) = &self.route {
            out.push(Arc::clone(route));
        }
        for child in &self.children {
            child.collect_routes(out);
        }
        if let Some(child) = &self.param_child {
            child.collect_routes(out);
        }
        if let Some(child) = &self.wildcard_child {
            child.collect_routes(out);
        }
    }

    fn static_child_index(&self, first: u8) -> Option<usize> {
        self.children
            .iter()
            .position(|c| c.prefix.first() == Some(&first))
    }

    fn fmt_tree(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let label = match self.kind {
            NodeKind::Static => String::from_utf8_lossy(&self.prefix).into_owned(),
            NodeKind::Param => format!(":{}", self.name.as_deref().unwrap_or("")),
            NodeKind::Wildcard => format!("*{}", self.name.as_deref().unwrap_or("")),
        };
        write!(f, "{:indent$}{label}", "", indent = depth * 2)?;
        if let Some(route) = &self.route {
            write!(f, "  => {} {}", route.method(), route.pattern())?;
        }
        writeln!(f)?;
        for child in &self.children {
            child.fmt_tree(f, depth + 1)?;
        }
        if let Some(child) = &self.param_child {
            child.fmt_tree(f, depth + 1)?;
        }
        if let Some(child) = &self.wildcard_child {
            child.fmt_tree(f, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_tree(f, 0)
    }
}

/// Insert `route` under `pieces`, returning the new root.
///
/// `root` is left untouched. When a route already exists at the terminal
/// position it is replaced in the returned tree.
#[cfg(test)]
pub(crate) fn insert(
    root: &Node,
    pieces: &[Piece],
    route: Arc<Route>,
    policy: ParamPolicy,
) -> Result<Node, RouteError> {
    insert_replacing(root, pieces, route, policy).map(|(node, _)| node)
}

/// Insert and also report the route that was displaced, if any.
pub(crate) fn insert_replacing(
    root: &Node,
    pieces: &[Piece],
    route: Arc<Route>,
    policy: ParamPolicy,
) -> Result<(Node, Option<Arc<Route>>), RouteError> {
    let mut insertion = Insertion {
        route,
        policy,
        replaced: None,
    };
    let node = insertion.descend(root, &[], pieces)?;
    Ok((node, insertion.replaced))
}

struct Insertion {
    route: Arc<Route>,
    policy: ParamPolicy,
    replaced: Option<Arc<Route>>,
}

impl Insertion {
    /// Produce a copy of `node` with the remaining static bytes `rest` and the
    /// remaining `pieces` inserted below it.
    fn descend(&mut self, node: &Node, rest: &[u8], pieces: &[Piece]) -> Result<Node, RouteError> {
        let mut copy = node.clone();

        if let Some(&first) = rest.first() {
            match node.static_child_index(first) {
                None => {
                    let leaf = self.descend(&Node::with_prefix(rest), &[], pieces)?;
                    copy.children.push(Arc::new(leaf));
                }
                Some(i) => {
                    let child = &node.children[i];
                    let common = common_prefix_len(&child.prefix, rest);
                    let updated = if common == child.prefix.len() {
                        self.descend(child, &rest[common..], pieces)?
                    } else {
                        let mut tail = Node::clone(child);
                        tail.prefix = child.prefix[common..].into();
                        let mut split = Node::with_prefix(&child.prefix[..common]);
                        split.children.push(Arc::new(tail));
                        self.descend(&split, &rest[common..], pieces)?
                    };
                    copy.children[i] = Arc::new(updated);
                }
            }
            return Ok(copy);
        }

        let Some((piece, tail)) = pieces.split_first() else {
            self.replaced = copy.route.replace(Arc::clone(&self.route));
            return Ok(copy);
        };

        match piece {
            Piece::Static(text) => return self.descend(node, text.as_bytes(), tail),
            Piece::Param(name) => {
                let slot = self.claim(node.param_child.as_deref(), NodeKind::Param, name)?;
                copy.param_child = Some(Arc::new(self.descend(&slot, &[], tail)?));
            }
            Piece::Wildcard(name) => {
                let slot = self.claim(node.wildcard_child.as_deref(), NodeKind::Wildcard, name)?;
                copy.wildcard_child = Some(Arc::new(self.descend(&slot, &[], tail)?));
            }
        }
        Ok(copy)
    }

    /// Reuse the dynamic child in a slot, resolving a name collision per policy.
    fn claim(
        &self,
        existing: Option<&Node>,
        kind: NodeKind,
        name: &Arc<str>,
    ) -> Result<Node, RouteError> {
        let Some(existing) = existing else {
            return Ok(Node::dynamic(kind, name));
        };
        let current = existing.name.as_deref().unwrap_or_default();
        if current == &**name {
            return Ok(existing.clone());
        }
        match self.policy {
            ParamPolicy::Reject => Err(RouteError::ParamConflict {
                pattern: self.route.pattern().to_string(),
                existing: current.to_string(),
                new: name.to_string(),
            }),
            ParamPolicy::LastWriteWins => {
                warn!(
                    pattern = %self.route.pattern(),
                    existing = %current,
                    new = %name,
                    "parameter name collision, newer name replaces existing"
                );
                let mut renamed = existing.clone();
                renamed.name = Some(Arc::clone(name));
                Ok(renamed)
            }
        }
    }
}

fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

/// Resolve `path` against the tree rooted at `root`.
///
/// Bound values are appended to `params`; on a miss `params` is left as it
/// was on entry.
pub(crate) fn search<'t>(root: &'t Node, path: &str, params: &mut ParamVec) -> Option<&'t Arc<Route>> {
    search_from(root, path, 0, params)
}

fn search_from<'t>(
    node: &'t Node,
    path: &str,
    pos: usize,
    params: &mut ParamVec,
) -> Option<&'t Arc<Route>> {
    let rest = &path.as_bytes()[pos..];
    let Some(&first) = rest.first() else {
        return node.route.as_ref();
    };

    if let Some(i) = node.static_child_index(first) {
        let child = &node.children[i];
        if rest.starts_with(&child.prefix) {
            if let Some(found) = search_from(child, path, pos + child.prefix.len(), params) {
                return Some(found);
            }
        }
    }

    if let Some(child) = &node.param_child {
        let end = rest
            .iter()
            .position(|&b| b == b'/')
            .map_or(path.len(), |i| pos + i);
        if end > pos {
            if let (Some(value), Some(name)) = (path.get(pos..end), &child.name) {
                let mark = params.len();
                params.push((Arc::clone(name), value.to_string()));
                if let Some(found) = search_from(child, path, end, params) {
                    return Some(found);
                }
                params.truncate(mark);
            }
        }
    }

    if let Some(child) = &node.wildcard_child {
        if let (Some(route), Some(value), Some(name)) =
            (&child.route, path.get(pos..), &child.name)
        {
            params.push((Arc::clone(name), value.to_string()));
            return Some(route);
        }
    }

    None
}

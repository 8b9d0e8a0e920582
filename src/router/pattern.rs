//! Route pattern parsing.
//!
//! A pattern is a `/`-delimited path. A segment starting with `:` captures one
//! path segment, a segment starting with `*` captures the rest of the path and
//! must come last. Everything else is literal text.
//!
//! Parsing turns the pattern into alternating [`Piece`]s where consecutive
//! literal segments are merged into a single static run, slashes included:
//!
//! ```text
//! /api/users/:id/posts  →  Static("/api/users/") Param("id") Static("/posts")
//! /files/*path          →  Static("/files/") Wildcard("path")
//! ```
//!
//! Storing slashes inside the static runs lets the tree share prefixes such as
//! `/api/` across every route without segment bookkeeping.

use std::sync::Arc;

use crate::error::RouteError;

/// One parsed element of a route pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Piece {
    Static(Box<str>),
    Param(Arc<str>),
    Wildcard(Arc<str>),
}

/// A validated, normalized route pattern.
#[derive(Debug, Clone)]
pub(crate) struct ParsedPattern {
    pub normalized: Arc<str>,
    pub pieces: Vec<Piece>,
}

impl ParsedPattern {
    /// True when the pattern contains no `:` or `*` segments.
    pub fn is_static(&self) -> bool {
        self.pieces.iter().all(|p| matches!(p, Piece::Static(_)))
    }

    /// Names bound by this pattern, in path order.
    pub fn param_names(&self) -> Vec<Arc<str>> {
        self.pieces
            .iter()
            .filter_map(|p| match p {
                Piece::Param(name) | Piece::Wildcard(name) => Some(Arc::clone(name)),
                Piece::Static(_) => None,
            })
            .collect()
    }
}

/// Normalize a raw pattern: empty becomes `/`, a missing leading slash is added.
pub(crate) fn normalize(pattern: &str) -> String {
    if pattern.is_empty() {
        "/".to_string()
    } else if pattern.starts_with('/') {
        pattern.to_string()
    } else {
        format!("/{pattern}")
    }
}

/// Parse and validate a route pattern.
pub(crate) fn parse(pattern: &str) -> Result<ParsedPattern, RouteError> {
    let normalized = normalize(pattern);
    let segments: Vec<&str> = normalized[1..].split('/').collect();
    let last = segments.len() - 1;

    let mut pieces = Vec::new();
    let mut run = String::from("/");

    for (i, segment) in segments.iter().enumerate() {
        if let Some(name) = segment.strip_prefix(':') {
            if name.is_empty() {
                return Err(RouteError::EmptyParamName {
                    pattern: normalized.clone(),
                });
            }
            pieces.push(Piece::Static(std::mem::take(&mut run).into_boxed_str()));
            pieces.push(Piece::Param(Arc::from(name)));
        } else if let Some(name) = segment.strip_prefix('*') {
            if name.is_empty() {
                return Err(RouteError::EmptyParamName {
                    pattern: normalized.clone(),
                });
            }
            if i != last {
                return Err(RouteError::WildcardNotLast {
                    pattern: normalized.clone(),
                });
            }
            pieces.push(Piece::Static(std::mem::take(&mut run).into_boxed_str()));
            pieces.push(Piece::Wildcard(Arc::from(name)));
        } else {
            run.push_str(segment);
        }
        if i != last {
            run.push('/');
        }
    }
    if !run.is_empty() {
        pieces.push(Piece::Static(run.into_boxed_str()));
    }

    Ok(ParsedPattern {
        normalized: Arc::from(normalized),
        pieces,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn st(s: &str) -> Piece {
        Piece::Static(s.into())
    }
    fn param(s: &str) -> Piece {
        Piece::Param(Arc::from(s))
    }
    fn wild(s: &str) -> Piece {
        Piece::Wildcard(Arc::from(s))
    }

    #[test]
    fn test_parse_static() {
        let p = parse("/api/users").unwrap();
        assert!(p.is_static());
        assert_eq!(p.pieces, vec![st("/api/users")]);
        assert_eq!(&*p.normalized, "/api/users");
    }

    #[test]
    fn test_parse_root_and_empty() {
        assert_eq!(parse("/").unwrap().pieces, vec![st("/")]);
        let empty = parse("").unwrap();
        assert_eq!(&*empty.normalized, "/");
        assert_eq!(empty.pieces, vec![st("/")]);
    }

    #[test]
    fn test_parse_adds_leading_slash() {
        let p = parse("users/:id").unwrap();
        assert_eq!(&*p.normalized, "/users/:id");
        assert_eq!(p.pieces, vec![st("/users/"), param("id")]);
    }

    #[test]
    fn test_parse_params() {
        let p = parse("/posts/:postId/comments/:commentId").unwrap();
        assert!(!p.is_static());
        assert_eq!(
            p.pieces,
            vec![
                st("/posts/"),
                param("postId"),
                st("/comments/"),
                param("commentId"),
            ]
        );
        let names: Vec<String> = p.param_names().iter().map(|n| n.to_string()).collect();
        assert_eq!(names, vec!["postId", "commentId"]);
    }

    #[test]
    fn test_parse_adjacent_params_and_trailing_slash() {
        let p = parse("/:a/:b/").unwrap();
        assert_eq!(
            p.pieces,
            vec![st("/"), param("a"), st("/"), param("b"), st("/")]
        );
    }

    #[test]
    fn test_parse_wildcard() {
        let p = parse("/static/*filepath").unwrap();
        assert_eq!(p.pieces, vec![st("/static/"), wild("filepath")]);
    }

    #[test]
    fn test_colon_inside_segment_is_literal() {
        let p = parse("/time/12:30").unwrap();
        assert!(p.is_static());
    }

    #[test]
    fn test_parse_rejects_bad_patterns() {
        assert!(matches!(
            parse("/users/:"),
            Err(RouteError::EmptyParamName { .. })
        ));
        assert!(matches!(
            parse("/files/*"),
            Err(RouteError::EmptyParamName { .. })
        ));
        assert!(matches!(
            parse("/files/*path/meta"),
            Err(RouteError::WildcardNotLast { .. })
        ));
    }
}

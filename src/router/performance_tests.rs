// Scalability checks for the routing table.
//
// Lookup cost should track path length, not route count. Thresholds are loose
// enough for unoptimized test builds.

use std::time::Instant;

use http::Method;

use super::{RouteRegistrar, Router};
use crate::dispatcher::{HandlerResponse, HandlerResult, RequestContext};

fn noop(_: &mut RequestContext) -> HandlerResult {
    Ok(HandlerResponse::no_content())
}

#[test]
fn test_router_performance_with_many_routes() {
    let router = Router::new();
    for i in 0..500 {
        router.get(&format!("/api/v1/resource{i}/:id"), noop).unwrap();
    }

    let table = router.snapshot();
    let start = Instant::now();
    for _ in 0..1000 {
        assert!(table.lookup(&Method::GET, "/api/v1/resource250/123").is_some());
    }
    let duration = start.elapsed();

    assert!(
        duration.as_millis() < 100,
        "Router performance degraded: {}ms for 1000 lookups with 500 routes",
        duration.as_millis()
    );
}

#[test]
fn test_registration_copies_only_the_changed_path() {
    let router = Router::new();
    for i in 0..200 {
        router.get(&format!("/svc{i}/items/:id"), noop).unwrap();
    }
    let before = router.snapshot();
    router.get("/svc7/items/:id/tags", noop).unwrap();
    let after = router.snapshot();

    // one new node for "/tags" at most plus the copied spine
    assert!(after.tree_node_count() <= before.tree_node_count() + 2);
    assert_eq!(after.len(), before.len() + 1);
}

#[test]
fn test_router_worst_case_performance() {
    let router = Router::new();
    for pattern in ["/a", "/a/b", "/a/b/c", "/a/b/c/d", "/a/b/c/d/e", "/a/b/c/d/e/f"] {
        router.get(pattern, noop).unwrap();
    }
    router.get("/a/:x/c/:y/e/:z", noop).unwrap();

    let table = router.snapshot();
    let start = Instant::now();
    for _ in 0..1000 {
        assert!(table.lookup(&Method::GET, "/a/b/c/d/e/f").is_some());
        assert!(table.lookup(&Method::GET, "/a/1/c/2/e/3").is_some());
    }
    let duration = start.elapsed();

    assert!(
        duration.as_millis() < 50,
        "Deep path matching too slow: {}ms",
        duration.as_millis()
    );
}

#[test]
fn test_router_common_prefix_efficiency() {
    let router = Router::new();
    for pattern in [
        "/api/v1/users",
        "/api/v1/users/:id",
        "/api/v1/users/:id/profile",
        "/api/v1/posts",
        "/api/v1/posts/:id",
        "/api/v2/users",
        "/api/v2/posts",
    ] {
        router.get(pattern, noop).unwrap();
    }

    let table = router.snapshot();
    for path in [
        "/api/v1/users",
        "/api/v1/users/123",
        "/api/v1/users/123/profile",
        "/api/v1/posts",
        "/api/v1/posts/9",
        "/api/v2/users",
        "/api/v2/posts",
    ] {
        assert!(table.lookup(&Method::GET, path).is_some(), "{path}");
    }
    assert!(table.lookup(&Method::GET, "/api/v3/users").is_none());
}

#[test]
fn test_router_parameter_extraction_performance() {
    let router = Router::new();
    router
        .get("/api/:version/users/:user_id/posts/:post_id/comments/:comment_id", noop)
        .unwrap();

    let table = router.snapshot();
    let start = Instant::now();
    for _ in 0..1000 {
        let route_match = table
            .lookup(&Method::GET, "/api/v1/users/123/posts/456/comments/789")
            .unwrap();
        assert_eq!(route_match.params.len(), 4);
        assert_eq!(route_match.param("comment_id"), Some("789"));
    }
    let duration = start.elapsed();

    assert!(
        duration.as_millis() < 50,
        "Parameter extraction too slow: {}ms",
        duration.as_millis()
    );
}

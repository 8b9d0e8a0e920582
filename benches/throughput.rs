#![allow(clippy::expect_used)]

use std::hint::black_box;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use nimbus::prelude::*;

fn noop(_: &mut RequestContext) -> HandlerResult {
    Ok(HandlerResponse::no_content())
}

const ROUTES: &[(&str, &str)] = &[
    ("GET", "/"),
    ("GET", "/zoo/animals"),
    ("POST", "/zoo/animals"),
    ("GET", "/zoo/animals/:id"),
    ("PUT", "/zoo/animals/:id"),
    ("PATCH", "/zoo/animals/:id"),
    ("DELETE", "/zoo/animals/:id"),
    ("GET", "/zoo/animals/:id/toys/:toy_id"),
    ("GET", "/zoo/:category/animals/:id/habitats/:habitat_id/sections/:section_id"),
    ("POST", "/inventory/:warehouse_id/feeds/:feed_id/items/:item_id/batches/:batch_id"),
    ("GET", "/complex/:a/:b/:c/:d/:e/:f/:g/:h/:i"),
    ("HEAD", "/zoo/health"),
    ("GET", "/assets/*filepath"),
];

fn zoo() -> Router {
    let router = Router::new();
    for (method, pattern) in ROUTES {
        let method: Method = method.parse().expect("valid method");
        router.add_route(method, pattern, noop, &[]).expect("valid pattern");
    }
    router
}

fn bench_lookup(c: &mut Criterion) {
    let router = zoo();
    let table = router.snapshot();

    c.bench_function("lookup_static", |b| {
        b.iter(|| black_box(table.lookup(&Method::GET, black_box("/zoo/animals")).is_some()))
    });

    c.bench_function("lookup_params", |b| {
        let paths = [
            (Method::GET, "/zoo/animals/123"),
            (Method::GET, "/zoo/animals/123/toys/456"),
            (Method::GET, "/zoo/cats/animals/123/habitats/88/sections/5"),
            (Method::POST, "/inventory/1/feeds/2/items/3/batches/4"),
            (Method::GET, "/complex/1/2/3/4/5/6/7/8/9"),
        ];
        b.iter(|| {
            for (method, path) in &paths {
                black_box(table.lookup(method, path));
            }
        })
    });

    c.bench_function("lookup_wildcard", |b| {
        b.iter(|| black_box(table.lookup(&Method::GET, black_box("/assets/css/site/main.css"))))
    });

    c.bench_function("lookup_miss", |b| {
        b.iter(|| black_box(table.lookup(&Method::GET, black_box("/zoo/unknown/path")).is_none()))
    });
}

fn bench_dispatch(c: &mut Criterion) {
    let bare = zoo();
    c.bench_function("dispatch_bare", |b| {
        b.iter(|| black_box(bare.dispatch(Request::get("/zoo/animals/42"))))
    });

    let stacked = Router::new();
    stacked.use_middleware([
        Arc::new(RecoveryMiddleware::new()) as SharedMiddleware,
        Arc::new(RequestIdMiddleware::new()) as SharedMiddleware,
        Arc::new(MetricsMiddleware::new()) as SharedMiddleware,
    ]);
    for (method, pattern) in ROUTES {
        let method: Method = method.parse().expect("valid method");
        stacked.add_route(method, pattern, noop, &[]).expect("valid pattern");
    }
    c.bench_function("dispatch_with_middleware", |b| {
        b.iter(|| black_box(stacked.dispatch(Request::get("/zoo/animals/42"))))
    });
}

criterion_group!(benches, bench_lookup, bench_dispatch);
criterion_main!(benches);

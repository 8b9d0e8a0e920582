#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use nimbus::prelude::*;
use parking_lot::Mutex;
use serde_json::{json, Value};

/// Handler that answers 200 with a fixed JSON body.
pub fn reply(body: Value) -> impl Fn(&mut RequestContext) -> HandlerResult {
    move |_: &mut RequestContext| Ok(HandlerResponse::ok(body.clone()))
}

/// Handler that echoes the bound path parameters as a JSON object.
pub fn echo_params(ctx: &mut RequestContext) -> HandlerResult {
    let params: serde_json::Map<String, Value> = ctx
        .params()
        .iter()
        .map(|(k, v)| (k.to_string(), json!(v)))
        .collect();
    Ok(HandlerResponse::ok(Value::Object(params)))
}

/// Shared event log for observing middleware order.
#[derive(Clone, Default)]
pub struct Trail(Arc<Mutex<Vec<String>>>);

impl Trail {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().push(event.into());
    }

    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.lock())
    }

    /// Middleware that records `<name>-pre` and `<name>-post` around `next`.
    pub fn layer(&self, name: &'static str) -> SharedMiddleware {
        let trail = self.clone();
        middleware_fn(move |next: BoxedHandler| {
            let trail = trail.clone();
            handler_fn(move |ctx: &mut RequestContext| {
                trail.push(format!("{name}-pre"));
                let out = next.call(ctx);
                trail.push(format!("{name}-post"));
                out
            })
        })
    }

    /// Handler that records `handler`.
    pub fn handler(&self) -> impl Fn(&mut RequestContext) -> HandlerResult {
        let trail = self.clone();
        move |_: &mut RequestContext| {
            trail.push("handler");
            Ok(HandlerResponse::no_content())
        }
    }
}

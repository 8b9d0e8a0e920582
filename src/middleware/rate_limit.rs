//! Per-client token-bucket rate limiting.
//!
//! Buckets live in a sharded `DashMap`, so clients hashed to different shards
//! never contend. A background thread evicts buckets that have been idle
//! longer than the configured TTL; it stops when [`RateLimiter::close`] runs,
//! which [`RateLimitMiddleware::install`] registers as a router cleanup.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::{Middleware, SharedMiddleware};
use crate::dispatcher::{handler_fn, BoxedHandler, RequestContext};
use crate::error::ApiError;
use crate::router::Router;

struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_update: now,
        }
    }

    fn try_acquire(&mut self, capacity: f64, refill_per_sec: f64, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_update).as_secs_f64();
        self.tokens = (self.tokens + elapsed * refill_per_sec).min(capacity);
        self.last_update = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub allowed: bool,
    /// Whole tokens left after this request.
    pub remaining: u32,
    /// Seconds until a token is available, when rejected.
    pub retry_after: Option<u64>,
}

/// Shared bucket store.
pub struct RateLimiter {
    buckets: DashMap<String, TokenBucket>,
    refill_per_sec: f64,
    burst: f64,
    idle_ttl: Duration,
    sweeper: Mutex<Option<(Sender<()>, JoinHandle<()>)>>,
}

impl RateLimiter {
    /// Allow `requests_per_sec` sustained with bursts of up to `burst`.
    /// Buckets idle for `idle_ttl` are dropped by a sweeper that runs every
    /// `sweep_every`.
    #[must_use]
    pub fn new(requests_per_sec: u32, burst: u32, idle_ttl: Duration, sweep_every: Duration) -> Arc<Self> {
        let limiter = Arc::new(Self {
            buckets: DashMap::new(),
            refill_per_sec: f64::from(requests_per_sec),
            burst: f64::from(burst.max(1)),
            idle_ttl,
            sweeper: Mutex::new(None),
        });

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let weak = Arc::downgrade(&limiter);
        let spawned = std::thread::Builder::new()
            .name("nimbus-ratelimit-sweeper".into())
            .spawn(move || loop {
                match stop_rx.recv_timeout(sweep_every) {
                    Err(RecvTimeoutError::Timeout) => match weak.upgrade() {
                        Some(limiter) => {
                            limiter.evict_idle(Instant::now());
                        }
                        None => break,
                    },
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            });
        match spawned {
            Ok(handle) => *limiter.sweeper.lock() = Some((stop_tx, handle)),
            Err(err) => warn!(error = %err, "could not start rate limiter sweeper; idle buckets will not be evicted"),
        }
        limiter
    }

    /// Check and consume one token for `key`.
    pub fn check(&self, key: &str) -> Decision {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> Decision {
        let mut bucket = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| TokenBucket::new(self.burst, now));
        let allowed = bucket.try_acquire(self.burst, self.refill_per_sec, now);
        let remaining = bucket.tokens.max(0.0).floor() as u32;
        let retry_after = (!allowed).then(|| {
            if self.refill_per_sec > 0.0 {
                ((1.0 - bucket.tokens) / self.refill_per_sec).ceil().max(1.0) as u64
            } else {
                u64::MAX
            }
        });
        Decision {
            allowed,
            remaining,
            retry_after,
        }
    }

    /// Drop buckets idle for longer than the TTL. Returns how many went.
    pub fn evict_idle(&self, now: Instant) -> usize {
        let before = self.buckets.len();
        self.buckets
            .retain(|_, b| now.saturating_duration_since(b.last_update) <= self.idle_ttl);
        let evicted = before.saturating_sub(self.buckets.len());
        if evicted > 0 {
            debug!(evicted, remaining = self.buckets.len(), "evicted idle rate limit buckets");
        }
        evicted
    }

    #[must_use]
    pub fn tracked_clients(&self) -> usize {
        self.buckets.len()
    }

    #[must_use]
    pub fn burst(&self) -> u32 {
        self.burst as u32
    }

    /// Stop the sweeper thread and wait for it. Idempotent.
    pub fn close(&self) {
        let Some((stop, handle)) = self.sweeper.lock().take() else {
            return;
        };
        drop(stop);
        if handle.join().is_err() {
            warn!("rate limiter sweeper panicked");
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sweeper.lock().is_none()
    }
}

/// Where the client key comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    /// The peer IP address.
    RemoteAddr,
    /// A request header (e.g. `X-API-Key`), falling back to the peer IP.
    Header(String),
}

/// Rejects clients that exceed their bucket with 429.
#[derive(Clone)]
pub struct RateLimitMiddleware {
    limiter: Arc<RateLimiter>,
    key: KeySource,
}

impl RateLimitMiddleware {
    #[must_use]
    pub fn new(limiter: Arc<RateLimiter>, key: KeySource) -> Self {
        Self { limiter, key }
    }

    /// Build a limiter whose sweeper is stopped when `router` shuts down.
    #[must_use]
    pub fn install(router: &Router, requests_per_sec: u32, burst: u32, key: KeySource) -> SharedMiddleware {
        let limiter = RateLimiter::new(
            requests_per_sec,
            burst,
            Duration::from_secs(600),
            Duration::from_secs(60),
        );
        let for_cleanup = Arc::clone(&limiter);
        router.register_cleanup(move || for_cleanup.close());
        Arc::new(Self::new(limiter, key))
    }

    #[must_use]
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }
}

fn client_key(ctx: &RequestContext, source: &KeySource) -> String {
    if let KeySource::Header(name) = source {
        if let Some(value) = ctx.header(name).filter(|v| !v.is_empty()) {
            return value.to_string();
        }
    }
    ctx.remote_addr()
        .map_or_else(|| "unknown".to_string(), |addr| addr.ip().to_string())
}

impl Middleware for RateLimitMiddleware {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        let limiter = Arc::clone(&self.limiter);
        let source = self.key.clone();
        handler_fn(move |ctx: &mut RequestContext| {
            let key = client_key(ctx, &source);
            let decision = limiter.check(&key);
            ctx.set_header("X-RateLimit-Limit", limiter.burst().to_string());
            ctx.set_header("X-RateLimit-Remaining", decision.remaining.to_string());
            if !decision.allowed {
                warn!(client = %key, path = %ctx.path(), "rate limit exceeded");
                if let Some(secs) = decision.retry_after {
                    ctx.set_header("Retry-After", secs.to_string());
                }
                return Err(ApiError::too_many_requests());
            }
            next.call(ctx)
        })
    }
}

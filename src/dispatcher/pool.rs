//! Recycling of [`RequestContext`] values between dispatches.
//!
//! Each thread keeps its own free list, so acquiring and releasing a context
//! never touches a lock shared with other dispatching threads.

use std::cell::RefCell;

use super::context::{Request, RequestContext};

thread_local! {
    static FREE: RefCell<Vec<RequestContext>> = const { RefCell::new(Vec::new()) };
}

/// Per-thread context pool settings.
#[derive(Debug, Clone, Copy)]
pub struct ContextPool {
    capacity: usize,
    max_map_capacity: usize,
}

impl ContextPool {
    /// `capacity` bounds the free list on each thread; zero disables pooling.
    /// Maps inside a released context that grew beyond `max_map_capacity`
    /// are reallocated.
    #[must_use]
    pub fn new(capacity: usize, max_map_capacity: usize) -> Self {
        Self {
            capacity,
            max_map_capacity,
        }
    }

    /// Take a context from this thread's free list, or build one.
    #[must_use]
    pub fn acquire(&self, request: Request) -> RequestContext {
        let pooled = if self.capacity == 0 {
            None
        } else {
            FREE.with(|free| free.borrow_mut().pop())
        };
        match pooled {
            Some(mut ctx) => {
                ctx.load(request);
                ctx
            }
            None => RequestContext::new(request),
        }
    }

    /// Reset `ctx` and return it to this thread's free list if there is room.
    pub fn release(&self, mut ctx: RequestContext) {
        if self.capacity == 0 {
            return;
        }
        ctx.reset(self.max_map_capacity);
        FREE.with(|free| {
            let mut free = free.borrow_mut();
            if free.len() < self.capacity {
                free.push(ctx);
            }
        });
    }

    /// Number of idle contexts on the calling thread.
    #[must_use]
    pub fn idle(&self) -> usize {
        FREE.with(|free| free.borrow().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_recycles_reset_contexts() {
        let pool = ContextPool::new(4, 32);
        let mut ctx = pool.acquire(Request::get("/first?x=1"));
        ctx.set("leftover", 1_u8);
        ctx.set_header("x-leftover", "1");
        pool.release(ctx);
        assert_eq!(pool.idle(), 1);

        let ctx = pool.acquire(Request::get("/second"));
        assert_eq!(pool.idle(), 0);
        assert_eq!(ctx.path(), "/second");
        assert!(ctx.query_string().is_empty());
        assert!(ctx.get::<u8>("leftover").is_none());
        assert!(ctx.response_headers().is_empty());
        pool.release(ctx);
    }

    #[test]
    fn test_pool_is_bounded() {
        let pool = ContextPool::new(2, 32);
        let contexts: Vec<_> = (0..4).map(|_| pool.acquire(Request::get("/"))).collect();
        for ctx in contexts {
            pool.release(ctx);
        }
        assert_eq!(pool.idle(), 2);
    }

    #[test]
    fn test_zero_capacity_disables_pooling() {
        std::thread::spawn(|| {
            let pool = ContextPool::new(0, 32);
            let ctx = pool.acquire(Request::get("/"));
            pool.release(ctx);
            assert_eq!(pool.idle(), 0);
        })
        .join()
        .unwrap();
    }
}

//! Work queue feeding the reconciler

pub mod rate_limit;
pub mod work_queue;

use async_trait::async_trait;
use std::time::Duration;

pub use rate_limit::{controller_rate_limiter, RateLimitConfig, RateLimiter};
pub use work_queue::RateLimitingQueue;

/// Queue of keys awaiting reconciliation
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Queue a key unless it is already pending
    fn add(&self, key: &str);

    /// Queue a key once the delay elapses
    fn add_after(&self, key: &str, delay: Duration);

    /// Queue a key after its rate-limited backoff
    fn add_rate_limited(&self, key: &str);

    /// Wait for the next key. `None` once the queue is shut down.
    async fn get(&self) -> Option<String>;

    /// Mark a key returned by `get` as finished
    fn done(&self, key: &str);

    /// Reset the key's backoff
    fn forget(&self, key: &str);

    /// Number of rate-limited requeues since the key was last forgotten
    fn num_requeues(&self, key: &str) -> u32;

    /// Number of keys waiting
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop handing out keys and ignore further adds
    fn shut_down(&self);

    fn is_shutting_down(&self) -> bool;
}

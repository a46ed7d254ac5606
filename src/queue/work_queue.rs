use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::trace;

use crate::queue::rate_limit::{controller_rate_limiter, RateLimitConfig, RateLimiter};
use crate::queue::WorkQueue;

/// Deduplicating, rate-limited work queue of string keys.
///
/// A key is queued at most once. A key added while it is being processed is
/// held back and queued again when the worker calls [`WorkQueue::done`], so no
/// two workers ever hold the same key.
#[derive(Clone)]
pub struct RateLimitingQueue {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<State>,
    notify: Notify,
    limiter: Box<dyn RateLimiter>,
}

#[derive(Default)]
struct State {
    /// Keys in processing order
    queue: VecDeque<String>,
    /// Keys that need processing
    dirty: HashSet<String>,
    /// Keys handed out and not yet done
    processing: HashSet<String>,
    shutting_down: bool,
}

impl RateLimitingQueue {
    /// Create a queue with the given rate limiter
    pub fn new(limiter: Box<dyn RateLimiter>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                notify: Notify::new(),
                limiter,
            }),
        }
    }

    /// Create a queue with the default controller rate limiter
    pub fn with_config(config: &RateLimitConfig) -> Self {
        Self::new(Box::new(controller_rate_limiter(config)))
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Whether the key is currently handed out to a worker
    pub fn is_processing(&self, key: &str) -> bool {
        self.state().processing.contains(key)
    }
}

#[async_trait]
impl WorkQueue for RateLimitingQueue {
    fn add(&self, key: &str) {
        {
            let mut state = self.state();
            if state.shutting_down || state.dirty.contains(key) {
                return;
            }
            state.dirty.insert(key.to_string());
            if state.processing.contains(key) {
                trace!("Key {} is being processed, deferring", key);
                return;
            }
            state.queue.push_back(key.to_string());
        }
        self.inner.notify.notify_one();
    }

    fn add_after(&self, key: &str, delay: Duration) {
        if self.is_shutting_down() {
            return;
        }
        if delay.is_zero() {
            self.add(key);
            return;
        }

        let queue = self.clone();
        let key = key.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(&key);
        });
    }

    fn add_rate_limited(&self, key: &str) {
        let delay = self.inner.limiter.when(key);
        trace!("Requeueing {} after {:?}", key, delay);
        self.add_after(key, delay);
    }

    async fn get(&self) -> Option<String> {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a concurrent add or shutdown is not missed
            notified.as_mut().enable();

            {
                let mut state = self.state();
                if state.shutting_down {
                    return None;
                }
                if let Some(key) = state.queue.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    return Some(key);
                }
            }

            notified.await;
        }
    }

    fn done(&self, key: &str) {
        let requeued = {
            let mut state = self.state();
            state.processing.remove(key);
            if state.dirty.contains(key) && !state.shutting_down {
                state.queue.push_back(key.to_string());
                true
            } else {
                false
            }
        };
        if requeued {
            self.inner.notify.notify_one();
        }
    }

    fn forget(&self, key: &str) {
        self.inner.limiter.forget(key);
    }

    fn num_requeues(&self, key: &str) -> u32 {
        self.inner.limiter.num_requeues(key)
    }

    fn len(&self) -> usize {
        self.state().queue.len()
    }

    fn shut_down(&self) {
        self.state().shutting_down = true;
        self.inner.notify.notify_waiters();
    }

    fn is_shutting_down(&self) -> bool {
        self.state().shutting_down
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::rate_limit::ItemExponentialFailureRateLimiter;

    fn queue() -> RateLimitingQueue {
        RateLimitingQueue::new(Box::new(ItemExponentialFailureRateLimiter::new(
            Duration::from_millis(1),
            Duration::from_millis(20),
        )))
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = queue();
        queue.add("a");
        queue.add("b");
        queue.add("c");

        assert_eq!(queue.get().await.as_deref(), Some("a"));
        assert_eq!(queue.get().await.as_deref(), Some("b"));
        assert_eq!(queue.get().await.as_deref(), Some("c"));
        assert_eq!(queue.len(), 0);
    }

    #[tokio::test]
    async fn test_deduplicates_queued_keys() {
        let queue = queue();
        queue.add("a");
        queue.add("a");
        queue.add("b");
        queue.add("a");

        assert_eq!(queue.len(), 2);
    }

    #[tokio::test]
    async fn test_key_added_while_processing_is_deferred() {
        let queue = queue();
        queue.add("a");
        let key = queue.get().await.unwrap();
        assert!(queue.is_processing(&key));

        queue.add("a");
        queue.add("a");
        assert_eq!(queue.len(), 0, "must not be handed to a second worker");

        queue.done(&key);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.get().await.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_done_without_readd_does_not_requeue() {
        let queue = queue();
        queue.add("a");
        let key = queue.get().await.unwrap();
        queue.done(&key);

        assert_eq!(queue.len(), 0);
        assert!(!queue.is_processing("a"));
    }

    #[tokio::test]
    async fn test_get_waits_for_add() {
        let queue = queue();
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.get().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.add("late");

        let key = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(key.as_deref(), Some("late"));
    }

    #[tokio::test]
    async fn test_shutdown_releases_waiters_and_ignores_adds() {
        let queue = queue();
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let queue = queue.clone();
                tokio::spawn(async move { queue.get().await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.shut_down();

        for waiter in waiters {
            let key = tokio::time::timeout(Duration::from_secs(1), waiter)
                .await
                .unwrap()
                .unwrap();
            assert!(key.is_none());
        }

        queue.add("a");
        assert_eq!(queue.len(), 0);
        assert!(queue.get().await.is_none());
    }

    #[tokio::test]
    async fn test_rate_limited_add_arrives_later() {
        let queue = queue();
        queue.add_rate_limited("a");
        queue.add_rate_limited("a");
        assert_eq!(queue.num_requeues("a"), 2);

        let key = tokio::time::timeout(Duration::from_secs(1), queue.get())
            .await
            .unwrap();
        assert_eq!(key.as_deref(), Some("a"));

        queue.forget("a");
        assert_eq!(queue.num_requeues("a"), 0);
    }

    #[tokio::test]
    async fn test_add_after_delays() {
        let queue = queue();
        queue.add_after("a", Duration::from_millis(30));
        assert_eq!(queue.len(), 0);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(queue.len(), 1);
    }
}

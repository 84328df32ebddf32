//! Fixed-window token bucket limiter.
//!
//! Each distinct client key owns a [`Visitor`] holding the tokens left in its
//! current window. When a window elapses the visitor is refilled to full
//! capacity in one step; there is no gradual leak. Visitors that have not been
//! seen for the retention horizon are removed by a periodic sweep so spoofed
//! or one-off keys cannot grow the map without bound.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::observability::metrics;
use crate::security::clock::{Clock, SystemClock};

/// Default fixed window length.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Visitors unseen for this long are dropped by the eviction sweep.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(60 * 60);

/// Default period between eviction sweeps.
pub const DEFAULT_EVICTION_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Per-key limiter state.
#[derive(Debug, Clone)]
pub struct Visitor {
    pub key: String,
    /// Tokens left in the current window, always `<= capacity`.
    pub tokens: u32,
    pub last_seen: Instant,
    pub window_reset_at: Instant,
}

impl Visitor {
    fn new(key: &str, capacity: u32, now: Instant, window: Duration) -> Self {
        Self {
            key: key.to_string(),
            tokens: capacity,
            last_seen: now,
            window_reset_at: now + window,
        }
    }

    /// Refill if the window has elapsed, then try to take one token.
    fn try_acquire(&mut self, capacity: u32, window: Duration, now: Instant) -> bool {
        if now >= self.window_reset_at {
            self.tokens = capacity;
            self.window_reset_at = now + window;
        }
        self.last_seen = now;

        if self.tokens > 0 {
            self.tokens -= 1;
            true
        } else {
            false
        }
    }
}

/// Outcome of a single admission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    /// Tokens left after this attempt.
    pub remaining: u32,
    /// Time until the visitor's window refills.
    pub reset_after: Duration,
}

/// A single limiter tier: one map of visitors behind one mutex.
///
/// The check and the decrement happen under the same lock, so two concurrent
/// requests can never both consume the last remaining token.
#[derive(Debug)]
pub struct TokenBucketLimiter {
    label: &'static str,
    capacity: u32,
    window: Duration,
    retention: Duration,
    visitors: Mutex<HashMap<String, Visitor>>,
    clock: Arc<dyn Clock>,
}

impl TokenBucketLimiter {
    /// Create a limiter granting `capacity` requests per `window`.
    pub fn new(label: &'static str, capacity: u32, window: Duration) -> Self {
        Self {
            label,
            capacity,
            window,
            retention: DEFAULT_RETENTION,
            visitors: Mutex::new(HashMap::new()),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Returns true if `key` may proceed, consuming one token.
    pub fn allow(&self, key: &str) -> bool {
        self.check(key).allowed
    }

    /// Like [`allow`](Self::allow) but reports remaining tokens and reset time.
    pub fn check(&self, key: &str) -> RateDecision {
        let now = self.clock.now();
        let mut visitors = self.visitors.lock().expect("rate limiter mutex poisoned");

        let visitor = visitors
            .entry(key.to_string())
            .or_insert_with(|| Visitor::new(key, self.capacity, now, self.window));

        let allowed = visitor.try_acquire(self.capacity, self.window, now);
        RateDecision {
            allowed,
            remaining: visitor.tokens,
            reset_after: visitor.window_reset_at.saturating_duration_since(now),
        }
    }

    /// Remove every visitor unseen for longer than the retention horizon.
    ///
    /// Returns the number of visitors removed.
    pub fn evict_stale(&self) -> usize {
        let now = self.clock.now();
        let retention = self.retention;

        let (removed, remaining) = {
            let mut visitors = self.visitors.lock().expect("rate limiter mutex poisoned");
            let before = visitors.len();
            visitors.retain(|_, v| now.saturating_duration_since(v.last_seen) <= retention);
            (before - visitors.len(), visitors.len())
        };

        metrics::record_visitors(self.label, remaining);
        if removed > 0 {
            metrics::record_visitors_evicted(self.label, removed);
            tracing::debug!(tier = self.label, removed, remaining, "Evicted stale visitors");
        }
        removed
    }

    /// Snapshot of a visitor, if one exists for `key`.
    pub fn visitor(&self, key: &str) -> Option<Visitor> {
        self.visitors
            .lock()
            .expect("rate limiter mutex poisoned")
            .get(key)
            .cloned()
    }

    pub fn visitor_count(&self) -> usize {
        self.visitors.lock().expect("rate limiter mutex poisoned").len()
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Run [`evict_stale`](Self::evict_stale) every `every` until shutdown.
    pub fn spawn_eviction(
        self: Arc<Self>,
        every: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; nothing is stale yet.
            ticker.tick().await;

            tracing::info!(tier = self.label, interval_secs = every.as_secs(), "Visitor eviction started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.evict_stale();
                    }
                    _ = shutdown.recv() => {
                        tracing::info!(tier = self.label, "Visitor eviction stopped");
                        break;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::clock::ManualClock;

    fn limiter(capacity: u32) -> (TokenBucketLimiter, ManualClock) {
        let clock = ManualClock::default();
        let limiter = TokenBucketLimiter::new("test", capacity, DEFAULT_WINDOW)
            .with_clock(Arc::new(clock.clone()));
        (limiter, clock)
    }

    #[test]
    fn allows_up_to_capacity_per_window() {
        let (limiter, _clock) = limiter(3);

        assert!(limiter.allow("ip:1.2.3.4"));
        assert!(limiter.allow("ip:1.2.3.4"));
        assert!(limiter.allow("ip:1.2.3.4"));
        assert!(!limiter.allow("ip:1.2.3.4"));
        assert!(!limiter.allow("ip:1.2.3.4"));
    }

    #[test]
    fn keys_are_independent() {
        let (limiter, _clock) = limiter(1);

        assert!(limiter.allow("user:1"));
        assert!(!limiter.allow("user:1"));
        assert!(limiter.allow("user:2"));
    }

    #[test]
    fn window_boundary_refills_completely() {
        let (limiter, clock) = limiter(5);

        for _ in 0..5 {
            assert!(limiter.allow("k"));
        }
        assert!(!limiter.allow("k"));

        clock.advance(Duration::from_secs(59));
        assert!(!limiter.allow("k"));

        clock.advance(Duration::from_secs(1));
        let decision = limiter.check("k");
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 4);
        assert_eq!(decision.reset_after, DEFAULT_WINDOW);
    }

    #[test]
    fn denied_calls_still_update_last_seen() {
        let (limiter, clock) = limiter(1);

        assert!(limiter.allow("k"));
        clock.advance(Duration::from_secs(10));
        assert!(!limiter.allow("k"));

        let visitor = limiter.visitor("k").unwrap();
        assert_eq!(visitor.last_seen, clock.now());
        assert_eq!(visitor.tokens, 0);
    }

    #[test]
    fn eviction_removes_only_stale_visitors() {
        let (limiter, clock) = limiter(2);

        limiter.allow("old");
        clock.advance(Duration::from_secs(30 * 60));
        limiter.allow("fresh");
        clock.advance(Duration::from_secs(30 * 60 + 1));

        assert_eq!(limiter.evict_stale(), 1);
        assert!(limiter.visitor("old").is_none());
        assert!(limiter.visitor("fresh").is_some());
    }

    #[test]
    fn evicted_key_returns_with_full_capacity() {
        let (limiter, clock) = limiter(2);

        assert!(limiter.allow("k"));
        assert!(limiter.allow("k"));
        assert!(!limiter.allow("k"));

        clock.advance(DEFAULT_RETENTION + Duration::from_secs(1));
        assert_eq!(limiter.evict_stale(), 1);

        let decision = limiter.check("k");
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 1);
    }

    #[tokio::test]
    async fn eviction_task_stops_on_shutdown() {
        let (tx, _) = broadcast::channel(1);
        let limiter = Arc::new(TokenBucketLimiter::new("test", 1, DEFAULT_WINDOW));
        let handle = limiter.spawn_eviction(Duration::from_millis(10), tx.subscribe());

        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(()).unwrap();
        handle.await.unwrap();
    }
}

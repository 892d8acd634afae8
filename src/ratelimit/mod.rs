//! Rate limiting for gateway operations.
//!
//! Fixed-window counters keyed by caller identity (user id, or client IP for
//! anonymous callers). The first request from an identifier opens a window;
//! once the count exceeds the configured maximum the rest of the window is
//! rejected; the first request after the window elapses opens a new one.
//! Bursts of up to twice the limit are possible across a window boundary.
//!
//! # Configuration
//!
//! - `CREDGATE_RATE_LIMIT_WINDOW_SECONDS`: Window length (default: 60)
//! - `CREDGATE_RATE_LIMIT_MAX_REQUESTS`: Requests allowed per window (default: 60)

pub mod store;

pub use store::{InMemoryRateLimitStore, RateLimitEntry, RateLimitStore};

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::RateLimitConfig;

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Requests left in the current window
    pub remaining: u32,
    /// Seconds until the current window closes (0 when allowed)
    pub retry_after_secs: u64,
}

/// Fixed-window rate limiter over an injected [`RateLimitStore`].
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    max_requests: u32,
    window: Duration,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("max_requests", &self.max_requests)
            .field("window", &self.window)
            .finish()
    }
}

impl RateLimiter {
    /// Create a new rate limiter.
    ///
    /// # Arguments
    /// - `store`: Counter storage
    /// - `max_requests`: Requests allowed per window
    /// - `window`: Window length
    pub fn new(store: Arc<dyn RateLimitStore>, max_requests: u32, window: Duration) -> Self {
        Self { store, max_requests, window }
    }

    /// Rate limiter with a process-local store.
    pub fn in_memory(max_requests: u32, window: Duration) -> Self {
        Self::new(Arc::new(InMemoryRateLimitStore::new()), max_requests, window)
    }

    pub fn from_config(config: &RateLimitConfig, store: Arc<dyn RateLimitStore>) -> Self {
        Self::new(store, config.max_requests, config.window())
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Whether a request from `identifier` is admitted right now.
    pub async fn allow(&self, identifier: &str) -> bool {
        self.check(identifier).await.allowed
    }

    /// Count a request from `identifier` and decide whether it is admitted.
    pub async fn check(&self, identifier: &str) -> RateLimitDecision {
        self.check_at(identifier, Instant::now()).await
    }

    /// [`check`](Self::check) with an explicit clock reading.
    pub async fn check_at(&self, identifier: &str, now: Instant) -> RateLimitDecision {
        let entry = self.store.increment(identifier, now, self.window).await;

        if entry.count <= self.max_requests {
            let remaining = self.max_requests - entry.count;
            debug!(identifier = %identifier, remaining, "Rate limit check passed");
            return RateLimitDecision { allowed: true, remaining, retry_after_secs: 0 };
        }

        let elapsed = now.saturating_duration_since(entry.window_start);
        let left = self.window.saturating_sub(elapsed);
        let retry_after_secs = left.as_secs_f64().ceil().max(1.0) as u64;

        warn!(
            identifier = %identifier,
            count = entry.count,
            retry_after_seconds = retry_after_secs,
            "Rate limit exceeded"
        );
        RateLimitDecision { allowed: false, remaining: 0, retry_after_secs }
    }

    /// Clear the counter for `identifier`.
    pub async fn reset(&self, identifier: &str) {
        self.store.reset(identifier).await;
    }

    /// Drop elapsed windows from the store.
    pub async fn prune(&self) -> usize {
        self.store.prune(Instant::now(), self.window).await
    }

    /// Periodically prune the store until the returned handle is aborted.
    pub fn spawn_pruner(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let limiter = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = limiter.prune().await;
                if removed > 0 {
                    debug!(removed, "Pruned expired rate limit windows");
                }
            }
        })
    }
}

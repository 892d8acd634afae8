//! Counter storage for the fixed-window rate limiter.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Counter state for one identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitEntry {
    /// Requests seen in the current window, including this one
    pub count: u32,
    /// When the current window opened
    pub window_start: Instant,
    /// When the most recent request arrived
    pub last_request: Instant,
}

impl RateLimitEntry {
    fn open(now: Instant) -> Self {
        Self { count: 1, window_start: now, last_request: now }
    }

    /// Whether the window that opened at `window_start` has elapsed at `now`.
    pub fn is_expired(&self, now: Instant, window: Duration) -> bool {
        now.saturating_duration_since(self.window_start) >= window
    }
}

/// Storage for rate-limit counters.
///
/// `increment` must be atomic per identifier: the read-increment-write
/// sequence cannot interleave with another request for the same identifier.
/// An in-process map is enough for a single instance; a shared counter
/// service gives a global limit across instances.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Count one request from `identifier` and return the updated entry.
    ///
    /// Opens a new window with `count == 1` when there is no entry or the
    /// previous window has elapsed.
    async fn increment(&self, identifier: &str, now: Instant, window: Duration) -> RateLimitEntry;

    /// Forget the counter for `identifier`.
    async fn reset(&self, identifier: &str);

    /// Drop entries whose window has elapsed. Returns how many were removed.
    async fn prune(&self, now: Instant, window: Duration) -> usize;
}

/// Process-local counter map.
#[derive(Debug, Default)]
pub struct InMemoryRateLimitStore {
    entries: Mutex<HashMap<String, RateLimitEntry>>,
}

impl InMemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of identifiers currently tracked.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn increment(&self, identifier: &str, now: Instant, window: Duration) -> RateLimitEntry {
        let mut entries = self.entries.lock().await;
        let entry = entries
            .entry(identifier.to_string())
            .and_modify(|entry| {
                if entry.is_expired(now, window) {
                    *entry = RateLimitEntry::open(now);
                } else {
                    entry.count = entry.count.saturating_add(1);
                    entry.last_request = now;
                }
            })
            .or_insert_with(|| RateLimitEntry::open(now));
        *entry
    }

    async fn reset(&self, identifier: &str) {
        self.entries.lock().await.remove(identifier);
    }

    async fn prune(&self, now: Instant, window: Duration) -> usize {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now, window));
        before - entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_increment_opens_and_counts() {
        let store = InMemoryRateLimitStore::new();
        let now = Instant::now();

        assert_eq!(store.increment("10.0.0.1", now, WINDOW).await.count, 1);
        assert_eq!(store.increment("10.0.0.1", now + Duration::from_secs(1), WINDOW).await.count, 2);

        let reopened = store.increment("10.0.0.1", now + WINDOW, WINDOW).await;
        assert_eq!(reopened.count, 1);
        assert_eq!(reopened.window_start, now + WINDOW);
    }

    #[tokio::test]
    async fn test_reset_forgets_identifier() {
        let store = InMemoryRateLimitStore::new();
        let now = Instant::now();
        store.increment("user-1", now, WINDOW).await;
        store.increment("user-1", now, WINDOW).await;
        store.reset("user-1").await;
        assert_eq!(store.increment("user-1", now, WINDOW).await.count, 1);
    }

    #[tokio::test]
    async fn test_prune_drops_expired_windows() {
        let store = InMemoryRateLimitStore::new();
        let now = Instant::now();
        store.increment("old", now, WINDOW).await;
        store.increment("fresh", now + Duration::from_secs(30), WINDOW).await;

        let removed = store.prune(now + Duration::from_secs(61), WINDOW).await;
        assert_eq!(removed, 1);
        assert_eq!(store.len().await, 1);
    }
}

use std::time::Instant;

use dashmap::DashMap;

/// Milliseconds on a monotonic clock anchored at construction.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub fn now_ms(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Presence: token -> last-seen (monotonic ms).
///
/// Entries are only removed by `remove` (logout) or an explicit `sweep`;
/// a stale token stops counting as active but stays in memory until then.
#[derive(Default)]
pub struct PresenceTracker {
    last_seen: DashMap<String, u64>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self {
            last_seen: DashMap::new(),
        }
    }

    /// Create or refresh `token` at `now_ms`.
    pub fn touch(&self, token: &str, now_ms: u64) {
        if let Some(mut seen) = self.last_seen.get_mut(token) {
            *seen = now_ms;
            return;
        }
        self.last_seen.insert(token.to_string(), now_ms);
    }

    pub fn remove(&self, token: &str) -> bool {
        self.last_seen.remove(token).is_some()
    }

    /// Tokens with `now_ms - last_seen <= window_ms`. O(n) scan, no caching.
    pub fn count_active(&self, window_ms: u64, now_ms: u64) -> usize {
        self.last_seen
            .iter()
            .filter(|e| now_ms.saturating_sub(*e.value()) <= window_ms)
            .count()
    }

    /// Drop entries last seen before `cutoff_ms`. Returns how many went.
    pub fn sweep(&self, cutoff_ms: u64) -> usize {
        let before = self.last_seen.len();
        self.last_seen.retain(|_, seen| *seen >= cutoff_ms);
        before.saturating_sub(self.last_seen.len())
    }

    /// Tracked tokens, stale ones included.
    pub fn len(&self) -> usize {
        self.last_seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_seen.is_empty()
    }
}

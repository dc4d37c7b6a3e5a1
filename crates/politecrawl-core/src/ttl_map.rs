use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

/// Capacity at which [`NextFetchMap`] starts evicting to make room.
pub const CAPACITY: usize = 10_000;

/// How long an entry may sit idle before a read treats it as absent.
///
/// 10 seconds is comfortably longer than `1/QPS` for any `QPS >= 0.1`,
/// so a host this map has forgotten about was genuinely idle rather
/// than mid-spacing.
pub const TTL: Duration = Duration::from_secs(10);

struct Entry {
    next_fetch: Instant,
    updated_at: Instant,
}

/// Bounded map from host to the earliest instant a fetch for that host
/// is next permitted.
///
/// A host absent from the map (including one evicted or expired) is
/// immediately fetchable — that's invariant N1. The map is not
/// internally synchronized: callers serialize access to it together
/// with the priority queue, since both must be updated atomically with
/// respect to a single `get_work` admission decision.
#[derive(Default)]
pub struct NextFetchMap {
    entries: HashMap<String, Entry>,
}

impl NextFetchMap {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// How long until `host` may next be fetched, as of `now`. Zero if
    /// the host is absent or its reservation has already elapsed.
    pub fn dt(&self, host: &str, now: Instant) -> Duration {
        match self.entries.get(host) {
            Some(entry) if now.duration_since(entry.updated_at) < TTL => {
                entry.next_fetch.saturating_duration_since(now)
            }
            _ => Duration::ZERO,
        }
    }

    /// Reserves `host`'s next fetchable instant, evicting another entry
    /// first if the map is at capacity.
    pub fn reserve(&mut self, host: &str, next_fetch: Instant, now: Instant) {
        if !self.entries.contains_key(host) && self.entries.len() >= CAPACITY {
            self.evict_one(now);
        }
        self.entries.insert(
            host.to_string(),
            Entry {
                next_fetch,
                updated_at: now,
            },
        );
    }

    /// Evicts the least-recently-updated *expired* entry if one exists;
    /// otherwise evicts whichever entry has the earliest `next_fetch`,
    /// since it is either already released or the least constraining
    /// reservation to give up.
    fn evict_one(&mut self, now: Instant) {
        let expired = self
            .entries
            .iter()
            .filter(|(_, e)| now.duration_since(e.updated_at) >= TTL)
            .min_by_key(|(_, e)| e.updated_at)
            .map(|(host, _)| host.clone());

        let victim = expired.or_else(|| {
            self.entries
                .iter()
                .min_by_key(|(_, e)| e.next_fetch)
                .map(|(host, _)| host.clone())
        });

        if let Some(host) = victim {
            self.entries.remove(&host);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn absent_host_is_immediately_fetchable() {
        let map = NextFetchMap::new();
        assert_eq!(map.dt("example.com", Instant::now()), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn reserved_host_reports_remaining_wait() {
        let mut map = NextFetchMap::new();
        let now = Instant::now();
        map.reserve("example.com", now + Duration::from_secs(2), now);
        assert_eq!(map.dt("example.com", now), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn entry_expires_after_ttl_of_inactivity() {
        let mut map = NextFetchMap::new();
        let now = Instant::now();
        map.reserve("example.com", now + Duration::from_millis(1), now);
        tokio::time::advance(TTL + Duration::from_secs(1)).await;
        assert_eq!(map.dt("example.com", Instant::now()), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn eviction_prefers_expired_entries_over_live_ones() {
        let mut map = NextFetchMap::new();
        let t0 = Instant::now();
        map.reserve("stale.example", t0 + Duration::from_secs(100), t0);

        tokio::time::advance(TTL + Duration::from_secs(1)).await;
        let t1 = Instant::now();
        // Fill to capacity with fresh entries; "stale.example" is expired
        // but still physically present until something forces an eviction.
        for i in 0..(CAPACITY - 1) {
            map.reserve(&format!("host{i}.example"), t1 + Duration::from_secs(1), t1);
        }
        assert_eq!(map.len(), CAPACITY);

        map.reserve("new.example", t1 + Duration::from_secs(1), t1);
        assert!(map.dt("stale.example", t1) == Duration::ZERO);
        assert_eq!(map.len(), CAPACITY);
    }
}

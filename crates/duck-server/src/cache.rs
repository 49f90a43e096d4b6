//! Size and age bounded DashMap caches (weather samples, journey results).

use dashmap::DashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

pub trait CacheEntry {
    fn stored_at(&self) -> Instant;

    fn age(&self) -> Duration {
        self.stored_at().elapsed()
    }
}

/// Drop entries older than `max_age`, then the oldest ones until at most
/// `max_entries` remain.
pub fn prune_cache<K, V>(cache: &DashMap<K, V>, max_entries: usize, max_age: Duration)
where
    K: Clone + Eq + Hash,
    V: CacheEntry,
{
    let now = Instant::now();
    let mut entries: Vec<(K, Instant)> = cache
        .iter()
        .map(|entry| (entry.key().clone(), entry.value().stored_at()))
        .collect();

    entries.retain(|(key, stored_at)| {
        if now.saturating_duration_since(*stored_at) > max_age {
            cache.remove(key);
            false
        } else {
            true
        }
    });

    if cache.len() <= max_entries {
        return;
    }

    entries.sort_by_key(|(_, stored_at)| *stored_at);
    for (key, _) in entries {
        if cache.len() <= max_entries {
            break;
        }
        cache.remove(&key);
    }
}

//! Quote Cache
//!
//! Bounded TTL memo store for validated quotes. Expiry is lazy: entries are
//! only checked when read, and expired entries are only removed when a write
//! finds the cache full.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use super::Quote;

/// Cache key. Fee routing is deliberately not part of it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QuoteKey {
    pub input_mint: String,
    pub output_mint: String,
    pub amount: u64,
    pub slippage_bps: u16,
}

impl QuoteKey {
    pub fn new(input_mint: &str, output_mint: &str, amount: u64, slippage_bps: u16) -> Self {
        Self {
            input_mint: input_mint.to_string(),
            output_mint: output_mint.to_string(),
            amount,
            slippage_bps,
        }
    }
}

#[derive(Debug, Clone)]
struct CachedQuote {
    quote: Quote,
    created_at: Instant,
    expires_at: Instant,
    /// Insertion order, used to find the oldest entries
    sequence: u64,
}

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<QuoteKey, CachedQuote>,
    next_sequence: u64,
}

/// TTL quote cache with capacity-driven batch eviction
#[derive(Debug)]
pub struct QuoteCache {
    inner: Mutex<CacheInner>,
    capacity: usize,
}

impl QuoteCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner::default()),
            capacity: capacity.max(1),
        }
    }

    /// Cached quote, only while `now < expiry`
    pub fn get(&self, key: &QuoteKey) -> Option<Quote> {
        let inner = self.inner.lock();
        inner
            .entries
            .get(key)
            .filter(|entry| Instant::now() < entry.expires_at)
            .map(|entry| entry.quote.clone())
    }

    /// Insert or overwrite, evicting when the cache is full
    pub fn set(&self, key: QuoteKey, quote: Quote, ttl: Duration) {
        let mut inner = self.inner.lock();
        let now = Instant::now();

        if !inner.entries.contains_key(&key) && inner.entries.len() >= self.capacity {
            let before = inner.entries.len();
            inner.entries.retain(|_, entry| now < entry.expires_at);
            let expired = before - inner.entries.len();

            if inner.entries.len() >= self.capacity {
                let len = inner.entries.len();
                let to_evict = (len / 2).max(len + 1 - self.capacity);

                let mut by_age: Vec<(u64, QuoteKey)> = inner
                    .entries
                    .iter()
                    .map(|(k, entry)| (entry.sequence, k.clone()))
                    .collect();
                by_age.sort_unstable_by_key(|(sequence, _)| *sequence);

                for (_, old_key) in by_age.into_iter().take(to_evict) {
                    inner.entries.remove(&old_key);
                }
                debug!(expired, evicted = to_evict, "Quote cache full, evicted oldest entries");
            } else {
                debug!(expired, "Quote cache full, purged expired entries");
            }
        }

        let sequence = inner.next_sequence;
        inner.next_sequence += 1;
        inner.entries.insert(
            key,
            CachedQuote {
                quote,
                created_at: now,
                expires_at: now + ttl,
                sequence,
            },
        );
    }

    /// Drop every expired entry
    pub fn purge_expired(&self) -> usize {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        let before = inner.entries.len();
        inner.entries.retain(|_, entry| now < entry.expires_at);
        before - inner.entries.len()
    }

    /// Age of a live entry
    pub fn age(&self, key: &QuoteKey) -> Option<Duration> {
        let inner = self.inner.lock();
        let now = Instant::now();
        inner
            .entries
            .get(key)
            .filter(|entry| now < entry.expires_at)
            .map(|entry| now.duration_since(entry.created_at))
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::sample_quote;
    use proptest::prelude::*;

    fn key(amount: u64) -> QuoteKey {
        QuoteKey::new("A", "B", amount, 50)
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_visible_until_ttl() {
        let cache = QuoteCache::new(10);
        let quote = sample_quote("A", "B", 1_000_000);
        cache.set(key(1), quote.clone(), Duration::from_secs(10));

        tokio::time::advance(Duration::from_millis(9_999)).await;
        assert_eq!(cache.get(&key(1)), Some(quote));

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(cache.get(&key(1)), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overwrite_resets_expiry() {
        let cache = QuoteCache::new(10);
        cache.set(key(1), sample_quote("A", "B", 1), Duration::from_secs(5));
        tokio::time::advance(Duration::from_secs(4)).await;
        cache.set(key(1), sample_quote("A", "B", 2), Duration::from_secs(5));
        tokio::time::advance(Duration::from_secs(4)).await;

        assert_eq!(cache.get(&key(1)).map(|q| q.in_amount), Some(2));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_cache_purges_expired_first() {
        let cache = QuoteCache::new(4);
        cache.set(key(1), sample_quote("A", "B", 1), Duration::from_secs(1));
        cache.set(key(2), sample_quote("A", "B", 2), Duration::from_secs(1));
        cache.set(key(3), sample_quote("A", "B", 3), Duration::from_secs(60));
        cache.set(key(4), sample_quote("A", "B", 4), Duration::from_secs(60));

        tokio::time::advance(Duration::from_secs(2)).await;
        cache.set(key(5), sample_quote("A", "B", 5), Duration::from_secs(60));

        assert_eq!(cache.len(), 3);
        assert!(cache.get(&key(3)).is_some());
        assert!(cache.get(&key(4)).is_some());
        assert!(cache.get(&key(5)).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_cache_evicts_oldest_half() {
        let cache = QuoteCache::new(4);
        for amount in 1..=4 {
            cache.set(key(amount), sample_quote("A", "B", amount), Duration::from_secs(60));
        }

        cache.set(key(5), sample_quote("A", "B", 5), Duration::from_secs(60));

        assert_eq!(cache.len(), 3);
        assert!(cache.get(&key(1)).is_none());
        assert!(cache.get(&key(2)).is_none());
        assert!(cache.get(&key(3)).is_some());
        assert!(cache.get(&key(5)).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_and_age() {
        let cache = QuoteCache::new(4);
        cache.set(key(1), sample_quote("A", "B", 1), Duration::from_secs(1));
        cache.set(key(2), sample_quote("A", "B", 2), Duration::from_secs(10));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.age(&key(2)), Some(Duration::from_secs(2)));
        assert_eq!(cache.age(&key(1)), None);
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }

    proptest! {
        #[test]
        fn prop_size_never_exceeds_capacity(
            capacity in 1usize..16,
            amounts in proptest::collection::vec(0u64..64, 1..200),
        ) {
            let cache = QuoteCache::new(capacity);
            for amount in amounts {
                cache.set(key(amount), sample_quote("A", "B", amount), Duration::from_secs(30));
                prop_assert!(cache.len() <= capacity);
            }
        }
    }
}

use std::{
    collections::HashMap,
    hash::Hash,
    time::{Duration, Instant},
};

/// Per-key TTL memoization for slow bus properties (OSD name, power status).
///
/// Expiry is checked lazily on access and expired entries are evicted before
/// absence is reported; there is no background sweep. A `None` ttl stores the
/// value for the lifetime of the cache.
#[derive(Default)]
pub struct TtlCache<K, V> {
    entries: HashMap<K, (V, Option<Instant>)>,
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// True iff a non-expired entry exists. Evicts an expired one.
    pub fn has(&mut self, key: &K) -> bool {
        match self.entries.get(key) {
            Some((_, None)) => true,
            Some((_, Some(expires_at))) => {
                if Instant::now() < *expires_at {
                    true
                } else {
                    self.entries.remove(key);
                    false
                }
            }
            None => false,
        }
    }

    pub fn get(&mut self, key: &K) -> Option<V> {
        if self.has(key) {
            self.entries.get(key).map(|(value, _)| value.clone())
        } else {
            None
        }
    }

    pub fn set(&mut self, key: K, value: V, ttl: Option<Duration>) {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.entries.insert(key, (value, expires_at));
    }

    pub fn remove(&mut self, key: &K) {
        self.entries.remove(key);
    }

    /// Return the live entry, or store `value` and return it.
    pub fn get_or_set(&mut self, key: K, value: V, ttl: Option<Duration>) -> V {
        self.get_or_set_with(key, ttl, || value)
    }

    /// Return the live entry, or invoke the producer and store its result.
    /// The producer is not called when a live entry exists.
    pub fn get_or_set_with(
        &mut self,
        key: K,
        ttl: Option<Duration>,
        producer: impl FnOnce() -> V,
    ) -> V {
        if let Some(value) = self.get(&key) {
            return value;
        }
        let value = producer();
        self.set(key, value.clone(), ttl);
        value
    }

    /// As `get_or_set_with`, but the producer may decline. Declined values
    /// are not cached, so the next access asks again.
    pub fn try_get_or_set_with(
        &mut self,
        key: K,
        ttl: Option<Duration>,
        producer: impl FnOnce() -> Option<V>,
    ) -> Option<V> {
        if let Some(value) = self.get(&key) {
            return Some(value);
        }
        let value = producer()?;
        self.set(key, value.clone(), ttl);
        Some(value)
    }
}

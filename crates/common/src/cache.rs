//! TTL-based caches for remote lookups.
//!
//! Expiry is checked lazily on read; there is no background sweeper. Cache
//! size is bounded by the keys callers issue, which in this system come from
//! user and marketplace activity rather than unbounded streams.

use std::{
    collections::HashMap,
    hash::Hash,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

/// Time-to-live policy for cached entries.
///
/// `Duration::ZERO` means "never expire". The dynamic form is re-evaluated on
/// every lookup so a live settings change takes effect without recreating the
/// cache.
#[derive(Clone)]
pub enum Ttl {
    Fixed(Duration),
    Dynamic(Arc<dyn Fn() -> Duration + Send + Sync>),
}

impl Ttl {
    pub fn fixed(ttl: Duration) -> Self {
        Self::Fixed(ttl)
    }

    pub fn dynamic(f: impl Fn() -> Duration + Send + Sync + 'static) -> Self {
        Self::Dynamic(Arc::new(f))
    }

    /// A TTL that never expires entries.
    pub fn never() -> Self {
        Self::Fixed(Duration::ZERO)
    }

    fn current(&self) -> Duration {
        match self {
            Self::Fixed(ttl) => *ttl,
            Self::Dynamic(f) => f(),
        }
    }
}

impl std::fmt::Debug for Ttl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fixed(ttl) => f.debug_tuple("Fixed").field(ttl).finish(),
            Self::Dynamic(_) => f.debug_tuple("Dynamic").finish(),
        }
    }
}

/// A cached value stamped with its insertion time.
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    stored_at: Instant,
}

impl<V> CacheEntry<V> {
    fn new(value: V) -> Self {
        Self {
            value,
            stored_at: Instant::now(),
        }
    }

    fn expired(&self, ttl: Duration) -> bool {
        !ttl.is_zero() && self.stored_at.elapsed() >= ttl
    }
}

/// Generic key-value cache with lazy TTL expiry.
pub struct TtlCache<K, V> {
    entries: Mutex<HashMap<K, CacheEntry<V>>>,
    ttl: Ttl,
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Ttl) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    fn locked(&self) -> MutexGuard<'_, HashMap<K, CacheEntry<V>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up a value, dropping it first if its TTL has elapsed.
    pub fn get(&self, key: &K) -> Option<V> {
        let ttl = self.ttl.current();
        let mut entries = self.locked();
        if entries.get(key).is_some_and(|e| e.expired(ttl)) {
            entries.remove(key);
            return None;
        }
        entries.get(key).map(|e| e.value.clone())
    }

    pub fn set(&self, key: K, value: V) {
        self.locked().insert(key, CacheEntry::new(value));
    }

    /// Remove one entry; returns whether it was present.
    pub fn remove(&self, key: &K) -> bool {
        self.locked().remove(key).is_some()
    }

    pub fn clear(&self) {
        self.locked().clear();
    }

    /// Number of stored entries, including any not yet lazily expired.
    pub fn len(&self) -> usize {
        self.locked().len()
    }

    pub fn is_empty(&self) -> bool {
        self.locked().is_empty()
    }
}

/// Single-slot variant for callers that only ever need the last fetched
/// result (e.g. remote update status).
pub struct SingleCache<T> {
    slot: Mutex<Option<CacheEntry<T>>>,
    ttl: Ttl,
}

impl<T: Clone> SingleCache<T> {
    pub fn new(ttl: Ttl) -> Self {
        Self {
            slot: Mutex::new(None),
            ttl,
        }
    }

    fn locked(&self) -> MutexGuard<'_, Option<CacheEntry<T>>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self) -> Option<T> {
        let ttl = self.ttl.current();
        let mut slot = self.locked();
        if slot.as_ref().is_some_and(|e| e.expired(ttl)) {
            *slot = None;
            return None;
        }
        slot.as_ref().map(|e| e.value.clone())
    }

    /// Replace the stored value wholesale.
    pub fn set(&self, value: T) {
        *self.locked() = Some(CacheEntry::new(value));
    }

    pub fn clear(&self) {
        *self.locked() = None;
    }
}

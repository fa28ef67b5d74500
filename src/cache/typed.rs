//! Named Moka cache with a typed key and value.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use moka::sync::Cache;
use tracing::debug;

use super::CacheConfig;

/// Shared handle to a bounded, optionally expiring cache.
///
/// Clones share storage. Values are cloned out on read, so keep them small
/// or wrap them in an `Arc`.
pub struct TypedCache<K, V> {
    cache: Cache<K, V>,
    name: Arc<str>,
}

impl<K, V> Clone for TypedCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            name: Arc::clone(&self.name),
        }
    }
}

impl<K, V> TypedCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(name: impl Into<Arc<str>>, config: CacheConfig) -> Self {
        let mut builder = Cache::builder().max_capacity(config.max_capacity);
        if let Some(ttl) = config.ttl {
            builder = builder.time_to_live(ttl);
        }
        if let Some(tti) = config.tti {
            builder = builder.time_to_idle(tti);
        }

        Self {
            cache: builder.build(),
            name: name.into(),
        }
    }

    pub fn insert(&self, key: K, value: V) {
        self.cache.insert(key, value);
    }

    /// Live (unexpired) value for `key`.
    pub fn get(&self, key: &K) -> Option<V> {
        self.cache.get(key)
    }

    /// Remove `key` and return what it held.
    ///
    /// Of two concurrent callers, at most one sees `Some`.
    pub fn take(&self, key: &K) -> Option<V> {
        self.cache.remove(key)
    }

    pub fn invalidate(&self, key: &K) {
        self.cache.invalidate(key);
    }

    /// Approximate; pending housekeeping is not reflected.
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Evict expired entries now.
    pub fn sweep(&self) {
        self.cache.run_pending_tasks();
        debug!("Swept {} cache, {} entries left", self.name, self.cache.entry_count());
    }
}

impl<K, V> fmt::Debug for TypedCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedCache").field("name", &self.name).finish_non_exhaustive()
    }
}

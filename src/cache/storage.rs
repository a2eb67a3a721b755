use std::fmt;
use std::hash::Hash;
use std::time::Duration;

use moka::future::Cache;

pub(crate) trait KeyType: Clone + fmt::Debug + Hash + Eq + Send + Sync + 'static {}
pub(crate) trait ValueType: Clone + fmt::Debug + Send + Sync + 'static {}

// Blanket implementations which satisfy the compiler
impl<K> KeyType for K where K: Clone + fmt::Debug + Hash + Eq + Send + Sync + 'static {}
impl<V> ValueType for V where V: Clone + fmt::Debug + Send + Sync + 'static {}

/// Bounded in-memory storage layer with write-based expiry.
#[derive(Clone)]
pub(crate) struct CacheStorage<K: KeyType, V: ValueType> {
    inner: Cache<K, V>,
}

impl<K, V> CacheStorage<K, V>
where
    K: KeyType,
    V: ValueType,
{
    pub(crate) fn new(capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub(crate) async fn get(&self, key: &K) -> Option<V> {
        self.inner.get(key).await
    }

    pub(crate) async fn insert(&self, key: K, value: V) {
        self.inner.insert(key, value).await;
    }
}

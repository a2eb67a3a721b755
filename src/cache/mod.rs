//! Deduplicating cache: a bounded TTL storage layer behind a wait map that
//! guarantees at most one load in flight per key. Concurrent callers for the
//! same key during a load observe the same in-flight load and receive its
//! result, success or failure.

use std::collections::HashMap;
use std::time::Duration;

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::sync::oneshot;
use tokio::sync::Mutex;

use self::storage::CacheStorage;
use self::storage::KeyType;
use self::storage::ValueType;

pub(crate) mod storage;

/// Raised to waiters when the leading load vanished without publishing a
/// result (only possible if the loading task panicked).
#[derive(Clone, Debug, Error)]
#[error("in-flight load was abandoned")]
pub struct Abandoned;

type WaitMap<K, V, E> = Arc<Mutex<HashMap<K, broadcast::Sender<Result<V, E>>>>>;

#[derive(Clone)]
pub(crate) struct DedupCache<K: KeyType, V: ValueType, E> {
    wait_map: WaitMap<K, V, E>,
    storage: CacheStorage<K, V>,
}

impl<K, V, E> DedupCache<K, V, E>
where
    K: KeyType,
    V: ValueType,
    E: Clone + Send + From<Abandoned> + 'static,
{
    pub(crate) fn new(capacity: u64, ttl: Duration) -> Self {
        Self {
            wait_map: Arc::new(Mutex::new(HashMap::new())),
            storage: CacheStorage::new(capacity, ttl),
        }
    }

    /// Look up `key`, returning either the cached value, a handle proving
    /// this caller is the one that must perform the load, or a subscription
    /// to a load already in flight.
    pub(crate) async fn get(&self, key: K) -> Entry<K, V, E> {
        let mut locked_wait_map = self.wait_map.lock().await;
        match locked_wait_map.get(&key) {
            Some(waiter) => {
                // Register interest in the in-flight load
                let receiver = waiter.subscribe();
                Entry {
                    inner: EntryInner::Receiver { receiver },
                }
            }
            None => {
                let (sender, _receiver) = broadcast::channel(1);
                locked_wait_map.insert(key.clone(), sender.clone());
                drop(locked_wait_map);

                if let Some(value) = self.storage.get(&key).await {
                    let mut locked_wait_map = self.wait_map.lock().await;
                    let _ = locked_wait_map.remove(&key);
                    let _ = sender.send(Ok(value.clone()));
                    return Entry {
                        inner: EntryInner::Value(value),
                    };
                }

                // When _drop_signal is dropped without the entry having
                // published a result, the sentinel task clears the wait map
                // so the key is not poisoned for later callers.
                let k = key.clone();
                let (_drop_signal, drop_sentinel) = oneshot::channel::<()>();
                let wait_map = Arc::clone(&self.wait_map);
                tokio::task::spawn(async move {
                    let _ = drop_sentinel.await;
                    let mut locked_wait_map = wait_map.lock().await;
                    let _ = locked_wait_map.remove(&k);
                });

                Entry {
                    inner: EntryInner::First {
                        key,
                        sender,
                        cache: self.clone(),
                        _drop_signal,
                    },
                }
            }
        }
    }

    async fn insert(&self, key: K, value: V) {
        self.storage.insert(key, value).await;
    }

    async fn remove_wait(&self, key: &K) {
        let mut locked_wait_map = self.wait_map.lock().await;
        let _ = locked_wait_map.remove(key);
    }
}

pub(crate) struct Entry<K: KeyType, V: ValueType, E> {
    inner: EntryInner<K, V, E>,
}

enum EntryInner<K: KeyType, V: ValueType, E> {
    First {
        key: K,
        sender: broadcast::Sender<Result<V, E>>,
        cache: DedupCache<K, V, E>,
        _drop_signal: oneshot::Sender<()>,
    },
    Receiver {
        receiver: broadcast::Receiver<Result<V, E>>,
    },
    Value(V),
}

impl<K, V, E> Entry<K, V, E>
where
    K: KeyType,
    V: ValueType,
    E: Clone + Send + From<Abandoned> + 'static,
{
    pub(crate) fn is_first(&self) -> bool {
        matches!(self.inner, EntryInner::First { .. })
    }

    /// Await the result of the load, for callers that are not first.
    pub(crate) async fn get(self) -> Result<V, E> {
        match self.inner {
            EntryInner::Value(value) => Ok(value),
            EntryInner::Receiver { mut receiver } => match receiver.recv().await {
                Ok(result) => result,
                Err(_) => Err(E::from(Abandoned)),
            },
            EntryInner::First { .. } => Err(E::from(Abandoned)),
        }
    }

    /// Cache `value` and publish it to all waiters.
    pub(crate) async fn insert(self, value: V) {
        if let EntryInner::First {
            key,
            sender,
            cache,
            _drop_signal,
        } = self.inner
        {
            cache.insert(key.clone(), value.clone()).await;
            cache.remove_wait(&key).await;
            let _ = sender.send(Ok(value));
        }
    }

    /// Publish `value` to all waiters without caching it. Used for negative
    /// results that must be re-checked on the next lookup.
    pub(crate) async fn send(self, value: V) {
        if let EntryInner::First {
            key, sender, cache, ..
        } = self.inner
        {
            cache.remove_wait(&key).await;
            let _ = sender.send(Ok(value));
        }
    }

    /// Publish a load failure to all waiters. Failures are never cached: the
    /// next lookup for the key triggers a fresh load.
    pub(crate) async fn error(self, error: E) {
        if let EntryInner::First {
            key, sender, cache, ..
        } = self.inner
        {
            cache.remove_wait(&key).await;
            let _ = sender.send(Err(error));
        }
    }
}

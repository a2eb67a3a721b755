use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::cache::DedupCache;
use crate::definition::AppDefinition;
use crate::error::CacheLoadError;
use crate::store::StoreError;

/// Backing store of application-definition documents, keyed by uri.
#[async_trait]
pub trait DefinitionSource: Send + Sync {
    /// Fetch the stored definition document for `uri`, or `None` if no such
    /// application exists.
    async fn fetch(&self, uri: &str) -> Result<Option<Value>, StoreError>;
}

/// Sizing and expiry of the application cache.
#[derive(Clone, Debug)]
pub struct CacheConfig {
    pub capacity: u64,
    /// Write-based expiry window: a cached definition is reloaded on the
    /// first lookup after this much time has passed since it was stored.
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 512,
            ttl: Duration::from_secs(1),
        }
    }
}

/// Loads, compiles and caches application definitions by uri.
///
/// At most one load is in flight per uri; concurrent callers for the same
/// uri await that load and share its outcome. Load failures and unknown uris
/// are never cached, so the next lookup retries.
#[derive(Clone)]
pub struct AppCache {
    cache: DedupCache<String, Option<Arc<AppDefinition>>, CacheLoadError>,
    source: Arc<dyn DefinitionSource>,
}

impl AppCache {
    pub fn new(source: Arc<dyn DefinitionSource>, config: CacheConfig) -> Self {
        Self {
            cache: DedupCache::new(config.capacity, config.ttl),
            source,
        }
    }

    /// Get the compiled definition for `uri`, loading it if necessary.
    ///
    /// `Ok(None)` means no such application; callers treat it as a client
    /// error, not a system fault.
    pub async fn get(&self, uri: &str) -> Result<Option<Arc<AppDefinition>>, CacheLoadError> {
        let entry = self.cache.get(uri.to_string()).await;
        if !entry.is_first() {
            return entry.get().await;
        }

        // The load runs detached so that it completes even if this caller is
        // cancelled; every waiter on the entry still gets a result.
        let source = Arc::clone(&self.source);
        let uri = uri.to_string();
        let task = tokio::task::spawn(async move {
            let outcome = load(source.as_ref(), &uri).await;
            match &outcome {
                Ok(Some(definition)) => entry.insert(Some(Arc::clone(definition))).await,
                Ok(None) => entry.send(None).await,
                Err(err) => entry.error(err.clone()).await,
            }
            outcome
        });
        match task.await {
            Ok(outcome) => outcome,
            Err(_) => Err(CacheLoadError::Abandoned(crate::cache::Abandoned)),
        }
    }
}

async fn load(
    source: &dyn DefinitionSource,
    uri: &str,
) -> Result<Option<Arc<AppDefinition>>, CacheLoadError> {
    let document = source
        .fetch(uri)
        .await
        .map_err(|err| CacheLoadError::Retrieval {
            reason: err.to_string(),
        })?;
    match document {
        None => {
            tracing::debug!(%uri, "no application definition found");
            Ok(None)
        }
        Some(document) => AppDefinition::from_document(&document)
            .map(|definition| Some(Arc::new(definition)))
            .map_err(|err| CacheLoadError::Invalid(Arc::new(err))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;
    use std::sync::Mutex;

    /// Definition source counting loads, with a mutable stored document.
    struct CountingSource {
        loads: AtomicUsize,
        document: Mutex<Option<Value>>,
    }

    impl CountingSource {
        fn new(document: Option<Value>) -> Self {
            Self {
                loads: AtomicUsize::new(0),
                document: Mutex::new(document),
            }
        }

        fn set_document(&self, document: Option<Value>) {
            *self.document.lock().unwrap() = document;
        }
    }

    #[async_trait]
    impl DefinitionSource for CountingSource {
        async fn fetch(&self, _uri: &str) -> Result<Option<Value>, StoreError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            // keep the load in flight long enough for callers to pile up
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(self.document.lock().unwrap().clone())
        }
    }

    fn definition(description: &str) -> Value {
        json!({
            "descriptor": { "name": "app1", "description": description },
            "schema": "type Query { hello: String }",
            "mappings": {},
        })
    }

    #[tokio::test]
    async fn concurrent_gets_trigger_exactly_one_load() {
        let source = Arc::new(CountingSource::new(Some(definition("v1"))));
        let cache = AppCache::new(Arc::clone(&source) as Arc<dyn DefinitionSource>, CacheConfig::default());

        let lookups = (0..16).map(|_| {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get("app1").await })
        });
        let results = futures::future::join_all(lookups).await;

        assert_eq!(source.loads.load(Ordering::SeqCst), 1);
        let definitions: Vec<_> = results
            .into_iter()
            .map(|result| result.unwrap().unwrap().unwrap())
            .collect();
        for definition in &definitions {
            assert!(Arc::ptr_eq(&definitions[0], definition));
        }
    }

    #[tokio::test]
    async fn expired_entries_reload_the_latest_document() {
        let source = Arc::new(CountingSource::new(Some(definition("v1"))));
        let cache = AppCache::new(
            Arc::clone(&source) as Arc<dyn DefinitionSource>,
            CacheConfig {
                capacity: 8,
                ttl: Duration::from_millis(50),
            },
        );

        let before = cache.get("app1").await.unwrap().unwrap();
        assert_eq!(before.descriptor.description, "v1");

        source.set_document(Some(definition("v2")));
        tokio::time::sleep(Duration::from_millis(120)).await;

        let after = cache.get("app1").await.unwrap().unwrap();
        assert_eq!(after.descriptor.description, "v2");
        // the old definition object is still usable by in-flight requests
        assert_eq!(before.descriptor.description, "v1");
    }

    #[tokio::test]
    async fn unknown_application_is_none_and_not_cached() {
        let source = Arc::new(CountingSource::new(None));
        let cache = AppCache::new(Arc::clone(&source) as Arc<dyn DefinitionSource>, CacheConfig::default());

        assert!(cache.get("nonexistent").await.unwrap().is_none());
        assert!(cache.get("nonexistent").await.unwrap().is_none());
        // absent applications are re-checked on every lookup
        assert_eq!(source.loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn load_failures_do_not_poison_the_key() {
        let source = Arc::new(CountingSource::new(Some(json!({"descriptor": {}}))));
        let cache = AppCache::new(Arc::clone(&source) as Arc<dyn DefinitionSource>, CacheConfig::default());

        assert!(matches!(
            cache.get("app1").await,
            Err(CacheLoadError::Invalid(_))
        ));

        source.set_document(Some(definition("fixed")));
        let recovered = cache.get("app1").await.unwrap().unwrap();
        assert_eq!(recovered.descriptor.description, "fixed");
    }
}

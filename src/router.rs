use std::sync::Arc;

use crate::app_cache::AppCache;
use crate::app_cache::CacheConfig;
use crate::app_cache::DefinitionSource;
use crate::error::RouterError;
use crate::request::Request;
use crate::response::Response;
use crate::store::DocumentStore;

/// Ties the application cache, the compiled schemas and the document store
/// to the request boundary.
///
/// The HTTP layer above selects the application by a path segment of the
/// request uri and maps [`RouterError::ApplicationNotFound`] to a client
/// error, never a crash.
#[derive(Clone)]
pub struct AppRouter {
    cache: AppCache,
    store: Arc<dyn DocumentStore>,
}

impl AppRouter {
    pub fn new(
        source: Arc<dyn DefinitionSource>,
        store: Arc<dyn DocumentStore>,
        config: CacheConfig,
    ) -> Self {
        Self {
            cache: AppCache::new(source, config),
            store,
        }
    }

    /// Execute `request` against the application registered under `uri`.
    ///
    /// Disabled applications are not served and resolve like unknown ones.
    pub async fn handle(&self, uri: &str, request: Request) -> Result<Response, RouterError> {
        let definition = self.cache.get(uri).await?;
        let definition = match definition {
            Some(definition) if definition.descriptor.enabled => definition,
            _ => {
                return Err(RouterError::ApplicationNotFound {
                    uri: uri.to_string(),
                })
            }
        };
        Ok(definition.execute(Arc::clone(&self.store), request).await)
    }

    /// The underlying application cache.
    pub fn cache(&self) -> &AppCache {
        &self.cache
    }
}

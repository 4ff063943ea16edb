use crate::config::DEFAULT_CACHE_STORE;
use crate::error::StoreError;
use crate::model::PermissionEntry;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Shared keyed store backing the permission cache.
///
/// Implementations may be process-local or shared between processes. Writers
/// only overwrite or forget whole values, so no locking contract is required.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Reads a value; expired entries read as `None`.
    async fn get(&self, key: &str) -> Result<Option<Vec<PermissionEntry>>, StoreError>;

    /// Writes a value with a time-to-live.
    async fn put(
        &self,
        key: &str,
        value: Vec<PermissionEntry>,
        ttl: Duration,
    ) -> Result<(), StoreError>;

    /// Removes a single key.
    async fn forget(&self, key: &str) -> Result<(), StoreError>;

    /// Returns the tag-capable view of this store, if it has one.
    fn taggable(&self) -> Option<&dyn TaggableStore> {
        None
    }
}

/// Cache store that supports scoped bulk invalidation by tag.
#[async_trait]
pub trait TaggableStore: Send + Sync {
    /// Reads a value written under `tag`.
    async fn get_tagged(
        &self,
        tag: &str,
        key: &str,
    ) -> Result<Option<Vec<PermissionEntry>>, StoreError>;

    /// Writes a value under `tag`.
    async fn put_tagged(
        &self,
        tag: &str,
        key: &str,
        value: Vec<PermissionEntry>,
        ttl: Duration,
    ) -> Result<(), StoreError>;

    /// Drops every value written under `tag`, leaving other entries alone.
    async fn flush_tag(&self, tag: &str) -> Result<(), StoreError>;
}

/// No-op cache store.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCache;

#[async_trait]
impl CacheStore for NoCache {
    async fn get(&self, _key: &str) -> Result<Option<Vec<PermissionEntry>>, StoreError> {
        Ok(None)
    }

    async fn put(
        &self,
        _key: &str,
        _value: Vec<PermissionEntry>,
        _ttl: Duration,
    ) -> Result<(), StoreError> {
        Ok(())
    }

    async fn forget(&self, _key: &str) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Named cache stores the configured selector is resolved against.
#[derive(Clone)]
pub struct CacheStores {
    default: Arc<dyn CacheStore>,
    named: HashMap<String, Arc<dyn CacheStore>>,
}

impl CacheStores {
    /// Creates a registry with the store `"default"` resolves to.
    pub fn new(default: Arc<dyn CacheStore>) -> Self {
        Self {
            default,
            named: HashMap::new(),
        }
    }

    /// Registers a store under a name.
    pub fn with_store(mut self, name: impl Into<String>, store: Arc<dyn CacheStore>) -> Self {
        self.named.insert(name.into(), store);
        self
    }

    /// Resolves a selector.
    ///
    /// An unknown name falls back to [`NoCache`], so a typo disables caching
    /// instead of failing startup.
    pub fn resolve(&self, selector: &str) -> Arc<dyn CacheStore> {
        if selector == DEFAULT_CACHE_STORE {
            return Arc::clone(&self.default);
        }
        match self.named.get(selector) {
            Some(store) => Arc::clone(store),
            None => {
                tracing::warn!(
                    selector,
                    "unknown permission cache store, falling back to no cache"
                );
                Arc::new(NoCache)
            }
        }
    }
}

impl Default for CacheStores {
    fn default() -> Self {
        Self::new(Arc::new(NoCache))
    }
}

impl std::fmt::Debug for CacheStores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.named.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("CacheStores")
            .field("named", &names)
            .finish_non_exhaustive()
    }
}

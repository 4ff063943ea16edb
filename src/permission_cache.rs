//! Memoized permission set with tagged or single-key invalidation.
//!
//! On a tag-capable store every distinct [`PermissionFilter`] is cached under
//! its own key and the filter is pushed into the store query. Otherwise the
//! unfiltered set is cached once under the base key and filters are applied
//! in memory after retrieval.
//!
//! Repopulation is lazy: an expired or flushed entry is reloaded by the next
//! [`PermissionCache::get`]. Concurrent cold reads may each load; the set is
//! idempotently reconstructible so the last write wins.

use crate::cache::CacheStore;
use crate::error::{Error, Result};
use crate::model::{Permission, PermissionEntry};
use crate::store::PermissionSource;
use crate::types::{EntityId, EntityName, GuardName};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Attribute filter applied to the permission set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PermissionFilter {
    /// Only permissions of this guard.
    pub guard_name: Option<GuardName>,
    /// Only the permission with this id.
    pub id: Option<EntityId>,
    /// Only permissions with this name.
    pub name: Option<EntityName>,
}

impl PermissionFilter {
    /// Creates an empty filter matching every permission.
    pub fn new() -> Self {
        Self::default()
    }

    /// Filters on guard name.
    pub fn guard(mut self, guard: GuardName) -> Self {
        self.guard_name = Some(guard);
        self
    }

    /// Filters on id.
    pub fn id(mut self, id: EntityId) -> Self {
        self.id = Some(id);
        self
    }

    /// Filters on name.
    pub fn name(mut self, name: EntityName) -> Self {
        self.name = Some(name);
        self
    }

    /// Returns true when no attribute is constrained.
    pub fn is_empty(&self) -> bool {
        self.guard_name.is_none() && self.id.is_none() && self.name.is_none()
    }

    /// Returns true when `permission` satisfies every constrained attribute.
    pub fn matches(&self, permission: &Permission) -> bool {
        self.guard_name
            .as_ref()
            .is_none_or(|guard| &permission.guard_name == guard)
            && self.id.is_none_or(|id| permission.id == id)
            && self
                .name
                .as_ref()
                .is_none_or(|name| &permission.name == name)
    }

    // Field-name order keeps keys stable regardless of how the filter was built.
    fn key_segments(&self) -> Vec<String> {
        let mut segments = Vec::with_capacity(3);
        if let Some(guard) = &self.guard_name {
            segments.push(format!("guard_name={guard}"));
        }
        if let Some(id) = self.id {
            segments.push(format!("id={id}"));
        }
        if let Some(name) = &self.name {
            segments.push(format!("name={name}"));
        }
        segments
    }
}

/// Permission cache over a shared [`CacheStore`].
#[derive(Clone)]
pub struct PermissionCache {
    store: Arc<dyn CacheStore>,
    key: String,
    ttl: Duration,
}

impl fmt::Debug for PermissionCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PermissionCache")
            .field("key", &self.key)
            .field("ttl", &self.ttl)
            .field("taggable", &self.is_taggable())
            .finish()
    }
}

impl PermissionCache {
    /// Creates a cache using `key` as base key and tag.
    pub fn new(store: Arc<dyn CacheStore>, key: impl Into<String>, ttl: Duration) -> Self {
        Self {
            store,
            key: key.into(),
            ttl,
        }
    }

    /// Returns true when the underlying store supports tags.
    pub fn is_taggable(&self) -> bool {
        self.store.taggable().is_some()
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    /// Derives the cache key for a filter.
    ///
    /// Tag-capable stores get one key per filter combination; otherwise the
    /// base key is used because filtering happens after the fetch.
    pub fn key_for(&self, filter: &PermissionFilter) -> String {
        if filter.is_empty() || !self.is_taggable() {
            return self.key.clone();
        }
        let mut key = self.key.clone();
        for segment in filter.key_segments() {
            key.push('.');
            key.push_str(&segment);
        }
        key
    }

    /// Returns the permission set matching `filter`, loading it from `source`
    /// on a miss.
    ///
    /// Cache store failures abort the read instead of degrading to an empty
    /// set.
    pub async fn get<P>(&self, source: &P, filter: &PermissionFilter) -> Result<Vec<PermissionEntry>>
    where
        P: PermissionSource + Sync + ?Sized,
    {
        let key = self.key_for(filter);

        if let Some(tags) = self.store.taggable() {
            if let Some(hit) = tags.get_tagged(&self.key, &key).await.map_err(Error::Cache)? {
                tracing::debug!(%key, count = hit.len(), "permission cache hit");
                return Ok(hit);
            }
            tracing::debug!(%key, "permission cache miss, loading filtered set");
            let loaded = source.load_permissions(filter).await.map_err(Error::from)?;
            tags.put_tagged(&self.key, &key, loaded.clone(), self.ttl)
                .await
                .map_err(Error::Cache)?;
            return Ok(loaded);
        }

        let all = match self.store.get(&key).await.map_err(Error::Cache)? {
            Some(hit) => {
                tracing::debug!(%key, count = hit.len(), "permission cache hit");
                hit
            }
            None => {
                tracing::debug!(%key, "permission cache miss, loading full set");
                let loaded = source
                    .load_permissions(&PermissionFilter::default())
                    .await
                    .map_err(Error::from)?;
                self.store
                    .put(&key, loaded.clone(), self.ttl)
                    .await
                    .map_err(Error::Cache)?;
                loaded
            }
        };

        if filter.is_empty() {
            return Ok(all);
        }
        Ok(all
            .into_iter()
            .filter(|entry| filter.matches(&entry.permission))
            .collect())
    }

    /// Flushes every cached permission set.
    pub async fn invalidate(&self) -> Result<()> {
        match self.store.taggable() {
            Some(tags) => tags.flush_tag(&self.key).await.map_err(Error::Cache)?,
            None => self.store.forget(&self.key).await.map_err(Error::Cache)?,
        }
        tracing::info!(key = %self.key, "permission cache flushed");
        Ok(())
    }
}

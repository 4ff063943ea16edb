use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::cache::{CacheStore, TaggableStore};
use crate::error::StoreError;
use crate::model::PermissionEntry;

/// In-memory cache store for permission sets.
///
/// This is a simple LRU cache with per-entry TTL. Built with
/// [`MemoryCache::tagged`] it also tracks tag scopes, so the permission
/// cache takes the filtered, tag-flushed path against it.
#[derive(Debug, Clone)]
pub struct MemoryCache {
    inner: Arc<Mutex<CacheState>>,
    capacity: usize,
    tags_enabled: bool,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    order: VecDeque<String>,
    tags: HashMap<String, HashSet<String>>,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Vec<PermissionEntry>,
    expires_at: Instant,
}

impl MemoryCache {
    /// Creates a single-key cache with the given capacity.
    ///
    /// A capacity of zero disables caching.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(CacheState::default())),
            capacity,
            tags_enabled: false,
        }
    }

    /// Creates a tag-capable cache with the given capacity.
    pub fn tagged(capacity: usize) -> Self {
        Self {
            tags_enabled: true,
            ..Self::new(capacity)
        }
    }

    /// Number of live entries, expired ones included until pruned.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("poisoned lock").entries.len()
    }

    /// Returns true when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn tagged_key(tag: &str, key: &str) -> String {
        format!("tag:{tag}:{key}")
    }

    fn remove_key(state: &mut CacheState, key: &str) {
        if state.entries.remove(key).is_some() {
            state.order.retain(|existing| existing != key);
        }
    }

    fn touch(state: &mut CacheState, key: &str) {
        state.order.retain(|existing| existing != key);
        state.order.push_back(key.to_string());
    }

    fn prune_expired(state: &mut CacheState, now: Instant) {
        state.entries.retain(|_, entry| entry.expires_at > now);
        let CacheState {
            entries,
            order,
            tags,
        } = state;
        order.retain(|key| entries.contains_key(key));
        for keys in tags.values_mut() {
            keys.retain(|key| entries.contains_key(key));
        }
    }

    fn evict_if_needed(state: &mut CacheState, capacity: usize) {
        while state.entries.len() > capacity {
            if let Some(key) = state.order.pop_front() {
                state.entries.remove(&key);
            } else {
                break;
            }
        }
    }

    fn read(&self, key: &str) -> Option<Vec<PermissionEntry>> {
        if self.capacity == 0 {
            return None;
        }

        let now = Instant::now();
        let mut guard = self.inner.lock().expect("poisoned lock");

        if let Some(entry) = guard.entries.get(key)
            && entry.expires_at <= now
        {
            Self::remove_key(&mut guard, key);
            return None;
        }

        let value = guard.entries.get(key).map(|entry| entry.value.clone());
        if value.is_some() {
            Self::touch(&mut guard, key);
        }
        value
    }

    fn write(&self, key: String, tag: Option<&str>, value: Vec<PermissionEntry>, ttl: Duration) {
        if self.capacity == 0 || ttl.is_zero() {
            return;
        }

        let now = Instant::now();
        let mut guard = self.inner.lock().expect("poisoned lock");
        Self::prune_expired(&mut guard, now);

        guard.entries.insert(
            key.clone(),
            CacheEntry {
                value,
                expires_at: now + ttl,
            },
        );
        if let Some(tag) = tag {
            guard
                .tags
                .entry(tag.to_string())
                .or_default()
                .insert(key.clone());
        }
        Self::touch(&mut guard, &key);
        Self::evict_if_needed(&mut guard, self.capacity);
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<PermissionEntry>>, StoreError> {
        Ok(self.read(key))
    }

    async fn put(
        &self,
        key: &str,
        value: Vec<PermissionEntry>,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        self.write(key.to_string(), None, value, ttl);
        Ok(())
    }

    async fn forget(&self, key: &str) -> Result<(), StoreError> {
        let mut guard = self.inner.lock().expect("poisoned lock");
        Self::remove_key(&mut guard, key);
        Ok(())
    }

    fn taggable(&self) -> Option<&dyn TaggableStore> {
        if self.tags_enabled { Some(self) } else { None }
    }
}

#[async_trait]
impl TaggableStore for MemoryCache {
    async fn get_tagged(
        &self,
        tag: &str,
        key: &str,
    ) -> Result<Option<Vec<PermissionEntry>>, StoreError> {
        Ok(self.read(&Self::tagged_key(tag, key)))
    }

    async fn put_tagged(
        &self,
        tag: &str,
        key: &str,
        value: Vec<PermissionEntry>,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        self.write(Self::tagged_key(tag, key), Some(tag), value, ttl);
        Ok(())
    }

    async fn flush_tag(&self, tag: &str) -> Result<(), StoreError> {
        let mut guard = self.inner.lock().expect("poisoned lock");
        if let Some(keys) = guard.tags.remove(tag) {
            for key in keys {
                Self::remove_key(&mut guard, &key);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Permission;
    use crate::types::{EntityId, EntityName, GuardName};
    use futures::executor::block_on;

    const TTL: Duration = Duration::from_secs(60);

    fn entry(name: &str) -> Vec<PermissionEntry> {
        vec![PermissionEntry {
            permission: Permission {
                id: EntityId::new(1),
                name: EntityName::try_from(name).unwrap(),
                guard_name: GuardName::try_from("web").unwrap(),
            },
            modules: Vec::new(),
        }]
    }

    #[test]
    fn lru_should_evict_least_recently_used() {
        let cache = MemoryCache::new(2);

        block_on(cache.put("a", entry("read"), TTL)).unwrap();
        block_on(cache.put("b", entry("write"), TTL)).unwrap();
        let _ = block_on(cache.get("a"));
        block_on(cache.put("c", entry("delete"), TTL)).unwrap();

        assert!(block_on(cache.get("b")).unwrap().is_none());
        assert!(block_on(cache.get("a")).unwrap().is_some());
        assert!(block_on(cache.get("c")).unwrap().is_some());
    }

    #[test]
    fn ttl_should_expire_entries() {
        let cache = MemoryCache::new(1);

        block_on(cache.put("a", entry("read"), Duration::from_millis(10))).unwrap();
        std::thread::sleep(Duration::from_millis(20));

        assert!(block_on(cache.get("a")).unwrap().is_none());
    }

    #[test]
    fn zero_capacity_should_disable_caching() {
        let cache = MemoryCache::new(0);
        block_on(cache.put("a", entry("read"), TTL)).unwrap();
        assert!(block_on(cache.get("a")).unwrap().is_none());
    }

    #[test]
    fn untagged_cache_should_not_expose_tags() {
        assert!(MemoryCache::new(4).taggable().is_none());
        assert!(MemoryCache::tagged(4).taggable().is_some());
    }

    #[test]
    fn flush_tag_should_leave_other_entries_alone() {
        let cache = MemoryCache::tagged(8);
        let tags = cache.taggable().unwrap();

        block_on(tags.put_tagged("perms", "perms.guard_name=web", entry("read"), TTL)).unwrap();
        block_on(tags.put_tagged("perms", "perms.guard_name=api", entry("write"), TTL)).unwrap();
        block_on(tags.put_tagged("other", "other", entry("audit"), TTL)).unwrap();
        block_on(cache.put("plain", entry("plain"), TTL)).unwrap();

        block_on(tags.flush_tag("perms")).unwrap();

        assert!(block_on(tags.get_tagged("perms", "perms.guard_name=web")).unwrap().is_none());
        assert!(block_on(tags.get_tagged("perms", "perms.guard_name=api")).unwrap().is_none());
        assert!(block_on(tags.get_tagged("other", "other")).unwrap().is_some());
        assert!(block_on(cache.get("plain")).unwrap().is_some());
    }

    #[test]
    fn forget_should_remove_single_key() {
        let cache = MemoryCache::new(4);
        block_on(cache.put("a", entry("read"), TTL)).unwrap();
        block_on(cache.put("b", entry("write"), TTL)).unwrap();

        block_on(cache.forget("a")).unwrap();

        assert!(block_on(cache.get("a")).unwrap().is_none());
        assert_eq!(cache.len(), 1);
    }
}

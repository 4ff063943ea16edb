use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::config::TableNames;
use crate::model::{GuardedEntity, Module, Permission, PermissionEntry};
use crate::permission_cache::PermissionFilter;
use crate::store::{AssociationStore, EntityStore, PermissionSource};
use crate::types::{EntityId, EntityName, GuardName, SubjectKey, SubjectType};

/// In-memory store implementation for tests and demos.
///
/// Rows and join tables live behind `RwLock`s; ids are assigned sequentially
/// per entity table starting at 1.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    tables: TableNames,
    permissions: Table<Permission>,
    modules: Table<Module>,
    module_permissions: RwLock<HashMap<EntityId, BTreeSet<EntityId>>>,
    subject_modules: RwLock<HashMap<SubjectKey, BTreeSet<EntityId>>>,
    subject_permissions: RwLock<HashMap<SubjectKey, BTreeSet<EntityId>>>,
    loads: AtomicUsize,
}

#[derive(Debug)]
struct Table<E> {
    rows: RwLock<BTreeMap<EntityId, E>>,
    next_id: AtomicU64,
}

impl<E> Default for Table<E> {
    fn default() -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl<E: GuardedEntity> Table<E> {
    fn find(&self, predicate: impl Fn(&E) -> bool) -> Option<E> {
        let guard = self.rows.read().expect("poisoned lock");
        guard.values().find(|row| predicate(row)).cloned()
    }

    fn insert(&self, table: &str, name: EntityName, guard_name: GuardName) -> Result<E, crate::StoreError> {
        let mut guard = self.rows.write().expect("poisoned lock");
        if guard
            .values()
            .any(|row| row.name() == &name && row.guard_name() == &guard_name)
        {
            return Err(format!(
                "unique constraint violated on `{table}`: name `{name}`, guard `{guard_name}`"
            )
            .into());
        }
        let id = EntityId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let row = E::from_parts(id, name, guard_name);
        guard.insert(id, row.clone());
        Ok(row)
    }

    fn rows_for(&self, ids: Option<&BTreeSet<EntityId>>) -> Vec<E> {
        let Some(ids) = ids else {
            return Vec::new();
        };
        let guard = self.rows.read().expect("poisoned lock");
        ids.iter().filter_map(|id| guard.get(id).cloned()).collect()
    }
}

fn attach<K>(edges: &RwLock<HashMap<K, BTreeSet<EntityId>>>, owner: &K, ids: &[EntityId])
where
    K: Clone + Eq + std::hash::Hash,
{
    if ids.is_empty() {
        return;
    }
    let mut guard = edges.write().expect("poisoned lock");
    guard.entry(owner.clone()).or_default().extend(ids.iter().copied());
}

fn detach<K>(edges: &RwLock<HashMap<K, BTreeSet<EntityId>>>, owner: &K, ids: Option<&[EntityId]>)
where
    K: Eq + std::hash::Hash,
{
    let mut guard = edges.write().expect("poisoned lock");
    match ids {
        None => {
            guard.remove(owner);
        }
        Some(ids) => {
            if let Some(set) = guard.get_mut(owner) {
                set.retain(|id| !ids.contains(id));
                if set.is_empty() {
                    guard.remove(owner);
                }
            }
        }
    }
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store reporting the given table names in its events
    /// and errors.
    pub fn with_tables(tables: TableNames) -> Self {
        Self {
            inner: Arc::new(Inner {
                tables,
                ..Inner::default()
            }),
        }
    }

    /// Number of bulk permission loads served so far.
    pub fn load_count(&self) -> usize {
        self.inner.loads.load(Ordering::SeqCst)
    }

    /// Deletes a permission row and every edge pointing at it.
    ///
    /// Callers own cache invalidation for out-of-band deletes.
    pub fn delete_permission(&self, id: EntityId) -> bool {
        let removed = self
            .inner
            .permissions
            .rows
            .write()
            .expect("poisoned lock")
            .remove(&id)
            .is_some();
        self.inner
            .module_permissions
            .write()
            .expect("poisoned lock")
            .values_mut()
            .for_each(|set| {
                set.remove(&id);
            });
        self.inner
            .subject_permissions
            .write()
            .expect("poisoned lock")
            .values_mut()
            .for_each(|set| {
                set.remove(&id);
            });
        removed
    }

    /// Deletes a module row and every edge pointing at it.
    pub fn delete_module(&self, id: EntityId) -> bool {
        let removed = self
            .inner
            .modules
            .rows
            .write()
            .expect("poisoned lock")
            .remove(&id)
            .is_some();
        self.inner
            .module_permissions
            .write()
            .expect("poisoned lock")
            .remove(&id);
        self.inner
            .subject_modules
            .write()
            .expect("poisoned lock")
            .values_mut()
            .for_each(|set| {
                set.remove(&id);
            });
        removed
    }
}

macro_rules! impl_entity_store {
    ($entity:ty, $field:ident, $table:ident) => {
        #[async_trait]
        impl EntityStore<$entity> for MemoryStore {
            async fn find_by_name(
                &self,
                name: &str,
                guard: &GuardName,
            ) -> std::result::Result<Option<$entity>, crate::StoreError> {
                Ok(self
                    .inner
                    .$field
                    .find(|row| row.name.as_str() == name && &row.guard_name == guard))
            }

            async fn find_by_id(
                &self,
                id: EntityId,
                guard: &GuardName,
            ) -> std::result::Result<Option<$entity>, crate::StoreError> {
                Ok(self
                    .inner
                    .$field
                    .find(|row| row.id == id && &row.guard_name == guard))
            }

            async fn insert(
                &self,
                name: EntityName,
                guard: GuardName,
            ) -> std::result::Result<$entity, crate::StoreError> {
                let row = self
                    .inner
                    .$field
                    .insert(&self.inner.tables.$table, name, guard)?;
                tracing::trace!(table = %self.inner.tables.$table, id = %row.id, "row inserted");
                Ok(row)
            }
        }
    };
}

impl_entity_store!(Permission, permissions, permissions);
impl_entity_store!(Module, modules, modules);

#[async_trait]
impl PermissionSource for MemoryStore {
    async fn load_permissions(
        &self,
        filter: &PermissionFilter,
    ) -> std::result::Result<Vec<PermissionEntry>, crate::StoreError> {
        self.inner.loads.fetch_add(1, Ordering::SeqCst);

        let permissions: Vec<Permission> = {
            let guard = self.inner.permissions.rows.read().expect("poisoned lock");
            guard
                .values()
                .filter(|permission| filter.matches(permission))
                .cloned()
                .collect()
        };
        let modules = self.inner.modules.rows.read().expect("poisoned lock");
        let links = self.inner.module_permissions.read().expect("poisoned lock");

        let entries: Vec<PermissionEntry> = permissions
            .into_iter()
            .map(|permission| {
                let granted_by = modules
                    .values()
                    .filter(|module| {
                        links
                            .get(&module.id)
                            .is_some_and(|ids| ids.contains(&permission.id))
                    })
                    .cloned()
                    .collect();
                PermissionEntry {
                    permission,
                    modules: granted_by,
                }
            })
            .collect();

        tracing::trace!(
            table = %self.inner.tables.permissions,
            count = entries.len(),
            "permissions loaded"
        );
        Ok(entries)
    }
}

#[async_trait]
impl AssociationStore for MemoryStore {
    async fn module_permissions(
        &self,
        module: EntityId,
    ) -> std::result::Result<Vec<Permission>, crate::StoreError> {
        let links = self.inner.module_permissions.read().expect("poisoned lock");
        Ok(self.inner.permissions.rows_for(links.get(&module)))
    }

    async fn attach_module_permissions(
        &self,
        module: EntityId,
        permissions: &[EntityId],
    ) -> std::result::Result<(), crate::StoreError> {
        attach(&self.inner.module_permissions, &module, permissions);
        tracing::trace!(table = %self.inner.tables.module_has_permissions, %module, "edges attached");
        Ok(())
    }

    async fn detach_module_permissions(
        &self,
        module: EntityId,
        permissions: Option<&[EntityId]>,
    ) -> std::result::Result<(), crate::StoreError> {
        detach(&self.inner.module_permissions, &module, permissions);
        tracing::trace!(table = %self.inner.tables.module_has_permissions, %module, "edges detached");
        Ok(())
    }

    async fn subject_modules(
        &self,
        subject: &SubjectKey,
    ) -> std::result::Result<Vec<Module>, crate::StoreError> {
        let links = self.inner.subject_modules.read().expect("poisoned lock");
        Ok(self.inner.modules.rows_for(links.get(subject)))
    }

    async fn subject_permissions(
        &self,
        subject: &SubjectKey,
    ) -> std::result::Result<Vec<Permission>, crate::StoreError> {
        let links = self.inner.subject_permissions.read().expect("poisoned lock");
        Ok(self.inner.permissions.rows_for(links.get(subject)))
    }

    async fn attach_subject_modules(
        &self,
        subject: &SubjectKey,
        modules: &[EntityId],
    ) -> std::result::Result<(), crate::StoreError> {
        attach(&self.inner.subject_modules, subject, modules);
        tracing::trace!(table = %self.inner.tables.model_has_modules, %subject, "edges attached");
        Ok(())
    }

    async fn detach_subject_modules(
        &self,
        subject: &SubjectKey,
        modules: Option<&[EntityId]>,
    ) -> std::result::Result<(), crate::StoreError> {
        detach(&self.inner.subject_modules, subject, modules);
        tracing::trace!(table = %self.inner.tables.model_has_modules, %subject, "edges detached");
        Ok(())
    }

    async fn attach_subject_permissions(
        &self,
        subject: &SubjectKey,
        permissions: &[EntityId],
    ) -> std::result::Result<(), crate::StoreError> {
        attach(&self.inner.subject_permissions, subject, permissions);
        tracing::trace!(table = %self.inner.tables.model_has_permissions, %subject, "edges attached");
        Ok(())
    }

    async fn detach_subject_permissions(
        &self,
        subject: &SubjectKey,
        permissions: Option<&[EntityId]>,
    ) -> std::result::Result<(), crate::StoreError> {
        detach(&self.inner.subject_permissions, subject, permissions);
        tracing::trace!(table = %self.inner.tables.model_has_permissions, %subject, "edges detached");
        Ok(())
    }

    async fn subjects_with_modules(
        &self,
        subject_type: &SubjectType,
        modules: &[EntityId],
    ) -> std::result::Result<Vec<SubjectKey>, crate::StoreError> {
        let links = self.inner.subject_modules.read().expect("poisoned lock");
        let mut keys: Vec<SubjectKey> = links
            .iter()
            .filter(|(key, _)| &key.subject_type == subject_type)
            .filter(|(_, ids)| modules.iter().any(|id| ids.contains(id)))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

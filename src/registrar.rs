use crate::cache::{CacheStore, CacheStores};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::gate::{Gate, PermissionHook};
use crate::guard::GuardResolver;
use crate::membership::{
    LoadedModule, PermissionHolder, Query, Subject, Target, ensure_shares_guard,
};
use crate::model::{GuardedEntity, Module, Permission, PermissionEntry};
use crate::permission_cache::{PermissionCache, PermissionFilter};
use crate::store::{EntityStore, Store};
use crate::types::{EntityId, EntityName, GuardName, SubjectKey, SubjectType};
use std::collections::HashSet;
use std::sync::Arc;

/// Orchestrates lookups, association mutations, membership checks and the
/// permission cache lifecycle over a pluggable store.
#[derive(Debug)]
pub struct Registrar<S> {
    store: S,
    cache: PermissionCache,
    guards: GuardResolver,
    config: Config,
}

/// Builder for [`Registrar`].
#[derive(Debug)]
pub struct RegistrarBuilder<S> {
    store: S,
    config: Config,
    cache_stores: CacheStores,
}

impl<S> RegistrarBuilder<S> {
    /// Creates a builder. Without a cache store every read hits the store.
    pub fn new(store: S, config: Config) -> Self {
        Self {
            store,
            config,
            cache_stores: CacheStores::default(),
        }
    }

    /// Uses `store` as the default cache store.
    pub fn cache_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.cache_stores = CacheStores::new(store);
        self
    }

    /// Sets the named cache stores `config.cache.store` is resolved against.
    pub fn cache_stores(mut self, stores: CacheStores) -> Self {
        self.cache_stores = stores;
        self
    }

    /// Builds the registrar.
    pub fn build(self) -> Registrar<S> {
        let cache = PermissionCache::new(
            self.cache_stores.resolve(&self.config.cache.store),
            self.config.cache.key.clone(),
            self.config.cache.ttl(),
        );

        Registrar {
            store: self.store,
            cache,
            guards: GuardResolver::new(self.config.guards.clone()),
            config: self.config,
        }
    }
}

impl<S> Registrar<S> {
    /// Returns the configuration the registrar was built with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the guard resolver.
    pub fn guards(&self) -> &GuardResolver {
        &self.guards
    }

    /// Returns the entity store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the permission cache.
    pub fn permission_cache(&self) -> &PermissionCache {
        &self.cache
    }

    fn default_guard_of<E: GuardedEntity>(&self, guard: Option<&GuardName>) -> GuardName {
        guard
            .cloned()
            .unwrap_or_else(|| self.guards.default_guard_for(&E::KIND.subject_type()))
    }

    // Holder guards first, then every other known guard so a name that only
    // exists under a foreign guard surfaces as a mismatch instead of NotFound.
    fn lookup_order(&self, default: &GuardName, accepted: &[GuardName]) -> Vec<GuardName> {
        let mut order = vec![default.clone()];
        let configured = self.config.guards.guards.iter().map(|guard| &guard.name);
        let candidates = accepted
            .iter()
            .chain(configured)
            .chain(std::iter::once(self.guards.default_guard()));
        for guard in candidates {
            if !order.contains(guard) {
                order.push(guard.clone());
            }
        }
        order
    }
}

impl<S> Registrar<S>
where
    S: Store,
{
    /// Finds an entity by name; `guard` defaults via the guard resolver.
    pub async fn find_by_name<E>(&self, name: &str, guard: Option<&GuardName>) -> Result<E>
    where
        E: GuardedEntity,
        S: EntityStore<E>,
    {
        let name = name.trim();
        let guard = self.default_guard_of::<E>(guard);
        EntityStore::<E>::find_by_name(&self.store, name, &guard)
            .await?
            .ok_or_else(|| Error::not_found_name(E::KIND, name))
    }

    /// Finds an entity by id; `guard` defaults via the guard resolver.
    pub async fn find_by_id<E>(&self, id: EntityId, guard: Option<&GuardName>) -> Result<E>
    where
        E: GuardedEntity,
        S: EntityStore<E>,
    {
        let guard = self.default_guard_of::<E>(guard);
        EntityStore::<E>::find_by_id(&self.store, id, &guard)
            .await?
            .ok_or_else(|| Error::not_found_id(E::KIND, id))
    }

    /// Returns the existing entity for name and guard, creating it if absent.
    pub async fn find_or_create<E>(&self, name: &str, guard: Option<&GuardName>) -> Result<E>
    where
        E: GuardedEntity,
        S: EntityStore<E>,
    {
        let name = EntityName::new(name)?;
        let guard = self.default_guard_of::<E>(guard);
        if let Some(existing) =
            EntityStore::<E>::find_by_name(&self.store, name.as_str(), &guard).await?
        {
            return Ok(existing);
        }
        self.insert::<E>(name, guard).await
    }

    /// Creates an entity, failing with [`Error::AlreadyExists`] when the
    /// name and guard pair is taken.
    pub async fn create<E>(&self, name: &str, guard: Option<&GuardName>) -> Result<E>
    where
        E: GuardedEntity,
        S: EntityStore<E>,
    {
        let name = EntityName::new(name)?;
        let guard = self.default_guard_of::<E>(guard);
        if EntityStore::<E>::find_by_name(&self.store, name.as_str(), &guard)
            .await?
            .is_some()
        {
            return Err(Error::AlreadyExists {
                kind: E::KIND,
                name: name.as_str().to_string(),
                guard,
            });
        }
        self.insert::<E>(name, guard).await
    }

    async fn insert<E>(&self, name: EntityName, guard: GuardName) -> Result<E>
    where
        E: GuardedEntity,
        S: EntityStore<E>,
    {
        let created = EntityStore::<E>::insert(&self.store, name, guard).await?;
        tracing::info!(
            kind = %E::KIND,
            id = %created.id(),
            name = %created.name(),
            guard = %created.guard_name(),
            "entity created"
        );
        self.forget_cached_permissions().await?;
        Ok(created)
    }

    /// Returns the cached permission set matching `filter`.
    pub async fn get_permissions(&self, filter: &PermissionFilter) -> Result<Vec<PermissionEntry>> {
        self.cache.get(&self.store, filter).await
    }

    /// Flushes the permission cache.
    pub async fn forget_cached_permissions(&self) -> Result<()> {
        self.cache.invalidate().await
    }

    /// Flushes the permission cache on operator request.
    pub async fn reset_cache(&self) -> Result<()> {
        self.forget_cached_permissions().await?;
        tracing::info!("Permission cache flushed.");
        Ok(())
    }

    /// Loads a subject using the guards configured for its type.
    pub async fn load_subject(&self, key: SubjectKey) -> Result<Subject> {
        let default = self.guards.default_guard_for(&key.subject_type);
        let accepted = self.guards.guard_names_for(&key.subject_type);
        let mut subject = Subject::new(key, default).with_guards(accepted);
        self.refresh(&mut subject).await?;
        Ok(subject)
    }

    /// Loads a subject pinned to a single guard.
    pub async fn load_subject_with_guard(&self, key: SubjectKey, guard: GuardName) -> Result<Subject> {
        let mut subject = Subject::new(key, guard);
        self.refresh(&mut subject).await?;
        Ok(subject)
    }

    /// Reloads a subject's modules and direct permissions from the store.
    pub async fn refresh(&self, subject: &mut Subject) -> Result<()> {
        let modules = self.store.subject_modules(subject.key()).await?;
        let permissions = self.store.subject_permissions(subject.key()).await?;
        subject.set_modules(modules);
        subject.set_permissions(permissions);
        Ok(())
    }

    /// Loads a module with its permissions.
    pub async fn load_module(&self, module: Module) -> Result<LoadedModule> {
        let permissions = self.store.module_permissions(module.id).await?;
        Ok(LoadedModule::new(module, permissions))
    }

    async fn resolve_for<E>(
        &self,
        default: &GuardName,
        accepted: &[GuardName],
        target: Target<E>,
    ) -> Result<E>
    where
        E: GuardedEntity,
        S: EntityStore<E>,
    {
        let (name, id) = match target {
            Target::Entity(entity) => return Ok(entity),
            Target::Name(name) => (Some(name.trim().to_string()), None),
            Target::Id(id) => (None, Some(id)),
        };

        for guard in self.lookup_order(default, accepted) {
            let found = match (&name, id) {
                (Some(name), _) => EntityStore::<E>::find_by_name(&self.store, name, &guard).await?,
                (None, Some(id)) => EntityStore::<E>::find_by_id(&self.store, id, &guard).await?,
                (None, None) => None,
            };
            if let Some(entity) = found {
                return Ok(entity);
            }
        }

        Err(match (name, id) {
            (Some(name), _) => Error::not_found_name(E::KIND, name),
            (None, Some(id)) => Error::not_found_id(E::KIND, id),
            (None, None) => Error::not_found_name(E::KIND, String::new()),
        })
    }

    // Resolves every term for a holder and rejects cross-guard edges before
    // anything is written. Blank names are skipped.
    async fn resolve_ids<E>(
        &self,
        default: &GuardName,
        accepted: &[GuardName],
        query: Query<E>,
    ) -> Result<Vec<EntityId>>
    where
        E: GuardedEntity,
        S: EntityStore<E>,
    {
        let mut ids = Vec::new();
        for target in query.into_targets() {
            if matches!(&target, Target::Name(name) if name.trim().is_empty()) {
                continue;
            }
            let entity = self.resolve_for(default, accepted, target).await?;
            ensure_shares_guard(accepted, &entity)?;
            if !ids.contains(&entity.id()) {
                ids.push(entity.id());
            }
        }
        Ok(ids)
    }

    async fn subject_ids<E>(&self, subject: &Subject, query: Query<E>) -> Result<Vec<EntityId>>
    where
        E: GuardedEntity,
        S: EntityStore<E>,
    {
        self.resolve_ids(subject.default_guard(), subject.guard_names(), query)
            .await
    }

    async fn after_subject_mutation(&self, subject: &mut Subject) -> Result<()> {
        self.forget_cached_permissions().await?;
        self.refresh(subject).await
    }

    /// Assigns modules to a subject, keeping existing assignments.
    pub async fn assign_module(
        &self,
        subject: &mut Subject,
        modules: impl Into<Query<Module>>,
    ) -> Result<()> {
        let ids = self.subject_ids(subject, modules.into()).await?;
        self.store.attach_subject_modules(subject.key(), &ids).await?;
        self.after_subject_mutation(subject).await
    }

    /// Removes modules from a subject.
    pub async fn remove_module(
        &self,
        subject: &mut Subject,
        modules: impl Into<Query<Module>>,
    ) -> Result<()> {
        let ids = self.subject_ids(subject, modules.into()).await?;
        self.store
            .detach_subject_modules(subject.key(), Some(&ids))
            .await?;
        self.after_subject_mutation(subject).await
    }

    /// Replaces all of a subject's modules.
    ///
    /// Every term is resolved before the existing assignments are dropped.
    pub async fn sync_modules(
        &self,
        subject: &mut Subject,
        modules: impl Into<Query<Module>>,
    ) -> Result<()> {
        let ids = self.subject_ids(subject, modules.into()).await?;
        self.store.detach_subject_modules(subject.key(), None).await?;
        self.store.attach_subject_modules(subject.key(), &ids).await?;
        self.after_subject_mutation(subject).await
    }

    /// Grants permissions directly to a subject.
    pub async fn give_permission_to(
        &self,
        subject: &mut Subject,
        permissions: impl Into<Query<Permission>>,
    ) -> Result<()> {
        let ids = self.subject_ids(subject, permissions.into()).await?;
        self.store
            .attach_subject_permissions(subject.key(), &ids)
            .await?;
        self.after_subject_mutation(subject).await
    }

    /// Revokes direct permissions from a subject.
    pub async fn revoke_permission_to(
        &self,
        subject: &mut Subject,
        permissions: impl Into<Query<Permission>>,
    ) -> Result<()> {
        let ids = self.subject_ids(subject, permissions.into()).await?;
        self.store
            .detach_subject_permissions(subject.key(), Some(&ids))
            .await?;
        self.after_subject_mutation(subject).await
    }

    /// Replaces all of a subject's direct permissions.
    pub async fn sync_permissions(
        &self,
        subject: &mut Subject,
        permissions: impl Into<Query<Permission>>,
    ) -> Result<()> {
        let ids = self.subject_ids(subject, permissions.into()).await?;
        self.store
            .detach_subject_permissions(subject.key(), None)
            .await?;
        self.store
            .attach_subject_permissions(subject.key(), &ids)
            .await?;
        self.after_subject_mutation(subject).await
    }

    /// Drops every module and direct permission of a deleted subject.
    pub async fn detach_subject(&self, key: &SubjectKey) -> Result<()> {
        self.store.detach_subject_modules(key, None).await?;
        self.store.detach_subject_permissions(key, None).await?;
        self.forget_cached_permissions().await
    }

    async fn after_module_mutation(&self, module: &mut LoadedModule) -> Result<()> {
        self.forget_cached_permissions().await?;
        let permissions = self.store.module_permissions(module.module().id).await?;
        module.set_permissions(permissions);
        Ok(())
    }

    /// Links permissions to a module.
    pub async fn give_permission_to_module(
        &self,
        module: &mut LoadedModule,
        permissions: impl Into<Query<Permission>>,
    ) -> Result<()> {
        let ids = self
            .resolve_ids(module.default_guard(), module.guard_names(), permissions.into())
            .await?;
        self.store
            .attach_module_permissions(module.module().id, &ids)
            .await?;
        self.after_module_mutation(module).await
    }

    /// Unlinks permissions from a module.
    pub async fn revoke_permission_from_module(
        &self,
        module: &mut LoadedModule,
        permissions: impl Into<Query<Permission>>,
    ) -> Result<()> {
        let ids = self
            .resolve_ids(module.default_guard(), module.guard_names(), permissions.into())
            .await?;
        self.store
            .detach_module_permissions(module.module().id, Some(&ids))
            .await?;
        self.after_module_mutation(module).await
    }

    /// Replaces all permissions of a module.
    pub async fn sync_module_permissions(
        &self,
        module: &mut LoadedModule,
        permissions: impl Into<Query<Permission>>,
    ) -> Result<()> {
        let ids = self
            .resolve_ids(module.default_guard(), module.guard_names(), permissions.into())
            .await?;
        self.store
            .detach_module_permissions(module.module().id, None)
            .await?;
        self.store
            .attach_module_permissions(module.module().id, &ids)
            .await?;
        self.after_module_mutation(module).await
    }

    /// Returns true when `holder` directly holds `permission`.
    ///
    /// Fails with [`Error::NotFound`] for unknown references and with
    /// [`Error::GuardMismatch`] when the permission belongs to a guard the
    /// holder does not accept. Module-granted permissions are not consulted;
    /// see [`Registrar::can`].
    pub async fn has_permission_to<H>(
        &self,
        holder: &H,
        permission: impl Into<Target<Permission>>,
    ) -> Result<bool>
    where
        H: PermissionHolder,
    {
        let permission = self
            .resolve_for(holder.default_guard(), holder.guard_names(), permission.into())
            .await?;
        ensure_shares_guard(holder.guard_names(), &permission)?;
        Ok(holder
            .direct_permissions()
            .iter()
            .any(|held| held.id == permission.id))
    }

    /// Returns true when `holder` directly holds any of `permissions`.
    pub async fn has_any_permission<H>(
        &self,
        holder: &H,
        permissions: impl Into<Query<Permission>>,
    ) -> Result<bool>
    where
        H: PermissionHolder,
    {
        for target in permissions.into().into_targets() {
            if self.has_permission_to(holder, target).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Returns true when `holder` directly holds every one of `permissions`.
    pub async fn has_all_permissions<H>(
        &self,
        holder: &H,
        permissions: impl Into<Query<Permission>>,
    ) -> Result<bool>
    where
        H: PermissionHolder,
    {
        for target in permissions.into().into_targets() {
            if !self.has_permission_to(holder, target).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Returns permissions a subject holds through its modules, read from the
    /// permission cache.
    pub async fn permissions_via_modules(&self, subject: &Subject) -> Result<Vec<Permission>> {
        let held: HashSet<EntityId> = subject.modules().iter().map(|module| module.id).collect();
        if held.is_empty() {
            return Ok(Vec::new());
        }
        let entries = self.get_permissions(&PermissionFilter::new()).await?;
        Ok(entries
            .into_iter()
            .filter(|entry| entry.modules.iter().any(|module| held.contains(&module.id)))
            .map(|entry| entry.permission)
            .collect())
    }

    /// Returns direct and module-granted permissions, without duplicates.
    pub async fn all_permissions(&self, subject: &Subject) -> Result<Vec<Permission>> {
        let mut seen = HashSet::new();
        let mut permissions = Vec::new();
        let direct = subject.direct_permissions().iter().cloned();
        for permission in direct.chain(self.permissions_via_modules(subject).await?) {
            if seen.insert(permission.id) {
                permissions.push(permission);
            }
        }
        Ok(permissions)
    }

    /// Returns true when `subject` holds `permission` directly or through one
    /// of its modules.
    pub async fn can(
        &self,
        subject: &Subject,
        permission: impl Into<Target<Permission>>,
    ) -> Result<bool> {
        let permission = self
            .resolve_for(subject.default_guard(), subject.guard_names(), permission.into())
            .await?;
        ensure_shares_guard(subject.guard_names(), &permission)?;
        if subject
            .direct_permissions()
            .iter()
            .any(|held| held.id == permission.id)
        {
            return Ok(true);
        }
        if subject.modules().is_empty() {
            return Ok(false);
        }

        let filter = PermissionFilter::new().guard(permission.guard_name.clone());
        let entries = self.get_permissions(&filter).await?;
        Ok(entries
            .iter()
            .filter(|entry| entry.permission.id == permission.id)
            .any(|entry| {
                subject
                    .modules()
                    .iter()
                    .any(|module| entry.granted_by(module.id))
            }))
    }

    /// Returns subjects of `subject_type` holding any of `modules`.
    pub async fn subjects_with_modules(
        &self,
        subject_type: &SubjectType,
        modules: impl Into<Query<Module>>,
    ) -> Result<Vec<SubjectKey>> {
        let default = self.guards.default_guard_for(subject_type);
        let accepted = self.guards.guard_names_for(subject_type);
        let ids = self.resolve_ids(&default, &accepted, modules.into()).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.store.subjects_with_modules(subject_type, &ids).await?)
    }
}

impl<S> Registrar<S>
where
    S: Store + 'static,
{
    /// Appends a hook to `gate` that allows abilities the subject can perform
    /// and abstains otherwise.
    pub fn register_gate_hook(self: &Arc<Self>, gate: &mut Gate) {
        gate.push(PermissionHook::new(Arc::clone(self)));
    }
}

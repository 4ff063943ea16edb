use crate::error::StoreError;
use crate::model::{GuardedEntity, Module, Permission, PermissionEntry};
use crate::permission_cache::PermissionFilter;
use crate::types::{EntityId, EntityName, GuardName, SubjectKey, SubjectType};
use async_trait::async_trait;

/// Store interface for guard-scoped entity rows.
#[async_trait]
pub trait EntityStore<E: GuardedEntity> {
    /// Finds a row by name within a guard.
    async fn find_by_name(
        &self,
        name: &str,
        guard: &GuardName,
    ) -> std::result::Result<Option<E>, StoreError>;

    /// Finds a row by id within a guard.
    async fn find_by_id(
        &self,
        id: EntityId,
        guard: &GuardName,
    ) -> std::result::Result<Option<E>, StoreError>;

    /// Inserts a new row and returns it with its assigned id.
    async fn insert(
        &self,
        name: EntityName,
        guard: GuardName,
    ) -> std::result::Result<E, StoreError>;
}

/// Store interface for the bulk permission read behind the permission cache.
#[async_trait]
pub trait PermissionSource {
    /// Returns permissions matching `filter`, each with its modules loaded.
    ///
    /// An empty filter returns every permission.
    async fn load_permissions(
        &self,
        filter: &PermissionFilter,
    ) -> std::result::Result<Vec<PermissionEntry>, StoreError>;
}

/// Store interface for the three many-to-many relations.
///
/// `attach_*` calls are idempotent and never detach existing edges.
/// `detach_*` calls with `None` remove every edge of the owner.
#[async_trait]
pub trait AssociationStore {
    /// Returns permissions linked to a module.
    async fn module_permissions(
        &self,
        module: EntityId,
    ) -> std::result::Result<Vec<Permission>, StoreError>;

    /// Links permissions to a module.
    async fn attach_module_permissions(
        &self,
        module: EntityId,
        permissions: &[EntityId],
    ) -> std::result::Result<(), StoreError>;

    /// Unlinks permissions from a module.
    async fn detach_module_permissions(
        &self,
        module: EntityId,
        permissions: Option<&[EntityId]>,
    ) -> std::result::Result<(), StoreError>;

    /// Returns modules assigned to a subject.
    async fn subject_modules(
        &self,
        subject: &SubjectKey,
    ) -> std::result::Result<Vec<Module>, StoreError>;

    /// Returns permissions assigned directly to a subject.
    async fn subject_permissions(
        &self,
        subject: &SubjectKey,
    ) -> std::result::Result<Vec<Permission>, StoreError>;

    /// Assigns modules to a subject.
    async fn attach_subject_modules(
        &self,
        subject: &SubjectKey,
        modules: &[EntityId],
    ) -> std::result::Result<(), StoreError>;

    /// Removes modules from a subject.
    async fn detach_subject_modules(
        &self,
        subject: &SubjectKey,
        modules: Option<&[EntityId]>,
    ) -> std::result::Result<(), StoreError>;

    /// Assigns permissions directly to a subject.
    async fn attach_subject_permissions(
        &self,
        subject: &SubjectKey,
        permissions: &[EntityId],
    ) -> std::result::Result<(), StoreError>;

    /// Removes direct permissions from a subject.
    async fn detach_subject_permissions(
        &self,
        subject: &SubjectKey,
        permissions: Option<&[EntityId]>,
    ) -> std::result::Result<(), StoreError>;

    /// Returns subjects of `subject_type` holding any of `modules`.
    async fn subjects_with_modules(
        &self,
        subject_type: &SubjectType,
        modules: &[EntityId],
    ) -> std::result::Result<Vec<SubjectKey>, StoreError>;
}

/// Composite store trait.
pub trait Store:
    EntityStore<Permission>
    + EntityStore<Module>
    + PermissionSource
    + AssociationStore
    + Send
    + Sync
{
}

impl<T> Store for T where
    T: EntityStore<Permission>
        + EntityStore<Module>
        + PermissionSource
        + AssociationStore
        + Send
        + Sync
{
}

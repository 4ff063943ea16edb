//! Guard-scoped module and permission authorization.
//!
//! Subjects hold permissions directly or through modules (named permission
//! collections). Every permission and module belongs to one guard, and edges
//! across guards are rejected. The full permission set with its granting
//! modules is read through a [`PermissionCache`] that is flushed on every
//! mutation. Use [`Registrar`] for lookups, mutations and checks, and
//! [`Gate`] to chain it with other authorization hooks.
//!
//! # Examples
//!
//! Granting through a module with the in-memory backends (enable
//! `memory-store` and `memory-cache`):
//! ```no_run
//! # #[cfg(all(feature = "memory-store", feature = "memory-cache"))]
//! # async fn demo() -> rs_modperm::Result<()> {
//! use rs_modperm::{Config, MemoryCache, MemoryStore, Module, Permission, RegistrarBuilder, SubjectKey};
//! use std::sync::Arc;
//!
//! let registrar = RegistrarBuilder::new(MemoryStore::new(), Config::default())
//!     .cache_store(Arc::new(MemoryCache::tagged(1024)))
//!     .build();
//!
//! let _: Permission = registrar.find_or_create("articles.edit", None).await?;
//! let editor: Module = registrar.find_or_create("editor", None).await?;
//! let mut editor = registrar.load_module(editor).await?;
//! registrar.give_permission_to_module(&mut editor, "articles.edit").await?;
//!
//! let key = SubjectKey::try_from_parts("user", "42")?;
//! let mut subject = registrar.load_subject(key).await?;
//! registrar.assign_module(&mut subject, "editor").await?;
//! assert!(registrar.can(&subject, "articles.edit").await?);
//! # Ok(())
//! # }
//! ```
#![forbid(unsafe_code)]

mod access;
mod cache;
mod config;
mod error;
mod gate;
mod guard;
mod membership;
mod model;
mod permission_cache;
mod registrar;
mod store;
mod types;
#[cfg(feature = "memory-cache")]
mod memory_cache;

#[cfg(feature = "memory-store")]
mod memory_store;

#[cfg(feature = "axum")]
pub mod axum;

pub use crate::access::{AccessError, Requirement, RequirementKind, Unauthorized};
pub use crate::cache::{CacheStore, CacheStores, NoCache, TaggableStore};
pub use crate::config::{
    CacheConfig, ColumnNames, Config, DEFAULT_CACHE_EXPIRATION_MINUTES, DEFAULT_CACHE_KEY,
    DEFAULT_CACHE_STORE, TableNames,
};
pub use crate::error::{Error, LookupKey, Result, StoreError};
pub use crate::gate::{Decision, FnHook, Gate, GateHook, PermissionHook, Verdict};
pub use crate::guard::{GuardConfig, GuardDefinition, GuardResolver};
pub use crate::membership::{
    LoadedModule, PermissionHolder, Query, Subject, Target, has_all, has_any, parse_pipe_list,
};
pub use crate::model::{EntityKind, GuardedEntity, Module, Permission, PermissionEntry};
pub use crate::permission_cache::{PermissionCache, PermissionFilter};
pub use crate::registrar::{Registrar, RegistrarBuilder};
pub use crate::store::{AssociationStore, EntityStore, PermissionSource, Store};
pub use crate::types::{
    EntityId, EntityName, GuardName, SubjectId, SubjectKey, SubjectType,
};

#[cfg(feature = "memory-store")]
pub use crate::memory_store::MemoryStore;

#[cfg(feature = "memory-cache")]
pub use crate::memory_cache::MemoryCache;

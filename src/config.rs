//! Startup configuration.
//!
//! A [`Config`] is built once by the host and handed to
//! [`RegistrarBuilder`](crate::RegistrarBuilder). Nothing here is global or
//! mutable after construction.

use crate::guard::GuardConfig;
use std::time::Duration;

/// Default cache lifetime: 24 hours.
pub const DEFAULT_CACHE_EXPIRATION_MINUTES: u64 = 60 * 24;

/// Default cache key, also used as the tag on tag-capable stores.
pub const DEFAULT_CACHE_KEY: &str = "rs_modperm.permission.cache";

/// Selector that resolves to the default cache store.
pub const DEFAULT_CACHE_STORE: &str = "default";

/// Top-level configuration.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Config {
    /// Table names used by entity store backends.
    pub table_names: TableNames,
    /// Column names used by entity store backends.
    pub column_names: ColumnNames,
    /// Permission cache settings.
    pub cache: CacheConfig,
    /// Guard definitions and the default guard.
    pub guards: GuardConfig,
    /// Include required permission names in rejection messages.
    pub display_permission_in_exception: bool,
    /// Include required module names in rejection messages.
    pub display_module_in_exception: bool,
}

impl Config {
    /// Replaces the guard configuration.
    pub fn with_guards(mut self, guards: GuardConfig) -> Self {
        self.guards = guards;
        self
    }

    /// Replaces the cache configuration.
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Toggles permission names in rejection messages.
    pub fn display_permission_in_exception(mut self, on: bool) -> Self {
        self.display_permission_in_exception = on;
        self
    }

    /// Toggles module names in rejection messages.
    pub fn display_module_in_exception(mut self, on: bool) -> Self {
        self.display_module_in_exception = on;
        self
    }
}

/// Association and entity table names.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TableNames {
    pub modules: String,
    pub permissions: String,
    pub model_has_permissions: String,
    pub model_has_modules: String,
    pub module_has_permissions: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            modules: "modules".to_string(),
            permissions: "permissions".to_string(),
            model_has_permissions: "model_has_permissions".to_string(),
            model_has_modules: "model_has_modules".to_string(),
            module_has_permissions: "module_has_permissions".to_string(),
        }
    }
}

/// Column names of the polymorphic join tables.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ColumnNames {
    /// Owner id column of the subject join tables.
    pub model_morph_key: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            model_morph_key: "model_id".to_string(),
        }
    }
}

/// Permission cache settings.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CacheConfig {
    /// Entry lifetime in minutes.
    pub expiration_minutes: u64,
    /// Base cache key and tag.
    pub key: String,
    /// Permission attribute that callers check against.
    ///
    /// Not read by the registrar, which always checks by name. Kept for
    /// external store backends that key cached rows by another attribute.
    pub model_key: String,
    /// Cache store selector, see [`CacheStores`](crate::CacheStores).
    pub store: String,
}

impl CacheConfig {
    /// Entry lifetime as a [`Duration`].
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.expiration_minutes.saturating_mul(60))
    }

    /// Sets the lifetime in minutes.
    pub fn with_expiration_minutes(mut self, minutes: u64) -> Self {
        self.expiration_minutes = minutes;
        self
    }

    /// Sets the base key.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Sets the store selector.
    pub fn with_store(mut self, store: impl Into<String>) -> Self {
        self.store = store.into();
        self
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            expiration_minutes: DEFAULT_CACHE_EXPIRATION_MINUTES,
            key: DEFAULT_CACHE_KEY.to_string(),
            model_key: "name".to_string(),
            store: DEFAULT_CACHE_STORE.to_string(),
        }
    }
}

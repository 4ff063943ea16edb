//! Membership checks against a holder's loaded associations.
//!
//! Nothing here touches storage. A [`Subject`] or [`LoadedModule`] carries the
//! associations that were current when it was loaded; the registrar reloads
//! them after every mutation it performs.

use crate::error::{Error, Result};
use crate::model::{GuardedEntity, Module, Permission};
use crate::types::{EntityId, EntityName, GuardName, SubjectKey};
use std::collections::HashSet;

/// One query term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target<E> {
    /// Match by name.
    Name(String),
    /// Match by storage id.
    Id(EntityId),
    /// Match an already resolved entity by id, bypassing lookup.
    Entity(E),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum TargetKey {
    Name(String),
    Id(EntityId),
}

impl TargetKey {
    fn matches<E: GuardedEntity>(&self, entity: &E) -> bool {
        match self {
            Self::Name(name) => entity.name().as_str() == name,
            Self::Id(id) => entity.id() == *id,
        }
    }
}

impl<E: GuardedEntity> Target<E> {
    fn key(&self) -> TargetKey {
        match self {
            Self::Name(name) => TargetKey::Name(name.trim().to_string()),
            Self::Id(id) => TargetKey::Id(*id),
            Self::Entity(entity) => TargetKey::Id(entity.id()),
        }
    }

    /// Returns true when `entity` is the one this term refers to.
    pub fn matches(&self, entity: &E) -> bool {
        self.key().matches(entity)
    }
}

impl<E> From<&str> for Target<E> {
    fn from(value: &str) -> Self {
        Self::Name(value.to_string())
    }
}

impl<E> From<String> for Target<E> {
    fn from(value: String) -> Self {
        Self::Name(value)
    }
}

impl<E> From<&EntityName> for Target<E> {
    fn from(value: &EntityName) -> Self {
        Self::Name(value.as_str().to_string())
    }
}

impl<E> From<EntityId> for Target<E> {
    fn from(value: EntityId) -> Self {
        Self::Id(value)
    }
}

impl<E> From<u64> for Target<E> {
    fn from(value: u64) -> Self {
        Self::Id(EntityId::new(value))
    }
}

/// A normalized list of query terms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query<E> {
    targets: Vec<Target<E>>,
}

impl<E> Query<E> {
    /// Creates a query from terms.
    pub fn new(targets: Vec<Target<E>>) -> Self {
        Self { targets }
    }

    /// Returns the terms.
    pub fn targets(&self) -> &[Target<E>] {
        &self.targets
    }

    /// Consumes the query, returning its terms.
    pub fn into_targets(self) -> Vec<Target<E>> {
        self.targets
    }

    /// Returns true when there are no terms.
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// A single string is one name, or a pipe-delimited list when it contains `|`.
impl<E> From<&str> for Query<E> {
    fn from(value: &str) -> Self {
        if !value.contains('|') {
            return Self::new(vec![Target::from(value)]);
        }
        Self::new(parse_pipe_list(value).into_iter().map(Target::Name).collect())
    }
}

impl<E> From<String> for Query<E> {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl<E> From<EntityId> for Query<E> {
    fn from(value: EntityId) -> Self {
        Self::new(vec![Target::Id(value)])
    }
}

impl<E> From<u64> for Query<E> {
    fn from(value: u64) -> Self {
        Self::new(vec![Target::Id(EntityId::new(value))])
    }
}

impl<E> From<Target<E>> for Query<E> {
    fn from(value: Target<E>) -> Self {
        Self::new(vec![value])
    }
}

impl<E, T> From<Vec<T>> for Query<E>
where
    T: Into<Target<E>>,
{
    fn from(values: Vec<T>) -> Self {
        Self::new(values.into_iter().map(Into::into).collect())
    }
}

impl<E, T> From<&[T]> for Query<E>
where
    T: Into<Target<E>> + Clone,
{
    fn from(values: &[T]) -> Self {
        Self::new(values.iter().cloned().map(Into::into).collect())
    }
}

impl<E, T, const N: usize> From<[T; N]> for Query<E>
where
    T: Into<Target<E>>,
{
    fn from(values: [T; N]) -> Self {
        Self::new(values.into_iter().map(Into::into).collect())
    }
}

macro_rules! impl_entity_targets {
    ($entity:ty) => {
        impl From<$entity> for Target<$entity> {
            fn from(value: $entity) -> Self {
                Self::Entity(value)
            }
        }

        impl From<&$entity> for Target<$entity> {
            fn from(value: &$entity) -> Self {
                Self::Entity(value.clone())
            }
        }

        impl From<$entity> for Query<$entity> {
            fn from(value: $entity) -> Self {
                Self::new(vec![Target::Entity(value)])
            }
        }

        impl From<&$entity> for Query<$entity> {
            fn from(value: &$entity) -> Self {
                Self::new(vec![Target::Entity(value.clone())])
            }
        }
    };
}

impl_entity_targets!(Module);
impl_entity_targets!(Permission);

/// Splits a pipe-delimited list of names.
///
/// The input is trimmed first. Inputs of at most two bytes come back whole.
/// An input wrapped in one matching pair of `'` or `"` is a single literal
/// name with the quotes stripped, so names may contain `|`.
pub fn parse_pipe_list(input: &str) -> Vec<String> {
    let trimmed = input.trim();
    if trimmed.len() <= 2 {
        return vec![trimmed.to_string()];
    }

    let bytes = trimmed.as_bytes();
    let first = bytes[0];
    let last = bytes[bytes.len() - 1];
    if matches!(first, b'\'' | b'"') && first == last {
        return vec![trimmed[1..trimmed.len() - 1].to_string()];
    }

    trimmed.split('|').map(str::to_string).collect()
}

/// Returns true when `loaded` contains any term of `query`.
pub fn has_any<E: GuardedEntity>(loaded: &[E], query: &Query<E>) -> bool {
    query
        .targets()
        .iter()
        .any(|target| loaded.iter().any(|entity| target.matches(entity)))
}

/// Returns true when `loaded` contains every term of `query`.
///
/// Terms are collapsed into a set first, so repeated terms never cause a
/// false negative. An empty query is trivially satisfied.
///
/// Name terms compare by name, but entity and id terms compare by id: a
/// same-named module from another guard does not satisfy an entity term.
pub fn has_all<E: GuardedEntity>(loaded: &[E], query: &Query<E>) -> bool {
    let wanted: HashSet<TargetKey> = query.targets().iter().map(Target::key).collect();
    let present: HashSet<TargetKey> = wanted
        .iter()
        .filter(|key| loaded.iter().any(|entity| key.matches(entity)))
        .cloned()
        .collect();
    present == wanted
}

/// Fails with [`Error::GuardMismatch`] unless `entity` belongs to one of `guards`.
pub(crate) fn ensure_shares_guard<E: GuardedEntity>(guards: &[GuardName], entity: &E) -> Result<()> {
    if guards.contains(entity.guard_name()) {
        return Ok(());
    }
    tracing::warn!(
        kind = %E::KIND,
        name = %entity.name(),
        guard = %entity.guard_name(),
        "entity guard does not match holder guards"
    );
    Err(Error::GuardMismatch {
        given: entity.guard_name().clone(),
        expected: guards.to_vec(),
    })
}

/// Anything that holds direct permissions under a set of guards.
pub trait PermissionHolder: Send + Sync {
    /// Guards the holder accepts entities from; never empty.
    fn guard_names(&self) -> &[GuardName];

    /// Guard used to resolve names and ids for this holder.
    fn default_guard(&self) -> &GuardName;

    /// Permissions linked directly to the holder.
    fn direct_permissions(&self) -> &[Permission];
}

/// A subject with its modules and direct permissions loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    key: SubjectKey,
    default_guard: GuardName,
    guard_names: Vec<GuardName>,
    modules: Vec<Module>,
    permissions: Vec<Permission>,
}

impl Subject {
    /// Creates a subject accepting only `default_guard`, with nothing loaded.
    pub fn new(key: SubjectKey, default_guard: GuardName) -> Self {
        Self {
            key,
            guard_names: vec![default_guard.clone()],
            default_guard,
            modules: Vec::new(),
            permissions: Vec::new(),
        }
    }

    /// Adds further acceptable guards.
    pub fn with_guards(mut self, guards: impl IntoIterator<Item = GuardName>) -> Self {
        for guard in guards {
            if !self.guard_names.contains(&guard) {
                self.guard_names.push(guard);
            }
        }
        self
    }

    /// Replaces the loaded associations.
    pub fn with_loaded(mut self, modules: Vec<Module>, permissions: Vec<Permission>) -> Self {
        self.modules = modules;
        self.permissions = permissions;
        self
    }

    /// Owner key in the association tables.
    pub fn key(&self) -> &SubjectKey {
        &self.key
    }

    /// Loaded modules.
    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    /// Names of the loaded modules.
    pub fn module_names(&self) -> Vec<&EntityName> {
        self.modules.iter().map(|module| &module.name).collect()
    }

    /// Returns true when the subject holds any of the given modules.
    pub fn has_module(&self, modules: impl Into<Query<Module>>) -> bool {
        has_any(&self.modules, &modules.into())
    }

    /// Alias of [`Subject::has_module`].
    pub fn has_any_module(&self, modules: impl Into<Query<Module>>) -> bool {
        self.has_module(modules)
    }

    /// Returns true when the subject holds every given module.
    pub fn has_all_modules(&self, modules: impl Into<Query<Module>>) -> bool {
        has_all(&self.modules, &modules.into())
    }

    pub(crate) fn set_modules(&mut self, modules: Vec<Module>) {
        self.modules = modules;
    }

    pub(crate) fn set_permissions(&mut self, permissions: Vec<Permission>) {
        self.permissions = permissions;
    }
}

impl PermissionHolder for Subject {
    fn guard_names(&self) -> &[GuardName] {
        &self.guard_names
    }

    fn default_guard(&self) -> &GuardName {
        &self.default_guard
    }

    fn direct_permissions(&self) -> &[Permission] {
        &self.permissions
    }
}

/// A module with its permissions loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedModule {
    module: Module,
    guard_names: Vec<GuardName>,
    permissions: Vec<Permission>,
}

impl LoadedModule {
    /// Wraps a module and the permissions linked to it.
    pub fn new(module: Module, permissions: Vec<Permission>) -> Self {
        Self {
            guard_names: vec![module.guard_name.clone()],
            module,
            permissions,
        }
    }

    /// The module row.
    pub fn module(&self) -> &Module {
        &self.module
    }

    pub(crate) fn set_permissions(&mut self, permissions: Vec<Permission>) {
        self.permissions = permissions;
    }
}

impl PermissionHolder for LoadedModule {
    fn guard_names(&self) -> &[GuardName] {
        &self.guard_names
    }

    fn default_guard(&self) -> &GuardName {
        &self.module.guard_name
    }

    fn direct_permissions(&self) -> &[Permission] {
        &self.permissions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard(value: &str) -> GuardName {
        GuardName::try_from(value).unwrap()
    }

    fn module(id: u64, name: &str) -> Module {
        Module {
            id: EntityId::new(id),
            name: EntityName::try_from(name).unwrap(),
            guard_name: guard("web"),
        }
    }

    fn subject(modules: Vec<Module>) -> Subject {
        Subject::new(SubjectKey::try_from_parts("user", "1").unwrap(), guard("web"))
            .with_loaded(modules, Vec::new())
    }

    #[test]
    fn parse_pipe_list_should_split_plain_lists() {
        assert_eq!(parse_pipe_list("edit|delete"), vec!["edit", "delete"]);
        assert_eq!(parse_pipe_list("  a|b|c "), vec!["a", "b", "c"]);
    }

    #[test]
    fn parse_pipe_list_should_keep_quoted_literal() {
        assert_eq!(parse_pipe_list("'a|b'"), vec!["a|b"]);
        assert_eq!(parse_pipe_list("\"x|y|z\""), vec!["x|y|z"]);
    }

    #[test]
    fn parse_pipe_list_should_split_mismatched_quotes() {
        assert_eq!(parse_pipe_list("'a|b\""), vec!["'a", "b\""]);
    }

    #[test]
    fn parse_pipe_list_should_short_circuit_short_input() {
        assert_eq!(parse_pipe_list("x"), vec!["x"]);
        assert_eq!(parse_pipe_list("a|"), vec!["a|"]);
    }

    #[test]
    fn query_from_str_should_only_split_on_pipe() {
        let single: Query<Module> = Query::from("'editor'");
        assert_eq!(single.targets(), &[Target::Name("'editor'".to_string())]);

        let list: Query<Module> = Query::from("editor|viewer");
        assert_eq!(list.targets().len(), 2);
    }

    #[test]
    fn has_module_should_match_name_id_and_entity() {
        let editor = module(1, "editor");
        let subject = subject(vec![editor.clone()]);

        assert!(subject.has_module("editor"));
        assert!(subject.has_module(1_u64));
        assert!(subject.has_module(&editor));
        assert!(!subject.has_module("viewer"));
        assert!(!subject.has_module(module(2, "editor").id));
    }

    #[test]
    fn has_any_module_should_match_any_term() {
        let subject = subject(vec![module(1, "editor")]);

        assert!(subject.has_any_module(vec!["viewer", "editor"]));
        assert!(subject.has_any_module("viewer|editor"));
        assert!(!subject.has_any_module(["viewer", "admin"]));
        assert!(!subject.has_any_module(Vec::<&str>::new()));
    }

    #[test]
    fn has_all_modules_should_require_superset() {
        let subject = subject(vec![module(1, "a"), module(2, "b"), module(3, "c")]);

        assert!(subject.has_all_modules(["a", "b"]));
        assert!(subject.has_all_modules(["a", "a", "b"]));
        assert!(subject.has_all_modules("a|c"));
        assert!(!subject.has_all_modules(["a", "d"]));
    }

    #[test]
    fn has_all_modules_should_compare_entities_by_id() {
        let a = module(1, "a");
        let subject = subject(vec![a.clone(), module(2, "b")]);

        assert!(subject.has_all_modules(vec![a.clone(), module(2, "b")]));
        assert!(!subject.has_all_modules(vec![a, module(9, "b")]));
    }

    #[test]
    fn has_all_modules_should_handle_quoted_pipe_names() {
        let subject = subject(vec![module(1, "a|b")]);

        assert!(subject.has_all_modules("'a|b'"));
        assert!(!subject.has_all_modules("a|b"));
    }

    #[test]
    fn ensure_shares_guard_should_reject_foreign_guard() {
        let api_module = Module {
            guard_name: guard("api"),
            ..module(1, "editor")
        };

        let result = ensure_shares_guard(&[guard("web")], &api_module);

        assert!(matches!(result, Err(Error::GuardMismatch { .. })));
        assert!(ensure_shares_guard(&[guard("web"), guard("api")], &api_module).is_ok());
    }

    #[test]
    fn with_guards_should_not_duplicate_default() {
        let subject = Subject::new(SubjectKey::try_from_parts("user", "1").unwrap(), guard("web"))
            .with_guards([guard("web"), guard("admin")]);

        assert_eq!(subject.guard_names(), &[guard("web"), guard("admin")]);
        assert_eq!(subject.default_guard(), &guard("web"));
    }
}

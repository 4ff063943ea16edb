#![cfg(all(feature = "memory-store", feature = "memory-cache"))]

use futures::executor::block_on;
use rs_modperm::{
    CacheStore, CacheStores, Config, Decision, Error, FnHook, Gate, GuardConfig, GuardName,
    MemoryCache, MemoryStore, Module, Permission, PermissionFilter, Registrar, RegistrarBuilder,
    Requirement, Subject, SubjectKey, SubjectType, Verdict, AccessError,
};
use std::sync::Arc;

fn guard(value: &str) -> GuardName {
    GuardName::try_from(value).unwrap()
}

fn user(id: &str) -> SubjectKey {
    SubjectKey::try_from_parts("user", id).unwrap()
}

fn config() -> Config {
    Config::default().with_guards(
        GuardConfig::new(guard("web"))
            .guard(guard("web"), SubjectType::try_from("user").unwrap())
            .guard(guard("api"), SubjectType::try_from("client").unwrap()),
    )
}

fn registrar_with(cache: Arc<dyn CacheStore>) -> (MemoryStore, Registrar<MemoryStore>) {
    let store = MemoryStore::new();
    let registrar = RegistrarBuilder::new(store.clone(), config())
        .cache_store(cache)
        .build();
    (store, registrar)
}

fn tagged() -> (MemoryStore, Registrar<MemoryStore>) {
    registrar_with(Arc::new(MemoryCache::tagged(64)))
}

fn untagged() -> (MemoryStore, Registrar<MemoryStore>) {
    registrar_with(Arc::new(MemoryCache::new(64)))
}

fn names(permissions: &[rs_modperm::PermissionEntry]) -> Vec<String> {
    let mut names: Vec<String> = permissions
        .iter()
        .map(|entry| entry.permission.name.to_string())
        .collect();
    names.sort();
    names
}

#[test]
fn end_to_end_module_membership() {
    let (_, registrar) = tagged();

    let editor: Module = block_on(registrar.create("editor", Some(&guard("web")))).unwrap();
    let edit: Permission = block_on(registrar.create("edit-post", Some(&guard("web")))).unwrap();
    let mut editor = block_on(registrar.load_module(editor)).unwrap();
    block_on(registrar.give_permission_to_module(&mut editor, &edit)).unwrap();

    let mut subject = block_on(registrar.load_subject(user("s"))).unwrap();
    block_on(registrar.assign_module(&mut subject, "editor")).unwrap();

    assert!(subject.has_module("editor"));
    assert!(subject.has_any_module(["editor", "viewer"]));
    assert!(!subject.has_all_modules(["editor", "viewer"]));
    assert!(block_on(registrar.can(&subject, "edit-post")).unwrap());
}

#[test]
fn find_or_create_twice_yields_one_row() {
    let (store, registrar) = tagged();

    let first: Permission = block_on(registrar.find_or_create("edit", None)).unwrap();
    let second: Permission = block_on(registrar.find_or_create("edit", None)).unwrap();

    assert_eq!(first.id, second.id);
    let all = block_on(registrar.get_permissions(&PermissionFilter::new())).unwrap();
    assert_eq!(all.len(), 1);
    assert!(store.load_count() >= 1);
}

#[test]
fn create_twice_fails_with_already_exists() {
    let (_, registrar) = untagged();

    block_on(registrar.create::<Module>("editor", None)).unwrap();
    let err = block_on(registrar.create::<Module>("editor", None)).unwrap_err();

    assert!(matches!(err, Error::AlreadyExists { .. }));
    assert_eq!(
        err.to_string(),
        "A `module` already exists for name `editor` and guard `web`."
    );
}

#[test]
fn foreign_guard_permission_raises_mismatch() {
    let (_, registrar) = tagged();
    block_on(registrar.create::<Permission>("edit", Some(&guard("api")))).unwrap();
    let subject = block_on(registrar.load_subject(user("1"))).unwrap();

    let err = block_on(registrar.has_permission_to(&subject, "edit")).unwrap_err();

    assert!(matches!(err, Error::GuardMismatch { .. }));
}

fn assert_cache_follows_new_links(registrar: &Registrar<MemoryStore>) {
    block_on(registrar.create::<Permission>("edit", None)).unwrap();
    block_on(registrar.create::<Permission>("publish", None)).unwrap();
    let module: Module = block_on(registrar.create("editor", None)).unwrap();

    // Warm the cache before linking anything.
    let before = block_on(registrar.get_permissions(&PermissionFilter::new())).unwrap();
    assert!(before.iter().all(|entry| entry.modules.is_empty()));

    let mut module = block_on(registrar.load_module(module)).unwrap();
    block_on(registrar.give_permission_to_module(&mut module, "publish")).unwrap();
    let mut subject = block_on(registrar.load_subject(user("1"))).unwrap();
    block_on(registrar.assign_module(&mut subject, "editor")).unwrap();

    let after = block_on(registrar.get_permissions(&PermissionFilter::new())).unwrap();
    let publish = after
        .iter()
        .find(|entry| entry.permission.name.as_str() == "publish")
        .unwrap();
    assert!(publish.granted_by(module.module().id));
    assert!(block_on(registrar.can(&subject, "publish")).unwrap());
    assert!(!block_on(registrar.can(&subject, "edit")).unwrap());
}

#[test]
fn tagged_cache_reflects_new_links_without_expiry() {
    let (_, registrar) = tagged();
    assert_cache_follows_new_links(&registrar);
}

#[test]
fn untagged_cache_reflects_new_links_without_expiry() {
    let (_, registrar) = untagged();
    assert_cache_follows_new_links(&registrar);
}

#[test]
fn invalidated_cache_matches_fresh_store_reads() {
    let (store, registrar) = tagged();
    block_on(registrar.create::<Permission>("edit", None)).unwrap();
    block_on(registrar.create::<Permission>("view", Some(&guard("api")))).unwrap();

    let filters = [
        PermissionFilter::new(),
        PermissionFilter::new().guard(guard("web")),
        PermissionFilter::new().guard(guard("api")),
    ];
    for filter in &filters {
        block_on(registrar.get_permissions(filter)).unwrap();
    }

    block_on(registrar.forget_cached_permissions()).unwrap();

    for filter in &filters {
        let cached = block_on(registrar.get_permissions(filter)).unwrap();
        let fresh = block_on(rs_modperm::PermissionSource::load_permissions(&store, filter)).unwrap();
        assert_eq!(names(&cached), names(&fresh));
    }
}

#[test]
fn concurrent_cold_reads_match_fresh_store_read() {
    for (store, registrar) in [tagged(), untagged()] {
        block_on(registrar.create::<Permission>("edit", None)).unwrap();
        block_on(registrar.create::<Permission>("delete", None)).unwrap();
        block_on(registrar.create::<Permission>("view", Some(&guard("api")))).unwrap();
        block_on(registrar.forget_cached_permissions()).unwrap();
        let loads = store.load_count();

        let filter = PermissionFilter::new();
        let fresh = block_on(rs_modperm::PermissionSource::load_permissions(&store, &filter)).unwrap();
        let registrar = Arc::new(registrar);
        let joins: Vec<_> = (0..8)
            .map(|_| {
                let registrar = Arc::clone(&registrar);
                std::thread::spawn(move || {
                    block_on(registrar.get_permissions(&PermissionFilter::new())).unwrap()
                })
            })
            .collect();

        for join in joins {
            let cached = join.join().expect("thread panicked");
            assert_eq!(names(&cached), names(&fresh));
        }
        // One fresh read plus at least one cold load.
        assert!(store.load_count() >= loads + 2);
    }
}

#[test]
fn padded_names_resolve_to_the_created_entity() {
    let (_, registrar) = tagged();
    let editor: Module = block_on(registrar.create(" editor ", None)).unwrap();
    let edit: Permission = block_on(registrar.create(" edit ", None)).unwrap();
    let mut loaded = block_on(registrar.load_module(editor.clone())).unwrap();
    block_on(registrar.give_permission_to_module(&mut loaded, " edit ")).unwrap();

    let found: Module = block_on(registrar.find_by_name(" editor ", None)).unwrap();
    let again: Module = block_on(registrar.find_or_create(" editor ", None)).unwrap();
    assert_eq!(editor.name.as_str(), "editor");
    assert_eq!(found.id, editor.id);
    assert_eq!(again.id, editor.id);

    let mut subject = block_on(registrar.load_subject(user("1"))).unwrap();
    block_on(registrar.assign_module(&mut subject, " editor ")).unwrap();

    assert!(subject.has_module(" editor "));
    assert!(subject.has_any_module("missing| editor "));
    assert!(subject.has_all_modules([" editor ", "editor"]));
    assert!(block_on(registrar.can(&subject, " edit ")).unwrap());
    assert!(block_on(registrar.can(&subject, edit.id)).unwrap());
}

#[test]
fn repeated_reads_hit_the_cache() {
    let (store, registrar) = untagged();
    block_on(registrar.create::<Permission>("edit", None)).unwrap();

    block_on(registrar.get_permissions(&PermissionFilter::new())).unwrap();
    let loads = store.load_count();
    block_on(registrar.get_permissions(&PermissionFilter::new())).unwrap();
    block_on(registrar.get_permissions(&PermissionFilter::new().guard(guard("web")))).unwrap();

    assert_eq!(store.load_count(), loads);
}

#[test]
fn tagged_filters_load_only_their_subset() {
    let (store, registrar) = tagged();
    block_on(registrar.create::<Permission>("edit", None)).unwrap();
    block_on(registrar.create::<Permission>("view", Some(&guard("api")))).unwrap();

    let api = block_on(registrar.get_permissions(&PermissionFilter::new().guard(guard("api")))).unwrap();
    let loads = store.load_count();
    let again = block_on(registrar.get_permissions(&PermissionFilter::new().guard(guard("api")))).unwrap();

    assert_eq!(names(&api), vec!["view"]);
    assert_eq!(api, again);
    assert_eq!(store.load_count(), loads);
}

#[test]
fn unknown_cache_selector_reads_through() {
    let store = MemoryStore::new();
    let stores = CacheStores::new(Arc::new(MemoryCache::new(16)))
        .with_store("shared", Arc::new(MemoryCache::tagged(16)));
    let mut config = config();
    config.cache.store = "missing".to_string();
    let registrar = RegistrarBuilder::new(store.clone(), config)
        .cache_stores(stores)
        .build();
    block_on(registrar.create::<Permission>("edit", None)).unwrap();

    block_on(registrar.get_permissions(&PermissionFilter::new())).unwrap();
    block_on(registrar.get_permissions(&PermissionFilter::new())).unwrap();

    assert!(!registrar.permission_cache().is_taggable());
    assert_eq!(store.load_count(), 2);
}

#[test]
fn gate_hook_allows_and_abstains() {
    let (_, registrar) = tagged();
    block_on(registrar.create::<Permission>("edit", None)).unwrap();
    block_on(registrar.create::<Permission>("delete", None)).unwrap();
    let mut subject = block_on(registrar.load_subject(user("1"))).unwrap();
    block_on(registrar.give_permission_to(&mut subject, "edit")).unwrap();

    let registrar = Arc::new(registrar);
    let mut gate = Gate::new();
    registrar.register_gate_hook(&mut gate);
    gate.push(FnHook(|_: &Subject, ability: &str| -> rs_modperm::Result<Verdict> {
        Ok(if ability == "reports.view" {
            Verdict::Allow
        } else {
            Verdict::Abstain
        })
    }));

    assert_eq!(block_on(gate.check(&subject, "edit")).unwrap(), Decision::Allow);
    assert_eq!(block_on(gate.check(&subject, "delete")).unwrap(), Decision::Deny);
    assert_eq!(block_on(gate.check(&subject, "reports.view")).unwrap(), Decision::Allow);
    assert_eq!(block_on(gate.check(&subject, "unknown")).unwrap(), Decision::Deny);
}

#[test]
fn gate_hook_propagates_guard_mismatch() {
    let (_, registrar) = tagged();
    block_on(registrar.create::<Permission>("sync", Some(&guard("api")))).unwrap();
    let subject = block_on(registrar.load_subject(user("1"))).unwrap();

    let registrar = Arc::new(registrar);
    let mut gate = Gate::new();
    registrar.register_gate_hook(&mut gate);

    assert!(matches!(
        block_on(gate.check(&subject, "sync")),
        Err(Error::GuardMismatch { .. })
    ));
}

#[test]
fn authorize_requirement_maps_outcomes() {
    let (_, registrar) = tagged();
    block_on(registrar.create::<Module>("admin", None)).unwrap();
    block_on(registrar.create::<Permission>("edit", None)).unwrap();
    block_on(registrar.create::<Permission>("sync", Some(&guard("api")))).unwrap();
    let mut subject = block_on(registrar.load_subject(user("1"))).unwrap();
    block_on(registrar.give_permission_to(&mut subject, "edit")).unwrap();

    let allowed = block_on(registrar.authorize_requirement(
        Some(&subject),
        &Requirement::permissions("missing|sync|edit"),
    ));
    let modules = block_on(
        registrar.authorize_requirement(Some(&subject), &Requirement::modules("admin")),
    );
    let either = block_on(registrar.authorize_requirement(
        Some(&subject),
        &Requirement::modules_or_permissions("admin|edit"),
    ));
    let anonymous = block_on(registrar.authorize_requirement(None, &Requirement::modules("admin")));

    assert!(allowed.is_ok());
    assert!(either.is_ok());
    match modules {
        Err(AccessError::Unauthorized(rejection)) => {
            assert_eq!(rejection.message(), "User does not have the right modules.");
            assert_eq!(rejection.required_modules(), &["admin".to_string()]);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    match anonymous {
        Err(AccessError::Unauthorized(rejection)) => {
            assert_eq!(rejection.message(), "User is not logged in.");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[test]
fn subjects_with_modules_lists_holders() {
    let (_, registrar) = tagged();
    block_on(registrar.create::<Module>("editor", None)).unwrap();
    block_on(registrar.create::<Module>("viewer", None)).unwrap();
    let mut alice = block_on(registrar.load_subject(user("alice"))).unwrap();
    let mut bob = block_on(registrar.load_subject(user("bob"))).unwrap();
    block_on(registrar.assign_module(&mut alice, "editor")).unwrap();
    block_on(registrar.assign_module(&mut bob, "viewer")).unwrap();

    let editors = block_on(
        registrar.subjects_with_modules(&SubjectType::try_from("user").unwrap(), "editor"),
    )
    .unwrap();
    let everyone = block_on(registrar.subjects_with_modules(
        &SubjectType::try_from("user").unwrap(),
        "editor|viewer",
    ))
    .unwrap();

    assert_eq!(editors, vec![user("alice")]);
    assert_eq!(everyone, vec![user("alice"), user("bob")]);
}

/// Layered storage tests
///
/// Frame fallback precedence, lazy memoization and sibling isolation.
/// Run with: cargo test --test storage_tests
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use webloom::core::StorageError;
use webloom::storage::LayeredStorage;
use webloom::web::{Environment, UrlResolver};

#[test]
fn test_lookup_precedence_follows_frame_order() {
    let mut storage = LayeredStorage::new();
    storage.set("site", "root".to_string());
    storage.set("theme", "light".to_string());

    storage.push_frame();
    storage.set("theme", "dark".to_string());

    // Own frame wins, parent fills the gaps.
    assert_eq!(*storage.get::<String>("theme").unwrap(), "dark");
    assert_eq!(*storage.get::<String>("site").unwrap(), "root");

    storage.push_frame();
    assert_eq!(*storage.get::<String>("theme").unwrap(), "dark");

    storage.pop_frame();
    storage.pop_frame();
    assert_eq!(*storage.get::<String>("theme").unwrap(), "light");
}

#[test]
fn test_child_never_mutates_parent() {
    let mut storage = LayeredStorage::new();
    storage.set("value", 1u32);
    storage.push_frame();
    storage.set("value", 2u32);
    storage.pop_frame();

    assert_eq!(*storage.get::<u32>("value").unwrap(), 1);
    assert_eq!(storage.depth(), 1);
}

#[test]
fn test_missing_attribute_is_an_error() {
    let storage = LayeredStorage::new();
    let err = storage.get::<String>("unknown").unwrap_err();
    assert!(matches!(err, StorageError::AttributeNotFound(_)));
    assert!(err.to_string().contains("unknown"));
}

#[test]
fn test_lazy_value_computed_once_per_storage() {
    let counter = Arc::new(AtomicUsize::new(0));
    let mut storage = LayeredStorage::new();
    let seen = counter.clone();
    storage.set_lazy("expensive", move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
        Arc::new(42u32)
    });

    for _ in 0..5 {
        assert_eq!(*storage.get::<u32>("expensive").unwrap(), 42);
    }
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn test_lazy_value_not_shared_between_siblings() {
    let counter = Arc::new(AtomicUsize::new(0));

    let mut make = || {
        let seen = counter.clone();
        let mut storage = LayeredStorage::new();
        storage.set_lazy("expensive", move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
            Arc::new("value".to_string())
        });
        storage
    };

    let first = make();
    let second = make();

    assert_eq!(*first.get::<String>("expensive").unwrap(), "value");
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    // The sibling computes its own copy; nothing leaked across instances.
    assert_eq!(*second.get::<String>("expensive").unwrap(), "value");
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[test]
fn test_lazy_value_reads_through_the_full_chain() {
    let mut storage = LayeredStorage::new();
    storage.set_lazy("greeting", |storage| {
        let name = storage
            .try_get::<String>("name")
            .map(|name| (*name).clone())
            .unwrap_or_else(|| "world".to_string());
        Arc::new(format!("hello {}", name))
    });
    storage.push_frame();
    storage.set("name", "webloom".to_string());

    assert_eq!(*storage.get::<String>("greeting").unwrap(), "hello webloom");
}

#[test]
fn test_environment_location_cached_per_instance() {
    let mut env = Environment::new(None, UrlResolver::root());
    env.storage_mut().set("namespace", "docs".to_string());
    env.storage_mut().set("current_url_name", "list".to_string());
    assert_eq!(env.current_location(), "docs.list");

    // Cached on this environment even if inputs change afterwards.
    env.storage_mut().set("current_url_name", "edit".to_string());
    assert_eq!(env.current_location(), "docs.list");

    // A sibling environment computes from its own attributes.
    let mut sibling = Environment::new(None, UrlResolver::root());
    sibling.storage_mut().set("namespace", "docs".to_string());
    sibling
        .storage_mut()
        .set("current_url_name", "edit".to_string());
    assert_eq!(sibling.current_location(), "docs.edit");
}

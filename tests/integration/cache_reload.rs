use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use kiln::persistence::{FsPersistence, Persistence};
use kiln::{CacheError, PersistentCache};

use crate::support::Site;

fn store(site: &Site) -> Arc<dyn Persistence> {
    Arc::new(FsPersistence::new(site.root().join("cache")))
}

#[tokio::test]
async fn reloaded_value_is_served_without_producing() {
    let site = Site::new();
    let first = PersistentCache::<u32>::load(store(&site), "pages.json", "config-a")
        .await
        .unwrap();
    let value = first
        .memoize("k", || async { Ok::<_, anyhow::Error>(42) })
        .await
        .unwrap();
    assert_eq!(value, 42);
    first.save().await.unwrap();

    let second = PersistentCache::<u32>::load(store(&site), "pages.json", "config-a")
        .await
        .unwrap();
    assert!(second.had("k"));
    assert!(!second.has("k"));

    let produced = Arc::new(AtomicUsize::new(0));
    let hits = AtomicUsize::new(0);
    let counter = produced.clone();
    let value = second
        .memoize_with(
            "k",
            move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, anyhow::Error>(7)
            },
            || {
                hits.fetch_add(1, Ordering::SeqCst);
            },
        )
        .await
        .unwrap();
    assert_eq!(value, 42);
    assert_eq!(produced.load(Ordering::SeqCst), 0);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(second.has("k"));
}

#[tokio::test]
async fn changed_identity_discards_previous_generation() {
    let site = Site::new();
    let first = PersistentCache::<String>::create(store(&site), "pages.json", "config-a");
    first.set("index", "dist/index.html".to_string());
    first.save().await.unwrap();

    let second = PersistentCache::<String>::load(store(&site), "pages.json", "config-b")
        .await
        .unwrap();
    assert!(!second.had("index"));
    assert_eq!(second.get("index"), None);
    assert_eq!(second.hash(), "config-b");
}

#[tokio::test]
async fn unpropagated_entries_are_dropped_by_the_next_save() {
    let site = Site::new();
    let first = PersistentCache::<u32>::create(store(&site), "pages.json", "id");
    first.set("kept", 1);
    first.set("dropped", 2);
    first.save().await.unwrap();

    let second = PersistentCache::<u32>::load(store(&site), "pages.json", "id")
        .await
        .unwrap();
    assert!(second.propagate("kept"));
    second.save().await.unwrap();

    let third = PersistentCache::<u32>::load(store(&site), "pages.json", "id")
        .await
        .unwrap();
    assert!(third.had("kept"));
    assert!(!third.had("dropped"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_share_one_production() {
    let site = Site::new();
    let cache = Arc::new(PersistentCache::<u64>::create(store(&site), "pages.json", "id"));
    let produced = Arc::new(AtomicUsize::new(0));
    let hits = Arc::new(AtomicUsize::new(0));

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let cache = cache.clone();
            let produced = produced.clone();
            let hits = hits.clone();
            tokio::spawn(async move {
                cache
                    .memoize_with(
                        "shared",
                        move || async move {
                            produced.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                            Ok::<_, anyhow::Error>(99)
                        },
                        move || {
                            hits.fetch_add(1, Ordering::SeqCst);
                        },
                    )
                    .await
            })
        })
        .collect();

    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), 99);
    }
    assert_eq!(produced.load(Ordering::SeqCst), 1);
    assert_eq!(hits.load(Ordering::SeqCst), 15);
}

#[tokio::test]
async fn require_reports_missing_snapshot() {
    let site = Site::new();
    let result = PersistentCache::<u32>::require(store(&site), "pages.json", "id").await;
    assert!(matches!(result, Err(CacheError::MissingSnapshot(_))));
}

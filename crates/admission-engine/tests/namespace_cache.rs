#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use admission_core::protocol::Namespace;
use admission_engine::cache::{NamespaceCache, NamespaceLookup};

use common::CountingFetcher;

fn team_a() -> Namespace {
    Namespace::new("team-a").with_annotation("example.com/owner", "a")
}

#[tokio::test]
async fn hit_within_ttl_skips_fetch() {
    let cache = NamespaceCache::new(Duration::from_secs(60), Duration::from_secs(60));
    let fetcher = CountingFetcher::new([team_a()]);

    let first = cache.get_namespace(&fetcher, "team-a").await.unwrap();
    let second = cache.get_namespace(&fetcher, "team-a").await.unwrap();

    assert_eq!(fetcher.calls(), 1);
    assert_eq!(first.annotation("example.com/owner"), Some("a"));
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(cache.len(), 1);
}

#[tokio::test]
async fn expired_entry_is_refetched() {
    let cache = NamespaceCache::new(Duration::from_millis(30), Duration::from_secs(60));
    let fetcher = CountingFetcher::new([team_a()]);

    cache.get_namespace(&fetcher, "team-a").await.unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;
    cache.get_namespace(&fetcher, "team-a").await.unwrap();

    assert_eq!(fetcher.calls(), 2);
}

#[tokio::test]
async fn failures_are_not_cached() {
    let cache = NamespaceCache::default();
    let fetcher = CountingFetcher::new([team_a()]);

    let err = cache.get_namespace(&fetcher, "missing").await.unwrap_err();
    assert_eq!(err.code().as_str(), "NOT_FOUND");
    assert!(cache.get_namespace(&fetcher, "missing").await.is_err());

    assert_eq!(fetcher.calls(), 2);
    assert!(cache.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_misses_fetch_once() {
    let cache = Arc::new(NamespaceCache::default());
    let fetcher = Arc::new(CountingFetcher::with_delay([team_a()], Duration::from_millis(50)));
    let lookup = NamespaceLookup::new(Arc::clone(&cache), fetcher.clone());

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let lookup = lookup.clone();
        tasks.push(tokio::spawn(async move { lookup.get("team-a").await }));
    }
    for t in tasks {
        assert_eq!(t.await.unwrap().unwrap().name(), "team-a");
    }

    assert_eq!(fetcher.calls(), 1);
}

#[tokio::test]
async fn invalidate_and_sweep() {
    let cache = NamespaceCache::new(Duration::from_millis(20), Duration::from_secs(60));
    let fetcher = CountingFetcher::new([team_a()]);

    cache.get_namespace(&fetcher, "team-a").await.unwrap();
    assert!(cache.invalidate("team-a"));
    assert!(!cache.invalidate("team-a"));

    cache.insert(Namespace::new("team-b"));
    cache.insert(team_a());
    assert_eq!(cache.len(), 2);
    assert_eq!(cache.sweep(), 0);

    tokio::time::sleep(Duration::from_millis(40)).await;
    assert_eq!(cache.sweep(), 2);
    assert!(cache.is_empty());
}

#[tokio::test]
async fn sweeper_evicts_in_background() {
    let cache = Arc::new(NamespaceCache::new(
        Duration::from_millis(20),
        Duration::from_millis(20),
    ));
    cache.insert(team_a());
    let sweeper = cache.spawn_sweeper();

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(cache.is_empty());

    sweeper.abort();
}

//! Read cache behaviour of resource modules

mod common;

use common::*;
use docrest::prelude::*;
use std::time::Duration;

fn info() -> Query {
    json!({"level": "info"}).as_object().cloned().unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_cached_reads_survive_until_lifespan() {
    let store = InMemoryDocumentStore::new();
    let (_, module) = mount(
        server_builder(store.clone()),
        logs_module()
            .enable_cache(true)
            .cache_lifespan(Duration::from_secs(10)),
    );
    seed(&store, [json!({"level": "info", "message": "a"})]).await;

    let first = module.find(info(), ApiOptions::new(), FindOptions::default()).await.unwrap();
    assert_eq!(first.len(), 1);

    seed(&store, [json!({"level": "info", "message": "b"})]).await;
    tokio::time::advance(Duration::from_secs(5)).await;

    let cached = module.find(info(), ApiOptions::new(), FindOptions::default()).await.unwrap();
    assert_eq!(cached.len(), 1);

    tokio::time::advance(Duration::from_secs(6)).await;

    let fresh = module.find(info(), ApiOptions::new(), FindOptions::default()).await.unwrap();
    assert_eq!(fresh.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_different_options_use_different_entries() {
    let store = InMemoryDocumentStore::new();
    let (_, module) = mount(server_builder(store.clone()), logs_module().enable_cache(true));
    seed(&store, (0..3).map(|i| json!({"level": "info", "message": format!("m{}", i)}))).await;

    let limited = FindOptions {
        limit: Some(1),
        ..Default::default()
    };
    let one = module.find(info(), ApiOptions::new(), limited).await.unwrap();
    let all = module.find(info(), ApiOptions::new(), FindOptions::default()).await.unwrap();

    assert_eq!(one.len(), 1);
    assert_eq!(all.len(), 3);
    assert_eq!(module.cache().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_disabled_cache_always_reads_store() {
    let store = InMemoryDocumentStore::new();
    let (_, module) = mount(server_builder(store.clone()), logs_module());
    seed(&store, [json!({"level": "info", "message": "a"})]).await;

    let first = module.find(info(), ApiOptions::new(), FindOptions::default()).await.unwrap();
    seed(&store, [json!({"level": "info", "message": "b"})]).await;
    let second = module.find(info(), ApiOptions::new(), FindOptions::default()).await.unwrap();

    assert!(!module.cache().is_enabled());
    assert_eq!(first.len(), 1);
    assert_eq!(second.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_cached_listing_over_http() {
    let store = InMemoryDocumentStore::new();
    let (server, _) = mount(
        server_builder(store.clone()),
        logs_module()
            .enable_cache(true)
            .cache_lifespan(Duration::from_secs(60)),
    );
    seed(&store, [json!({"level": "info", "message": "a"})]).await;

    let listing: Value = as_admin(server.get("/api/logs")).await.json();
    assert_eq!(listing.as_array().unwrap().len(), 1);

    seed(&store, [json!({"level": "info", "message": "b"})]).await;

    let listing: Value = as_admin(server.get("/api/logs")).await.json();
    assert_eq!(listing.as_array().unwrap().len(), 1);
}

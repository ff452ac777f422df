//! End-to-end scenarios against the public facade, one per seed test from
//! the testable-properties section of the specification: insert-then-find,
//! type isolation, filter-aware search, graph cascade delete, and
//! reader/writer role enforcement.

use brainy::{
    BackpressureConfig, BrainyConfig, BrainyError, FindOptions, MetadataFilter, Noun, NounType, Query, StorageConfig,
    Verb, VerbType,
};
use serde_json::json;

fn config(dimensions: usize) -> BrainyConfig {
    BrainyConfig::default().with_dimensions(dimensions).with_storage(StorageConfig::Memory)
}

#[tokio::test]
async fn insert_then_find_returns_the_exact_match() {
    let store = brainy::BrainyStore::start(config(4)).await.unwrap();
    let mut unit = vec![0.0; 4];
    unit[0] = 1.0;
    store.add_noun(Noun::new("n1", unit.clone(), NounType::Thing)).await.unwrap();

    let hits = store
        .find(Query::Vector(unit), FindOptions { limit: 1, ..Default::default() })
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "n1");
    // No `where`/`sourceId` in play, so only the vector component (weight 0.6
    // by default) contributes: s_vec = 1 for an exact match.
    assert!((hits[0].score - 0.6).abs() < 1e-4);
}

#[tokio::test]
async fn type_isolation_scopes_search_and_lists_active_types() {
    let store = brainy::BrainyStore::start(config(3)).await.unwrap();
    let v = vec![1.0, 0.0, 0.0];
    store.add_noun(Noun::new("p1", v.clone(), NounType::Person)).await.unwrap();
    store.add_noun(Noun::new("d1", v.clone(), NounType::Document)).await.unwrap();

    let options = FindOptions {
        limit: 10,
        noun_types: Some(vec![NounType::Person]),
        ..Default::default()
    };
    let hits = store.find(Query::Vector(v), options).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "p1");

    let mut active = store.get_active_types();
    active.sort();
    assert_eq!(active, vec![NounType::Person, NounType::Document]);
}

#[tokio::test]
async fn filter_aware_search_only_returns_matching_level() {
    let store = brainy::BrainyStore::start(config(2)).await.unwrap();
    for i in 0..100 {
        let level = if i < 50 { "senior" } else { "junior" };
        let mut noun = Noun::new(format!("person-{i}"), vec![i as f32, 0.0], NounType::Person);
        noun.metadata.insert("level".to_string(), json!(level));
        store.add_noun(noun).await.unwrap();
    }

    let hits = store
        .find_by_filter(MetadataFilter::Eq("level".to_string(), json!("senior")), 10, 0)
        .await
        .unwrap();
    assert_eq!(hits.len(), 10);
}

#[tokio::test]
async fn cascade_delete_removes_touching_verbs() {
    let store = brainy::BrainyStore::start(config(2)).await.unwrap();
    store.add_noun(Noun::new("a", vec![1.0, 0.0], NounType::Thing)).await.unwrap();
    store.add_noun(Noun::new("b", vec![0.0, 1.0], NounType::Thing)).await.unwrap();
    store.add_noun(Noun::new("c", vec![1.0, 1.0], NounType::Thing)).await.unwrap();
    store
        .add_verb(Verb::new("v1", "a", "b", VerbType::RelatedTo, vec![0.0, 0.0]), false)
        .await
        .unwrap();
    store
        .add_verb(Verb::new("v2", "c", "a", VerbType::Contains, vec![0.0, 0.0]), false)
        .await
        .unwrap();

    store.delete_noun("a", false, true).await.unwrap();

    assert!(store.get_noun("a").await.unwrap().is_none());
    assert!(store.get_verb("v1").await.unwrap().is_none());
    assert!(store.get_verb("v2").await.unwrap().is_none());
    assert!(store.get_noun("b").await.unwrap().is_some());
}

#[tokio::test]
async fn soft_deleted_noun_disappears_from_search_but_not_from_get() {
    let store = brainy::BrainyStore::start(config(2)).await.unwrap();
    store.add_noun(Noun::new("n1", vec![1.0, 0.0], NounType::Thing)).await.unwrap();

    store.delete_noun("n1", true, false).await.unwrap();

    let hits = store
        .find(Query::Vector(vec![1.0, 0.0]), FindOptions { limit: 5, ..Default::default() })
        .await
        .unwrap();
    assert!(hits.is_empty());
    assert!(store.get_noun("n1").await.unwrap().unwrap().is_soft_deleted());
}

#[tokio::test]
async fn pagination_windows_are_disjoint_and_exhaustive() {
    let store = brainy::BrainyStore::start(config(2)).await.unwrap();
    for i in 0..9 {
        store
            .add_noun(Noun::new(format!("n{i}"), vec![i as f32, 0.0], NounType::Thing))
            .await
            .unwrap();
    }

    let query = vec![0.0, 0.0];
    let mut seen = std::collections::HashSet::new();
    for offset in [0, 3, 6] {
        let options = FindOptions { limit: 3, offset, ..Default::default() };
        let page = store.find(Query::Vector(query.clone()), options).await.unwrap();
        assert_eq!(page.len(), 3);
        for hit in page {
            assert!(seen.insert(hit.id), "pagination windows overlapped");
        }
    }
    assert_eq!(seen.len(), 9);
}

#[tokio::test]
async fn reader_role_permits_search_but_rejects_mutation() {
    let store = brainy::BrainyStore::start(
        config(2).with_distributed(brainy::DistributedOptions {
            role: Some("reader".to_string()),
            heartbeat_interval_secs: Some(3600),
            partition_count: None,
        }),
    )
    .await
    .unwrap();

    let err = store.add_noun(Noun::new("n1", vec![1.0, 0.0], NounType::Thing)).await.unwrap_err();
    assert!(matches!(err, BrainyError::ReadOnly { .. }));

    let hits = store
        .find(Query::StructuredOnly, FindOptions { limit: 5, ..Default::default() })
        .await
        .unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn writer_role_permits_mutation_but_rejects_search() {
    let store = brainy::BrainyStore::start(
        config(2).with_distributed(brainy::DistributedOptions {
            role: Some("writer".to_string()),
            heartbeat_interval_secs: Some(3600),
            partition_count: None,
        }),
    )
    .await
    .unwrap();

    store.add_noun(Noun::new("n1", vec![1.0, 0.0], NounType::Thing)).await.unwrap();
    let err = store
        .find(Query::Vector(vec![1.0, 0.0]), FindOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, BrainyError::WriteOnly { .. }));
}

#[tokio::test]
async fn cold_start_replays_storage_into_fresh_indexes() {
    let backend: std::sync::Arc<dyn brainy::storage::StorageBackend> =
        std::sync::Arc::new(brainy::storage::MemoryBackend::new());
    {
        let store = brainy::BrainyStore::start_with_storage(config(2), backend.clone()).await.unwrap();
        store.add_noun(Noun::new("n1", vec![1.0, 0.0], NounType::Thing)).await.unwrap();
        store.add_noun(Noun::new("p1", vec![0.0, 1.0], NounType::Person)).await.unwrap();
        store
            .add_verb(Verb::new("v1", "n1", "p1", VerbType::RelatedTo, vec![0.0, 0.0]), false)
            .await
            .unwrap();
    }

    let reloaded = brainy::BrainyStore::start_with_storage(config(2), backend).await.unwrap();
    let mut active = reloaded.get_active_types();
    active.sort();
    assert_eq!(active, vec![NounType::Person, NounType::Thing]);
    assert_eq!(reloaded.neighbors("n1", 1, None).len(), 1);
}

#[tokio::test]
async fn batch_insert_chunks_by_backpressure_limit_and_isolates_failures() {
    let store = brainy::BrainyStore::start(config(2).with_backpressure(BackpressureConfig { max_batch_size: 2 }))
        .await
        .unwrap();

    let mut nouns: Vec<Noun> = (0..5)
        .map(|i| Noun::new(format!("n{i}"), vec![i as f32, 0.0], NounType::Thing))
        .collect();
    nouns.push(Noun::new("bad", vec![1.0], NounType::Thing)); // wrong dimension

    let result = store.add_nouns_batch(nouns).await;
    assert_eq!(result.done.len(), 5);
    assert_eq!(result.failed.len(), 1);
    assert_eq!(result.failed[0].0, "bad");
}

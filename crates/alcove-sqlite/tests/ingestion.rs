//! Integration tests for episode ingestion: retry schedule, error
//! propagation, fact search, and single-writer serialization

use alcove_core::extraction::{
    ExtractedEdge, ExtractedNode, Extraction, MockExtractionProvider,
};
use alcove_core::{GraphStore, StoreError};
use alcove_sqlite::{Column, EmbeddedVaultStore};
use std::sync::Arc;
use std::time::Duration;

fn sample_extraction() -> Extraction {
    Extraction {
        nodes: vec![
            ExtractedNode {
                name: "Ada".to_string(),
                entity_type: "Person".to_string(),
                summary: Some("mathematician".to_string()),
            },
            ExtractedNode {
                name: "Analytical Engine".to_string(),
                entity_type: "Project".to_string(),
                summary: None,
            },
        ],
        edges: vec![ExtractedEdge {
            source: "Ada".to_string(),
            target: "Analytical Engine".to_string(),
            relation: "worked_on".to_string(),
            fact: "Ada wrote programs for the Analytical Engine".to_string(),
            valid_at: None,
            invalid_at: None,
        }],
    }
}

async fn connected_store(provider: Arc<MockExtractionProvider>) -> EmbeddedVaultStore {
    let store = EmbeddedVaultStore::memory(provider);
    store.connect(&[]).await.unwrap();
    store
}

#[tokio::test]
async fn add_episode_persists_nodes_and_edges() {
    let provider = Arc::new(MockExtractionProvider::new());
    provider.set_response("meeting", sample_extraction());
    let store = connected_store(provider).await;

    let outcome = store
        .add_episode("meeting", "Ada talked about the engine", "journal", None, None)
        .await
        .unwrap();
    assert_eq!(outcome.nodes_created, 2);
    assert_eq!(outcome.edges_created, 1);
    assert!(!outcome.episode_uuid.is_empty());

    // Re-ingesting the same entities creates no new nodes, but the fact
    // still accumulates
    let outcome = store
        .add_episode("meeting", "same again", "journal", None, None)
        .await
        .unwrap();
    assert_eq!(outcome.nodes_created, 0);
    assert_eq!(outcome.edges_created, 1);
}

#[tokio::test]
async fn search_returns_facts_with_provenance() {
    let provider = Arc::new(MockExtractionProvider::new());
    provider.set_response("meeting", sample_extraction());
    let store = connected_store(provider).await;
    store
        .add_episode("meeting", "body", "journal", None, None)
        .await
        .unwrap();

    let facts = store.search("Analytical", None).await.unwrap();
    assert_eq!(facts.len(), 1);
    let fact = &facts[0];
    assert_eq!(fact.source_entity, "Ada");
    assert_eq!(fact.target_entity, "Analytical Engine");
    assert_eq!(fact.relation, "worked_on");
    assert!(fact.fact.contains("programs"));

    assert!(store.search("nothing here", None).await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_propagate_last_error_after_four_attempts() {
    let provider = Arc::new(MockExtractionProvider::new());
    provider.push_failures("model overloaded", 4);
    let store = connected_store(provider.clone()).await;

    let err = store
        .add_episode("meeting", "body", "journal", None, None)
        .await
        .unwrap_err();
    match err {
        StoreError::Ingestion(msg) => assert_eq!(msg, "model overloaded"),
        other => panic!("expected ingestion error, got {:?}", other),
    }

    let calls = provider.calls();
    assert_eq!(calls.len(), 4);

    // Attempts land on the fixed schedule: +0s, +5s, +15s, +45s
    let base = calls[0].started;
    let offsets: Vec<Duration> = calls.iter().map(|c| c.started - base).collect();
    assert_eq!(offsets[0], Duration::ZERO);
    assert_eq!(offsets[1], Duration::from_secs(5));
    assert_eq!(offsets[2], Duration::from_secs(20));
    assert_eq!(offsets[3], Duration::from_secs(65));
}

#[tokio::test(start_paused = true)]
async fn transient_failures_recover_mid_schedule() {
    let provider = Arc::new(MockExtractionProvider::new());
    provider.push_failures("rate limited", 2);
    provider.set_response("meeting", sample_extraction());
    let store = connected_store(provider.clone()).await;

    let outcome = store
        .add_episode("meeting", "body", "journal", None, None)
        .await
        .unwrap();
    assert_eq!(outcome.nodes_created, 2);
    assert_eq!(provider.calls().len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn raw_mutations_wait_for_in_flight_ingestion() {
    let provider = Arc::new(MockExtractionProvider::with_latency(Duration::from_millis(
        80,
    )));
    provider.set_response("slow", sample_extraction());
    let store = Arc::new(connected_store(provider.clone()).await);
    store
        .ensure_node_table("scratch", &[Column::required("id", "TEXT")], "id")
        .await
        .unwrap();

    let ingest = {
        let store = store.clone();
        tokio::spawn(async move {
            store
                .add_episode("slow", "body", "journal", None, None)
                .await
        })
    };
    // Let the ingestion take the write gate before issuing the INSERT
    tokio::time::sleep(Duration::from_millis(20)).await;

    store
        .execute("INSERT INTO scratch (id) VALUES ('s1')", vec![])
        .await
        .unwrap();
    let insert_done = tokio::time::Instant::now();
    ingest.await.unwrap().unwrap();

    let calls = provider.calls();
    assert_eq!(calls.len(), 1);
    assert!(
        calls[0].finished <= insert_done,
        "raw INSERT interleaved into the ingestion: extraction ran {:?} .. {:?}, insert finished {:?}",
        calls[0].started,
        calls[0].finished,
        insert_done
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_ingestions_never_overlap_on_the_backend() {
    let provider = Arc::new(MockExtractionProvider::with_latency(Duration::from_millis(
        40,
    )));
    provider.set_response("left", sample_extraction());
    provider.set_response("right", Extraction::default());
    let store = Arc::new(connected_store(provider.clone()).await);

    let left = {
        let store = store.clone();
        tokio::spawn(async move {
            store
                .add_episode("left", "body", "journal", None, None)
                .await
        })
    };
    let right = {
        let store = store.clone();
        tokio::spawn(async move {
            store
                .add_episode("right", "body", "journal", None, None)
                .await
        })
    };
    left.await.unwrap().unwrap();
    right.await.unwrap().unwrap();

    let mut calls = provider.calls();
    assert_eq!(calls.len(), 2);
    calls.sort_by_key(|c| c.started);
    // The write gate serializes the whole round trip, so the first call
    // finishes before the second one starts
    assert!(
        calls[0].finished <= calls[1].started,
        "extraction spans overlapped: {:?} .. {:?} vs {:?} .. {:?}",
        calls[0].started,
        calls[0].finished,
        calls[1].started,
        calls[1].finished
    );
}

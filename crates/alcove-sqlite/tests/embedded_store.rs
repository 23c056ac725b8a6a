//! Integration tests for the embedded adapter's GraphStore surface

use alcove_core::extraction::MockExtractionProvider;
use alcove_core::types::FieldMap;
use alcove_core::{compile_definition, EntityType, GraphStore, StoreError};
use alcove_sqlite::{Column, EmbeddedVaultStore};
use serde_json::{json, Value};
use std::sync::Arc;

fn person_schema() -> EntityType {
    let doc = serde_yaml::from_str(
        r#"
        name: Person
        fields:
          email: { type: string, required: true }
          age: { type: integer }
          active: { type: boolean }
          tags: { type: array, items: string }
        "#,
    )
    .unwrap();
    compile_definition("person.yaml", &doc).unwrap()
}

fn fields(pairs: &[(&str, Value)]) -> FieldMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

async fn connected_store() -> EmbeddedVaultStore {
    let store = EmbeddedVaultStore::memory(Arc::new(MockExtractionProvider::new()));
    store.connect(&[person_schema()]).await.unwrap();
    store
}

#[tokio::test]
async fn calls_before_connect_fail_fast() {
    let store = EmbeddedVaultStore::memory(Arc::new(MockExtractionProvider::new()));
    assert!(!store.is_connected());

    let err = store.get_entity("Person:x").await.unwrap_err();
    assert!(matches!(err, StoreError::NotConnected));
    let err = store.search("anything", None).await.unwrap_err();
    assert!(matches!(err, StoreError::NotConnected));
}

#[tokio::test]
async fn connect_is_idempotent() {
    let store = connected_store().await;
    assert!(store.is_connected());
    store.connect(&[person_schema()]).await.unwrap();
    assert_eq!(store.list_schemas().len(), 1);
}

#[tokio::test]
async fn create_get_update_roundtrip() {
    let store = connected_store().await;

    let id = store
        .create_entity("Person", fields(&[("email", json!("a@b.com"))]), None)
        .await
        .unwrap();
    assert!(id.starts_with("Person:"));

    let entity = store.get_entity(&id).await.unwrap().unwrap();
    assert_eq!(entity.fields["email"], json!("a@b.com"));
    assert_eq!(entity.entity_type, "Person");

    store
        .update_entity(&id, fields(&[("email", json!("c@d.com"))]), None)
        .await
        .unwrap();
    let entity = store.get_entity(&id).await.unwrap().unwrap();
    assert_eq!(entity.fields["email"], json!("c@d.com"));
}

#[tokio::test]
async fn update_merges_instead_of_replacing() {
    let store = connected_store().await;
    let id = store
        .create_entity(
            "Person",
            fields(&[("email", json!("a@b.com")), ("age", json!(30))]),
            None,
        )
        .await
        .unwrap();

    store
        .update_entity(&id, fields(&[("active", json!(true))]), None)
        .await
        .unwrap();

    let entity = store.get_entity(&id).await.unwrap().unwrap();
    assert_eq!(entity.fields["email"], json!("a@b.com"));
    assert_eq!(entity.fields["age"], json!(30));
    assert_eq!(entity.fields["active"], json!(true));
}

#[tokio::test]
async fn missing_required_field_is_rejected() {
    let store = connected_store().await;
    let err = store
        .create_entity("Person", fields(&[("age", json!(30))]), None)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));
}

#[tokio::test]
async fn unknown_entity_and_fields_are_rejected() {
    let store = connected_store().await;
    assert!(store
        .create_entity("Robot", fields(&[]), None)
        .await
        .is_err());
    assert!(store
        .create_entity(
            "Person",
            fields(&[("email", json!("a@b.com")), ("nickname", json!("Al"))]),
            None,
        )
        .await
        .is_err());
}

#[tokio::test]
async fn get_missing_entity_returns_none() {
    let store = connected_store().await;
    assert!(store.get_entity("Person:nope").await.unwrap().is_none());
    assert!(store.get_entity("garbage").await.unwrap().is_none());
}

#[tokio::test]
async fn delete_removes_entity_and_links() {
    let store = connected_store().await;
    let a = store
        .create_entity("Person", fields(&[("email", json!("a@b.com"))]), None)
        .await
        .unwrap();
    let b = store
        .create_entity("Person", fields(&[("email", json!("b@b.com"))]), None)
        .await
        .unwrap();
    store.create_relationship(&a, "knows", &b).await.unwrap();

    store.delete_entity(&a, Some("cleanup")).await.unwrap();
    assert!(store.get_entity(&a).await.unwrap().is_none());

    // The dangling edge is gone too
    let b_entity = store.get_entity(&b).await.unwrap().unwrap();
    assert!(b_entity.relationships.is_empty());
}

#[tokio::test]
async fn relationship_add_is_idempotent() {
    let store = connected_store().await;
    let a = store
        .create_entity("Person", fields(&[("email", json!("a@b.com"))]), None)
        .await
        .unwrap();
    let b = store
        .create_entity("Person", fields(&[("email", json!("b@b.com"))]), None)
        .await
        .unwrap();

    store.create_relationship(&a, "knows", &b).await.unwrap();
    store.create_relationship(&a, "knows", &b).await.unwrap();

    let entity = store.get_entity(&a).await.unwrap().unwrap();
    assert_eq!(entity.relationships["knows"], vec![b.clone()]);
}

#[tokio::test]
async fn query_clamps_limit_and_pages() {
    let store = connected_store().await;
    for i in 0..5 {
        store
            .create_entity(
                "Person",
                fields(&[("email", json!(format!("p{}@b.com", i)))]),
                None,
            )
            .await
            .unwrap();
    }

    let page = store
        .query_entities("Person", None, 5000, 0)
        .await
        .unwrap();
    assert_eq!(page.limit, 1000);
    assert_eq!(page.count, 5);
    assert_eq!(page.results.len(), 5);

    let page = store.query_entities("Person", None, 2, 2).await.unwrap();
    assert_eq!(page.results.len(), 2);
    assert_eq!(page.offset, 2);
    assert_eq!(page.count, 5);
}

#[tokio::test]
async fn query_filters_on_fields() {
    let store = connected_store().await;
    store
        .create_entity(
            "Person",
            fields(&[("email", json!("a@b.com")), ("age", json!(30))]),
            None,
        )
        .await
        .unwrap();
    store
        .create_entity(
            "Person",
            fields(&[("email", json!("b@b.com")), ("age", json!(40))]),
            None,
        )
        .await
        .unwrap();

    let filter = fields(&[("age", json!(40))]);
    let page = store
        .query_entities("Person", Some(&filter), 10, 0)
        .await
        .unwrap();
    assert_eq!(page.results.len(), 1);
    assert_eq!(page.results[0].fields["email"], json!("b@b.com"));

    let bad_filter = fields(&[("shoe_size", json!(44))]);
    assert!(store
        .query_entities("Person", Some(&bad_filter), 10, 0)
        .await
        .is_err());
}

#[tokio::test]
async fn traversal_follows_chain_with_depth() {
    let store = connected_store().await;
    let p1 = store
        .create_entity("Person", fields(&[("email", json!("p1@b.com"))]), None)
        .await
        .unwrap();
    let p2 = store
        .create_entity("Person", fields(&[("email", json!("p2@b.com"))]), None)
        .await
        .unwrap();
    let p3 = store
        .create_entity("Person", fields(&[("email", json!("p3@b.com"))]), None)
        .await
        .unwrap();
    store.create_relationship(&p1, "knows", &p2).await.unwrap();
    store.create_relationship(&p2, "knows", &p3).await.unwrap();

    let one: Vec<String> = store
        .traverse_graph(&p1, "knows", 1)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.id)
        .collect();
    assert_eq!(one, vec![p1.clone(), p2.clone()]);

    let two: Vec<String> = store
        .traverse_graph(&p1, "knows", 2)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.id)
        .collect();
    assert_eq!(two, vec![p1.clone(), p2.clone(), p3.clone()]);

    assert!(store.traverse_graph(&p1, "knows", 0).await.is_err());
    assert!(store.traverse_graph(&p1, "knows", 6).await.is_err());
}

#[tokio::test]
async fn execute_returns_ordered_row_maps() {
    let store = connected_store().await;
    store
        .create_entity(
            "Person",
            fields(&[("email", json!("a@b.com")), ("age", json!(30))]),
            None,
        )
        .await
        .unwrap();

    let rows = store
        .execute(
            "SELECT email, age FROM Person WHERE age = ?1",
            vec![json!(30)],
        )
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["email"], json!("a@b.com"));
    assert_eq!(rows[0]["age"], json!(30));
}

#[tokio::test]
async fn execute_strips_bookkeeping_from_node_values() {
    let store = connected_store().await;
    store
        .ensure_node_table(
            "scratch",
            &[
                Column::required("id", "TEXT"),
                Column::new("doc", "TEXT"),
            ],
            "id",
        )
        .await
        .unwrap();
    store
        .execute(
            "INSERT INTO scratch (id, doc) VALUES (?1, ?2)",
            vec![
                json!("s1"),
                json!(r#"{"_internal_id":7,"_label":"scratch","name":"kept"}"#),
            ],
        )
        .await
        .unwrap();

    let rows = store
        .execute("SELECT doc FROM scratch WHERE id = 's1'", vec![])
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("name"), Some(&json!("kept")));
    assert!(rows[0].get("_internal_id").is_none());
    assert!(rows[0].get("_label").is_none());
}

#[tokio::test]
async fn ensure_tables_are_idempotent() {
    let store = connected_store().await;
    for _ in 0..2 {
        store
            .ensure_node_table("notes", &[Column::required("id", "TEXT")], "id")
            .await
            .unwrap();
        store
            .ensure_rel_table("note_refs", "notes", "notes", &[])
            .await
            .unwrap();
    }
}

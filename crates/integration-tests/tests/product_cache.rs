//! Product store and tiered cache against the fake table-store.
//!
//! Run with: cargo test -p dawajen-integration-tests --test product_cache

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use dawajen_core::{Bilingual, NewProduct, ProductId, ProductPatch, Session, UserId};
use dawajen_integration_tests::{FakeTableStore, product_row, product_store};
use dawajen_storefront::store::{ServedFrom, StoreError};
use rust_decimal::Decimal;
use serde_json::json;
use tokio_util::sync::CancellationToken;

fn catalog() -> Vec<serde_json::Value> {
    vec![
        product_row(1, "Whole chicken", "Chicken", "Fresh", "25.00"),
        product_row(2, "Chicken wings", "Chicken", "Cuts", "18.00"),
        product_row(3, "Duck", "Duck", "Fresh", "40.00"),
    ]
}

#[tokio::test]
async fn test_miss_then_memory_hit() {
    let fake = FakeTableStore::start().await;
    fake.set_products(catalog());
    let store = product_store(&fake, None, CancellationToken::new()).await;

    let first = store.products().await.unwrap();
    assert_eq!(first.served_from, ServedFrom::Remote);
    assert_eq!(first.products.len(), 3);

    let second = store.products().await.unwrap();
    assert_eq!(second.served_from, ServedFrom::Memory);
    assert_eq!(second.products, first.products);
    assert_eq!(fake.product_list_requests(), 1);
}

#[tokio::test]
async fn test_cold_start_served_from_persistent_tier() {
    let fake = FakeTableStore::start().await;
    fake.set_products(catalog());
    let dir = tempfile::tempdir().unwrap();

    {
        let shutdown = CancellationToken::new();
        let store = product_store(&fake, Some(dir.path()), shutdown.clone()).await;
        store.products().await.unwrap();
        store.cache().flush().await;
        store.shutdown();
    }

    // A restarted process sees the persisted list without asking the backend.
    let store = product_store(&fake, Some(dir.path()), CancellationToken::new()).await;
    let snapshot = store.products().await.unwrap();
    assert_eq!(snapshot.served_from, ServedFrom::Persistent);
    assert_eq!(snapshot.products.len(), 3);
    assert!(snapshot.stored_at.is_some());
    assert_eq!(fake.product_list_requests(), 1);

    // Promoted into memory on the way out.
    let again = store.products().await.unwrap();
    assert_eq!(again.served_from, ServedFrom::Memory);
}

#[tokio::test]
async fn test_refetch_bypasses_cache() {
    let fake = FakeTableStore::start().await;
    fake.set_products(catalog());
    let store = product_store(&fake, None, CancellationToken::new()).await;
    store.products().await.unwrap();

    fake.push_product(product_row(4, "Quail", "Quail", "Fresh", "12.00"));
    assert_eq!(store.products().await.unwrap().products.len(), 3);

    let refreshed = store.refetch().await.unwrap();
    assert_eq!(refreshed.served_from, ServedFrom::Remote);
    assert_eq!(refreshed.products.len(), 4);
    assert_eq!(refreshed.products[0].id, ProductId::new(4));
    assert_eq!(fake.product_list_requests(), 2);
}

#[tokio::test]
async fn test_confirmed_mutations_update_cached_list() {
    let fake = FakeTableStore::start().await;
    fake.set_products(catalog());
    let admin = fake.add_user("owner@example.com", "pw", true);
    let session = Session {
        access_token: admin.token,
        user_id: UserId::new(admin.id),
    };
    let store = product_store(&fake, None, CancellationToken::new()).await;
    store.products().await.unwrap();

    let created = store
        .create_product(
            &session,
            &NewProduct {
                name: Bilingual::new("حمام", "Pigeon"),
                category: Bilingual::new("حمام", "Pigeon"),
                product_type: Bilingual::new("طازج", "Fresh"),
                ingredients: Bilingual::default(),
                description: Bilingual::default(),
                price: Decimal::from(30),
                quantity: 4,
                image_url: None,
            },
        )
        .await
        .unwrap();

    let patch = ProductPatch {
        price: Some(Decimal::from(22)),
        ..ProductPatch::default()
    };
    store
        .update_product(&session, ProductId::new(1), &patch)
        .await
        .unwrap();
    store
        .delete_product(&session, ProductId::new(3))
        .await
        .unwrap();

    let snapshot = store.products().await.unwrap();
    assert_eq!(snapshot.served_from, ServedFrom::Memory);
    let ids: Vec<i64> = snapshot.products.iter().map(|p| p.id.as_i64()).collect();
    assert_eq!(ids, vec![created.id.as_i64(), 2, 1]);
    let chicken = snapshot
        .products
        .iter()
        .find(|p| p.id == ProductId::new(1))
        .unwrap();
    assert_eq!(chicken.price, Decimal::from(22));

    // The backend agrees and no extra list fetch was needed.
    assert_eq!(fake.product(3).unwrap()["is_deleted"], json!(true));
    assert_eq!(fake.product_list_requests(), 1);
}

#[tokio::test]
async fn test_rejected_mutation_leaves_cache_untouched() {
    let fake = FakeTableStore::start().await;
    fake.set_products(catalog());
    let customer = fake.add_user("customer@example.com", "pw", false);
    let session = Session {
        access_token: customer.token,
        user_id: UserId::new(customer.id),
    };
    let store = product_store(&fake, None, CancellationToken::new()).await;
    let before = store.products().await.unwrap();

    let err = store
        .delete_product(&session, ProductId::new(1))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Remote(_)));

    let after = store.products().await.unwrap();
    assert_eq!(after.products, before.products);
}

#[tokio::test]
async fn test_connection_failure_sets_error_status() {
    let fake = FakeTableStore::start().await;
    fake.set_products(catalog());
    fake.fail_product_lists(503, json!({ "message": "network unreachable" }));
    let store = product_store(&fake, None, CancellationToken::new()).await;

    let err = store.products().await.unwrap_err();
    assert!(err.is_connection_error());
    let status = store.status();
    assert!(status.connection_error);
    assert!(status.error.is_some());

    fake.heal();
    let snapshot = store.products().await.unwrap();
    assert_eq!(snapshot.products.len(), 3);
    let status = store.status();
    assert!(status.error.is_none());
    assert!(!status.connection_error);
}

#[tokio::test]
async fn test_product_detail_of_deleted_product_is_not_found() {
    let fake = FakeTableStore::start().await;
    let mut deleted = product_row(9, "Gone", "Chicken", "Fresh", "5");
    deleted["is_deleted"] = json!(true);
    fake.set_products(vec![product_row(1, "Whole chicken", "Chicken", "Fresh", "25"), deleted]);
    let store = product_store(&fake, None, CancellationToken::new()).await;

    let found = store.product(ProductId::new(1)).await.unwrap();
    assert_eq!(found.name.en, "Whole chicken");

    let err = store.product(ProductId::new(9)).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound(id) if id == ProductId::new(9)));
}

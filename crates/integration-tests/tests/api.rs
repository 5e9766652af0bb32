//! Storefront HTTP API end to end.
//!
//! Each test serves the real router on an ephemeral port, backed by a fresh
//! fake table-store.
//!
//! Run with: cargo test -p dawajen-integration-tests --test api

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::str::FromStr;

use dawajen_integration_tests::{FakeTableStore, app_state, eventually, product_row, serve_app};
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde_json::{Value, json};

struct TestApp {
    fake: FakeTableStore,
    base: String,
    http: Client,
}

impl TestApp {
    async fn start() -> Self {
        let fake = FakeTableStore::start().await;
        fake.set_products(vec![
            product_row(1, "Whole chicken", "Chicken", "Fresh", "25.00"),
            product_row(2, "Chicken wings", "Chicken", "Cuts", "18.00"),
            product_row(3, "Chicken breast", "Chicken", "Fresh", "32.00"),
            product_row(4, "Duck", "Duck", "Fresh", "40.00"),
            product_row(5, "Frozen nuggets", "Frozen", "Processed", "15.00"),
        ]);
        let base = serve_app(app_state(&fake)).await;
        Self {
            fake,
            base,
            http: Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        let response = self.http.get(self.url(path)).send().await.unwrap();
        let status = response.status();
        (status, response.json().await.unwrap_or(Value::Null))
    }

    async fn sign_in(&self, email: &str, password: &str) -> String {
        let response = self
            .http
            .post(self.url("/api/auth/sign-in"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = response.json().await.unwrap();
        body["access_token"].as_str().unwrap().to_string()
    }
}

fn ids(page: &Value) -> Vec<i64> {
    page["products"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_i64().unwrap())
        .collect()
}

fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => Decimal::from_str(s).unwrap(),
        other => Decimal::from_str(&other.to_string()).unwrap(),
    }
}

#[tokio::test]
async fn test_catalog_filters_and_sorts() {
    let app = TestApp::start().await;

    let (status, page) = app.get("/api/products").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["state"], "ready");
    assert_eq!(page["served_from"], "remote");
    assert_eq!(ids(&page), vec![5, 4, 3, 2, 1]);

    let (_, page) = app.get("/api/products?category=chicken&type=fresh").await;
    assert_eq!(page["served_from"], "memory");
    assert_eq!(ids(&page), vec![3, 1]);

    let (_, page) = app
        .get("/api/products?category=chicken&sort=price-low")
        .await;
    assert_eq!(ids(&page), vec![2, 1, 3]);

    // Bounds in the wrong order are swapped.
    let (_, page) = app
        .get("/api/products?min_price=30&max_price=18&sort=price-high")
        .await;
    assert_eq!(ids(&page), vec![1, 2]);

    let (_, page) = app.get("/api/products?q=DUCK").await;
    assert_eq!(ids(&page), vec![4]);

    let (_, page) = app.get("/api/products?q=quail").await;
    assert_eq!(page["state"], "empty");
    assert_eq!(page["total"], 0);

    assert_eq!(app.fake.product_list_requests(), 1);
}

#[tokio::test]
async fn test_popular_sort_uses_favorite_counts() {
    let app = TestApp::start().await;
    app.fake.add_favorite(uuid::Uuid::new_v4(), 2);
    app.fake.add_favorite(uuid::Uuid::new_v4(), 2);
    app.fake.add_favorite(uuid::Uuid::new_v4(), 4);

    let (_, page) = app.get("/api/products?sort=popular").await;
    assert_eq!(ids(&page), vec![2, 4, 5, 3, 1]);
}

#[tokio::test]
async fn test_categories_grouped_by_count() {
    let app = TestApp::start().await;

    let (status, body) = app.get("/api/categories").await;
    assert_eq!(status, StatusCode::OK);
    let categories = body["categories"].as_array().unwrap();
    assert_eq!(categories[0]["key"], "chicken");
    assert_eq!(categories[0]["count"], 3);
    assert_eq!(categories[0]["types"][0]["key"], "fresh");
    assert_eq!(categories[0]["types"][0]["count"], 2);
}

#[tokio::test]
async fn test_unknown_product_is_not_found() {
    let app = TestApp::start().await;
    let (status, body) = app.get("/api/products/404").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().is_some());
}

#[tokio::test]
async fn test_backend_outage_offers_retry() {
    let app = TestApp::start().await;
    app.fake
        .fail_product_lists(503, json!({ "message": "connection refused" }));

    let (status, body) = app.get("/api/products").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["connection_error"], true);
    assert_eq!(body["retry"], "/api/products/refresh");

    app.fake.heal();
    let response = app
        .http
        .post(app.url("/api/products/refresh"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["count"], 5);
}

#[tokio::test]
async fn test_admin_routes_require_admin_role() {
    let app = TestApp::start().await;
    app.fake.add_user("customer@example.com", "pw", false);
    app.fake.add_user("owner@example.com", "pw", true);
    let new_product = json!({
        "name": { "ar": "سمان", "en": "Quail" },
        "category": { "ar": "سمان", "en": "Quail" },
        "price": "12.50",
        "quantity": 8,
    });

    let response = app
        .http
        .post(app.url("/api/admin/products"))
        .json(&new_product)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let customer = app.sign_in("customer@example.com", "pw").await;
    let response = app
        .http
        .post(app.url("/api/admin/products"))
        .bearer_auth(&customer)
        .json(&new_product)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Warm the cache so the create is reflected without a refetch.
    app.get("/api/products").await;

    let owner = app.sign_in("owner@example.com", "pw").await;
    let response = app
        .http
        .post(app.url("/api/admin/products"))
        .bearer_auth(&owner)
        .json(&new_product)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created: Value = response.json().await.unwrap();
    let created_id = created["id"].as_i64().unwrap();

    let (_, page) = app.get("/api/products?category=quail").await;
    assert_eq!(ids(&page), vec![created_id]);

    let response = app
        .http
        .delete(app.url(&format!("/api/admin/products/{created_id}")))
        .bearer_auth(&owner)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let (_, page) = app.get("/api/products?category=quail").await;
    assert_eq!(page["state"], "empty");
    assert_eq!(app.fake.product_list_requests(), 1);
}

#[tokio::test]
async fn test_checkout_places_order_and_notifies_shop() {
    let app = TestApp::start().await;
    app.fake.add_user("amina@example.com", "pw", false);
    let token = app.sign_in("amina@example.com", "pw").await;

    for (product_id, quantity) in [(1, 2), (2, 1)] {
        let response = app
            .http
            .post(app.url("/api/cart"))
            .bearer_auth(&token)
            .json(&json!({ "product_id": product_id, "quantity": quantity }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let cart: Value = app
        .http
        .get(app.url("/api/cart"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(decimal(&cart["subtotal"]), Decimal::from(68));
    assert_eq!(cart["item_count"], 3);

    let response = app
        .http
        .post(app.url("/api/orders"))
        .bearer_auth(&token)
        .json(&json!({
            "fulfillment": {
                "method": "delivery",
                "address": "12 Palm Street, Riyadh",
                "phone": "0501234567"
            },
            "notes": "Ring twice"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let order: Value = response.json().await.unwrap();
    assert_eq!(decimal(&order["total"]), Decimal::from(68));
    assert_eq!(order["items"].as_array().unwrap().len(), 2);
    assert!(app.fake.cart_rows().is_empty());

    assert!(eventually(|| !app.fake.telegram_messages().is_empty()).await);
    let message = &app.fake.telegram_messages()[0];
    assert_eq!(message["chat_id"], "-1001");
    let text = message["text"].as_str().unwrap();
    assert!(text.contains("Whole chicken x2"));
    assert!(text.contains("12 Palm Street, Riyadh"));

    let orders: Value = app
        .http
        .get(app.url("/api/orders"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(orders.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_checkout_rejects_short_stock() {
    let app = TestApp::start().await;
    app.fake.add_user("amina@example.com", "pw", false);
    let token = app.sign_in("amina@example.com", "pw").await;

    let response = app
        .http
        .post(app.url("/api/cart"))
        .bearer_auth(&token)
        .json(&json!({ "product_id": 4, "quantity": 21 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .http
        .post(app.url("/api/orders"))
        .bearer_auth(&token)
        .json(&json!({ "fulfillment": { "method": "pickup" } }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(app.fake.cart_rows().len(), 1);
    assert!(app.fake.telegram_messages().is_empty());
}

#[tokio::test]
async fn test_cart_requires_sign_in() {
    let app = TestApp::start().await;
    let (status, _) = app.get("/api/cart").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let response = app
        .http
        .get(app.url("/api/cart"))
        .bearer_auth("not-a-token")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

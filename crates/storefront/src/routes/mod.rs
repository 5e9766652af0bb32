//! HTTP route handlers for the storefront API.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                          - Liveness check
//! GET    /health/ready                    - Readiness (product list loadable)
//!
//! # Catalog
//! GET    /api/products                    - Filtered, sorted, paginated list
//! GET    /api/products/{id}               - Product detail
//! POST   /api/products/refresh            - Drop the cache and refetch
//! GET    /api/categories                  - Category/type groups
//!
//! # Auth
//! POST   /api/auth/sign-in                - Email/password sign-in
//!
//! # Cart (requires auth)
//! GET    /api/cart                        - Cart with current prices
//! POST   /api/cart                        - Set a line's quantity
//! DELETE /api/cart                        - Empty the cart
//! DELETE /api/cart/{product_id}           - Remove a line
//!
//! # Favorites (requires auth)
//! GET    /api/favorites
//! PUT    /api/favorites/{product_id}
//! DELETE /api/favorites/{product_id}
//!
//! # Orders (requires auth)
//! POST   /api/orders                      - Checkout the stored cart
//! GET    /api/orders
//! GET    /api/orders/{id}
//!
//! # Admin (requires admin role)
//! POST   /api/admin/products
//! PATCH  /api/admin/products/{id}
//! DELETE /api/admin/products/{id}         - Soft delete
//! GET    /api/admin/orders
//! PATCH  /api/admin/orders/{id}/status
//! ```

pub mod admin;
pub mod auth;
pub mod cart;
pub mod favorites;
pub mod orders;
pub mod products;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{delete, get, patch, post, put},
};
use serde::Serialize;

use crate::cache::CacheStats;
use crate::state::AppState;
use crate::store::FetchStatus;

/// Create the catalog routes router.
pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(products::index))
        .route("/refresh", post(products::refresh))
        .route("/{id}", get(products::show))
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show).post(cart::upsert).delete(cart::clear))
        .route("/{product_id}", delete(cart::remove))
}

/// Create the favorites routes router.
pub fn favorite_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(favorites::index))
        .route(
            "/{product_id}",
            put(favorites::add).delete(favorites::remove),
        )
}

/// Create the order routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(orders::index).post(orders::create))
        .route("/{id}", get(orders::show))
}

/// Create the admin routes router.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/products", post(admin::create_product))
        .route(
            "/products/{id}",
            patch(admin::update_product).delete(admin::delete_product),
        )
        .route("/orders", get(admin::orders))
        .route("/orders/{id}/status", patch(admin::update_order_status))
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .route("/api/categories", get(products::categories))
        .route("/api/auth/sign-in", post(auth::sign_in))
        .nest("/api/products", product_routes())
        .nest("/api/cart", cart_routes())
        .nest("/api/favorites", favorite_routes())
        .nest("/api/orders", order_routes())
        .nest("/api/admin", admin_routes())
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Serialize)]
struct Readiness {
    status: FetchStatus,
    cache: CacheStats,
}

/// Readiness check: the product list can be served (from cache or remote).
///
/// Returns 503 Service Unavailable if it cannot.
async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<Readiness>) {
    let store = state.store();
    let code = match store.products().await {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    (
        code,
        Json(Readiness {
            status: store.status(),
            cache: store.cache_stats(),
        }),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::Request;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    use crate::cache::{CacheSettings, TieredCache};
    use crate::config::{StorefrontConfig, TableStoreConfig};
    use crate::middleware::REQUEST_ID_HEADER;
    use crate::notify::TelegramNotifier;
    use crate::remote::TableStoreClient;
    use crate::state::AppState;

    /// State whose table-store is a closed local port.
    fn unreachable_state() -> AppState {
        let table_store = TableStoreConfig::new("http://127.0.0.1:9", "test-anon-key").unwrap();
        let client = TableStoreClient::new(&table_store).unwrap();
        let shutdown = CancellationToken::new();
        let cache = Arc::new(TieredCache::memory_only(
            CacheSettings::default(),
            shutdown.clone(),
        ));
        AppState::from_parts(
            StorefrontConfig::new(table_store),
            client,
            cache,
            Arc::new(TelegramNotifier::new(None)),
            shutdown,
        )
    }

    async fn call(uri: &str) -> (axum::http::StatusCode, axum::http::HeaderMap, serde_json::Value) {
        let app = crate::app(unreachable_state());
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, headers, body)
    }

    #[tokio::test]
    async fn test_health_sets_request_id() {
        let (status, headers, _) = call("/health").await;
        assert_eq!(status, axum::http::StatusCode::OK);
        assert!(headers.contains_key(REQUEST_ID_HEADER));
    }

    #[tokio::test]
    async fn test_cart_requires_bearer_token() {
        let (status, _, body) = call("/api/cart").await;
        assert_eq!(status, axum::http::StatusCode::UNAUTHORIZED);
        assert!(body["error"].as_str().unwrap().contains("bearer"));
    }

    #[tokio::test]
    async fn test_unreachable_backend_reports_connection_error() {
        let (status, _, body) = call("/api/products?category=chicken").await;
        assert_eq!(status, axum::http::StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["connection_error"], true);
        assert_eq!(body["retry"], crate::error::RETRY_PATH);
    }

    #[tokio::test]
    async fn test_invalid_sort_is_bad_request() {
        let (status, _, _) = call("/api/products?sort=cheapest").await;
        assert_eq!(status, axum::http::StatusCode::BAD_REQUEST);
    }
}

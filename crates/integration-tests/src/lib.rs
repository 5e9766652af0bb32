//! Integration tests for Dawajen.
//!
//! The tests run the real table-store client, product store and HTTP router
//! against [`FakeTableStore`], an in-process axum server that speaks just
//! enough of the PostgREST dialect (and the password-grant auth endpoints)
//! for the storefront. No external services are needed.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p dawajen-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `remote_client` - Request shapes, row validation, error mapping
//! - `product_cache` - Cache flow through the product store, cold starts
//! - `api` - The HTTP surface end to end, including checkout

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path as UrlPath, Query, State},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{TimeDelta, TimeZone, Utc};
use dawajen_storefront::cache::{CacheSettings, SystemClock, TieredCache, open_or_disabled};
use dawajen_storefront::config::{StorefrontConfig, TableStoreConfig};
use dawajen_storefront::notify::TelegramNotifier;
use dawajen_storefront::remote::TableStoreClient;
use dawajen_storefront::state::AppState;
use dawajen_storefront::store::ProductStore;
use serde_json::{Map, Value, json};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Anon key the fake accepts.
pub const ANON_KEY: &str = "fake-anon-key-7Qm2xZ9pL4vB";

/// A request the fake received.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    pub table: String,
    pub query: HashMap<String, String>,
    pub bearer: Option<String>,
    pub apikey: Option<String>,
}

/// A user the fake can sign in.
#[derive(Debug, Clone)]
pub struct FakeUser {
    pub id: Uuid,
    pub email: String,
    pub password: String,
    pub token: String,
    pub admin: bool,
}

#[derive(Default)]
struct Tables {
    products: Vec<Value>,
    favorites: Vec<Value>,
    cart: Vec<Value>,
    orders: Vec<Value>,
    order_items: Vec<Value>,
    users: Vec<FakeUser>,
    next_id: i64,
    requests: Vec<Recorded>,
    telegram: Vec<Value>,
    list_failure: Option<(u16, Value)>,
    list_delay: Option<Duration>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn user_for(&self, bearer: Option<&str>) -> Option<FakeUser> {
        let bearer = bearer?;
        self.users.iter().find(|u| u.token == bearer).cloned()
    }
}

type Shared = Arc<Mutex<Tables>>;

fn lock(shared: &Shared) -> MutexGuard<'_, Tables> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-process fake of the hosted table-store.
pub struct FakeTableStore {
    addr: SocketAddr,
    tables: Shared,
    server: JoinHandle<()>,
}

impl Drop for FakeTableStore {
    fn drop(&mut self) {
        self.server.abort();
    }
}

/// A `products` row as the table-store returns it.
#[must_use]
pub fn product_row(id: i64, name_en: &str, category_en: &str, type_en: &str, price: &str) -> Value {
    let created = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap() + TimeDelta::hours(id);
    json!({
        "id": id,
        "name_ar": format!("منتج {id}"),
        "name_en": name_en,
        "category_ar": "دواجن",
        "category_en": category_en,
        "type_ar": "طازج",
        "type_en": type_en,
        "ingredients_ar": null,
        "ingredients_en": null,
        "description_ar": null,
        "description_en": null,
        "price": price,
        "quantity": 20,
        "image_url": null,
        "is_deleted": false,
        "created_at": created.to_rfc3339(),
    })
}

fn eq_filter<'a>(query: &'a HashMap<String, String>, column: &str) -> Option<&'a str> {
    query.get(column).and_then(|v| v.strip_prefix("eq."))
}

fn column_matches(row: &Value, column: &str, expected: &str) -> bool {
    match row.get(column) {
        Some(Value::String(s)) => s == expected,
        Some(Value::Number(n)) => n.to_string() == expected,
        Some(Value::Bool(b)) => b.to_string() == expected,
        Some(Value::Null) | None => expected == "null",
        _ => false,
    }
}

/// Apply every `column=eq.value` filter in the query.
fn apply_filters(rows: &[Value], query: &HashMap<String, String>) -> Vec<Value> {
    rows.iter()
        .filter(|row| {
            query.iter().all(|(column, value)| match value.strip_prefix("eq.") {
                Some(expected) => column_matches(row, column, expected),
                None => true,
            })
        })
        .cloned()
        .collect()
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

fn record(tables: &mut Tables, method: Method, table: &str, query: &HashMap<String, String>, headers: &HeaderMap) {
    tables.requests.push(Recorded {
        method,
        table: table.to_string(),
        query: query.clone(),
        bearer: bearer(headers),
        apikey: headers
            .get("apikey")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    });
}

fn api_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "code": "42501", "message": message }))).into_response()
}

// =============================================================================
// REST handlers
// =============================================================================

async fn rest_get(
    State(shared): State<Shared>,
    UrlPath(table): UrlPath<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let (delay, failure) = {
        let mut tables = lock(&shared);
        record(&mut tables, Method::GET, &table, &query, &headers);
        if table == "products" {
            (tables.list_delay, tables.list_failure.clone())
        } else {
            (None, None)
        }
    };
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
    if let Some((status, body)) = failure {
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return (status, Json(body)).into_response();
    }

    let tables = lock(&shared);
    let rows = match table.as_str() {
        "products" => {
            let mut rows = apply_filters(&tables.products, &query);
            if query.get("order").map(String::as_str) == Some("created_at.desc") {
                rows.sort_by(|a, b| b["created_at"].as_str().cmp(&a["created_at"].as_str()));
            }
            rows
        }
        "favorites" => apply_filters(&tables.favorites, &query),
        "cart" => apply_filters(&tables.cart, &query),
        "profiles" => {
            let Some(id) = eq_filter(&query, "id") else {
                return Json(json!([])).into_response();
            };
            tables
                .users
                .iter()
                .filter(|u| u.id.to_string() == id)
                .map(|u| {
                    json!({
                        "id": u.id,
                        "full_name": u.email,
                        "role": if u.admin { "admin" } else { "customer" },
                    })
                })
                .collect()
        }
        "orders" => {
            let Some(user) = tables.user_for(bearer(&headers).as_deref()) else {
                return Json(json!([])).into_response();
            };
            let visible: Vec<Value> = tables
                .orders
                .iter()
                .filter(|o| user.admin || column_matches(o, "user_id", &user.id.to_string()))
                .cloned()
                .collect();
            let mut rows = apply_filters(&visible, &query);
            for row in &mut rows {
                let id = row["id"].as_i64().unwrap_or_default();
                let items: Vec<Value> = tables
                    .order_items
                    .iter()
                    .filter(|item| item["order_id"].as_i64() == Some(id))
                    .cloned()
                    .collect();
                row["order_items"] = Value::Array(items);
            }
            rows
        }
        _ => return api_error(StatusCode::NOT_FOUND, "relation does not exist"),
    };
    Json(Value::Array(rows)).into_response()
}

fn insert_one(tables: &mut Tables, table: &str, mut row: Map<String, Value>) -> Value {
    let id = tables.next_id();
    row.insert("id".into(), json!(id));
    row.entry("created_at")
        .or_insert_with(|| json!(Utc::now().to_rfc3339()));
    let row = Value::Object(row);
    match table {
        "products" => tables.products.push(row.clone()),
        "orders" => tables.orders.push(row.clone()),
        "order_items" => tables.order_items.push(row.clone()),
        _ => {}
    }
    row
}

async fn rest_post(
    State(shared): State<Shared>,
    UrlPath(table): UrlPath<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut tables = lock(&shared);
    record(&mut tables, Method::POST, &table, &query, &headers);
    let user = tables.user_for(bearer(&headers).as_deref());

    match (table.as_str(), body) {
        ("products", Value::Object(row)) => {
            if !user.is_some_and(|u| u.admin) {
                return api_error(StatusCode::FORBIDDEN, "permission denied for table products");
            }
            let row = insert_one(&mut tables, "products", row);
            (StatusCode::CREATED, Json(json!([row]))).into_response()
        }
        ("orders", Value::Object(row)) => {
            if user.is_none() {
                return api_error(StatusCode::UNAUTHORIZED, "JWT expired");
            }
            let row = insert_one(&mut tables, "orders", row);
            (StatusCode::CREATED, Json(json!([row]))).into_response()
        }
        ("order_items", Value::Array(rows)) => {
            let inserted: Vec<Value> = rows
                .into_iter()
                .filter_map(|row| match row {
                    Value::Object(row) => Some(insert_one(&mut tables, "order_items", row)),
                    _ => None,
                })
                .collect();
            (StatusCode::CREATED, Json(Value::Array(inserted))).into_response()
        }
        ("cart", Value::Object(row)) => {
            let user_id = row.get("user_id").cloned().unwrap_or(Value::Null);
            let product_id = row.get("product_id").cloned().unwrap_or(Value::Null);
            let quantity = row.get("quantity").cloned().unwrap_or(json!(1));
            let existing = tables
                .cart
                .iter_mut()
                .find(|line| line["user_id"] == user_id && line["product_id"] == product_id);
            let line = if let Some(line) = existing {
                line["quantity"] = quantity;
                line.clone()
            } else {
                let id = tables.next_id();
                let line = json!({
                    "id": id,
                    "user_id": user_id,
                    "product_id": product_id,
                    "quantity": quantity,
                });
                tables.cart.push(line.clone());
                line
            };
            (StatusCode::CREATED, Json(json!([line]))).into_response()
        }
        ("favorites", Value::Object(row)) => {
            let duplicate = tables.favorites.iter().any(|f| {
                f["user_id"] == row["user_id"] && f["product_id"] == row["product_id"]
            });
            if !duplicate {
                tables.favorites.push(Value::Object(row));
            }
            StatusCode::CREATED.into_response()
        }
        _ => api_error(StatusCode::BAD_REQUEST, "unsupported insert"),
    }
}

async fn rest_patch(
    State(shared): State<Shared>,
    UrlPath(table): UrlPath<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut tables = lock(&shared);
    record(&mut tables, Method::PATCH, &table, &query, &headers);
    let user = tables.user_for(bearer(&headers).as_deref());
    if !user.is_some_and(|u| u.admin) {
        return api_error(StatusCode::FORBIDDEN, &format!("permission denied for table {table}"));
    }
    let Some(id) = eq_filter(&query, "id").and_then(|id| id.parse::<i64>().ok()) else {
        return api_error(StatusCode::BAD_REQUEST, "missing id filter");
    };
    let Value::Object(changes) = body else {
        return api_error(StatusCode::BAD_REQUEST, "body must be an object");
    };

    let rows = match table.as_str() {
        "products" => &mut tables.products,
        "orders" => &mut tables.orders,
        _ => return api_error(StatusCode::NOT_FOUND, "relation does not exist"),
    };
    let mut updated = Vec::new();
    for row in rows.iter_mut().filter(|r| r["id"].as_i64() == Some(id)) {
        if let Value::Object(fields) = row {
            for (key, value) in &changes {
                fields.insert(key.clone(), value.clone());
            }
        }
        updated.push(row.clone());
    }

    if table == "orders" {
        for row in &mut updated {
            let items: Vec<Value> = tables
                .order_items
                .iter()
                .filter(|item| item["order_id"].as_i64() == Some(id))
                .cloned()
                .collect();
            row["order_items"] = Value::Array(items);
        }
    }
    Json(Value::Array(updated)).into_response()
}

async fn rest_delete(
    State(shared): State<Shared>,
    UrlPath(table): UrlPath<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let mut tables = lock(&shared);
    record(&mut tables, Method::DELETE, &table, &query, &headers);
    let keep = |row: &Value| -> bool {
        !query.iter().all(|(column, value)| match value.strip_prefix("eq.") {
            Some(expected) => column_matches(row, column, expected),
            None => true,
        })
    };
    match table.as_str() {
        "cart" => tables.cart.retain(keep),
        "favorites" => tables.favorites.retain(keep),
        _ => return api_error(StatusCode::NOT_FOUND, "relation does not exist"),
    }
    StatusCode::NO_CONTENT.into_response()
}

// =============================================================================
// Auth handlers
// =============================================================================

async fn auth_token(State(shared): State<Shared>, Json(body): Json<Value>) -> Response {
    let tables = lock(&shared);
    let email = body["email"].as_str().unwrap_or_default();
    let password = body["password"].as_str().unwrap_or_default();
    match tables
        .users
        .iter()
        .find(|u| u.email == email && u.password == password)
    {
        Some(user) => Json(json!({
            "access_token": user.token,
            "token_type": "bearer",
            "user": { "id": user.id, "email": user.email },
        }))
        .into_response(),
        None => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "invalid_grant", "error_description": "Invalid login credentials" })),
        )
            .into_response(),
    }
}

async fn auth_user(State(shared): State<Shared>, headers: HeaderMap) -> Response {
    let tables = lock(&shared);
    match tables.user_for(bearer(&headers).as_deref()) {
        Some(user) => Json(json!({ "id": user.id, "email": user.email })).into_response(),
        None => (StatusCode::UNAUTHORIZED, Json(json!({ "msg": "invalid JWT" }))).into_response(),
    }
}

async fn telegram_send(
    State(shared): State<Shared>,
    UrlPath(bot): UrlPath<String>,
    Json(body): Json<Value>,
) -> Response {
    if !bot.starts_with("bot") {
        return StatusCode::NOT_FOUND.into_response();
    }
    lock(&shared).telegram.push(body);
    Json(json!({ "ok": true, "result": {} })).into_response()
}

impl FakeTableStore {
    /// Start the fake on an ephemeral port.
    pub async fn start() -> Self {
        let tables: Shared = Arc::new(Mutex::new(Tables {
            next_id: 1000,
            ..Tables::default()
        }));
        let app = Router::new()
            .route(
                "/rest/v1/{table}",
                get(rest_get)
                    .post(rest_post)
                    .patch(rest_patch)
                    .delete(rest_delete),
            )
            .route("/auth/v1/token", post(auth_token))
            .route("/auth/v1/user", get(auth_user))
            .route("/{bot}/sendMessage", post(telegram_send))
            .with_state(Arc::clone(&tables));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self {
            addr,
            tables,
            server,
        }
    }

    /// Base URL of the fake.
    #[must_use]
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    #[must_use]
    pub fn config(&self) -> TableStoreConfig {
        TableStoreConfig::new(&self.url(), ANON_KEY).unwrap()
    }

    #[must_use]
    pub fn client(&self) -> TableStoreClient {
        TableStoreClient::new(&self.config()).unwrap()
    }

    pub fn set_products(&self, rows: Vec<Value>) {
        lock(&self.tables).products = rows;
    }

    pub fn push_product(&self, row: Value) {
        lock(&self.tables).products.push(row);
    }

    pub fn add_favorite(&self, user_id: Uuid, product_id: i64) {
        lock(&self.tables)
            .favorites
            .push(json!({ "user_id": user_id, "product_id": product_id }));
    }

    /// Make product list requests fail with `status` and `body`.
    pub fn fail_product_lists(&self, status: u16, body: Value) {
        lock(&self.tables).list_failure = Some((status, body));
    }

    pub fn heal(&self) {
        lock(&self.tables).list_failure = None;
    }

    /// Delay every product list response.
    pub fn delay_product_lists(&self, delay: Duration) {
        lock(&self.tables).list_delay = Some(delay);
    }

    /// Register a user. Returns it with its access token.
    pub fn add_user(&self, email: &str, password: &str, admin: bool) -> FakeUser {
        let id = Uuid::new_v4();
        let user = FakeUser {
            id,
            email: email.to_string(),
            password: password.to_string(),
            token: format!("token-{id}"),
            admin,
        };
        lock(&self.tables).users.push(user.clone());
        user
    }

    /// Requests received for `table`, oldest first.
    #[must_use]
    pub fn requests(&self, table: &str) -> Vec<Recorded> {
        lock(&self.tables)
            .requests
            .iter()
            .filter(|r| r.table == table)
            .cloned()
            .collect()
    }

    /// Number of full product list fetches (requests without an `id` filter).
    #[must_use]
    pub fn product_list_requests(&self) -> usize {
        self.requests("products")
            .iter()
            .filter(|r| r.method == Method::GET && !r.query.contains_key("id"))
            .count()
    }

    #[must_use]
    pub fn cart_rows(&self) -> Vec<Value> {
        lock(&self.tables).cart.clone()
    }

    #[must_use]
    pub fn product(&self, id: i64) -> Option<Value> {
        lock(&self.tables)
            .products
            .iter()
            .find(|p| p["id"].as_i64() == Some(id))
            .cloned()
    }

    #[must_use]
    pub fn telegram_messages(&self) -> Vec<Value> {
        lock(&self.tables).telegram.clone()
    }
}

/// Cache settings used by the harness.
#[must_use]
pub fn cache_settings() -> CacheSettings {
    CacheSettings {
        max_items: 16,
        ..CacheSettings::default()
    }
}

/// A product store over `fake`, with an optional persistent directory.
pub async fn product_store(
    fake: &FakeTableStore,
    cache_dir: Option<&Path>,
    shutdown: CancellationToken,
) -> Arc<ProductStore> {
    let persistent = open_or_disabled(cache_dir).await;
    let cache = Arc::new(TieredCache::new(
        cache_settings(),
        persistent,
        Arc::new(SystemClock),
        shutdown.clone(),
    ));
    Arc::new(ProductStore::new(Arc::new(fake.client()), cache, shutdown))
}

/// Full application state over `fake`. Order notifications go to the fake's
/// Bot API endpoint.
#[must_use]
pub fn app_state(fake: &FakeTableStore) -> AppState {
    let shutdown = CancellationToken::new();
    let cache = Arc::new(TieredCache::memory_only(cache_settings(), shutdown.clone()));
    let telegram = dawajen_storefront::config::TelegramConfig {
        bot_token: secrecy::SecretString::from("123456:fake-bot-token".to_string()),
        chat_id: "-1001".to_string(),
    };
    let notifier = TelegramNotifier::new(Some(&telegram)).with_api_base(fake.url());
    AppState::from_parts(
        StorefrontConfig::new(fake.config()),
        fake.client(),
        cache,
        Arc::new(notifier),
        shutdown,
    )
}

/// Serve the storefront router on an ephemeral port. Returns its base URL.
pub async fn serve_app(state: AppState) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, dawajen_storefront::app(state))
            .await
            .unwrap();
    });
    format!("http://{addr}")
}

/// Poll `condition` until it holds or two seconds pass.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

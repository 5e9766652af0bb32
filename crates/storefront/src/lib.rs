//! Dawajen storefront library.
//!
//! The storefront serves a bilingual poultry catalog as a JSON API. Products
//! come from a hosted table-store and are kept in a two-tier cache (memory
//! plus an optional on-disk tier) so the catalog survives restarts and
//! short backend outages.
//!
//! # Modules
//!
//! - [`cache`] - Tiered product cache with priority eviction and a background sweeper
//! - [`catalog`] - Filtering, sorting, grouping and batch pagination
//! - [`remote`] - Table-store client
//! - [`store`] - Cache-to-catalog glue with fetch ordering and cancellation
//! - [`checkout`] / [`notify`] - Order placement and shop notifications
//! - [`routes`] - axum handlers

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cache;
pub mod catalog;
pub mod checkout;
pub mod config;
pub mod error;
pub mod middleware;
pub mod notify;
pub mod remote;
pub mod routes;
pub mod state;
pub mod store;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use state::AppState;

/// Build the full application router with its middleware stack.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::routes())
        .layer(axum::middleware::from_fn(
            middleware::request_id_middleware,
        ))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
}

//! Product catalog route handlers.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::{DateTime, Utc};
use dawajen_core::{Product, ProductId};
use serde::Serialize;
use tracing::instrument;

use crate::catalog::{CatalogQuery, CatalogView, CategoryGroup, SortMode, ViewState};
use crate::error::Result;
use crate::state::AppState;
use crate::store::{ProductSnapshot, ServedFrom, StoreError};

/// One page of the catalog.
#[derive(Debug, Serialize)]
pub struct ProductPage {
    #[serde(flatten)]
    pub state: ViewState,
    /// Displayed prefix of the filtered list.
    pub products: Vec<Product>,
    /// Size of the full filtered list.
    pub total: usize,
    pub has_more: bool,
    pub batches: usize,
    pub served_from: ServedFrom,
    pub stored_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct CategoryList {
    pub categories: Vec<CategoryGroup>,
}

#[derive(Debug, Serialize)]
pub struct RefreshResult {
    pub count: usize,
    pub served_from: ServedFrom,
}

async fn build_view(
    state: &AppState,
    query: &CatalogQuery,
) -> Result<(CatalogView, ProductSnapshot)> {
    let store = state.store();
    let snapshot = store.products().await?;
    let popularity = if query.sort == Some(SortMode::Popular) {
        store.popularity().await
    } else {
        None
    };

    let mut view = CatalogView::with_products(snapshot.products.clone(), popularity);
    query.apply_to(&mut view);
    Ok((view, snapshot))
}

/// `GET /api/products`
#[instrument(skip(state))]
pub async fn index(
    State(state): State<AppState>,
    Query(query): Query<CatalogQuery>,
) -> Result<Json<ProductPage>> {
    let (view, snapshot) = build_view(&state, &query).await?;

    Ok(Json(ProductPage {
        state: view.state(),
        products: view.displayed().to_vec(),
        total: view.filtered().len(),
        has_more: view.has_more(),
        batches: view.pager().batches(),
        served_from: snapshot.served_from,
        stored_at: snapshot.stored_at,
    }))
}

/// `GET /api/products/{id}`
#[instrument(skip(state))]
pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
) -> Result<Json<Product>> {
    Ok(Json(state.store().product(id).await?))
}

/// `GET /api/categories`
#[instrument(skip(state))]
pub async fn categories(State(state): State<AppState>) -> Result<Json<CategoryList>> {
    let snapshot = state.store().products().await?;
    let view = CatalogView::with_products(snapshot.products, None);
    Ok(Json(CategoryList {
        categories: view.groups(),
    }))
}

/// `POST /api/products/refresh`
#[instrument(skip(state))]
pub async fn refresh(State(state): State<AppState>) -> Result<Json<RefreshResult>> {
    let store = state.store();
    store.invalidate_popularity();
    let snapshot = match store.refetch().await {
        Ok(snapshot) => snapshot,
        // A newer refetch or a mutation overtook this one; serve what won.
        Err(StoreError::Cancelled) => store.products().await?,
        Err(e) => return Err(e.into()),
    };
    Ok(Json(RefreshResult {
        count: snapshot.products.len(),
        served_from: snapshot.served_from,
    }))
}

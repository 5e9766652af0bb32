//! Favorite route handlers.
//!
//! Favorites feed the "popular" sort, so every change drops the cached
//! popularity counts.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use dawajen_core::ProductId;
use serde::Serialize;
use tracing::instrument;

use crate::error::Result;
use crate::middleware::RequireAuth;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct FavoriteList {
    pub product_ids: Vec<ProductId>,
}

/// `GET /api/favorites`
#[instrument(skip(state, session))]
pub async fn index(
    State(state): State<AppState>,
    RequireAuth(session): RequireAuth,
) -> Result<Json<FavoriteList>> {
    let favorites = state.client().list_favorites(&session).await?;
    Ok(Json(FavoriteList {
        product_ids: favorites.into_iter().map(|f| f.product_id).collect(),
    }))
}

/// `PUT /api/favorites/{product_id}`
#[instrument(skip(state, session))]
pub async fn add(
    State(state): State<AppState>,
    RequireAuth(session): RequireAuth,
    Path(product_id): Path<ProductId>,
) -> Result<StatusCode> {
    state.store().product(product_id).await?;
    state.client().add_favorite(&session, product_id).await?;
    state.store().invalidate_popularity();
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /api/favorites/{product_id}`
#[instrument(skip(state, session))]
pub async fn remove(
    State(state): State<AppState>,
    RequireAuth(session): RequireAuth,
    Path(product_id): Path<ProductId>,
) -> Result<StatusCode> {
    state.client().remove_favorite(&session, product_id).await?;
    state.store().invalidate_popularity();
    Ok(StatusCode::NO_CONTENT)
}

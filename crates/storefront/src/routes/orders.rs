//! Customer order route handlers.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use dawajen_core::{Fulfillment, Order, OrderId};
use serde::Deserialize;
use tracing::instrument;

use crate::error::Result;
use crate::middleware::RequireAuth;
use crate::state::AppState;

/// Checkout request. Lines come from the user's stored cart.
#[derive(Debug, Deserialize)]
pub struct PlaceOrderForm {
    pub fulfillment: Fulfillment,
    #[serde(default)]
    pub notes: Option<String>,
}

/// `POST /api/orders`
#[instrument(skip(state, session, form))]
pub async fn create(
    State(state): State<AppState>,
    RequireAuth(session): RequireAuth,
    Json(form): Json<PlaceOrderForm>,
) -> Result<(StatusCode, Json<Order>)> {
    let lines = state.client().list_cart(&session).await?;
    let order = state
        .checkout()
        .place_order(&session, &lines, form.fulfillment, form.notes)
        .await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// `GET /api/orders`
#[instrument(skip(state, session))]
pub async fn index(
    State(state): State<AppState>,
    RequireAuth(session): RequireAuth,
) -> Result<Json<Vec<Order>>> {
    Ok(Json(state.client().list_orders(&session).await?))
}

/// `GET /api/orders/{id}`
#[instrument(skip(state, session))]
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(session): RequireAuth,
    Path(id): Path<OrderId>,
) -> Result<Json<Order>> {
    Ok(Json(state.client().get_order(&session, id).await?))
}

//! Back-office route handlers. Every handler requires an admin profile.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use dawajen_core::{NewProduct, Order, OrderId, OrderStatus, Product, ProductId, ProductPatch};
use serde::Deserialize;
use tracing::{info, instrument};

use crate::error::{AppError, Result};
use crate::middleware::RequireAdmin;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StatusForm {
    pub status: OrderStatus,
}

/// `POST /api/admin/products`
#[instrument(skip(state, session, _profile, input))]
pub async fn create_product(
    State(state): State<AppState>,
    RequireAdmin(session, _profile): RequireAdmin,
    Json(input): Json<NewProduct>,
) -> Result<(StatusCode, Json<Product>)> {
    let product = state.store().create_product(&session, &input).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

/// `PATCH /api/admin/products/{id}`
#[instrument(skip(state, session, _profile, patch))]
pub async fn update_product(
    State(state): State<AppState>,
    RequireAdmin(session, _profile): RequireAdmin,
    Path(id): Path<ProductId>,
    Json(patch): Json<ProductPatch>,
) -> Result<Json<Product>> {
    Ok(Json(state.store().update_product(&session, id, &patch).await?))
}

/// `DELETE /api/admin/products/{id}` - soft delete.
#[instrument(skip(state, session, _profile))]
pub async fn delete_product(
    State(state): State<AppState>,
    RequireAdmin(session, _profile): RequireAdmin,
    Path(id): Path<ProductId>,
) -> Result<StatusCode> {
    state.store().delete_product(&session, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/admin/orders`
#[instrument(skip(state, session, _profile))]
pub async fn orders(
    State(state): State<AppState>,
    RequireAdmin(session, _profile): RequireAdmin,
) -> Result<Json<Vec<Order>>> {
    Ok(Json(state.client().list_all_orders(&session).await?))
}

/// `PATCH /api/admin/orders/{id}/status`
///
/// Only forward transitions (or cancellation of an open order) are allowed.
#[instrument(skip(state, session, _profile))]
pub async fn update_order_status(
    State(state): State<AppState>,
    RequireAdmin(session, _profile): RequireAdmin,
    Path(id): Path<OrderId>,
    Json(form): Json<StatusForm>,
) -> Result<Json<Order>> {
    let current = state.client().get_order(&session, id).await?;
    if !current.status.can_transition_to(form.status) {
        return Err(AppError::BadRequest(format!(
            "cannot move order from {} to {}",
            current.status, form.status
        )));
    }

    let order = state
        .client()
        .update_order_status(&session, id, form.status)
        .await?;
    info!(order_id = %id, from = %current.status, to = %order.status, "Order status changed");
    Ok(Json(order))
}

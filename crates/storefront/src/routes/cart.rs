//! Cart route handlers.
//!
//! Cart lines live in the table-store keyed by user, so every handler
//! needs a signed-in user.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use dawajen_core::{CartItem, ProductId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use crate::error::{AppError, Result};
use crate::middleware::RequireAuth;
use crate::state::AppState;
use crate::store::StoreError;

/// Maximum quantity of a single product per cart line.
const MAX_LINE_QUANTITY: u32 = 99;

#[derive(Debug, Deserialize)]
pub struct CartLineInput {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// A cart line with current catalog data.
#[derive(Debug, Serialize)]
pub struct CartLineView {
    #[serde(flatten)]
    pub item: CartItem,
    pub name: Option<dawajen_core::Bilingual>,
    pub unit_price: Option<Decimal>,
    pub line_total: Option<Decimal>,
    pub available: bool,
}

#[derive(Debug, Serialize)]
pub struct CartView {
    pub items: Vec<CartLineView>,
    pub subtotal: Decimal,
    pub item_count: u32,
}

/// `GET /api/cart`
#[instrument(skip(state, session))]
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(session): RequireAuth,
) -> Result<Json<CartView>> {
    let lines = state.client().list_cart(&session).await?;

    let mut items = Vec::with_capacity(lines.len());
    for item in lines {
        let product = match state.store().product(item.product_id).await {
            Ok(product) => Some(product),
            Err(StoreError::NotFound(_)) => None,
            Err(e) => return Err(e.into()),
        };
        if product.is_none() {
            warn!(product_id = %item.product_id, "Cart line references a missing product");
        }
        let unit_price = product.as_ref().map(|p| p.price);
        items.push(CartLineView {
            line_total: unit_price.map(|price| price * Decimal::from(item.quantity)),
            available: product.as_ref().is_some_and(|p| p.quantity >= item.quantity),
            name: product.map(|p| p.name),
            unit_price,
            item,
        });
    }

    Ok(Json(CartView {
        subtotal: items.iter().filter_map(|line| line.line_total).sum(),
        item_count: items.iter().map(|line| line.item.quantity).sum(),
        items,
    }))
}

/// `POST /api/cart` - set a line's quantity, adding it if absent.
#[instrument(skip(state, session))]
pub async fn upsert(
    State(state): State<AppState>,
    RequireAuth(session): RequireAuth,
    Json(input): Json<CartLineInput>,
) -> Result<Json<CartItem>> {
    if input.quantity == 0 || input.quantity > MAX_LINE_QUANTITY {
        return Err(AppError::BadRequest(format!(
            "quantity must be between 1 and {MAX_LINE_QUANTITY}"
        )));
    }
    // Reject unknown products before writing
    state.store().product(input.product_id).await?;

    let item = state
        .client()
        .upsert_cart_item(&session, input.product_id, input.quantity)
        .await?;
    Ok(Json(item))
}

/// `DELETE /api/cart/{product_id}`
#[instrument(skip(state, session))]
pub async fn remove(
    State(state): State<AppState>,
    RequireAuth(session): RequireAuth,
    Path(product_id): Path<ProductId>,
) -> Result<StatusCode> {
    state
        .client()
        .remove_cart_item(&session, product_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /api/cart`
#[instrument(skip(state, session))]
pub async fn clear(
    State(state): State<AppState>,
    RequireAuth(session): RequireAuth,
) -> Result<StatusCode> {
    state.client().clear_cart(&session).await?;
    Ok(StatusCode::NO_CONTENT)
}

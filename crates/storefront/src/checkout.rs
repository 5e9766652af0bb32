//! Turning a cart into an order.
//!
//! Prices and stock come from the product store at checkout time, never
//! from the client. Once the order is written the cart is cleared and the
//! shop is notified in the background.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dawajen_core::{
    CartItem, Fulfillment, NewOrder, NewOrderItem, Order, ProductId, Session,
};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::notify::{OrderNotice, OrderNotifier, spawn_notification};
use crate::remote::{RemoteError, TableStoreClient};
use crate::store::{ProductStore, StoreError};

/// Errors from placing an order.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("cart is empty")]
    EmptyCart,

    #[error("delivery address is required")]
    MissingAddress,

    #[error("invalid quantity for product {0}")]
    InvalidQuantity(ProductId),

    #[error("product {0} is no longer available")]
    UnknownProduct(ProductId),

    #[error("only {available} of product {product_id} in stock")]
    OutOfStock { product_id: ProductId, available: u32 },

    #[error(transparent)]
    Store(StoreError),

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl CheckoutError {
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        match self {
            Self::Store(e) => e.is_connection_error(),
            Self::Remote(e) => e.is_connection_error(),
            _ => false,
        }
    }
}

/// Where orders are written.
#[async_trait]
pub trait OrderBackend: Send + Sync {
    /// Insert the order and its items.
    async fn insert_order(&self, session: &Session, order: &NewOrder) -> Result<Order, RemoteError>;

    /// Empty the user's cart.
    async fn clear_cart(&self, session: &Session) -> Result<(), RemoteError>;
}

#[async_trait]
impl OrderBackend for TableStoreClient {
    async fn insert_order(&self, session: &Session, order: &NewOrder) -> Result<Order, RemoteError> {
        Self::insert_order(self, session, order).await
    }

    async fn clear_cart(&self, session: &Session) -> Result<(), RemoteError> {
        Self::clear_cart(self, session).await
    }
}

/// Checkout service.
#[derive(Clone)]
pub struct Checkout {
    store: Arc<ProductStore>,
    orders: Arc<dyn OrderBackend>,
    notifier: Arc<dyn OrderNotifier>,
}

impl Checkout {
    #[must_use]
    pub fn new(
        store: Arc<ProductStore>,
        orders: Arc<dyn OrderBackend>,
        notifier: Arc<dyn OrderNotifier>,
    ) -> Self {
        Self {
            store,
            orders,
            notifier,
        }
    }

    /// Place an order for `lines`.
    ///
    /// Lines for the same product are merged. A failure to clear the cart
    /// after the order is written is logged and does not fail checkout.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError`] if the cart is empty, the fulfillment is
    /// incomplete, a product is unknown or short on stock, or the order
    /// insert fails.
    #[instrument(skip(self, session, lines, fulfillment, notes), fields(user_id = %session.user_id, lines = lines.len()))]
    pub async fn place_order(
        &self,
        session: &Session,
        lines: &[CartItem],
        fulfillment: Fulfillment,
        notes: Option<String>,
    ) -> Result<Order, CheckoutError> {
        if lines.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        if let Fulfillment::Delivery { address, .. } = &fulfillment
            && address.trim().is_empty()
        {
            return Err(CheckoutError::MissingAddress);
        }

        let mut quantities: Vec<(ProductId, u32)> = Vec::new();
        for line in lines {
            if line.quantity == 0 {
                return Err(CheckoutError::InvalidQuantity(line.product_id));
            }
            match quantities.iter_mut().find(|(id, _)| *id == line.product_id) {
                Some((_, quantity)) => *quantity = quantity.saturating_add(line.quantity),
                None => quantities.push((line.product_id, line.quantity)),
            }
        }

        let mut items = Vec::with_capacity(quantities.len());
        let mut product_names = HashMap::new();
        for (product_id, quantity) in quantities {
            let product = match self.store.product(product_id).await {
                Ok(product) => product,
                Err(StoreError::NotFound(_)) => {
                    return Err(CheckoutError::UnknownProduct(product_id));
                }
                Err(e) => return Err(CheckoutError::Store(e)),
            };
            if product.quantity < quantity {
                return Err(CheckoutError::OutOfStock {
                    product_id,
                    available: product.quantity,
                });
            }
            product_names.insert(product_id, product.name.display(false).to_string());
            items.push(NewOrderItem {
                product_id,
                quantity,
                unit_price: product.price,
            });
        }

        let new_order = NewOrder {
            user_id: session.user_id,
            fulfillment,
            notes: notes.filter(|n| !n.trim().is_empty()),
            items,
        };
        let order = self.orders.insert_order(session, &new_order).await?;
        info!(order_id = %order.id, total = %order.total, "Order placed");

        if let Err(e) = self.orders.clear_cart(session).await {
            warn!(order_id = %order.id, error = %e, "Failed to clear cart after checkout");
        }

        spawn_notification(
            Arc::clone(&self.notifier),
            OrderNotice {
                order: order.clone(),
                product_names,
            },
        );
        Ok(order)
    }
}

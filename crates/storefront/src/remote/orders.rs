//! Orders and order items.

use dawajen_core::{
    NewOrder, Order, OrderId, OrderItem, OrderItemRow, OrderRow, OrderStatus, Session,
};
use reqwest::{Method, RequestBuilder};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, instrument, warn};

use super::{RemoteError, TableStoreClient};

/// Order columns plus embedded `order_items`.
const ORDER_SELECT: &str = "*,order_items(*)";

/// An `orders` row with its embedded items.
#[derive(Deserialize)]
struct OrderWithItems {
    #[serde(flatten)]
    order: OrderRow,
    #[serde(default)]
    order_items: Vec<OrderItemRow>,
}

fn convert_order(raw: Value) -> Result<Order, RemoteError> {
    let row: OrderWithItems =
        serde_json::from_value(raw).map_err(|e| RemoteError::Parse(e.to_string()))?;
    let items = row
        .order_items
        .into_iter()
        .map(OrderItem::try_from)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| RemoteError::Parse(e.to_string()))?;
    row.order
        .into_order(items)
        .map_err(|e| RemoteError::Parse(e.to_string()))
}

/// Convert orders, skipping rows that fail validation.
fn convert_orders(rows: Vec<Value>) -> Vec<Order> {
    rows.into_iter()
        .filter_map(|raw| match convert_order(raw) {
            Ok(order) => Some(order),
            Err(e) => {
                warn!(table = "orders", error = %e, "Skipping invalid row");
                None
            }
        })
        .collect()
}

impl TableStoreClient {
    async fn fetch_orders(request: RequestBuilder) -> Result<Vec<Order>, RemoteError> {
        let rows: Vec<Value> = Self::send_json(request).await?;
        Ok(convert_orders(rows))
    }

    /// Insert an order and its items.
    ///
    /// The order row is written first so the items can reference its id.
    ///
    /// # Errors
    ///
    /// Returns error if either insert fails. An order whose item insert
    /// failed is left in place with status `pending`.
    #[instrument(skip(self, session, order), fields(user_id = %session.user_id, items = order.items.len()))]
    pub async fn insert_order(
        &self,
        session: &Session,
        order: &NewOrder,
    ) -> Result<Order, RemoteError> {
        let request = self
            .rest(Method::POST, "orders", Some(session))?
            .header("Prefer", "return=representation")
            .json(&order.to_row());
        let rows: Vec<OrderRow> = Self::send_json(request).await?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| RemoteError::Parse("empty insert response".to_string()))?;
        let order_id = OrderId::new(row.id.ok_or_else(|| RemoteError::Parse("order row without id".to_string()))?);

        let request = self
            .rest(Method::POST, "order_items", Some(session))?
            .header("Prefer", "return=representation")
            .json(&order.item_rows(order_id));
        let item_rows: Vec<OrderItemRow> = Self::send_json(request).await?;
        let items = item_rows
            .into_iter()
            .map(OrderItem::try_from)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| RemoteError::Parse(e.to_string()))?;

        let order = row
            .into_order(items)
            .map_err(|e| RemoteError::Parse(e.to_string()))?;
        info!(order_id = %order.id, total = %order.total, "Order created");
        Ok(order)
    }

    /// One order with its items. Row-level security limits customers to
    /// their own orders.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::NotFound`] if no visible order has this id.
    #[instrument(skip(self, session), fields(user_id = %session.user_id))]
    pub async fn get_order(&self, session: &Session, id: OrderId) -> Result<Order, RemoteError> {
        let request = self.rest(Method::GET, "orders", Some(session))?.query(&[
            ("select", ORDER_SELECT.to_string()),
            ("id", format!("eq.{id}")),
        ]);
        let rows: Vec<Value> = Self::send_json(request).await?;
        let raw = rows
            .into_iter()
            .next()
            .ok_or_else(|| RemoteError::NotFound(format!("order {id}")))?;
        convert_order(raw)
    }

    /// The signed-in user's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    #[instrument(skip(self, session), fields(user_id = %session.user_id))]
    pub async fn list_orders(&self, session: &Session) -> Result<Vec<Order>, RemoteError> {
        let request = self.rest(Method::GET, "orders", Some(session))?.query(&[
            ("select", ORDER_SELECT.to_string()),
            ("user_id", format!("eq.{}", session.user_id)),
            ("order", "created_at.desc".to_string()),
        ]);
        Self::fetch_orders(request).await
    }

    /// Every order, newest first. Requires an admin session.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    #[instrument(skip(self, session))]
    pub async fn list_all_orders(&self, session: &Session) -> Result<Vec<Order>, RemoteError> {
        let request = self
            .rest(Method::GET, "orders", Some(session))?
            .query(&[("select", ORDER_SELECT), ("order", "created_at.desc")]);
        Self::fetch_orders(request).await
    }

    /// Change an order's status.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::NotFound`] if the order does not exist.
    #[instrument(skip(self, session))]
    pub async fn update_order_status(
        &self,
        session: &Session,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<Order, RemoteError> {
        let request = self
            .rest(Method::PATCH, "orders", Some(session))?
            .query(&[
                ("id", format!("eq.{id}")),
                ("select", ORDER_SELECT.to_string()),
            ])
            .header("Prefer", "return=representation")
            .json(&json!({ "status": status.as_str() }));
        let rows: Vec<Value> = Self::send_json(request).await?;
        let raw = rows
            .into_iter()
            .next()
            .ok_or_else(|| RemoteError::NotFound(format!("order {id}")))?;
        let order = convert_order(raw)?;
        info!(order_id = %order.id, status = %order.status, "Order status updated");
        Ok(order)
    }
}

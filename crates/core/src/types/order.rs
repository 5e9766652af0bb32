//! Orders, order items and fulfillment.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::id::{OrderId, OrderItemId, ProductId, UserId};
use super::phone::PhoneNumber;
use super::price::parse_price;
use super::product::RowError;

/// Order lifecycle status.
///
/// ```text
/// pending -> confirmed -> preparing -> out_for_delivery -> completed
///                                   \-> ready_for_pickup -> completed
/// (any non-terminal) -> cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Confirmed,
    Preparing,
    OutForDelivery,
    ReadyForPickup,
    Completed,
    Cancelled,
}

impl OrderStatus {
    /// Terminal statuses accept no further transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Whether the admin back-office may move an order from `self` to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (from, Self::Cancelled) => !from.is_terminal(),
            (Self::Pending, Self::Confirmed)
            | (Self::Confirmed, Self::Preparing)
            | (Self::Preparing, Self::OutForDelivery | Self::ReadyForPickup)
            | (Self::OutForDelivery | Self::ReadyForPickup, Self::Completed) => true,
            _ => false,
        }
    }

    /// Wire value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Preparing => "preparing",
            Self::OutForDelivery => "out_for_delivery",
            Self::ReadyForPickup => "ready_for_pickup",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "confirmed" => Ok(Self::Confirmed),
            "preparing" => Ok(Self::Preparing),
            "out_for_delivery" => Ok(Self::OutForDelivery),
            "ready_for_pickup" => Ok(Self::ReadyForPickup),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("invalid order status: {s}")),
        }
    }
}

/// How the customer receives the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Fulfillment {
    /// Courier delivery to an address.
    Delivery { address: String, phone: PhoneNumber },
    /// Customer collects from the shop.
    Pickup { phone: Option<PhoneNumber> },
}

impl Fulfillment {
    const fn method(&self) -> &'static str {
        match self {
            Self::Delivery { .. } => "delivery",
            Self::Pickup { .. } => "pickup",
        }
    }

    /// Contact number, if any.
    #[must_use]
    pub const fn phone(&self) -> Option<&PhoneNumber> {
        match self {
            Self::Delivery { phone, .. } => Some(phone),
            Self::Pickup { phone } => phone.as_ref(),
        }
    }
}

/// A placed order with its items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub fulfillment: Fulfillment,
    pub status: OrderStatus,
    pub total: Decimal,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub items: Vec<OrderItem>,
}

/// A line of an order, priced at checkout time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Decimal,
}

impl OrderItem {
    /// `unit_price × quantity`.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Order about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub user_id: UserId,
    pub fulfillment: Fulfillment,
    pub notes: Option<String>,
    pub items: Vec<NewOrderItem>,
}

/// Order line about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrderItem {
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Decimal,
}

impl NewOrder {
    /// Sum of all line totals.
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.items
            .iter()
            .map(|item| item.unit_price * Decimal::from(item.quantity))
            .sum()
    }

    /// Encode the `orders` row body.
    #[must_use]
    pub fn to_row(&self) -> Value {
        let address = match &self.fulfillment {
            Fulfillment::Delivery { address, .. } => Some(address.clone()),
            Fulfillment::Pickup { .. } => None,
        };
        json!({
            "user_id": self.user_id,
            "fulfillment_method": self.fulfillment.method(),
            "delivery_address": address,
            "phone": self.fulfillment.phone().map(PhoneNumber::as_str),
            "status": OrderStatus::Pending.as_str(),
            "total": self.total().to_string(),
            "notes": self.notes,
        })
    }

    /// Encode the `order_items` row bodies for an inserted order.
    #[must_use]
    pub fn item_rows(&self, order_id: OrderId) -> Value {
        Value::Array(
            self.items
                .iter()
                .map(|item| {
                    json!({
                        "order_id": order_id,
                        "product_id": item.product_id,
                        "quantity": item.quantity,
                        "unit_price": item.unit_price.to_string(),
                    })
                })
                .collect(),
        )
    }
}

/// Raw `orders` row.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderRow {
    pub id: Option<i64>,
    pub user_id: Option<UserId>,
    pub fulfillment_method: Option<String>,
    pub delivery_address: Option<String>,
    pub phone: Option<String>,
    pub status: Option<String>,
    #[serde(default)]
    pub total: Value,
    pub notes: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Raw `order_items` row.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderItemRow {
    pub id: Option<i64>,
    pub order_id: Option<i64>,
    pub product_id: Option<i64>,
    pub quantity: Option<i64>,
    #[serde(default)]
    pub unit_price: Value,
}

impl TryFrom<OrderItemRow> for OrderItem {
    type Error = RowError;

    fn try_from(row: OrderItemRow) -> Result<Self, Self::Error> {
        let quantity = row.quantity.ok_or(RowError::MissingField("quantity"))?;
        Ok(Self {
            id: OrderItemId::new(row.id.ok_or(RowError::MissingField("id"))?),
            product_id: ProductId::new(row.product_id.ok_or(RowError::MissingField("product_id"))?),
            quantity: u32::try_from(quantity).map_err(|_| RowError::InvalidField {
                field: "quantity",
                reason: format!("out of range: {quantity}"),
            })?,
            unit_price: parse_price(&row.unit_price),
        })
    }
}

impl OrderRow {
    /// Combine the order row with its already-converted items.
    ///
    /// # Errors
    ///
    /// Returns an error if required columns are missing or the status or
    /// fulfillment columns hold unknown values.
    pub fn into_order(self, items: Vec<OrderItem>) -> Result<Order, RowError> {
        let id = self.id.ok_or(RowError::MissingField("id"))?;
        let user_id = self.user_id.ok_or(RowError::MissingField("user_id"))?;
        let created_at = self.created_at.ok_or(RowError::MissingField("created_at"))?;
        let status = self
            .status
            .as_deref()
            .unwrap_or("pending")
            .parse::<OrderStatus>()
            .map_err(|reason| RowError::InvalidField {
                field: "status",
                reason,
            })?;
        let phone = self
            .phone
            .as_deref()
            .map(PhoneNumber::parse)
            .transpose()
            .map_err(|e| RowError::InvalidField {
                field: "phone",
                reason: e.to_string(),
            })?;

        let fulfillment = match self.fulfillment_method.as_deref() {
            Some("delivery") => Fulfillment::Delivery {
                address: self
                    .delivery_address
                    .ok_or(RowError::MissingField("delivery_address"))?,
                phone: phone.ok_or(RowError::MissingField("phone"))?,
            },
            Some("pickup") | None => Fulfillment::Pickup { phone },
            Some(other) => {
                return Err(RowError::InvalidField {
                    field: "fulfillment_method",
                    reason: format!("unknown method: {other}"),
                });
            }
        };

        Ok(Order {
            id: OrderId::new(id),
            user_id,
            fulfillment,
            status,
            total: parse_price(&self.total),
            notes: self.notes.filter(|n| !n.trim().is_empty()),
            created_at,
            items,
        })
    }
}

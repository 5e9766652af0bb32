//! Order notifications to the shop's Telegram chat.
//!
//! Notifications are fire-and-forget: [`spawn_notification`] runs the send
//! on its own task and only logs the outcome, so checkout never waits on the
//! bot API.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use dawajen_core::{Fulfillment, Order, ProductId};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, warn};

use crate::config::TelegramConfig;

/// Telegram Bot API base URL.
const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Errors from sending a notification.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// HTTP request failed.
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    /// The bot API answered with `ok: false`.
    #[error("API error: {0}")]
    Api(String),
}

/// A placed order plus the display names of its products.
#[derive(Debug, Clone)]
pub struct OrderNotice {
    pub order: Order,
    pub product_names: HashMap<ProductId, String>,
}

impl OrderNotice {
    /// Plain-text message body.
    #[must_use]
    pub fn message(&self) -> String {
        let order = &self.order;
        let mut text = format!("New order #{}\n", order.id);

        match &order.fulfillment {
            Fulfillment::Delivery { address, phone } => {
                let _ = writeln!(text, "Delivery to: {address}");
                let _ = writeln!(text, "Phone: {}", phone.as_str());
            }
            Fulfillment::Pickup { phone } => {
                let _ = writeln!(text, "Pickup");
                if let Some(phone) = phone {
                    let _ = writeln!(text, "Phone: {}", phone.as_str());
                }
            }
        }

        text.push('\n');
        for item in &order.items {
            let name = self
                .product_names
                .get(&item.product_id)
                .map_or_else(|| format!("Product {}", item.product_id), Clone::clone);
            let _ = writeln!(
                text,
                "- {name} x{} @ {} = {}",
                item.quantity,
                item.unit_price,
                item.line_total()
            );
        }
        let _ = write!(text, "\nTotal: {}", order.total);

        if let Some(notes) = order.notes.as_deref().filter(|n| !n.trim().is_empty()) {
            let _ = write!(text, "\nNotes: {notes}");
        }
        text
    }
}

/// Something that can announce a new order.
#[async_trait]
pub trait OrderNotifier: Send + Sync {
    /// Send the notice.
    ///
    /// # Errors
    ///
    /// Returns error if delivery fails.
    async fn order_placed(&self, notice: &OrderNotice) -> Result<(), NotifyError>;
}

#[derive(Deserialize)]
struct SendMessageResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Telegram bot notifier. Without a config every send is skipped.
#[derive(Clone)]
pub struct TelegramNotifier {
    client: Client,
    api_base: String,
    bot: Option<(SecretString, String)>,
}

impl std::fmt::Debug for TelegramNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramNotifier")
            .field("api_base", &self.api_base)
            .field("configured", &self.bot.is_some())
            .finish_non_exhaustive()
    }
}

impl TelegramNotifier {
    #[must_use]
    pub fn new(config: Option<&TelegramConfig>) -> Self {
        Self {
            client: Client::new(),
            api_base: TELEGRAM_API_BASE.to_string(),
            bot: config.map(|c| (c.bot_token.clone(), c.chat_id.clone())),
        }
    }

    /// Point at a different Bot API host.
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub const fn is_configured(&self) -> bool {
        self.bot.is_some()
    }
}

#[async_trait]
impl OrderNotifier for TelegramNotifier {
    #[instrument(skip(self, notice), fields(order_id = %notice.order.id))]
    async fn order_placed(&self, notice: &OrderNotice) -> Result<(), NotifyError> {
        let Some((token, chat_id)) = &self.bot else {
            debug!("Telegram not configured, skipping order notification");
            return Ok(());
        };

        let url = format!("{}/bot{}/sendMessage", self.api_base, token.expose_secret());
        let response = self
            .client
            .post(url)
            .json(&json!({ "chat_id": chat_id, "text": notice.message() }))
            .send()
            .await?;

        let status = response.status();
        let result: SendMessageResponse = response.json().await?;
        if !result.ok {
            let description = result
                .description
                .unwrap_or_else(|| format!("HTTP {status}"));
            error!(error = %description, "Telegram API error sending message");
            return Err(NotifyError::Api(description));
        }

        debug!("Order notification sent");
        Ok(())
    }
}

/// Send `notice` on a background task. Failures are logged, never returned.
pub fn spawn_notification(notifier: Arc<dyn OrderNotifier>, notice: OrderNotice) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = notifier.order_placed(&notice).await {
            warn!(order_id = %notice.order.id, error = %e, "Order notification failed");
        }
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use dawajen_core::{OrderId, OrderItem, OrderItemId, OrderStatus, PhoneNumber, UserId};
    use rust_decimal::Decimal;
    use std::sync::Mutex;

    fn order(fulfillment: Fulfillment, notes: Option<&str>) -> Order {
        Order {
            id: OrderId::new(42),
            user_id: UserId::new(uuid::Uuid::nil()),
            fulfillment,
            status: OrderStatus::Pending,
            total: Decimal::from(70),
            notes: notes.map(String::from),
            created_at: Utc::now(),
            items: vec![
                OrderItem {
                    id: OrderItemId::new(1),
                    product_id: ProductId::new(3),
                    quantity: 2,
                    unit_price: Decimal::from(25),
                },
                OrderItem {
                    id: OrderItemId::new(2),
                    product_id: ProductId::new(9),
                    quantity: 1,
                    unit_price: Decimal::from(20),
                },
            ],
        }
    }

    #[test]
    fn test_message_lists_items_and_total() {
        let notice = OrderNotice {
            order: order(
                Fulfillment::Delivery {
                    address: "King Fahd Rd 12".to_string(),
                    phone: PhoneNumber::parse("+966501234567").unwrap(),
                },
                Some("ring twice"),
            ),
            product_names: HashMap::from([(ProductId::new(3), "Whole chicken".to_string())]),
        };

        let text = notice.message();
        assert!(text.starts_with("New order #42\n"));
        assert!(text.contains("Delivery to: King Fahd Rd 12"));
        assert!(text.contains("Phone: +966501234567"));
        assert!(text.contains("- Whole chicken x2 @ 25 = 50"));
        assert!(text.contains("- Product 9 x1 @ 20 = 20"));
        assert!(text.contains("Total: 70"));
        assert!(text.ends_with("Notes: ring twice"));
    }

    #[test]
    fn test_message_pickup_without_phone() {
        let notice = OrderNotice {
            order: order(Fulfillment::Pickup { phone: None }, Some("  ")),
            product_names: HashMap::new(),
        };
        let text = notice.message();
        assert!(text.contains("Pickup\n"));
        assert!(!text.contains("Phone:"));
        assert!(!text.contains("Notes:"));
    }

    #[tokio::test]
    async fn test_unconfigured_notifier_skips() {
        let notifier = TelegramNotifier::new(None);
        assert!(!notifier.is_configured());
        let notice = OrderNotice {
            order: order(Fulfillment::Pickup { phone: None }, None),
            product_names: HashMap::new(),
        };
        notifier.order_placed(&notice).await.unwrap();
    }

    struct Failing(Mutex<usize>);

    #[async_trait]
    impl OrderNotifier for Failing {
        async fn order_placed(&self, _notice: &OrderNotice) -> Result<(), NotifyError> {
            *self.0.lock().unwrap() += 1;
            Err(NotifyError::Api("chat not found".to_string()))
        }
    }

    #[tokio::test]
    async fn test_spawned_failure_is_swallowed() {
        let notifier = Arc::new(Failing(Mutex::new(0)));
        let notice = OrderNotice {
            order: order(Fulfillment::Pickup { phone: None }, None),
            product_names: HashMap::new(),
        };
        spawn_notification(notifier.clone(), notice).await.unwrap();
        assert_eq!(*notifier.0.lock().unwrap(), 1);
    }
}

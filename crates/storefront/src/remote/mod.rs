//! Hosted table-store client.
//!
//! # Architecture
//!
//! - PostgREST dialect over `reqwest`: `GET /rest/v1/<table>?col=eq.value`,
//!   `Prefer: return=representation` on writes
//! - Password-grant auth at `/auth/v1/token`
//! - Every request carries the anon key as `apikey`; the bearer token is the
//!   user's access token when a session is given, otherwise the anon key
//! - Rows are validated at the boundary: rows that fail conversion are
//!   logged and skipped, never trusted
//!
//! The product cache sits above this client (see [`crate::store`]), so
//! nothing here caches.

mod account;
mod catalog;
mod orders;

use std::sync::Arc;

use async_trait::async_trait;
use dawajen_core::{NewProduct, Product, ProductId, ProductPatch, Session};
use reqwest::{Method, RequestBuilder, Response};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};
use url::Url;

use crate::catalog::Popularity;
use crate::config::TableStoreConfig;

/// Message fragments that mark a failure as a connectivity problem rather
/// than a backend rejection.
const CONNECTION_ERROR_MARKERS: &[&str] = &[
    "error sending request",
    "connection",
    "timed out",
    "dns",
    "network",
    "failed to fetch",
];

/// Errors from the table-store.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend rejected the request.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Response body did not have the expected shape.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Bad endpoint URL.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// No row matched.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Email/password rejected or the session token is no longer valid.
    #[error("Invalid credentials")]
    Unauthorized,

    /// The request was aborted by its cancellation token.
    #[error("Request cancelled")]
    Cancelled,
}

impl RemoteError {
    /// Whether the error looks like a transient connectivity failure.
    ///
    /// Detection is by message substring so that errors surfaced from any
    /// layer (client, proxy, gateway) are classified alike.
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        match self {
            Self::Cancelled | Self::Unauthorized | Self::NotFound(_) => false,
            Self::Http(e) if e.is_connect() || e.is_timeout() => true,
            other => {
                let mut message = other.to_string().to_lowercase();
                if let Self::Http(e) = other {
                    let mut source = std::error::Error::source(e);
                    while let Some(cause) = source {
                        message.push(' ');
                        message.push_str(&cause.to_string().to_lowercase());
                        source = cause.source();
                    }
                }
                CONNECTION_ERROR_MARKERS
                    .iter()
                    .any(|marker| message.contains(marker))
            }
        }
    }

    /// Whether the request was cancelled.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Where the product store gets its data.
///
/// Implemented by [`TableStoreClient`]; tests substitute in-memory fakes.
#[async_trait]
pub trait ProductSource: Send + Sync {
    /// Every non-deleted product, newest first. Must return
    /// [`RemoteError::Cancelled`] promptly once `cancel` fires.
    async fn list_products(&self, cancel: &CancellationToken)
    -> Result<Vec<Product>, RemoteError>;

    /// A single product, deleted or not.
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, RemoteError>;

    /// Favorite count per product.
    async fn favorite_counts(&self) -> Result<Popularity, RemoteError>;

    async fn insert_product(
        &self,
        session: &Session,
        product: &NewProduct,
    ) -> Result<Product, RemoteError>;

    async fn update_product(
        &self,
        session: &Session,
        id: ProductId,
        patch: &ProductPatch,
    ) -> Result<Product, RemoteError>;

    /// Set `is_deleted`; the row itself is kept.
    async fn soft_delete_product(
        &self,
        session: &Session,
        id: ProductId,
    ) -> Result<Product, RemoteError>;
}

// =============================================================================
// TableStoreClient
// =============================================================================

/// Client for the hosted table-store.
#[derive(Clone)]
pub struct TableStoreClient {
    inner: Arc<TableStoreClientInner>,
}

struct TableStoreClientInner {
    client: reqwest::Client,
    base: Url,
    anon_key: String,
}

impl TableStoreClient {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &TableStoreConfig) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            inner: Arc::new(TableStoreClientInner {
                client,
                base: config.url.clone(),
                anon_key: config.anon_key.expose_secret().to_string(),
            }),
        })
    }

    /// Base URL of the table-store.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.base
    }

    fn request(
        &self,
        method: Method,
        path: &str,
        session: Option<&Session>,
    ) -> Result<RequestBuilder, RemoteError> {
        let url = self.inner.base.join(path)?;
        let bearer = session.map_or(self.inner.anon_key.as_str(), |s| s.access_token.as_str());
        Ok(self
            .inner
            .client
            .request(method, url)
            .header("apikey", &self.inner.anon_key)
            .bearer_auth(bearer))
    }

    fn rest(
        &self,
        method: Method,
        table: &str,
        session: Option<&Session>,
    ) -> Result<RequestBuilder, RemoteError> {
        self.request(method, &format!("rest/v1/{table}"), session)
    }

    /// Send a request and decode a JSON body.
    async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, RemoteError> {
        let response = Self::check(request.send().await?).await?;
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            error!(
                error = %e,
                body = %body.chars().take(500).collect::<String>(),
                "Failed to parse table-store response"
            );
            RemoteError::Parse(e.to_string())
        })
    }

    /// Send a request whose body is irrelevant.
    async fn send_empty(request: RequestBuilder) -> Result<(), RemoteError> {
        Self::check(request.send().await?).await?;
        Ok(())
    }

    /// Turn non-success statuses into [`RemoteError::Api`], keeping the
    /// backend's own message.
    async fn check(response: Response) -> Result<Response, RemoteError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        warn!(
            status = %status,
            body = %body.chars().take(500).collect::<String>(),
            "Table-store returned non-success status"
        );
        Err(RemoteError::Api {
            status: status.as_u16(),
            message: backend_message(&body),
        })
    }
}

/// Pull the human-readable message out of an error body.
fn backend_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            ["message", "msg", "error_description", "error"]
                .iter()
                .find_map(|field| value.get(field).and_then(Value::as_str).map(str::to_owned))
        })
        .unwrap_or_else(|| body.chars().take(200).collect())
}

/// Convert every row that passes validation, logging the rest.
fn convert_rows<R, T, E>(table: &'static str, rows: Vec<Value>) -> Vec<T>
where
    R: DeserializeOwned,
    T: TryFrom<R, Error = E>,
    E: std::fmt::Display,
{
    rows.into_iter()
        .filter_map(|raw| {
            let row = match serde_json::from_value::<R>(raw) {
                Ok(row) => row,
                Err(e) => {
                    warn!(table, error = %e, "Skipping malformed row");
                    return None;
                }
            };
            match T::try_from(row) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(table, error = %e, "Skipping invalid row");
                    None
                }
            }
        })
        .collect()
}

//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers should return `Result<T, AppError>`.
//!
//! Every error body is JSON: `{"error": "..."}`. Connection failures to the
//! table-store additionally carry `"connection_error": true` and the path
//! of the refresh endpoint so clients can offer a retry.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::checkout::CheckoutError;
use crate::remote::RemoteError;
use crate::store::StoreError;

/// Endpoint clients call to retry after a connection error.
pub const RETRY_PATH: &str = "/api/products/refresh";

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Table-store call failed.
    #[error("Table-store error: {0}")]
    Remote(#[from] RemoteError),

    /// Product store failed.
    #[error("Product store error: {0}")]
    Store(#[from] StoreError),

    /// Checkout rejected or failed.
    #[error("Checkout error: {0}")]
    Checkout(#[from] CheckoutError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// User is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not allowed.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    fn is_connection_error(&self) -> bool {
        match self {
            Self::Remote(e) => e.is_connection_error(),
            Self::Store(e) => e.is_connection_error(),
            Self::Checkout(e) => e.is_connection_error(),
            _ => false,
        }
    }

    fn remote_status(err: &RemoteError) -> StatusCode {
        match err {
            RemoteError::NotFound(_) => StatusCode::NOT_FOUND,
            RemoteError::Unauthorized => StatusCode::UNAUTHORIZED,
            RemoteError::Api { status, .. } if matches!(status, 401 | 403) => {
                StatusCode::FORBIDDEN
            }
            RemoteError::Api { status, .. } if (400..500).contains(status) => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::BAD_GATEWAY,
        }
    }

    fn status(&self) -> StatusCode {
        if self.is_connection_error() {
            return StatusCode::SERVICE_UNAVAILABLE;
        }
        match self {
            Self::Remote(err) | Self::Store(StoreError::Remote(err)) => Self::remote_status(err),
            Self::Store(StoreError::Invalid(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Store(StoreError::NotFound(_)) | Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Store(StoreError::Cancelled) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Checkout(err) => match err {
                CheckoutError::Store(StoreError::Remote(e)) | CheckoutError::Remote(e) => {
                    Self::remote_status(e)
                }
                CheckoutError::Store(StoreError::Cancelled) => StatusCode::SERVICE_UNAVAILABLE,
                CheckoutError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
                CheckoutError::OutOfStock { .. } => StatusCode::CONFLICT,
                _ => StatusCode::UNPROCESSABLE_ENTITY,
            },
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the client. Backend messages are kept for any API
    /// failure that is not a connection problem; internal errors are hidden.
    fn public_message(&self, status: StatusCode) -> String {
        match self {
            Self::Internal(_) => "Internal server error".to_string(),
            Self::Remote(err) | Self::Store(StoreError::Remote(err))
                if err.is_connection_error() =>
            {
                "Could not reach the product service".to_string()
            }
            Self::Remote(RemoteError::Api { message, .. })
            | Self::Store(StoreError::Remote(RemoteError::Api { message, .. }))
                if status.is_client_error() =>
            {
                format!("Request rejected: {message}")
            }
            Self::Remote(RemoteError::Api { message, .. })
            | Self::Store(StoreError::Remote(RemoteError::Api { message, .. })) => {
                format!("Backend error: {message}")
            }
            Self::Remote(_) | Self::Store(StoreError::Remote(_))
                if status.is_server_error() =>
            {
                "Could not reach the product service".to_string()
            }
            Self::Store(StoreError::Cancelled) => "Request cancelled, please retry".to_string(),
            Self::Store(err) => err.to_string(),
            Self::Checkout(err) if status.is_client_error() => err.to_string(),
            Self::Checkout(_) => "Could not place the order".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server errors to Sentry
        if status.is_server_error() && !matches!(self, Self::Store(StoreError::Cancelled)) {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let message = self.public_message(status);
        let body = if self.is_connection_error() {
            json!({ "error": message, "connection_error": true, "retry": RETRY_PATH })
        } else {
            json!({ "error": message })
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            ..Default::default()
        }));
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use dawajen_core::{ProductId, RowError};

    async fn body(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("product 123".to_string());
        assert_eq!(err.to_string(), "Not found: product 123");

        let err = AppError::BadRequest("invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: invalid input");
    }

    #[test]
    fn test_app_error_status_codes() {
        fn get_status(err: AppError) -> StatusCode {
            err.into_response().status()
        }

        assert_eq!(
            get_status(AppError::NotFound("test".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(AppError::Unauthorized("test".to_string())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            get_status(AppError::Forbidden("test".to_string())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            get_status(AppError::Internal("test".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            get_status(StoreError::NotFound(ProductId::new(1)).into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(StoreError::Invalid(RowError::MissingField("name")).into()),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            get_status(CheckoutError::EmptyCart.into()),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[tokio::test]
    async fn test_connection_error_body_offers_retry() {
        let err = AppError::Store(StoreError::Remote(RemoteError::Api {
            status: 502,
            message: "network unreachable".to_string(),
        }));
        let (status, body) = body(err).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["connection_error"], true);
        assert_eq!(body["retry"], RETRY_PATH);
    }

    #[tokio::test]
    async fn test_rejected_write_keeps_backend_message() {
        let err = AppError::Store(StoreError::Remote(RemoteError::Api {
            status: 403,
            message: "permission denied for table products".to_string(),
        }));
        let (status, body) = body(err).await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(
            body["error"],
            "Request rejected: permission denied for table products"
        );
        assert!(body.get("connection_error").is_none());
    }

    #[tokio::test]
    async fn test_failed_write_keeps_server_side_message() {
        let err = AppError::Store(StoreError::Remote(RemoteError::Api {
            status: 500,
            message: "new row violates trigger check_price".to_string(),
        }));
        let (status, body) = body(err).await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(
            body["error"],
            "Backend error: new row violates trigger check_price"
        );
        assert!(body.get("connection_error").is_none());
    }

    #[tokio::test]
    async fn test_connection_error_message_stays_generic() {
        let err = AppError::Remote(RemoteError::Api {
            status: 503,
            message: "connection refused".to_string(),
        });
        let (_, body) = body(err).await;
        assert_eq!(body["error"], "Could not reach the product service");
    }

    #[tokio::test]
    async fn test_internal_details_hidden() {
        let (_, body) = body(AppError::Internal("db password wrong".to_string())).await;
        assert_eq!(body["error"], "Internal server error");
    }
}

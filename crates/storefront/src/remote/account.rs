//! Auth, profiles, cart and favorites.

use dawajen_core::{CartItem, Favorite, ProductId, Profile, Session, UserId};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument, warn};

use super::{RemoteError, TableStoreClient};

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    user: AuthUser,
}

#[derive(Deserialize)]
struct AuthUser {
    id: UserId,
}

impl TableStoreClient {
    // =========================================================================
    // Auth
    // =========================================================================

    /// Exchange email and password for a session.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Unauthorized`] if the credentials are rejected.
    #[instrument(skip(self, password))]
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, RemoteError> {
        let response = self
            .request(Method::POST, "auth/v1/token", None)?
            .query(&[("grant_type", "password")])
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;

        if matches!(
            response.status(),
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED
        ) {
            warn!("Sign-in rejected");
            return Err(RemoteError::Unauthorized);
        }

        let token: TokenResponse = Self::send_json_response(response).await?;
        info!(user_id = %token.user.id, "Signed in");
        Ok(Session {
            access_token: token.access_token,
            user_id: token.user.id,
        })
    }

    /// Resolve a bearer token to a session.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Unauthorized`] if the token is expired or invalid.
    #[instrument(skip_all)]
    pub async fn current_user(&self, access_token: &str) -> Result<Session, RemoteError> {
        let probe = Session {
            access_token: access_token.to_string(),
            user_id: UserId::new(uuid::Uuid::nil()),
        };
        let response = self
            .request(Method::GET, "auth/v1/user", Some(&probe))?
            .send()
            .await?;

        if matches!(
            response.status(),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            return Err(RemoteError::Unauthorized);
        }

        let user: AuthUser = Self::send_json_response(response).await?;
        Ok(Session {
            access_token: probe.access_token,
            user_id: user.id,
        })
    }

    async fn send_json_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, RemoteError> {
        let response = Self::check(response).await?;
        response
            .json()
            .await
            .map_err(|e| RemoteError::Parse(e.to_string()))
    }

    // =========================================================================
    // Profiles
    // =========================================================================

    /// The signed-in user's profile.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::NotFound`] if the user has no profile row.
    #[instrument(skip(self, session), fields(user_id = %session.user_id))]
    pub async fn get_profile(&self, session: &Session) -> Result<Profile, RemoteError> {
        let request = self
            .rest(Method::GET, "profiles", Some(session))?
            .query(&[
                ("select", "*".to_string()),
                ("id", format!("eq.{}", session.user_id)),
            ]);
        let profiles: Vec<Profile> = Self::send_json(request).await?;
        profiles
            .into_iter()
            .next()
            .ok_or_else(|| RemoteError::NotFound(format!("profile {}", session.user_id)))
    }

    // =========================================================================
    // Cart
    // =========================================================================

    /// Cart lines for the signed-in user, oldest first.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    #[instrument(skip(self, session), fields(user_id = %session.user_id))]
    pub async fn list_cart(&self, session: &Session) -> Result<Vec<CartItem>, RemoteError> {
        let request = self.rest(Method::GET, "cart", Some(session))?.query(&[
            ("select", "*".to_string()),
            ("user_id", format!("eq.{}", session.user_id)),
            ("order", "id.asc".to_string()),
        ]);
        Self::send_json(request).await
    }

    /// Set the quantity of a product in the cart, adding the line if needed.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    #[instrument(skip(self, session), fields(user_id = %session.user_id))]
    pub async fn upsert_cart_item(
        &self,
        session: &Session,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartItem, RemoteError> {
        let request = self
            .rest(Method::POST, "cart", Some(session))?
            .query(&[("on_conflict", "user_id,product_id")])
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(&json!({
                "user_id": session.user_id,
                "product_id": product_id,
                "quantity": quantity,
            }));
        let rows: Vec<CartItem> = Self::send_json(request).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| RemoteError::Parse("empty upsert response".to_string()))
    }

    /// Remove one product from the cart.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    #[instrument(skip(self, session), fields(user_id = %session.user_id))]
    pub async fn remove_cart_item(
        &self,
        session: &Session,
        product_id: ProductId,
    ) -> Result<(), RemoteError> {
        let request = self.rest(Method::DELETE, "cart", Some(session))?.query(&[
            ("user_id", format!("eq.{}", session.user_id)),
            ("product_id", format!("eq.{product_id}")),
        ]);
        Self::send_empty(request).await
    }

    /// Empty the cart.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    #[instrument(skip(self, session), fields(user_id = %session.user_id))]
    pub async fn clear_cart(&self, session: &Session) -> Result<(), RemoteError> {
        let request = self
            .rest(Method::DELETE, "cart", Some(session))?
            .query(&[("user_id", format!("eq.{}", session.user_id))]);
        Self::send_empty(request).await
    }

    // =========================================================================
    // Favorites
    // =========================================================================

    /// Favorites of the signed-in user.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    #[instrument(skip(self, session), fields(user_id = %session.user_id))]
    pub async fn list_favorites(&self, session: &Session) -> Result<Vec<Favorite>, RemoteError> {
        let request = self.rest(Method::GET, "favorites", Some(session))?.query(&[
            ("select", "user_id,product_id".to_string()),
            ("user_id", format!("eq.{}", session.user_id)),
        ]);
        Self::send_json(request).await
    }

    /// Mark a product as a favorite. Adding an existing favorite is a no-op.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    #[instrument(skip(self, session), fields(user_id = %session.user_id))]
    pub async fn add_favorite(
        &self,
        session: &Session,
        product_id: ProductId,
    ) -> Result<(), RemoteError> {
        let request = self
            .rest(Method::POST, "favorites", Some(session))?
            .query(&[("on_conflict", "user_id,product_id")])
            .header("Prefer", "resolution=ignore-duplicates")
            .json(&json!({ "user_id": session.user_id, "product_id": product_id }));
        Self::send_empty(request).await
    }

    /// Remove a favorite.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    #[instrument(skip(self, session), fields(user_id = %session.user_id))]
    pub async fn remove_favorite(
        &self,
        session: &Session,
        product_id: ProductId,
    ) -> Result<(), RemoteError> {
        let request = self.rest(Method::DELETE, "favorites", Some(session))?.query(&[
            ("user_id", format!("eq.{}", session.user_id)),
            ("product_id", format!("eq.{product_id}")),
        ]);
        Self::send_empty(request).await
    }
}

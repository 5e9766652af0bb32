//! Authentication extractors.
//!
//! Clients send the table-store access token they got from
//! `POST /api/auth/sign-in` as `Authorization: Bearer <token>`. The token is
//! resolved to a [`Session`] on every request and forwarded to the
//! table-store, so row-level security applies there too.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use dawajen_core::{Profile, Session};
use tracing::{Span, debug};

use crate::error::{AppError, set_sentry_user};
use crate::remote::RemoteError;
use crate::state::AppState;

/// Extractor that requires a signed-in user.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(RequireAuth(session): RequireAuth) -> String {
///     format!("Hello, {}!", session.user_id)
/// }
/// ```
pub struct RequireAuth(pub Session);

/// Extractor that requires a signed-in user whose profile role is `admin`.
pub struct RequireAdmin(pub Session, pub Profile);

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

impl FromRequestParts<AppState> for RequireAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or_else(|| AppError::Unauthorized("missing bearer token".to_string()))?;

        let session = match state.client().current_user(token).await {
            Ok(session) => session,
            Err(RemoteError::Unauthorized) => {
                debug!("Rejected bearer token");
                return Err(AppError::Unauthorized("invalid or expired token".to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        Span::current().record("user_id", tracing::field::display(&session.user_id));
        set_sentry_user(&session.user_id);
        Ok(Self(session))
    }
}

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let RequireAuth(session) = RequireAuth::from_request_parts(parts, state).await?;

        let profile = match state.client().get_profile(&session).await {
            Ok(profile) => profile,
            Err(RemoteError::NotFound(_)) => {
                return Err(AppError::Forbidden("admin access required".to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        if !profile.is_admin() {
            return Err(AppError::Forbidden("admin access required".to_string()));
        }
        Ok(Self(session, profile))
    }
}

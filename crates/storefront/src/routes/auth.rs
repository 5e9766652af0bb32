//! Sign-in route handler.

use axum::{Json, extract::State};
use dawajen_core::UserId;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::{AppError, Result};
use crate::remote::RemoteError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct SignInForm {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct SignInResponse {
    pub access_token: String,
    pub user_id: UserId,
    pub is_admin: bool,
}

impl std::fmt::Debug for SignInForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignInForm")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// `POST /api/auth/sign-in`
#[instrument(skip(state, form), fields(email = %form.email))]
pub async fn sign_in(
    State(state): State<AppState>,
    Json(form): Json<SignInForm>,
) -> Result<Json<SignInResponse>> {
    let email = form.email.trim();
    if email.is_empty() || form.password.is_empty() {
        return Err(AppError::BadRequest(
            "email and password are required".to_string(),
        ));
    }

    let session = match state.client().sign_in(email, &form.password).await {
        Ok(session) => session,
        Err(RemoteError::Unauthorized) => {
            return Err(AppError::Unauthorized("invalid credentials".to_string()));
        }
        Err(e) => return Err(e.into()),
    };

    let is_admin = state
        .client()
        .get_profile(&session)
        .await
        .is_ok_and(|profile| profile.is_admin());

    Ok(Json(SignInResponse {
        access_token: session.access_token,
        user_id: session.user_id,
        is_admin,
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_in_form_debug_hides_password() {
        let form: SignInForm = serde_json::from_str(
            r#"{"email":"amina@example.com","password":"correct horse"}"#,
        )
        .unwrap();

        let rendered = format!("{form:?}");
        assert!(rendered.contains("amina@example.com"));
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains("correct horse"));
    }
}

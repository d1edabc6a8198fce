//! Authentication middleware
//!
//! Extracts the authenticated identity from a bearer token so handlers
//! receive a resolved user id, mirroring the command-layer contract that
//! identity is settled before any core operation runs.

use axum::{
    RequestPartsExt, async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};

use super::session::verify_token;
use crate::AppState;
use crate::error::AppError;

/// Authenticated identity attached to a request
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: String,
    pub username: String,
}

/// Extractor for the current authenticated user
///
/// # Usage
/// ```ignore
/// async fn handler(
///     CurrentUser(user): CurrentUser,
/// ) -> impl IntoResponse {
///     format!("Hello, {}", user.username)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CurrentUser(pub AuthUser);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthUser>().cloned() {
            return Ok(CurrentUser(user));
        }

        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| AppError::Unauthorized)?;

        let state = AppState::from_ref(state);
        let claims = verify_token(bearer.token(), &state.config.auth.token_secret)?;

        let user = AuthUser {
            id: claims.sub,
            username: claims.username,
        };
        parts.extensions.insert(user.clone());

        Ok(CurrentUser(user))
    }
}

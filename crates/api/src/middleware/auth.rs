//! Bearer-token authentication.
//!
//! Usage: add `AuthUser` as an extractor parameter to require a valid
//! authentication token, or `ActivatedUser` to also require an activated
//! account.
//!
//! ```ignore
//! async fn my_handler(ActivatedUser(user): ActivatedUser, ...) -> ... {
//!     // user.id is available here
//! }
//! ```

use axum::{
    Json, RequestPartsExt,
    extract::FromRequestParts,
    http::{HeaderValue, StatusCode, header::WWW_AUTHENTICATE, request::Parts},
    response::{IntoResponse, Response},
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};

use crate::{
    error::AppError,
    models::{TokenScope, User},
    services::tokens,
    state::AppState,
};

/// User resolved from a valid authentication token.
pub struct AuthUser(pub User);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| AuthError::MissingToken)?;

        let user = tokens::resolve(
            state.repos.users.as_ref(),
            TokenScope::Authentication,
            bearer.token(),
        )
        .await
        .map_err(|e| AuthError::Unavailable(e.into()))?
        .ok_or(AuthError::InvalidToken)?;

        Ok(AuthUser(user))
    }
}

/// An [`AuthUser`] whose account has been activated.
pub struct ActivatedUser(pub User);

impl FromRequestParts<AppState> for ActivatedUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let AuthUser(user) = AuthUser::from_request_parts(parts, state).await?;

        if !user.activated {
            return Err(AuthError::Inactive);
        }

        Ok(ActivatedUser(user))
    }
}

pub enum AuthError {
    MissingToken,
    InvalidToken,
    Inactive,
    /// The token store could not be consulted.
    Unavailable(anyhow::Error),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingToken => (
                StatusCode::UNAUTHORIZED,
                "you must be authenticated to access this resource",
            ),
            AuthError::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                "invalid or missing authentication token",
            ),
            AuthError::Inactive => (
                StatusCode::FORBIDDEN,
                "your user account must be activated to access this resource",
            ),
            AuthError::Unavailable(err) => return AppError::Internal(err).into_response(),
        };

        let mut response = (status, Json(serde_json::json!({ "error": message }))).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

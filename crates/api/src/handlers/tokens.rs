//! Authentication tokens.
//!
//! POST /v1/tokens/authentication exchanges an email and password for a
//! bearer token valid for 24 hours. Unknown emails and wrong passwords get
//! the same 401 response.

use axum::{
    Json, Router, debug_handler, extract::State, http::StatusCode, response::IntoResponse,
    routing::post,
};
use garde::Validate;
use shared::api::{AuthTokenResponse, CreateAuthTokenPayload, TokenView};

use crate::{
    error::AppError,
    extract::AppJson,
    models::TokenScope,
    services::{password, tokens},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/v1/tokens/authentication", post(create_authentication_token))
}

fn invalid_credentials() -> AppError {
    AppError::External(
        StatusCode::UNAUTHORIZED,
        "invalid authentication credentials",
    )
}

#[debug_handler]
async fn create_authentication_token(
    State(state): State<AppState>,
    AppJson(payload): AppJson<CreateAuthTokenPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let user = state
        .repos
        .users
        .find_by_email(&payload.email)
        .await
        .map_err(AppError::from_store)?
        .ok_or_else(invalid_credentials)?;

    if !password::verify(payload.password, user.password_hash.clone()).await? {
        return Err(invalid_credentials());
    }

    let token = tokens::generate(
        user.id,
        tokens::AUTHENTICATION_TTL,
        TokenScope::Authentication,
    );
    state
        .repos
        .tokens
        .insert(&token)
        .await
        .map_err(AppError::from_store)?;

    tracing::info!(user_id = user.id, "authentication token issued");

    Ok((
        StatusCode::CREATED,
        Json(AuthTokenResponse {
            authentication_token: TokenView {
                token: token.plaintext,
                expiry: token.expiry,
            },
        }),
    ))
}

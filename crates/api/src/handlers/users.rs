//! Account registration and activation.
//!
//! Flow:
//! 1. POST /v1/users with name, email and password creates an inactive user
//!    and a 3-day activation token
//! 2. The token plaintext is emailed in the background; the response (202)
//!    does not wait for delivery
//! 3. PUT /v1/users/activated with the token activates the account and
//!    deletes every activation token the user holds
//!
//! Activation is a versioned write like any other user update, so it cannot
//! silently overwrite a concurrent change to the same user.

use axum::{
    Json, Router, debug_handler, extract::State, http::StatusCode, response::IntoResponse,
    routing::{post, put},
};
use garde::Validate;
use shared::api::{ActivateUserPayload, RegisterUserPayload, UserResponse};

use crate::{
    error::AppError,
    extract::AppJson,
    models::{NewUser, TokenScope, User},
    occ::ConditionalUpdater,
    services::{password, send_welcome_with_retry, tokens},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/users", post(register_user))
        .route("/v1/users/activated", put(activate_user))
}

#[debug_handler]
async fn register_user(
    State(state): State<AppState>,
    AppJson(payload): AppJson<RegisterUserPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let password_hash = password::hash(payload.password).await?;

    let user = state
        .repos
        .users
        .insert(&NewUser {
            name: payload.name,
            email: payload.email,
            password_hash,
        })
        .await
        .map_err(AppError::from_store)?;

    let token = tokens::generate(user.id, tokens::ACTIVATION_TTL, TokenScope::Activation);
    state
        .repos
        .tokens
        .insert(&token)
        .await
        .map_err(AppError::from_store)?;

    tracing::info!(user_id = user.id, "user registered");

    let email = state.email.clone();
    let to = user.email.clone();
    let user_id = user.id;
    state.tasks.spawn(async move {
        if let Err(err) =
            send_welcome_with_retry(email.as_ref(), &to, user_id, &token.plaintext).await
        {
            tracing::error!(user_id, "failed to send welcome email: {err:#}");
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(UserResponse { user: user.view() }),
    ))
}

#[debug_handler]
async fn activate_user(
    State(state): State<AppState>,
    AppJson(payload): AppJson<ActivateUserPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let user = tokens::resolve(
        state.repos.users.as_ref(),
        TokenScope::Activation,
        &payload.token,
    )
    .await
    .map_err(AppError::from_store)?
    .ok_or_else(|| AppError::Validation("token: invalid or expired activation token".into()))?;

    let user = ConditionalUpdater::new(state.repos.users.as_ref())
        .apply_to(user, None, |user: &mut User| {
            user.activated = true;
            Ok(())
        })
        .await
        .map_err(AppError::from_update)?;

    state
        .repos
        .tokens
        .delete_all_for_user(TokenScope::Activation, user.id)
        .await
        .map_err(AppError::from_store)?;

    tracing::info!(user_id = user.id, "user activated");

    Ok(Json(UserResponse { user: user.view() }))
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::*;
    use crate::models::Token;
    use crate::repos::{MockTokenRepo, MockUserRepo, StoreError, TokenRepo};
    use crate::services::MockEmailSender;
    use crate::services::tokens::ACTIVATION_TTL;
    use crate::test_utils::{MemoryUsers, TestStateBuilder, mock_user};

    fn registration(email: &str) -> RegisterUserPayload {
        RegisterUserPayload {
            name: "Ana".into(),
            email: email.into(),
            password: "pa55word".into(),
        }
    }

    fn inactive_user(id: i64) -> crate::models::User {
        let mut user = mock_user(id, "ana@example.com");
        user.activated = false;
        user
    }

    async fn issue(store: &MemoryUsers, user_id: i64) -> Token {
        let token = tokens::generate(user_id, ACTIVATION_TTL, TokenScope::Activation);
        TokenRepo::insert(store, &token).await.unwrap();
        token
    }

    #[tokio::test]
    async fn register_creates_inactive_user_and_mails_token() {
        let store = Arc::new(MemoryUsers::default());
        let mut email = MockEmailSender::new();
        email
            .expect_send_welcome()
            .withf(|to, user_id, token| {
                to == "ana@example.com" && *user_id == 1 && tokens::is_well_formed(token)
            })
            .times(1)
            .returning(|_, _, _| Ok(()));
        let state = TestStateBuilder::new()
            .with_memory_users(store.clone())
            .with_email_sender(email)
            .build();
        let tasks = state.tasks.clone();

        let response = register_user(State(state), AppJson(registration("ana@example.com")))
            .await
            .unwrap()
            .into_response();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let user = store.get(1).unwrap();
        assert!(!user.activated);
        assert!(user.password_hash.starts_with("$argon2id$"));
        assert_eq!(store.token_count(1, TokenScope::Activation), 1);

        tasks.close();
        tasks.wait().await;
    }

    #[tokio::test]
    async fn register_duplicate_email_is_422() {
        let store = Arc::new(MemoryUsers::with(vec![mock_user(1, "ana@example.com")]));
        let state = TestStateBuilder::new().with_memory_users(store).build();

        let err = register_user(State(state), AppJson(registration("ANA@example.com")))
            .await
            .err()
            .unwrap();

        assert_eq!(err.into_response().status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn register_rejects_short_password() {
        let mut users = MockUserRepo::new();
        users.expect_insert().never();
        let state = TestStateBuilder::new().with_user_repo(users).build();
        let mut payload = registration("ana@example.com");
        payload.password = "short".into();

        let err = register_user(State(state), AppJson(payload))
            .await
            .err()
            .unwrap();

        assert_eq!(err.into_response().status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn register_fails_when_token_store_times_out() {
        let store = Arc::new(MemoryUsers::default());
        let mut token_repo = MockTokenRepo::new();
        token_repo
            .expect_insert()
            .returning(|_| Err(StoreError::Timeout(Duration::from_secs(3))));
        let mut email = MockEmailSender::new();
        email.expect_send_welcome().never();
        let state = TestStateBuilder::new()
            .with_memory_users(store)
            .with_token_repo(token_repo)
            .with_email_sender(email)
            .build();

        let err = register_user(State(state), AppJson(registration("ana@example.com")))
            .await
            .err()
            .unwrap();

        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn activate_sets_flag_bumps_version_and_clears_tokens() {
        let store = Arc::new(MemoryUsers::with(vec![inactive_user(4)]));
        let token = issue(&store, 4).await;
        issue(&store, 4).await;
        let state = TestStateBuilder::new()
            .with_memory_users(store.clone())
            .build();

        let response = activate_user(
            State(state),
            AppJson(ActivateUserPayload {
                token: token.plaintext.clone(),
            }),
        )
        .await
        .unwrap()
        .into_response();

        assert_eq!(response.status(), StatusCode::OK);
        let user = store.get(4).unwrap();
        assert!(user.activated);
        assert_eq!(user.version, 2);
        assert_eq!(store.token_count(4, TokenScope::Activation), 0);
    }

    #[tokio::test]
    async fn activate_with_unknown_token_is_422() {
        let store = Arc::new(MemoryUsers::with(vec![inactive_user(4)]));
        let state = TestStateBuilder::new().with_memory_users(store).build();

        let err = activate_user(
            State(state),
            AppJson(ActivateUserPayload {
                token: "0".repeat(32),
            }),
        )
        .await
        .err()
        .unwrap();

        assert_eq!(err.into_response().status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn activation_token_is_single_use() {
        let store = Arc::new(MemoryUsers::with(vec![inactive_user(4)]));
        let token = issue(&store, 4).await;
        let state = TestStateBuilder::new()
            .with_memory_users(store.clone())
            .build();

        let payload = || {
            AppJson(ActivateUserPayload {
                token: token.plaintext.clone(),
            })
        };
        activate_user(State(state.clone()), payload()).await.unwrap();
        let err = activate_user(State(state), payload()).await.err().unwrap();

        assert_eq!(err.into_response().status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}

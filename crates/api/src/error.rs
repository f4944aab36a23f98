use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::{occ::UpdateError, repos::StoreError};

/// Body returned for optimistic-concurrency conflicts.
pub const EDIT_CONFLICT_MESSAGE: &str =
    "unable to update the record due to an edit conflict, please try again";

#[derive(Debug)]
pub enum AppError {
    /// Internal errors - logged but return generic 500 to user
    Internal(anyhow::Error),
    /// User-facing errors - message is safe to show
    External(StatusCode, &'static str),
    /// Validation errors - safe to show
    Validation(String),
    /// Request refused before reaching a handler (unreadable body, unknown
    /// route, wrong method) - message is safe to show
    Rejected(StatusCode, String),
}

impl AppError {
    pub fn not_found() -> Self {
        Self::External(
            StatusCode::NOT_FOUND,
            "the requested resource could not be found",
        )
    }

    pub fn edit_conflict() -> Self {
        Self::External(StatusCode::CONFLICT, EDIT_CONFLICT_MESSAGE)
    }

    /// Maps a conditional-update failure to its client-visible response.
    pub fn from_update(err: UpdateError) -> Self {
        match err {
            UpdateError::NotFound => Self::not_found(),
            UpdateError::Conflict => Self::edit_conflict(),
            UpdateError::Rejected(message) => Self::Validation(message),
            UpdateError::Store(err) => Self::from_store(err),
        }
    }

    /// Keeps the status axum chose for an unreadable JSON body but answers
    /// in the usual error envelope.
    pub fn from_json_rejection(rejection: JsonRejection) -> Self {
        Self::Rejected(rejection.status(), rejection.body_text())
    }

    /// Store failures are server faults, except a taken email address.
    pub fn from_store(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateEmail => {
                Self::Validation("email: a user with this email address already exists".into())
            }
            err => Self::Internal(err.into()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Internal(err) => {
                tracing::error!("internal error: {:?}", err);
                sentry::capture_error(
                    err.as_ref() as &(dyn std::error::Error + Send + Sync + 'static)
                );

                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "the server encountered a problem and could not process your request"
                        .to_string(),
                )
            }
            AppError::External(status, msg) => (status, msg.to_string()),
            AppError::Validation(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            AppError::Rejected(status, msg) => (status, msg),
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::Internal(err.into())
    }
}

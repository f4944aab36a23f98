//! Request extractors that reject with [`AppError`].
//!
//! axum's own `Json` rejection answers in plain text. Handlers take
//! [`AppJson`] instead so an unreadable body gets the same `{"error": ...}`
//! envelope as every other failure.

use axum::{
    Json,
    extract::{FromRequest, Request},
};
use serde::de::DeserializeOwned;

use crate::error::AppError;

/// JSON request body.
#[derive(Debug)]
pub struct AppJson<T>(pub T);

impl<T, S> FromRequest<S> for AppJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(AppError::from_json_rejection)?;
        Ok(AppJson(value))
    }
}

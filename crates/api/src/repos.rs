//! Database repositories (PostgreSQL).
//!
//! This module contains traits and implementations for database access.
//! Each repository is abstracted behind a trait to enable fakes and mocks in
//! tests.
//!
//! ## Repositories
//!
//! - **movies** - Movie catalogue CRUD with versioned updates
//! - **users** - Accounts, lookup by email and by token digest
//! - **tokens** - Activation and authentication token rows
//! - **status** - Database connectivity for health checks
//!
//! Every statement runs under a fixed deadline ([`STORE_TIMEOUT`]). A
//! statement that misses it fails with [`StoreError::Timeout`]; since each
//! write is a single statement, nothing is partially applied.
//!
//! ## Usage in Handlers
//!
//! ```ignore
//! async fn handler(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
//!     let movie = state.repos.movies.fetch(id).await?;
//!     let user = state.repos.users.find_by_email(&email).await?;
//! }
//! ```

mod movies;
mod status;
mod tokens;
mod users;

pub use movies::{MovieFilter, MovieRepo, PgMovieRepo, Sort};
pub use status::{PgStatusRepo, StatusRepo};
pub use tokens::{PgTokenRepo, TokenRepo};
pub use users::{PgUserRepo, UserRepo};

#[cfg(test)]
pub use movies::{MockMovieRepo, SortColumn};
#[cfg(test)]
pub use status::MockStatusRepo;
#[cfg(test)]
pub use tokens::MockTokenRepo;
#[cfg(test)]
pub use users::MockUserRepo;

use std::{future::Future, sync::Arc, time::Duration};

use thiserror::Error;

/// Upper bound on any single database operation.
pub const STORE_TIMEOUT: Duration = Duration::from_secs(3);

/// Failures surfaced by the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("a user with this email address already exists")]
    DuplicateEmail,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Runs `op` under [`STORE_TIMEOUT`].
pub(crate) async fn with_deadline<T, F>(op: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    match tokio::time::timeout(STORE_TIMEOUT, op).await {
        Ok(result) => result.map_err(StoreError::from),
        Err(_) => Err(StoreError::Timeout(STORE_TIMEOUT)),
    }
}

/// Collection of all database repositories.
#[derive(Clone)]
pub struct Repos {
    pub movies: Arc<dyn MovieRepo>,
    pub users: Arc<dyn UserRepo>,
    pub tokens: Arc<dyn TokenRepo>,
    pub status: Arc<dyn StatusRepo>,
}

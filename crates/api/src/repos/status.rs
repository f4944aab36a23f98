//! Database liveness for the healthcheck endpoint.

use async_trait::async_trait;
use sqlx::{Pool, Postgres};

use super::{StoreError, with_deadline};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StatusRepo: Send + Sync {
    /// `Ok(true)` when the database answers and the schema is migrated.
    /// A connected database without the `movies` table reports `Ok(false)`.
    async fn ping(&self) -> Result<bool, StoreError>;
}

#[derive(Clone)]
pub struct PgStatusRepo {
    pool: Pool<Postgres>,
}

impl PgStatusRepo {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StatusRepo for PgStatusRepo {
    async fn ping(&self) -> Result<bool, StoreError> {
        let migrated: bool = with_deadline(
            sqlx::query_scalar("SELECT to_regclass('movies') IS NOT NULL").fetch_one(&self.pool),
        )
        .await?;
        Ok(migrated)
    }
}

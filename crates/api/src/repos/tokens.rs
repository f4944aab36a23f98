//! Token repository for PostgreSQL.
//!
//! Only the SHA-256 digest of a token is stored; plaintexts never reach the
//! database.

use async_trait::async_trait;
use sqlx::{Pool, Postgres};

use super::{StoreError, with_deadline};
use crate::models::{Token, TokenScope};

/// Repository for activation and authentication tokens.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenRepo: Send + Sync {
    /// Persist a token's digest, owner, scope and expiry.
    async fn insert(&self, token: &Token) -> Result<(), StoreError>;

    /// Remove every token of `scope` belonging to `user_id`. Returns the
    /// number of rows removed.
    async fn delete_all_for_user(&self, scope: TokenScope, user_id: i64)
    -> Result<u64, StoreError>;
}

/// PostgreSQL implementation of TokenRepo.
#[derive(Clone)]
pub struct PgTokenRepo {
    pool: Pool<Postgres>,
}

impl PgTokenRepo {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenRepo for PgTokenRepo {
    async fn insert(&self, token: &Token) -> Result<(), StoreError> {
        with_deadline(
            sqlx::query(
                "INSERT INTO tokens (hash, user_id, expiry, scope) VALUES ($1, $2, $3, $4)",
            )
            .bind(&token.hash[..])
            .bind(token.user_id)
            .bind(token.expiry)
            .bind(token.scope.as_str())
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn delete_all_for_user(
        &self,
        scope: TokenScope,
        user_id: i64,
    ) -> Result<u64, StoreError> {
        let result = with_deadline(
            sqlx::query("DELETE FROM tokens WHERE scope = $1 AND user_id = $2")
                .bind(scope.as_str())
                .bind(user_id)
                .execute(&self.pool),
        )
        .await?;
        Ok(result.rows_affected())
    }
}

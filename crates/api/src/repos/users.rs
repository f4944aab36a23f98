//! User repository for PostgreSQL.

use async_trait::async_trait;
use sqlx::{Pool, Postgres};

use super::{StoreError, with_deadline};
use crate::{
    models::{NewUser, TokenScope, User},
    occ::{VersionedStore, WriteOutcome},
};

const USER_COLUMNS: &str = "id, name, email, password_hash, activated, version, created_at";

/// The bound parameter arrives typed as `text`; without the cast Postgres
/// compares the `citext` column as plain text and the lookup turns
/// case-sensitive.
const FIND_BY_EMAIL: &str = "SELECT id, name, email, password_hash, activated, version, created_at
     FROM users WHERE email = $1::citext";

/// Repository for user operations. Updates go through [`VersionedStore`].
#[async_trait]
pub trait UserRepo: VersionedStore<User> {
    /// Create a user. Fails with [`StoreError::DuplicateEmail`] if the
    /// address is taken (case-insensitively).
    async fn insert(&self, user: &NewUser) -> Result<User, StoreError>;

    /// Find a user by email.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// Find the owner of an unexpired token with the given scope and digest.
    async fn find_for_token(
        &self,
        scope: TokenScope,
        hash: &[u8],
    ) -> Result<Option<User>, StoreError>;
}

#[cfg(test)]
mockall::mock! {
    pub UserRepo {}

    #[async_trait]
    impl VersionedStore<User> for UserRepo {
        async fn fetch(&self, id: i64) -> Result<Option<User>, StoreError>;
        async fn write_if_version(&self, record: &User) -> Result<WriteOutcome, StoreError>;
    }

    #[async_trait]
    impl UserRepo for UserRepo {
        async fn insert(&self, user: &NewUser) -> Result<User, StoreError>;
        async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
        async fn find_for_token(
            &self,
            scope: TokenScope,
            hash: &[u8],
        ) -> Result<Option<User>, StoreError>;
    }
}

/// Unique violations on `users.email` become [`StoreError::DuplicateEmail`].
fn map_duplicate<T>(result: Result<T, StoreError>) -> Result<T, StoreError> {
    match result {
        Err(StoreError::Database(sqlx::Error::Database(db))) if db.is_unique_violation() => {
            Err(StoreError::DuplicateEmail)
        }
        other => other,
    }
}

/// PostgreSQL implementation of UserRepo.
#[derive(Clone)]
pub struct PgUserRepo {
    pool: Pool<Postgres>,
}

impl PgUserRepo {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VersionedStore<User> for PgUserRepo {
    async fn fetch(&self, id: i64) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        with_deadline(
            sqlx::query_as::<_, User>(&sql)
                .bind(id)
                .fetch_optional(&self.pool),
        )
        .await
    }

    async fn write_if_version(&self, user: &User) -> Result<WriteOutcome, StoreError> {
        let version = map_duplicate(
            with_deadline(
                sqlx::query_scalar::<_, i32>(
                    "UPDATE users
                     SET name = $1, email = $2, password_hash = $3, activated = $4,
                         version = version + 1
                     WHERE id = $5 AND version = $6
                     RETURNING version",
                )
                .bind(&user.name)
                .bind(&user.email)
                .bind(&user.password_hash)
                .bind(user.activated)
                .bind(user.id)
                .bind(user.version)
                .fetch_optional(&self.pool),
            )
            .await,
        )?;

        Ok(version.map_or(WriteOutcome::NoMatch, WriteOutcome::Applied))
    }
}

#[async_trait]
impl UserRepo for PgUserRepo {
    async fn insert(&self, user: &NewUser) -> Result<User, StoreError> {
        let sql = format!(
            "INSERT INTO users (name, email, password_hash, activated)
             VALUES ($1, $2, $3, false)
             RETURNING {USER_COLUMNS}"
        );
        map_duplicate(
            with_deadline(
                sqlx::query_as::<_, User>(&sql)
                    .bind(&user.name)
                    .bind(&user.email)
                    .bind(&user.password_hash)
                    .fetch_one(&self.pool),
            )
            .await,
        )
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        with_deadline(
            sqlx::query_as::<_, User>(FIND_BY_EMAIL)
                .bind(email)
                .fetch_optional(&self.pool),
        )
        .await
    }

    async fn find_for_token(
        &self,
        scope: TokenScope,
        hash: &[u8],
    ) -> Result<Option<User>, StoreError> {
        with_deadline(
            sqlx::query_as::<_, User>(
                "SELECT users.id, users.name, users.email, users.password_hash,
                        users.activated, users.version, users.created_at
                 FROM users
                 INNER JOIN tokens ON users.id = tokens.user_id
                 WHERE tokens.hash = $1
                 AND tokens.scope = $2
                 AND tokens.expiry > now()",
            )
            .bind(hash)
            .bind(scope.as_str())
            .fetch_optional(&self.pool),
        )
        .await
    }
}

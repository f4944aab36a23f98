use chrono::{DateTime, Utc};
use shared::api::{MoviePayload, MovieView, Runtime, UpdateMoviePayload, UserView};
use sqlx::FromRow;

use crate::occ::Versioned;

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct Movie {
    pub id: i64,
    pub title: String,
    pub year: i32,
    /// Minutes.
    pub runtime: i32,
    pub genres: Vec<String>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
}

impl Movie {
    /// Overwrites the fields present in `patch`, leaving the rest untouched.
    pub fn merge(&mut self, patch: UpdateMoviePayload) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(year) = patch.year {
            self.year = year;
        }
        if let Some(runtime) = patch.runtime {
            self.runtime = runtime.0;
        }
        if let Some(genres) = patch.genres {
            self.genres = genres;
        }
    }

    /// The client-editable fields, for re-validation after a merge.
    pub fn fields(&self) -> MoviePayload {
        MoviePayload {
            title: self.title.clone(),
            year: self.year,
            runtime: Runtime(self.runtime),
            genres: self.genres.clone(),
        }
    }

    pub fn view(&self) -> MovieView {
        MovieView {
            id: self.id,
            title: self.title.clone(),
            year: self.year,
            runtime: Runtime(self.runtime),
            genres: self.genres.clone(),
            version: self.version,
        }
    }
}

impl Versioned for Movie {
    fn id(&self) -> i64 {
        self.id
    }

    fn version(&self) -> i32 {
        self.version
    }

    fn set_version(&mut self, version: i32) {
        self.version = version;
    }
}

/// A registered account. The password is only ever held as an argon2 PHC string.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub activated: bool,
    pub version: i32,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn view(&self) -> UserView {
        UserView {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            activated: self.activated,
            created_at: self.created_at,
        }
    }
}

impl Versioned for User {
    fn id(&self) -> i64 {
        self.id
    }

    fn version(&self) -> i32 {
        self.version
    }

    fn set_version(&mut self, version: i32) {
        self.version = version;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
}

/// What a token grants. Stored as text in the `tokens.scope` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenScope {
    Activation,
    Authentication,
}

impl TokenScope {
    pub fn as_str(self) -> &'static str {
        match self {
            TokenScope::Activation => "activation",
            TokenScope::Authentication => "authentication",
        }
    }
}

/// A freshly generated token. `plaintext` is handed to the user once and is
/// never persisted; only `hash` is stored.
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    pub plaintext: String,
    pub hash: [u8; 32],
    pub user_id: i64,
    pub expiry: DateTime<Utc>,
    pub scope: TokenScope,
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("plaintext", &"<redacted>")
            .field("user_id", &self.user_id)
            .field("expiry", &self.expiry)
            .field("scope", &self.scope)
            .finish()
    }
}

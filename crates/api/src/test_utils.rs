//! Shared test utilities for API handler tests.
//!
//! Provides fixtures, in-memory repositories and a flexible `TestStateBuilder`
//! for constructing `AppState` instances with only the collaborators each test
//! needs.
//!
//! Mocks suit single-call expectations. The in-memory repositories apply
//! conditional writes atomically under a lock, so they stand in for the
//! database where a test exercises the version protocol itself.
//!
//! ## Usage
//!
//! ```ignore
//! use crate::test_utils::{MemoryMovies, TestStateBuilder, mock_movie};
//!
//! let state = TestStateBuilder::new()
//!     .with_movie_repo(MemoryMovies::with(vec![mock_movie(1, 1)]))
//!     .build();
//! ```

use std::{
    cmp::Ordering as CmpOrdering,
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use shared::api::MoviePayload;
use tokio_util::task::TaskTracker;

use crate::config::Config;
use crate::models::{Movie, NewUser, Token, TokenScope, User};
use crate::occ::{VersionedStore, WriteOutcome};
use crate::repos::{
    MockMovieRepo, MockStatusRepo, MockTokenRepo, MockUserRepo, MovieFilter, MovieRepo, Repos,
    SortColumn, StatusRepo, StoreError, TokenRepo, UserRepo,
};
use crate::services::{EmailSender, MockEmailSender};
use crate::state::AppState;

/// Creates a test configuration with dummy values.
pub fn test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 4000,
        database_url: "postgres://test".to_string(),
        db_max_connections: 1,
        env: "test".to_string(),
        limiter_rps: 2.0,
        limiter_burst: 4,
        limiter_enabled: true,
        limiter_cleanup_interval_secs: 60,
        cors_trusted_origins: vec![],
        smtp_url: None,
        smtp_sender: "Greenlight <no-reply@greenlight.test>".to_string(),
        sentry_dsn: None,
    }
}

/// Creates a movie with the given id and version.
pub fn mock_movie(id: i64, version: i32) -> Movie {
    Movie {
        id,
        title: format!("Movie {id}"),
        year: 2020,
        runtime: 100,
        genres: vec!["drama".to_string()],
        version,
        created_at: Utc::now(),
    }
}

/// Creates an activated user with the given id and email.
pub fn mock_user(id: i64, email: &str) -> User {
    User {
        id,
        name: "Test User".to_string(),
        email: email.to_string(),
        password_hash: String::new(),
        activated: true,
        version: 1,
        created_at: Utc::now(),
    }
}

/// Movie repository held in memory.
#[derive(Default)]
pub struct MemoryMovies {
    rows: Mutex<BTreeMap<i64, Movie>>,
    write_attempts: AtomicUsize,
}

impl MemoryMovies {
    pub fn with(movies: Vec<Movie>) -> Self {
        Self {
            rows: Mutex::new(movies.into_iter().map(|m| (m.id, m)).collect()),
            write_attempts: AtomicUsize::new(0),
        }
    }

    pub fn get(&self, id: i64) -> Option<Movie> {
        self.rows.lock().get(&id).cloned()
    }

    pub fn remove(&self, id: i64) {
        self.rows.lock().remove(&id);
    }

    /// Number of conditional writes issued, successful or not.
    pub fn write_attempts(&self) -> usize {
        self.write_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VersionedStore<Movie> for MemoryMovies {
    async fn fetch(&self, id: i64) -> Result<Option<Movie>, StoreError> {
        Ok(self.get(id))
    }

    async fn write_if_version(&self, movie: &Movie) -> Result<WriteOutcome, StoreError> {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);

        let mut rows = self.rows.lock();
        match rows.get_mut(&movie.id) {
            Some(stored) if stored.version == movie.version => {
                let version = stored.version + 1;
                *stored = Movie {
                    version,
                    created_at: stored.created_at,
                    ..movie.clone()
                };
                Ok(WriteOutcome::Applied(version))
            }
            _ => Ok(WriteOutcome::NoMatch),
        }
    }
}

fn compare_movies(a: &Movie, b: &Movie, column: SortColumn) -> CmpOrdering {
    match column {
        SortColumn::Id => a.id.cmp(&b.id),
        SortColumn::Title => a.title.cmp(&b.title),
        SortColumn::Year => a.year.cmp(&b.year),
        SortColumn::Runtime => a.runtime.cmp(&b.runtime),
    }
}

#[async_trait]
impl MovieRepo for MemoryMovies {
    async fn insert(&self, movie: &MoviePayload) -> Result<Movie, StoreError> {
        let mut rows = self.rows.lock();
        let id = rows.keys().next_back().map_or(1, |last| last + 1);
        let movie = Movie {
            id,
            title: movie.title.clone(),
            year: movie.year,
            runtime: movie.runtime.0,
            genres: movie.genres.clone(),
            version: 1,
            created_at: Utc::now(),
        };
        rows.insert(id, movie.clone());
        Ok(movie)
    }

    async fn list(&self, filter: &MovieFilter) -> Result<(Vec<Movie>, u64), StoreError> {
        let title = filter.title.to_lowercase();
        let mut matching: Vec<Movie> = self
            .rows
            .lock()
            .values()
            .filter(|m| title.is_empty() || m.title.to_lowercase().contains(&title))
            .filter(|m| filter.genres.iter().all(|g| m.genres.contains(g)))
            .cloned()
            .collect();

        matching.sort_by(|a, b| {
            let ord = compare_movies(a, b, filter.sort.column);
            let ord = if filter.sort.descending { ord.reverse() } else { ord };
            ord.then(a.id.cmp(&b.id))
        });

        let total = matching.len() as u64;
        let skip = (filter.page.saturating_sub(1) as usize) * filter.page_size as usize;
        let page = matching
            .into_iter()
            .skip(skip)
            .take(filter.page_size as usize)
            .collect();

        Ok((page, total))
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        Ok(self.rows.lock().remove(&id).is_some())
    }
}

/// User and token repository held in memory.
#[derive(Default)]
pub struct MemoryUsers {
    users: Mutex<BTreeMap<i64, User>>,
    tokens: Mutex<Vec<Token>>,
}

impl MemoryUsers {
    pub fn with(users: Vec<User>) -> Self {
        Self {
            users: Mutex::new(users.into_iter().map(|u| (u.id, u)).collect()),
            tokens: Mutex::new(Vec::new()),
        }
    }

    pub fn get(&self, id: i64) -> Option<User> {
        self.users.lock().get(&id).cloned()
    }

    pub fn token_count(&self, user_id: i64, scope: TokenScope) -> usize {
        self.tokens
            .lock()
            .iter()
            .filter(|t| t.user_id == user_id && t.scope == scope)
            .count()
    }

    fn email_taken(users: &BTreeMap<i64, User>, email: &str, except: Option<i64>) -> bool {
        users
            .values()
            .any(|u| Some(u.id) != except && u.email.eq_ignore_ascii_case(email))
    }
}

#[async_trait]
impl VersionedStore<User> for MemoryUsers {
    async fn fetch(&self, id: i64) -> Result<Option<User>, StoreError> {
        Ok(self.get(id))
    }

    async fn write_if_version(&self, user: &User) -> Result<WriteOutcome, StoreError> {
        let mut users = self.users.lock();
        if Self::email_taken(&users, &user.email, Some(user.id)) {
            return Err(StoreError::DuplicateEmail);
        }

        match users.get_mut(&user.id) {
            Some(stored) if stored.version == user.version => {
                let version = stored.version + 1;
                *stored = User {
                    version,
                    created_at: stored.created_at,
                    ..user.clone()
                };
                Ok(WriteOutcome::Applied(version))
            }
            _ => Ok(WriteOutcome::NoMatch),
        }
    }
}

#[async_trait]
impl UserRepo for MemoryUsers {
    async fn insert(&self, user: &NewUser) -> Result<User, StoreError> {
        let mut users = self.users.lock();
        if Self::email_taken(&users, &user.email, None) {
            return Err(StoreError::DuplicateEmail);
        }

        let id = users.keys().next_back().map_or(1, |last| last + 1);
        let user = User {
            id,
            name: user.name.clone(),
            email: user.email.clone(),
            password_hash: user.password_hash.clone(),
            activated: false,
            version: 1,
            created_at: Utc::now(),
        };
        users.insert(id, user.clone());
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .users
            .lock()
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_for_token(
        &self,
        scope: TokenScope,
        hash: &[u8],
    ) -> Result<Option<User>, StoreError> {
        let now = Utc::now();
        let owner = self
            .tokens
            .lock()
            .iter()
            .find(|t| t.hash.as_slice() == hash && t.scope == scope && t.expiry > now)
            .map(|t| t.user_id);

        Ok(owner.and_then(|id| self.get(id)))
    }
}

#[async_trait]
impl TokenRepo for MemoryUsers {
    async fn insert(&self, token: &Token) -> Result<(), StoreError> {
        self.tokens.lock().push(token.clone());
        Ok(())
    }

    async fn delete_all_for_user(
        &self,
        scope: TokenScope,
        user_id: i64,
    ) -> Result<u64, StoreError> {
        let mut tokens = self.tokens.lock();
        let before = tokens.len();
        tokens.retain(|t| !(t.user_id == user_id && t.scope == scope));
        Ok((before - tokens.len()) as u64)
    }
}

/// Builder for constructing test `AppState` with custom collaborators.
///
/// Uses default (empty) mocks for anything not explicitly set, so an
/// unexpected call fails the test.
#[derive(Default)]
pub struct TestStateBuilder {
    movies: Option<Arc<dyn MovieRepo>>,
    users: Option<Arc<dyn UserRepo>>,
    tokens: Option<Arc<dyn TokenRepo>>,
    status: Option<Arc<dyn StatusRepo>>,
    email: Option<Arc<dyn EmailSender>>,
}

impl TestStateBuilder {
    /// Creates a new builder with nothing configured.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_movie_repo(mut self, repo: impl MovieRepo + 'static) -> Self {
        self.movies = Some(Arc::new(repo));
        self
    }

    /// Serves movies from a store the test keeps a handle on.
    pub fn with_memory_movies(mut self, store: Arc<MemoryMovies>) -> Self {
        self.movies = Some(store);
        self
    }

    pub fn with_user_repo(mut self, repo: impl UserRepo + 'static) -> Self {
        self.users = Some(Arc::new(repo));
        self
    }

    pub fn with_token_repo(mut self, repo: impl TokenRepo + 'static) -> Self {
        self.tokens = Some(Arc::new(repo));
        self
    }

    /// Serves both users and tokens from one in-memory store.
    pub fn with_memory_users(mut self, store: Arc<MemoryUsers>) -> Self {
        self.users = Some(store.clone());
        self.tokens = Some(store);
        self
    }

    pub fn with_status_repo(mut self, repo: MockStatusRepo) -> Self {
        self.status = Some(Arc::new(repo));
        self
    }

    pub fn with_email_sender(mut self, sender: impl EmailSender + 'static) -> Self {
        self.email = Some(Arc::new(sender));
        self
    }

    /// Builds the `AppState` using configured collaborators or defaults.
    pub fn build(self) -> AppState {
        let repos = Repos {
            movies: self
                .movies
                .unwrap_or_else(|| Arc::new(MockMovieRepo::new())),
            users: self.users.unwrap_or_else(|| Arc::new(MockUserRepo::new())),
            tokens: self
                .tokens
                .unwrap_or_else(|| Arc::new(MockTokenRepo::new())),
            status: self
                .status
                .unwrap_or_else(|| Arc::new(MockStatusRepo::new())),
        };

        AppState {
            config: test_config(),
            repos,
            email: self
                .email
                .unwrap_or_else(|| Arc::new(MockEmailSender::new())),
            tasks: TaskTracker::new(),
        }
    }
}

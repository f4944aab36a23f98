//! Movie repository for PostgreSQL.

use async_trait::async_trait;
use shared::api::MoviePayload;
use sqlx::{Pool, Postgres, Row};

use super::{StoreError, with_deadline};
use crate::{
    models::Movie,
    occ::{VersionedStore, WriteOutcome},
};

/// Columns a movie listing can be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortColumn {
    Id,
    Title,
    Year,
    Runtime,
}

impl SortColumn {
    fn as_sql(self) -> &'static str {
        match self {
            SortColumn::Id => "id",
            SortColumn::Title => "title",
            SortColumn::Year => "year",
            SortColumn::Runtime => "runtime",
        }
    }
}

/// Ordering for a movie listing, parsed from the `sort` query parameter
/// (`title`, `-year`, ...). Only safelisted columns parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sort {
    pub column: SortColumn,
    pub descending: bool,
}

impl Default for Sort {
    fn default() -> Self {
        Self {
            column: SortColumn::Id,
            descending: false,
        }
    }
}

impl std::str::FromStr for Sort {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (descending, name) = match s.strip_prefix('-') {
            Some(name) => (true, name),
            None => (false, s),
        };
        let column = match name {
            "id" => SortColumn::Id,
            "title" => SortColumn::Title,
            "year" => SortColumn::Year,
            "runtime" => SortColumn::Runtime,
            _ => return Err(()),
        };
        Ok(Self { column, descending })
    }
}

impl Sort {
    /// ORDER BY clause body. `id` breaks ties so pages are stable.
    fn order_by(self) -> String {
        let direction = if self.descending { "DESC" } else { "ASC" };
        format!("{} {}, id ASC", self.column.as_sql(), direction)
    }
}

/// Filters and pagination for listing movies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovieFilter {
    /// Full-text match against the title; empty matches everything.
    pub title: String,
    /// Movies must carry all of these genres.
    pub genres: Vec<String>,
    pub page: u32,
    pub page_size: u32,
    pub sort: Sort,
}

impl MovieFilter {
    fn limit(&self) -> i64 {
        i64::from(self.page_size)
    }

    fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.page_size)
    }
}

/// Repository for movie operations. Updates go through [`VersionedStore`].
#[async_trait]
pub trait MovieRepo: VersionedStore<Movie> {
    /// Insert a movie; the store assigns id, version 1, and created_at.
    async fn insert(&self, movie: &MoviePayload) -> Result<Movie, StoreError>;

    /// One page of matching movies plus the total match count.
    async fn list(&self, filter: &MovieFilter) -> Result<(Vec<Movie>, u64), StoreError>;

    /// Delete a movie. Returns false if no such movie existed.
    async fn delete(&self, id: i64) -> Result<bool, StoreError>;
}

#[cfg(test)]
mockall::mock! {
    pub MovieRepo {}

    #[async_trait]
    impl VersionedStore<Movie> for MovieRepo {
        async fn fetch(&self, id: i64) -> Result<Option<Movie>, StoreError>;
        async fn write_if_version(&self, record: &Movie) -> Result<WriteOutcome, StoreError>;
    }

    #[async_trait]
    impl MovieRepo for MovieRepo {
        async fn insert(&self, movie: &MoviePayload) -> Result<Movie, StoreError>;
        async fn list(&self, filter: &MovieFilter) -> Result<(Vec<Movie>, u64), StoreError>;
        async fn delete(&self, id: i64) -> Result<bool, StoreError>;
    }
}

/// PostgreSQL implementation of MovieRepo.
#[derive(Clone)]
pub struct PgMovieRepo {
    pool: Pool<Postgres>,
}

impl PgMovieRepo {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VersionedStore<Movie> for PgMovieRepo {
    async fn fetch(&self, id: i64) -> Result<Option<Movie>, StoreError> {
        if id < 1 {
            return Ok(None);
        }
        with_deadline(
            sqlx::query_as::<_, Movie>(
                "SELECT id, title, year, runtime, genres, version, created_at
                 FROM movies WHERE id = $1",
            )
            .bind(id)
            .fetch_optional(&self.pool),
        )
        .await
    }

    async fn write_if_version(&self, movie: &Movie) -> Result<WriteOutcome, StoreError> {
        let version = with_deadline(
            sqlx::query_scalar::<_, i32>(
                "UPDATE movies
                 SET title = $1, year = $2, runtime = $3, genres = $4, version = version + 1
                 WHERE id = $5 AND version = $6
                 RETURNING version",
            )
            .bind(&movie.title)
            .bind(movie.year)
            .bind(movie.runtime)
            .bind(&movie.genres)
            .bind(movie.id)
            .bind(movie.version)
            .fetch_optional(&self.pool),
        )
        .await?;

        Ok(version.map_or(WriteOutcome::NoMatch, WriteOutcome::Applied))
    }
}

#[async_trait]
impl MovieRepo for PgMovieRepo {
    async fn insert(&self, movie: &MoviePayload) -> Result<Movie, StoreError> {
        with_deadline(
            sqlx::query_as::<_, Movie>(
                "INSERT INTO movies (title, year, runtime, genres)
                 VALUES ($1, $2, $3, $4)
                 RETURNING id, title, year, runtime, genres, version, created_at",
            )
            .bind(&movie.title)
            .bind(movie.year)
            .bind(movie.runtime.0)
            .bind(&movie.genres)
            .fetch_one(&self.pool),
        )
        .await
    }

    async fn list(&self, filter: &MovieFilter) -> Result<(Vec<Movie>, u64), StoreError> {
        // The ORDER BY body comes from a closed set of columns, never from
        // client text.
        let sql = format!(
            "SELECT count(*) OVER() AS total, id, title, year, runtime, genres, version, created_at
             FROM movies
             WHERE (to_tsvector('simple', title) @@ plainto_tsquery('simple', $1) OR $1 = '')
             AND (genres @> $2 OR $2 = '{{}}')
             ORDER BY {}
             LIMIT $3 OFFSET $4",
            filter.sort.order_by()
        );

        let rows = with_deadline(
            sqlx::query(&sql)
                .bind(&filter.title)
                .bind(&filter.genres)
                .bind(filter.limit())
                .bind(filter.offset())
                .fetch_all(&self.pool),
        )
        .await?;

        let mut total = 0u64;
        let mut movies = Vec::with_capacity(rows.len());
        for row in &rows {
            total = row.try_get::<i64, _>("total")? as u64;
            movies.push(Movie {
                id: row.try_get("id")?,
                title: row.try_get("title")?,
                year: row.try_get("year")?,
                runtime: row.try_get("runtime")?,
                genres: row.try_get("genres")?,
                version: row.try_get("version")?,
                created_at: row.try_get("created_at")?,
            });
        }

        Ok((movies, total))
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        if id < 1 {
            return Ok(false);
        }
        let result = with_deadline(
            sqlx::query("DELETE FROM movies WHERE id = $1")
                .bind(id)
                .execute(&self.pool),
        )
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

//! Movie catalogue.
//!
//! Reads are public. Writes require an activated user.
//!
//! Updates are optimistic: the handler reads the movie, merges the patch,
//! re-validates the result and writes it back only if nobody else wrote in
//! between. A client may send the version it last saw in
//! `X-Expected-Version` to fail fast when its copy is already stale.
//!
//! Endpoints:
//! - GET /v1/movies - List movies (filters, sorting, pagination)
//! - POST /v1/movies - Create a movie
//! - GET /v1/movies/{id} - Show a movie
//! - PATCH /v1/movies/{id} - Partially update a movie
//! - DELETE /v1/movies/{id} - Delete a movie

use axum::{
    Json, Router, debug_handler,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header::LOCATION},
    response::IntoResponse,
    routing::get,
};
use chrono::{Datelike, Utc};
use garde::Validate;
use serde::Deserialize;
use shared::api::{
    MessageResponse, Metadata, MovieListResponse, MoviePayload, MovieResponse, UpdateMoviePayload,
};

use crate::{
    error::AppError,
    extract::AppJson,
    middleware::auth::ActivatedUser,
    models::Movie,
    occ::ConditionalUpdater,
    repos::{MovieFilter, Sort},
    state::AppState,
};

/// Request header carrying the version a client expects to overwrite.
pub const EXPECTED_VERSION_HEADER: &str = "x-expected-version";

const DEFAULT_PAGE_SIZE: u32 = 20;
const MAX_PAGE: u32 = 10_000_000;
const MAX_PAGE_SIZE: u32 = 100;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/movies", get(list_movies).post(create_movie))
        .route(
            "/v1/movies/{id}",
            get(show_movie).patch(update_movie).delete(delete_movie),
        )
}

/// Ids that are not positive integers name no movie.
fn parse_id(raw: &str) -> Result<i64, AppError> {
    match raw.parse::<i64>() {
        Ok(id) if id >= 1 => Ok(id),
        _ => Err(AppError::not_found()),
    }
}

fn current_year() -> i32 {
    Utc::now().year()
}

/// Reads the optional `X-Expected-Version` precondition.
fn expected_version(headers: &HeaderMap) -> Result<Option<i32>, AppError> {
    let Some(value) = headers.get(EXPECTED_VERSION_HEADER) else {
        return Ok(None);
    };

    value
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse::<i32>().ok())
        .map(Some)
        .ok_or(AppError::External(
            StatusCode::BAD_REQUEST,
            "X-Expected-Version must be an integer",
        ))
}

/// Raw query string parameters for the list endpoint.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ListMoviesQuery {
    title: Option<String>,
    genres: Option<String>,
    page: Option<String>,
    page_size: Option<String>,
    sort: Option<String>,
}

impl ListMoviesQuery {
    fn into_filter(self) -> Result<MovieFilter, AppError> {
        let page = parse_bounded("page", self.page.as_deref(), 1, 1, MAX_PAGE)?;
        let page_size = parse_bounded(
            "page_size",
            self.page_size.as_deref(),
            DEFAULT_PAGE_SIZE,
            1,
            MAX_PAGE_SIZE,
        )?;

        let sort = match self.sort.as_deref() {
            None | Some("") => Sort::default(),
            Some(raw) => raw
                .parse()
                .map_err(|_| AppError::Validation("sort: invalid sort value".into()))?,
        };

        let genres = self
            .genres
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .map(str::to_string)
            .collect();

        Ok(MovieFilter {
            title: self.title.unwrap_or_default(),
            genres,
            page,
            page_size,
            sort,
        })
    }
}

fn parse_bounded(
    name: &str,
    raw: Option<&str>,
    default: u32,
    min: u32,
    max: u32,
) -> Result<u32, AppError> {
    let Some(raw) = raw.filter(|r| !r.is_empty()) else {
        return Ok(default);
    };
    let value: u32 = raw
        .parse()
        .map_err(|_| AppError::Validation(format!("{name}: must be an integer value")))?;
    if !(min..=max).contains(&value) {
        return Err(AppError::Validation(format!(
            "{name}: must be between {min} and {max}"
        )));
    }
    Ok(value)
}

#[debug_handler]
async fn list_movies(
    State(state): State<AppState>,
    Query(query): Query<ListMoviesQuery>,
) -> Result<impl IntoResponse, AppError> {
    let filter = query.into_filter()?;

    let (movies, total) = state
        .repos
        .movies
        .list(&filter)
        .await
        .map_err(AppError::from_store)?;

    Ok(Json(MovieListResponse {
        metadata: Metadata::calculate(total, filter.page, filter.page_size),
        movies: movies.iter().map(Movie::view).collect(),
    }))
}

#[debug_handler]
async fn create_movie(
    ActivatedUser(user): ActivatedUser,
    State(state): State<AppState>,
    AppJson(payload): AppJson<MoviePayload>,
) -> Result<impl IntoResponse, AppError> {
    payload
        .validate_with(&current_year())
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let movie = state
        .repos
        .movies
        .insert(&payload)
        .await
        .map_err(AppError::from_store)?;

    tracing::info!(user_id = user.id, movie_id = movie.id, "movie created");

    let location = HeaderValue::try_from(format!("/v1/movies/{}", movie.id))?;

    Ok((
        StatusCode::CREATED,
        [(LOCATION, location)],
        Json(MovieResponse {
            movie: movie.view(),
        }),
    ))
}

#[debug_handler]
async fn show_movie(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id)?;

    let movie = state
        .repos
        .movies
        .fetch(id)
        .await
        .map_err(AppError::from_store)?
        .ok_or_else(AppError::not_found)?;

    Ok(Json(MovieResponse {
        movie: movie.view(),
    }))
}

#[debug_handler]
async fn update_movie(
    ActivatedUser(user): ActivatedUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    AppJson(patch): AppJson<UpdateMoviePayload>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id)?;
    let precondition = expected_version(&headers)?;
    let year = current_year();

    let movie = ConditionalUpdater::new(state.repos.movies.as_ref())
        .apply(id, precondition, move |movie: &mut Movie| {
            movie.merge(patch);
            movie
                .fields()
                .validate_with(&year)
                .map_err(|e| e.to_string())
        })
        .await
        .map_err(AppError::from_update)?;

    tracing::info!(
        user_id = user.id,
        movie_id = movie.id,
        version = movie.version,
        "movie updated"
    );

    Ok(Json(MovieResponse {
        movie: movie.view(),
    }))
}

#[debug_handler]
async fn delete_movie(
    ActivatedUser(user): ActivatedUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id)?;

    let deleted = state
        .repos
        .movies
        .delete(id)
        .await
        .map_err(AppError::from_store)?;

    if !deleted {
        return Err(AppError::not_found());
    }

    tracing::info!(user_id = user.id, movie_id = id, "movie deleted");

    Ok(Json(MessageResponse {
        message: "movie successfully deleted".to_string(),
    }))
}

use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::constants::DEFAULT_PAGE_SIZE;
use crate::error::{AppError, Result};
use crate::models::filters::{validate_filters, MOVIE_SORT_SAFELIST};
use crate::models::movies::validate_movie;
use crate::models::{CurrentUser, Filters, Movie, Runtime};
use crate::routes::extract::{parse_id, read_csv, read_int, read_string, JsonBody};
use crate::validator::Validator;
use crate::AppState;

/// Header a client can send to make an update conditional on a version
pub const EXPECTED_VERSION_HEADER: &str = "X-Expected-Version";

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CreateMovieRequest {
    pub title: String,
    pub year: i32,
    pub runtime: Runtime,
    pub genres: Vec<String>,
}

/// Partial update; absent fields keep their stored value
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UpdateMovieRequest {
    pub title: Option<String>,
    pub year: Option<i32>,
    pub runtime: Option<Runtime>,
    pub genres: Option<Vec<String>>,
}

fn user_id(current: &CurrentUser) -> i64 {
    current.user().map_or(0, |u| u.id)
}

/// POST /v1/movies
pub async fn create_movie(
    State(state): State<AppState>,
    current: CurrentUser,
    JsonBody(input): JsonBody<CreateMovieRequest>,
) -> Result<impl IntoResponse> {
    let mut movie = Movie::new(input.title, input.year, input.runtime, input.genres);

    let mut v = Validator::new();
    validate_movie(&mut v, &movie);
    if !v.valid() {
        return Err(AppError::FailedValidation(v.into_errors()));
    }

    state.models.movies.insert(&mut movie).await?;
    tracing::info!("Movie {} created by user {}", movie.id, user_id(&current));

    let location = format!("/v1/movies/{}", movie.id);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(json!({ "movie": movie })),
    ))
}

/// GET /v1/movies/:id
pub async fn show_movie(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let movie = state.models.movies.get(parse_id(&id)?).await?;
    Ok(Json(json!({ "movie": movie })))
}

/// PATCH /v1/movies/:id
///
/// Read-modify-write without locks: the store rejects the write with an
/// edit conflict if another update landed in between.
pub async fn update_movie(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
    headers: HeaderMap,
    JsonBody(input): JsonBody<UpdateMovieRequest>,
) -> Result<Json<Value>> {
    let mut movie = state.models.movies.get(parse_id(&id)?).await?;

    if let Some(expected) = headers.get(EXPECTED_VERSION_HEADER) {
        if expected.to_str().ok() != Some(movie.version.to_string().as_str()) {
            return Err(AppError::EditConflict);
        }
    }

    if let Some(title) = input.title {
        movie.title = title;
    }
    if let Some(year) = input.year {
        movie.year = year;
    }
    if let Some(runtime) = input.runtime {
        movie.runtime = runtime;
    }
    if let Some(genres) = input.genres {
        movie.genres = genres;
    }

    let mut v = Validator::new();
    validate_movie(&mut v, &movie);
    if !v.valid() {
        return Err(AppError::FailedValidation(v.into_errors()));
    }

    state.models.movies.update(&mut movie).await?;
    tracing::info!(
        "Movie {} updated to version {} by user {}",
        movie.id,
        movie.version,
        user_id(&current)
    );

    Ok(Json(json!({ "movie": movie })))
}

/// DELETE /v1/movies/:id
pub async fn delete_movie(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let id = parse_id(&id)?;
    state.models.movies.delete(id).await?;
    tracing::info!("Movie {} deleted by user {}", id, user_id(&current));

    Ok(Json(json!({ "message": "movie successfully deleted" })))
}

/// GET /v1/movies?title=&genres=&page=&page_size=&sort=
pub async fn list_movies(
    State(state): State<AppState>,
    Query(qs): Query<HashMap<String, String>>,
) -> Result<Json<Value>> {
    let mut v = Validator::new();

    let title = read_string(&qs, "title", "");
    let genres = read_csv(&qs, "genres", Vec::new());
    let filters = Filters {
        page: read_int(&qs, "page", 1, &mut v),
        page_size: read_int(&qs, "page_size", DEFAULT_PAGE_SIZE, &mut v),
        sort: read_string(&qs, "sort", "id"),
        sort_safelist: MOVIE_SORT_SAFELIST,
    };

    validate_filters(&mut v, &filters);
    if !v.valid() {
        return Err(AppError::FailedValidation(v.into_errors()));
    }

    let (movies, metadata) = state.models.movies.get_all(&title, &genres, &filters).await?;

    Ok(Json(json!({ "movies": movies, "metadata": metadata })))
}

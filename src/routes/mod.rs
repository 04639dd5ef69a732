pub mod extract;
pub mod health;
pub mod movies;
pub mod tokens;
pub mod users;

use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, patch, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer, cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer,
};

use crate::constants::MAX_BODY_BYTES;
use crate::error::AppError;
use crate::observability::{render_metrics, track_metrics};
use crate::middleware::{
    authenticate, handle_panic, rate_limit, render_framework_errors, require_movies_read,
    require_movies_write,
};
use crate::AppState;

pub use health::health_check;
pub use movies::{create_movie, delete_movie, list_movies, show_movie, update_movie};
pub use tokens::create_authentication_token;
pub use users::{activate_user, register_user};

/// CORS for the configured trusted origins; no origins means no CORS headers
fn cors_layer(trusted_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = trusted_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::OPTIONS,
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

async fn not_found() -> AppError {
    AppError::NotFound
}

/// Build the application router with the full middleware chain
///
/// Outermost first: metrics, panic recovery, tracing, JSON rendering of
/// framework errors, request timeout, CORS, rate limiting, authentication.
/// Movie routes additionally pass a permission gate.
pub fn router(state: AppState) -> Router {
    let read = from_fn_with_state(state.clone(), require_movies_read);
    let write = from_fn_with_state(state.clone(), require_movies_write);

    Router::new()
        .route("/v1/healthcheck", get(health_check))
        .route("/debug/vars", get(render_metrics))
        .route(
            "/v1/movies",
            get(list_movies)
                .route_layer(read.clone())
                .merge(post(create_movie).route_layer(write.clone())),
        )
        .route(
            "/v1/movies/:id",
            get(show_movie).route_layer(read).merge(
                patch(update_movie)
                    .delete(delete_movie)
                    .route_layer(write),
            ),
        )
        .route("/v1/users", post(register_user))
        .route("/v1/users/activated", put(activate_user))
        .route(
            "/v1/tokens/authentication",
            post(create_authentication_token),
        )
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(
            ServiceBuilder::new()
                .layer(from_fn(track_metrics))
                .layer(CatchPanicLayer::custom(handle_panic))
                .layer(TraceLayer::new_for_http())
                .layer(from_fn(render_framework_errors))
                .layer(TimeoutLayer::new(Duration::from_secs(
                    state.config.request_timeout_secs,
                )))
                .layer(cors_layer(&state.config.cors_trusted_origins))
                .layer(from_fn_with_state(state.clone(), rate_limit))
                .layer(from_fn_with_state(state.clone(), authenticate)),
        )
        .with_state(state)
}

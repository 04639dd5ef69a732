use axum::{extract::State, http::StatusCode, Json};
use chrono::Duration;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::constants::AUTHENTICATION_TOKEN_TTL_HOURS;
use crate::db::StoreError;
use crate::error::{AppError, Result};
use crate::models::users::{password_matches, validate_email, validate_password_plaintext};
use crate::models::Scope;
use crate::routes::extract::JsonBody;
use crate::validator::Validator;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CreateTokenRequest {
    pub email: String,
    pub password: String,
}

/// Exchange email and password for a bearer token
///
/// Unknown emails and wrong passwords get the same response.
///
/// POST /v1/tokens/authentication
pub async fn create_authentication_token(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<CreateTokenRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    let mut v = Validator::new();
    validate_email(&mut v, &input.email);
    validate_password_plaintext(&mut v, &input.password);
    if !v.valid() {
        return Err(AppError::FailedValidation(v.into_errors()));
    }

    let user = match state.models.users.get_by_email(&input.email).await {
        Ok(user) => user,
        Err(StoreError::NotFound) => return Err(AppError::InvalidCredentials),
        Err(e) => return Err(e.into()),
    };

    let hash = user.password_hash.clone();
    let password = input.password;
    let matches = tokio::task::spawn_blocking(move || password_matches(&hash, &password)).await??;
    if !matches {
        tracing::debug!("Password mismatch for user {}", user.id);
        return Err(AppError::InvalidCredentials);
    }

    let token = state
        .models
        .tokens
        .new_token(
            user.id,
            Duration::hours(AUTHENTICATION_TOKEN_TTL_HOURS),
            Scope::Authentication,
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "authentication_token": token })),
    ))
}

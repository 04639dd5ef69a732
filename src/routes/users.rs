use axum::{extract::State, http::StatusCode, Json};
use chrono::Duration;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::constants::{ACTIVATION_TOKEN_TTL_HOURS, ERR_INVALID_ACTIVATION_TOKEN};
use crate::db::StoreError;
use crate::error::{AppError, Result};
use crate::models::permissions::MOVIES_READ;
use crate::models::tokens::validate_token_plaintext;
use crate::models::users::{hash_password, validate_password_plaintext, validate_user};
use crate::models::{Scope, User};
use crate::routes::extract::JsonBody;
use crate::validator::Validator;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ActivateRequest {
    pub token: String,
}

/// Register a new user
///
/// The account starts inactive with `movies:read`. An activation token is
/// handed to the mailer in the background so the response doesn't wait on
/// delivery.
///
/// POST /v1/users
pub async fn register_user(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<RegisterRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    let mut v = Validator::new();
    validate_password_plaintext(&mut v, &input.password);
    let mut user = User::new(input.name, input.email, String::new());
    validate_user(&mut v, &user);
    if !v.valid() {
        return Err(AppError::FailedValidation(v.into_errors()));
    }

    let password = input.password;
    user.password_hash = tokio::task::spawn_blocking(move || hash_password(&password)).await??;

    state.models.users.insert(&mut user).await?;
    state
        .models
        .permissions
        .add_for_user(user.id, &[MOVIES_READ])
        .await?;

    let token = state
        .models
        .tokens
        .new_token(
            user.id,
            Duration::hours(ACTIVATION_TOKEN_TTL_HOURS),
            Scope::Activation,
        )
        .await?;

    let mailer = state.mailer.clone();
    let recipient = user.clone();
    tokio::spawn(async move {
        if let Err(e) = mailer.send_welcome(&recipient, &token).await {
            tracing::error!("Failed to send welcome message to user {}: {:?}", recipient.id, e);
        }
    });

    tracing::info!("New user {} registered", user.id);

    Ok((StatusCode::ACCEPTED, Json(json!({ "user": user }))))
}

/// Activate an account with the token from the welcome message
///
/// PUT /v1/users/activated
pub async fn activate_user(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<ActivateRequest>,
) -> Result<Json<Value>> {
    let mut v = Validator::new();
    validate_token_plaintext(&mut v, &input.token);
    if !v.valid() {
        return Err(AppError::FailedValidation(v.into_errors()));
    }

    let mut user = match state
        .models
        .tokens
        .get_for_token(Scope::Activation, &input.token)
        .await
    {
        Ok(user) => user,
        Err(StoreError::NotFound) => {
            return Err(AppError::field("token", ERR_INVALID_ACTIVATION_TOKEN))
        }
        Err(e) => return Err(e.into()),
    };

    user.activated = true;
    state.models.users.update(&mut user).await?;

    state
        .models
        .tokens
        .delete_all_for_user(Scope::Activation, user.id)
        .await?;

    tracing::info!("User {} activated", user.id);

    Ok(Json(json!({ "user": user })))
}

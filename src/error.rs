use axum::{
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;

use crate::db::StoreError;
use crate::validator::FieldErrors;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation failed: {0:?}")]
    FailedValidation(FieldErrors),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Record not found")]
    NotFound,

    #[error("Edit conflict")]
    EditConflict,

    #[error("Method {0} not allowed")]
    MethodNotAllowed(Method),

    #[error("Request timed out")]
    RequestTimeout,

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid authentication token")]
    InvalidAuthenticationToken,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Authentication required")]
    AuthenticationRequired,

    #[error("Inactive account")]
    InactiveAccount,

    #[error("Not permitted")]
    NotPermitted,

    #[error("Persistence error: {0}")]
    Persistence(StoreError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// A validation failure on a single field
    pub fn field(key: &str, message: &str) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(key.to_string(), message.to_string());
        AppError::FailedValidation(errors)
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => AppError::NotFound,
            StoreError::EditConflict => AppError::EditConflict,
            StoreError::InvalidSort => AppError::field("sort", "invalid sort value"),
            StoreError::DuplicateEmail => {
                AppError::field("email", "a user with this email address already exists")
            }
            other => AppError::Persistence(other),
        }
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Internal(anyhow::Error::new(err))
    }
}

const SERVER_ERROR_MESSAGE: &str =
    "the server encountered a problem and could not process your request";

/// Implement IntoResponse to convert AppError into HTTP responses
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error): (StatusCode, Value) = match self {
            AppError::FailedValidation(errors) => (StatusCode::UNPROCESSABLE_ENTITY, json!(errors)),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!(msg)),
            AppError::NotFound => (
                StatusCode::NOT_FOUND,
                json!("the requested resource could not be found"),
            ),
            AppError::EditConflict => (
                StatusCode::CONFLICT,
                json!("unable to update the record due to an edit conflict, please try again"),
            ),
            AppError::MethodNotAllowed(method) => (
                StatusCode::METHOD_NOT_ALLOWED,
                json!(format!("the {method} method is not supported for this resource")),
            ),
            AppError::RequestTimeout => (
                StatusCode::REQUEST_TIMEOUT,
                json!("the request took too long to process"),
            ),
            AppError::RateLimitExceeded => {
                (StatusCode::TOO_MANY_REQUESTS, json!("rate limit exceeded"))
            }
            AppError::InvalidAuthenticationToken => {
                let body = Json(json!({ "error": "invalid or missing authentication token" }));
                let mut response = (StatusCode::UNAUTHORIZED, body).into_response();
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
                return response;
            }
            AppError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                json!("invalid authentication credentials"),
            ),
            AppError::AuthenticationRequired => (
                StatusCode::UNAUTHORIZED,
                json!("you must be authenticated to access this resource"),
            ),
            AppError::InactiveAccount => (
                StatusCode::FORBIDDEN,
                json!("your user account must be activated to access this resource"),
            ),
            AppError::NotPermitted => (
                StatusCode::FORBIDDEN,
                json!("your user account doesn't have the necessary permissions to access this resource"),
            ),
            AppError::Persistence(ref e) => {
                tracing::error!("Persistence error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, json!(SERVER_ERROR_MESSAGE))
            }
            AppError::Internal(ref e) => {
                tracing::error!("Internal error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, json!(SERVER_ERROR_MESSAGE))
            }
        };

        (status, Json(json!({ "error": error }))).into_response()
    }
}

/// Result type alias for application results
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_are_classified() {
        assert!(matches!(AppError::from(StoreError::NotFound), AppError::NotFound));
        assert!(matches!(AppError::from(StoreError::EditConflict), AppError::EditConflict));
        assert!(matches!(
            AppError::from(StoreError::Timeout),
            AppError::Persistence(StoreError::Timeout)
        ));
        match AppError::from(StoreError::InvalidSort) {
            AppError::FailedValidation(errors) => assert_eq!(errors["sort"], "invalid sort value"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_status_codes() {
        let cases = [
            (AppError::field("title", "must be provided"), StatusCode::UNPROCESSABLE_ENTITY),
            (AppError::BadRequest("bad".into()), StatusCode::BAD_REQUEST),
            (AppError::NotFound, StatusCode::NOT_FOUND),
            (AppError::EditConflict, StatusCode::CONFLICT),
            (AppError::MethodNotAllowed(Method::PUT), StatusCode::METHOD_NOT_ALLOWED),
            (AppError::RequestTimeout, StatusCode::REQUEST_TIMEOUT),
            (AppError::RateLimitExceeded, StatusCode::TOO_MANY_REQUESTS),
            (AppError::InvalidAuthenticationToken, StatusCode::UNAUTHORIZED),
            (AppError::AuthenticationRequired, StatusCode::UNAUTHORIZED),
            (AppError::InactiveAccount, StatusCode::FORBIDDEN),
            (AppError::NotPermitted, StatusCode::FORBIDDEN),
            (AppError::Persistence(StoreError::Timeout), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }

    #[test]
    fn test_invalid_token_sets_www_authenticate() {
        let response = AppError::InvalidAuthenticationToken.into_response();
        assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");
    }
}

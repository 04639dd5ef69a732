//! Request gating: rate limiting, authentication and authorization
//!
//! Stages run outermost first: panic isolation, rate limit, authenticate,
//! then the per-route permission gate. Each stage either answers the
//! request itself or forwards it unchanged to the next one.

use std::any::Any;
use std::net::SocketAddr;

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::db::StoreError;
use crate::error::{AppError, Result};
use crate::models::permissions::{MOVIES_READ, MOVIES_WRITE};
use crate::models::tokens::validate_token_plaintext;
use crate::models::{CurrentUser, Scope, User};
use crate::validator::Validator;
use crate::AppState;

// =============================================================================
// Panic isolation
// =============================================================================

/// Turn a panic in a handler into a 500 that closes the connection
///
/// The connection state can't be trusted after a panic, so it must not be
/// reused for keep-alive.
pub fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };

    let mut response =
        AppError::Internal(anyhow::anyhow!("handler panicked: {detail}")).into_response();
    response
        .headers_mut()
        .insert(header::CONNECTION, HeaderValue::from_static("close"));
    response
}

// =============================================================================
// Framework responses
// =============================================================================

/// Give the router's bare 405 and the timeout layer's bare 408 our JSON body
///
/// Handlers never produce these statuses themselves.
pub async fn render_framework_errors(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let response = next.run(request).await;

    match response.status() {
        StatusCode::METHOD_NOT_ALLOWED => {
            let allow = response.headers().get(header::ALLOW).cloned();
            let mut rendered = AppError::MethodNotAllowed(method).into_response();
            if let Some(allow) = allow {
                rendered.headers_mut().insert(header::ALLOW, allow);
            }
            rendered
        }
        StatusCode::REQUEST_TIMEOUT => AppError::RequestTimeout.into_response(),
        _ => response,
    }
}

// =============================================================================
// Rate limiting
// =============================================================================

/// Reject clients that have used up their request budget
///
/// Skipped entirely when the limiter is disabled.
pub async fn rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response> {
    if state.limiter.enabled() {
        let ip = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("client address unavailable")))?;

        if !state.limiter.allow(ip) {
            tracing::debug!("Rate limit exceeded for {}", ip);
            return Err(AppError::RateLimitExceeded);
        }
    }

    Ok(next.run(request).await)
}

// =============================================================================
// Authentication
// =============================================================================

/// Resolve the `Authorization` header into a [`CurrentUser`]
///
/// No header means an anonymous request. A header that is present must be
/// `Bearer <token>` with a live authentication token.
pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let resolved = resolve_user(&state, request.headers()).await;
    let mut response = match resolved {
        Ok(current) => {
            request.extensions_mut().insert(current);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    };

    response
        .headers_mut()
        .append(header::VARY, HeaderValue::from_static("Authorization"));
    response
}

async fn resolve_user(state: &AppState, headers: &HeaderMap) -> Result<CurrentUser> {
    let header_value = match headers.get(header::AUTHORIZATION) {
        Some(value) if !value.is_empty() => value,
        _ => return Ok(CurrentUser::Anonymous),
    };

    let token = header_value
        .to_str()
        .ok()
        .and_then(parse_bearer)
        .ok_or(AppError::InvalidAuthenticationToken)?;

    let mut v = Validator::new();
    validate_token_plaintext(&mut v, token);
    if !v.valid() {
        return Err(AppError::InvalidAuthenticationToken);
    }

    match state
        .models
        .tokens
        .get_for_token(Scope::Authentication, token)
        .await
    {
        Ok(user) => Ok(CurrentUser::Authenticated(user)),
        Err(StoreError::NotFound) => Err(AppError::InvalidAuthenticationToken),
        Err(e) => Err(AppError::Persistence(e)),
    }
}

/// Extract the token from `Bearer <token>`
fn parse_bearer(value: &str) -> Option<&str> {
    let parts: Vec<&str> = value.split(' ').collect();
    match parts.as_slice() {
        ["Bearer", token] => Some(*token),
        _ => None,
    }
}

/// The identity set by [`authenticate`]
///
/// Missing identity means the handler was mounted outside the
/// authentication stage, which is a server bug.
#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("missing user in request extensions")))
    }
}

// =============================================================================
// Authorization
// =============================================================================

fn current_user(request: &Request) -> Result<&CurrentUser> {
    request
        .extensions()
        .get::<CurrentUser>()
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("missing user in request extensions")))
}

fn authenticated(current: &CurrentUser) -> Result<&User> {
    current.user().ok_or(AppError::AuthenticationRequired)
}

fn activated(current: &CurrentUser) -> Result<&User> {
    let user = authenticated(current)?;
    if !user.activated {
        return Err(AppError::InactiveAccount);
    }
    Ok(user)
}

/// Require an activated user holding `code`
///
/// Permissions are read from the store on every request so revocations
/// apply immediately.
async fn require_permission(
    state: &AppState,
    code: &str,
    request: Request,
    next: Next,
) -> Result<Response> {
    let user_id = activated(current_user(&request)?)?.id;

    let permissions = state.models.permissions.get_all_for_user(user_id).await?;
    if !permissions.include(code) {
        tracing::debug!("User {} lacks permission {}", user_id, code);
        return Err(AppError::NotPermitted);
    }

    Ok(next.run(request).await)
}

pub async fn require_movies_read(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response> {
    require_permission(&state, MOVIES_READ, request, next).await
}

pub async fn require_movies_write(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response> {
    require_permission(&state, MOVIES_WRITE, request, next).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bearer() {
        assert_eq!(parse_bearer("Bearer abc"), Some("abc"));
        assert_eq!(parse_bearer("Basic abc"), None);
        assert_eq!(parse_bearer("Bearer"), None);
        assert_eq!(parse_bearer("Bearer abc def"), None);
        assert_eq!(parse_bearer("Bearer  abc"), None);
    }

    #[test]
    fn test_activated_checks() {
        assert!(matches!(
            activated(&CurrentUser::Anonymous),
            Err(AppError::AuthenticationRequired)
        ));

        let mut user = User::new("Alice".into(), "alice@example.com".into(), String::new());
        assert!(matches!(
            activated(&CurrentUser::Authenticated(user.clone())),
            Err(AppError::InactiveAccount)
        ));

        user.activated = true;
        assert!(activated(&CurrentUser::Authenticated(user)).is_ok());
    }

    #[test]
    fn test_handle_panic_closes_connection() {
        let response = handle_panic(Box::new("boom"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[header::CONNECTION], "close");
    }
}

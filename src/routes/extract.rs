use std::collections::HashMap;

use axum::{
    async_trait,
    extract::{FromRequest, Request},
    Json,
};
use serde::de::DeserializeOwned;

use crate::constants::ERR_NOT_AN_INTEGER;
use crate::error::{AppError, Result};
use crate::validator::Validator;

/// JSON request body whose rejections render as our 400 envelope
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => Err(AppError::BadRequest(rejection.body_text())),
        }
    }
}

/// Parse a path id; anything that isn't an integer is simply not found
pub fn parse_id(raw: &str) -> Result<i64> {
    raw.parse().map_err(|_| AppError::NotFound)
}

/// String query value, or `default` when missing
pub fn read_string(qs: &HashMap<String, String>, key: &str, default: &str) -> String {
    match qs.get(key) {
        Some(value) if !value.is_empty() => value.clone(),
        _ => default.to_string(),
    }
}

/// Comma separated query value, or `default` when missing
pub fn read_csv(qs: &HashMap<String, String>, key: &str, default: Vec<String>) -> Vec<String> {
    match qs.get(key) {
        Some(value) if !value.is_empty() => value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => default,
    }
}

/// Integer query value, or `default` when missing
///
/// A value that doesn't parse is recorded on `v` and `default` returned.
pub fn read_int(qs: &HashMap<String, String>, key: &str, default: i64, v: &mut Validator) -> i64 {
    match qs.get(key) {
        Some(value) if !value.is_empty() => value.parse().unwrap_or_else(|_| {
            v.add_error(key, ERR_NOT_AN_INTEGER);
            default
        }),
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn qs(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_read_string_and_csv() {
        let q = qs(&[("title", "moana"), ("genres", "animation, adventure,,")]);

        assert_eq!(read_string(&q, "title", ""), "moana");
        assert_eq!(read_string(&q, "sort", "id"), "id");
        assert_eq!(read_csv(&q, "genres", vec![]), vec!["animation", "adventure"]);
        assert!(read_csv(&q, "missing", vec![]).is_empty());
    }

    #[test]
    fn test_read_int() {
        let q = qs(&[("page", "3"), ("page_size", "ten")]);
        let mut v = Validator::new();

        assert_eq!(read_int(&q, "page", 1, &mut v), 3);
        assert_eq!(read_int(&q, "page_size", 20, &mut v), 20);
        assert_eq!(read_int(&q, "other", 7, &mut v), 7);
        assert_eq!(v.errors()["page_size"], ERR_NOT_AN_INTEGER);
        assert!(!v.errors().contains_key("page"));
    }

    #[test]
    fn test_parse_id() {
        assert_eq!(parse_id("42").unwrap(), 42);
        assert_eq!(parse_id("-1").unwrap(), -1);
        assert!(matches!(parse_id("abc"), Err(AppError::NotFound)));
    }
}

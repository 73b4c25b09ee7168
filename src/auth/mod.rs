use axum::http::{header, HeaderMap};
use uuid::Uuid;

use crate::error::{AppError, Result};

pub mod denylist;

pub use denylist::{hash_token, SqliteTokenDenylist, TokenDenylist};

/// Header carrying the id of the user an upstream gateway has authenticated.
pub const USER_ID_HEADER: &str = "x-user-id";

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

pub fn actor_id(headers: &HeaderMap) -> Result<Uuid> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Uuid::parse_str(value.trim()).ok())
        .ok_or(AppError::Unauthorized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers), Some("abc.def"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic xyz"));
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn test_actor_id() {
        let mut headers = HeaderMap::new();
        assert!(matches!(actor_id(&headers), Err(AppError::Unauthorized)));

        let id = Uuid::new_v4();
        headers.insert(USER_ID_HEADER, HeaderValue::from_str(&id.to_string()).unwrap());
        assert_eq!(actor_id(&headers).unwrap(), id);

        headers.insert(USER_ID_HEADER, HeaderValue::from_static("not-a-uuid"));
        assert!(actor_id(&headers).is_err());
    }
}

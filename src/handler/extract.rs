use axum::{extract::FromRequestParts, http::request::Parts};

use crate::service::{payment::PaymentError, ServiceError};

/// Set by the authenticating gateway in front of this service.
pub const USER_ID_HEADER: &str = "x-user-id";
pub const SITE_KEY_HEADER: &str = "x-site-key";

/// The caller's user id, already authenticated upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserId(pub i64);

impl<S> FromRequestParts<S> for UserId
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(PaymentError::Unauthorized)?;

        raw.parse()
            .map(UserId)
            .map_err(|_| PaymentError::InvalidRequest(format!("Invalid user id: {}", raw)).into())
    }
}

/// The presented site API key, if any. Checking it is up to the handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteKey(pub Option<String>);

impl SiteKey {
    pub fn as_deref(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

impl<S> FromRequestParts<S> for SiteKey
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(SiteKey(
            parts
                .headers
                .get(SITE_KEY_HEADER)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string),
        ))
    }
}

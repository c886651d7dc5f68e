//! Session identity
//!
//! The acting user is taken from a signed session token, never from a
//! request body. The token travels either as `Authorization: Bearer <jwt>`
//! or in the session cookie.

use crate::config::AuthConfig;
use crate::errors::{AppError, Result};
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Authenticated user of the current request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUser {
    pub user_id: String,
}

impl SessionUser {
    /// Reject a client-supplied identity that differs from the session's
    pub fn ensure_same_user(&self, claimed: Option<&str>) -> Result<()> {
        match claimed {
            Some(other) if other != self.user_id => Err(AppError::Forbidden {
                message: "userId does not match the session user".to_string(),
            }),
            _ => Ok(()),
        }
    }
}

/// Session token claims
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject (user ID)
    pub sub: String,

    /// Expiration time (Unix timestamp)
    pub exp: i64,

    /// Issued at (Unix timestamp)
    pub iat: i64,
}

/// Issues and verifies session tokens
pub struct SessionKeys {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiration_secs: i64,
    cookie_name: String,
}

impl SessionKeys {
    /// Create session keys with the given secret
    pub fn new(secret: &str, expiration_secs: u64, cookie_name: impl Into<String>) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expiration_secs: expiration_secs as i64,
            cookie_name: cookie_name.into(),
        }
    }

    /// Fails when no signing secret is configured
    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        let secret = config
            .session_secret
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::Configuration {
                message: "auth.session_secret is not set".to_string(),
            })?;

        Ok(Self::new(
            secret,
            config.session_ttl_secs,
            config.session_cookie.clone(),
        ))
    }

    /// Issue a session token for a user
    pub fn issue(&self, user_id: &str) -> Result<String> {
        let now = Utc::now();
        let exp = now + Duration::seconds(self.expiration_secs);

        let claims = SessionClaims {
            sub: user_id.to_string(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key).map_err(|e| AppError::Internal {
            message: format!("Failed to issue session token: {}", e),
        })
    }

    /// Validate and decode a session token
    pub fn verify(&self, token: &str) -> Result<SessionClaims> {
        decode::<SessionClaims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AppError::ExpiredSession,
                _ => AppError::Unauthorized {
                    message: "Invalid session token".to_string(),
                },
            })
    }

    /// Find the raw token in the request headers
    fn token_from_parts<'a>(&self, parts: &'a Parts) -> Option<&'a str> {
        let bearer = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(extract_bearer);

        bearer.or_else(|| {
            parts
                .headers
                .get_all(header::COOKIE)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .find_map(|cookies| cookie_value(cookies, &self.cookie_name))
        })
    }
}

/// Extract the token from an Authorization header value
pub fn extract_bearer(auth_header: &str) -> Option<&str> {
    auth_header.strip_prefix("Bearer ").map(str::trim).filter(|t| !t.is_empty())
}

/// Look up a cookie by name in a Cookie header value
pub fn cookie_value<'a>(cookies: &'a str, name: &str) -> Option<&'a str> {
    cookies.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name && !value.is_empty()).then_some(value)
    })
}

/// Axum extractor for SessionUser
impl<S> FromRequestParts<S> for SessionUser
where
    Arc<SessionKeys>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self> {
        let keys = Arc::<SessionKeys>::from_ref(state);

        let token = keys.token_from_parts(parts).ok_or_else(|| AppError::Unauthorized {
            message: "Missing session".to_string(),
        })?;

        let claims = keys.verify(token)?;

        Ok(SessionUser {
            user_id: claims.sub,
        })
    }
}

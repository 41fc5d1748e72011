//! Supabase session handling.
//!
//! The browser holds a Supabase access token, sent either as a bearer
//! token or in the `sb-access-token` cookie. Tokens are HS256 JWTs signed
//! with the project's JWT secret and issued for the `authenticated`
//! audience.

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts, HeaderMap};
use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "sb-access-token";
pub const SUPABASE_AUDIENCE: &str = "authenticated";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    pub exp: u64,
    #[serde(default)]
    pub aud: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUser {
    pub user_id: Uuid,
    pub email: String,
}

pub struct SessionVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl SessionVerifier {
    pub fn new(jwt_secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[SUPABASE_AUDIENCE]);
        Self {
            key: DecodingKey::from_secret(jwt_secret.as_bytes()),
            validation,
        }
    }

    pub fn verify(&self, token: &str) -> Result<SessionUser, ApiError> {
        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|err| {
            let reason = match err.kind() {
                ErrorKind::ExpiredSignature => "Session expired",
                ErrorKind::InvalidAudience => "Token not issued for this site",
                ErrorKind::InvalidSignature => "Invalid session signature",
                _ => "Invalid session token",
            };
            debug!("Rejected session token: {}", err);
            ApiError::Unauthorized(reason.to_string())
        })?;

        Ok(SessionUser {
            user_id: data.claims.sub,
            email: data.claims.email.unwrap_or_default(),
        })
    }
}

/// Bearer token from `Authorization`, falling back to the session cookie.
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = bearer_token(headers) {
        return Some(token);
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Session if one was presented and verified; anonymous otherwise.
pub struct MaybeSession(pub Option<SessionUser>);

/// A verified session, or 401.
pub struct Session(pub SessionUser);

/// A verified session whose email is on the admin list, or 401/403.
pub struct AdminSession(pub SessionUser);

impl FromRequestParts<AppState> for MaybeSession {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user = extract_token(&parts.headers).and_then(|token| state.sessions.verify(&token).ok());
        Ok(MaybeSession(user))
    }
}

impl FromRequestParts<AppState> for Session {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = extract_token(&parts.headers)
            .ok_or_else(|| ApiError::Unauthorized("Sign in required".to_string()))?;
        state.sessions.verify(&token).map(Session)
    }
}

impl FromRequestParts<AppState> for AdminSession {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Session(user) = Session::from_request_parts(parts, state).await?;
        if !state.settings.is_admin(&user.email) {
            return Err(ApiError::Forbidden("Admin access required".to_string()));
        }
        Ok(AdminSession(user))
    }
}

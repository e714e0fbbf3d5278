//! Principal resolution for `WebSocket` upgrades.

use async_trait::async_trait;
use axum::Json;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use duel_core::PlayerId;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing credentials")]
    MissingToken,
    #[error("invalid token: {0}")]
    InvalidToken(String),
    #[error("token does not name a valid user")]
    InvalidPrincipal,
    #[error("authentication is not configured")]
    Unconfigured,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (StatusCode::UNAUTHORIZED, body).into_response()
    }
}

/// Resolves the authenticated principal from an upgrade request.
#[async_trait]
pub trait PrincipalResolver: Send + Sync {
    async fn resolve(&self, headers: &HeaderMap, query: Option<&str>) -> Result<PlayerId, AuthError>;
}

#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(rename = "userId")]
    user_id: i64,
}

/// HS256 bearer tokens carrying a `userId` claim.
pub struct JwtResolver {
    key: Option<DecodingKey>,
    validation: Validation,
    allow_query_token: bool,
}

impl JwtResolver {
    /// With no secret every request is refused.
    pub fn new(secret: Option<&SecretString>, allow_query_token: bool) -> Self {
        Self {
            key: secret.map(|s| DecodingKey::from_secret(s.expose_secret().as_bytes())),
            validation: Validation::new(Algorithm::HS256),
            allow_query_token,
        }
    }

    pub fn verify(&self, token: &str) -> Result<PlayerId, AuthError> {
        let key = self.key.as_ref().ok_or(AuthError::Unconfigured)?;
        let data = jsonwebtoken::decode::<Claims>(token, key, &self.validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;
        if data.claims.user_id <= 0 {
            return Err(AuthError::InvalidPrincipal);
        }
        Ok(PlayerId(data.claims.user_id))
    }

    fn token_from<'a>(&self, headers: &'a HeaderMap, query: Option<&'a str>) -> Option<&'a str> {
        let from_header = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.strip_prefix("Bearer ").unwrap_or(v).trim())
            .filter(|v| !v.is_empty());
        if from_header.is_some() || !self.allow_query_token {
            return from_header;
        }
        query?
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(k, _)| *k == "token")
            .map(|(_, v)| v)
            .filter(|v| !v.is_empty())
    }
}

#[async_trait]
impl PrincipalResolver for JwtResolver {
    async fn resolve(&self, headers: &HeaderMap, query: Option<&str>) -> Result<PlayerId, AuthError> {
        let token = self.token_from(headers, query).ok_or(AuthError::MissingToken)?;
        self.verify(token)
    }
}

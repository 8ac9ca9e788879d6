//! Bearer token authentication.
//!
//! Token issuance belongs to the users service; the gateway only verifies
//! tokens signed with the shared secret and records the subject.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use crate::error::GatewayError;

/// Why a request failed authentication. Each variant has a fixed client message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("missing Authorization header")]
    MissingHeader,

    #[error("invalid Authorization header format")]
    MalformedHeader,

    #[error("invalid or expired token")]
    InvalidToken,
}

/// Authenticated caller, attached to request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject(pub String);

/// Verifies a bearer token and yields its subject.
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<Subject, AuthError>;
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: Option<String>,
    user_id: Option<serde_json::Value>,
}

/// HMAC-signed JWT verifier.
pub struct HmacJwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl HmacJwtVerifier {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
        // `exp` is checked when present but not mandatory.
        validation.required_spec_claims.clear();

        Self {
            key: DecodingKey::from_secret(secret),
            validation,
        }
    }
}

impl TokenVerifier for HmacJwtVerifier {
    fn verify(&self, token: &str) -> Result<Subject, AuthError> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.key, &self.validation).map_err(|e| {
            tracing::debug!(error = %e, "Token rejected");
            AuthError::InvalidToken
        })?;

        let claims = data.claims;
        let user_id = claims.user_id.and_then(|v| match v {
            serde_json::Value::Number(n) => Some(n.to_string()),
            serde_json::Value::String(s) => Some(s),
            _ => None,
        });

        claims
            .sub
            .or(user_id)
            .map(Subject)
            .ok_or(AuthError::InvalidToken)
    }
}

/// Extract the token from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingHeader)?
        .to_str()
        .map_err(|_| AuthError::MalformedHeader)?;

    if value.is_empty() {
        return Err(AuthError::MissingHeader);
    }

    match value.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() => {
            Ok(token)
        }
        _ => Err(AuthError::MalformedHeader),
    }
}

/// Middleware requiring a valid bearer token.
pub async fn require_bearer(
    State(verifier): State<Arc<dyn TokenVerifier>>,
    mut request: Request,
    next: Next,
) -> Response {
    let subject = match bearer_token(request.headers()).and_then(|t| verifier.verify(t)) {
        Ok(subject) => subject,
        Err(e) => {
            tracing::debug!(reason = %e, path = %request.uri().path(), "Unauthorized request");
            return GatewayError::Unauthorized(e).into_response();
        }
    };

    request.extensions_mut().insert(subject);
    next.run(request).await
}

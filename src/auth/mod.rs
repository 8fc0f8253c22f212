//! Admin principal resolution.
//!
//! Requests carry an HS256 JWT in `Authorization: Bearer <token>`. The `sub`
//! claim is the opaque account id that scopes every query; the `admin` role
//! is required for all ledger routes.

use crate::{config::AppConfig, errors::ServiceError};
use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

pub const ADMIN_ROLE: &str = "admin";

/// Claim structure for JWT tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,        // Subject (account id)
    pub roles: Vec<String>, // Granted roles
    pub jti: String,        // Token id
    pub iat: i64,           // Issued at
    pub exp: i64,           // Expiration time
    pub iss: String,        // Issuer
    pub aud: String,        // Audience
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub token_ttl: Duration,
}

impl From<&AppConfig> for AuthConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            jwt_secret: cfg.jwt_secret.clone(),
            jwt_issuer: cfg.auth_issuer.clone(),
            jwt_audience: cfg.auth_audience.clone(),
            token_ttl: Duration::from_secs(60 * 60),
        }
    }
}

/// Verifies bearer tokens. Issuing exists for tests and operator tooling;
/// production tokens come from the external identity provider.
#[derive(Clone, Debug)]
pub struct AuthService {
    config: AuthConfig,
}

impl AuthService {
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    pub fn issue_token(&self, user_id: Uuid, roles: &[&str]) -> Result<String, ServiceError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
            jti: Uuid::new_v4().to_string(),
            iat: now,
            exp: now + self.config.token_ttl.as_secs() as i64,
            iss: self.config.jwt_issuer.clone(),
            aud: self.config.jwt_audience.clone(),
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(|e| ServiceError::InternalError(format!("Failed to sign token: {}", e)))
    }

    /// Validate a JWT token and extract the claims
    pub fn validate_token(&self, token: &str) -> Result<Claims, ServiceError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.config.jwt_issuer.as_str()]);
        validation.set_audience(&[self.config.jwt_audience.as_str()]);

        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|e| {
            debug!(error = %e, "Rejected bearer token");
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    ServiceError::Unauthorized("Token has expired".to_string())
                }
                _ => ServiceError::Unauthorized("Invalid token".to_string()),
            }
        })
    }
}

/// The authenticated admin on whose account a request operates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminPrincipal {
    pub user_id: Uuid,
    pub roles: Vec<String>,
}

impl AdminPrincipal {
    pub fn from_claims(claims: Claims) -> Result<Self, ServiceError> {
        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| ServiceError::Unauthorized("Invalid subject".to_string()))?;
        if !claims.roles.iter().any(|r| r == ADMIN_ROLE) {
            return Err(ServiceError::Forbidden("Admin role required".to_string()));
        }
        Ok(Self {
            user_id,
            roles: claims.roles,
        })
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))?
        .trim();
    (!token.is_empty()).then_some(token)
}

#[async_trait]
impl<S> FromRequestParts<S> for AdminPrincipal
where
    S: Send + Sync,
    Arc<AuthService>: FromRef<S>,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth = Arc::<AuthService>::from_ref(state);
        let token = bearer_token(parts)
            .ok_or_else(|| ServiceError::Unauthorized("Missing bearer token".to_string()))?;
        let claims = auth.validate_token(token)?;
        AdminPrincipal::from_claims(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn service(secret: &str) -> AuthService {
        AuthService::new(AuthConfig {
            jwt_secret: secret.to_string(),
            jwt_issuer: "stock-ledger-api".to_string(),
            jwt_audience: "stock-ledger-admin".to_string(),
            token_ttl: Duration::from_secs(300),
        })
    }

    const SECRET: &str = "a3f9c1d27b6e48f0a1b2c3d4e5f60718293a4b5c";

    #[test]
    fn issued_admin_token_resolves_to_principal() {
        let auth = service(SECRET);
        let user_id = Uuid::new_v4();
        let token = auth.issue_token(user_id, &[ADMIN_ROLE]).unwrap();
        let principal = AdminPrincipal::from_claims(auth.validate_token(&token).unwrap()).unwrap();
        assert_eq!(principal.user_id, user_id);
    }

    #[test]
    fn token_without_admin_role_is_forbidden() {
        let auth = service(SECRET);
        let token = auth.issue_token(Uuid::new_v4(), &["viewer"]).unwrap();
        let claims = auth.validate_token(&token).unwrap();
        assert_matches!(AdminPrincipal::from_claims(claims), Err(ServiceError::Forbidden(_)));
    }

    #[test]
    fn token_signed_with_another_secret_is_rejected() {
        let token = service("0000000000000000000000000000000000000000")
            .issue_token(Uuid::new_v4(), &[ADMIN_ROLE])
            .unwrap();
        assert_matches!(
            service(SECRET).validate_token(&token),
            Err(ServiceError::Unauthorized(_))
        );
    }
}

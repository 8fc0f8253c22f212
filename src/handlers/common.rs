use crate::{errors::ServiceError, services::idempotency::{IdempotencyKey, IDEMPOTENCY_KEY_HEADER}};
use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, FromRequestParts, Path, Request},
    http::{request::Parts, HeaderMap},
};
use serde::{de::DeserializeOwned, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Success envelope: `{ "data": ... }`.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

/// JSON body that has passed `validator` checks. An empty body is read as
/// the type's default so key-only transitions can be posted without one.
#[derive(Debug, Clone, Default)]
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate + Default,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| ServiceError::ValidationError(e.body_text()))?;

        let value = if bytes.iter().all(u8::is_ascii_whitespace) {
            T::default()
        } else {
            serde_json::from_slice(&bytes)
                .map_err(|e| ServiceError::ValidationError(format!("Invalid JSON body: {}", e)))?
        };
        value.validate()?;
        Ok(Self(value))
    }
}

/// `:id` path segment parsed as a UUID.
#[derive(Debug, Clone, Copy)]
pub struct EntityId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for EntityId
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(id) = Path::<Uuid>::from_request_parts(parts, state)
            .await
            .map_err(|e| ServiceError::ValidationError(e.body_text()))?;
        Ok(Self(id))
    }
}

/// The body key wins; the `Idempotency-Key` header is the fallback.
pub fn idempotency_key(body_key: Option<&str>, headers: &HeaderMap) -> Option<IdempotencyKey> {
    let header_key = headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|v| v.to_str().ok());
    IdempotencyKey::from_request(body_key, header_key)
}

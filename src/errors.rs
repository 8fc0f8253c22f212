use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::{error::DbErr, SqlErr};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

fn current_request_id() -> Option<String> {
    crate::tracing::current_request_id().map(|rid| rid.as_str().to_string())
}

/// Error body returned by every failing endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "ALREADY_SHIPPED",
    "message": "Order 550e8400-e29b-41d4-a716-446655440000 has shipped items and cannot be cancelled",
    "request_id": "req-abc123xyz"
}))]
pub struct ErrorResponse {
    /// Stable machine-readable error code
    #[schema(example = "ALREADY_SHIPPED")]
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// Unique request identifier for support and debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Purchase order {0} not found")]
    PurchaseOrderNotFound(Uuid),

    #[error("Order {0} has no items")]
    EmptyItems(Uuid),

    #[error("At least one return item with a positive quantity is required")]
    ReturnItemsRequired,

    #[error("Order item {0} does not belong to this order")]
    ReturnItemNotFound(Uuid),

    #[error("Order {0} has shipped items and cannot be cancelled")]
    AlreadyShipped(Uuid),

    #[error("Order {0} is cancelled")]
    OrderCancelled(Uuid),

    #[error("Cannot {action} from status {from}")]
    InvalidTransition { action: &'static str, from: String },

    #[error("Purchase order {0} has no lines")]
    PurchaseOrderLinesRequired(Uuid),

    #[error("At least one receive line is required")]
    ReceiveLinesRequired,

    #[error("Purchase order line {0} does not belong to this purchase order")]
    PurchaseOrderLineNotFound(Uuid),

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("Movement {0} cannot be voided: {1}")]
    VoidNotAllowed(Uuid, String),

    #[error("Invalid cursor")]
    InvalidCursor,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Concurrent modification: {0}")]
    ConcurrentModification(Uuid),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Normalizes a database error, surfacing unique-key races as concurrent
    /// modifications so the whole transition can be re-run.
    pub fn db_error(error: DbErr, entity_id: Uuid) -> Self {
        match error.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => {
                ServiceError::ConcurrentModification(entity_id)
            }
            _ => ServiceError::DatabaseError(error),
        }
    }

    /// Stable machine-readable code placed in the `error` field of responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::DatabaseError(_) => "DATABASE_ERROR",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::NotFound(_) => "NOT_FOUND",
            Self::PurchaseOrderNotFound(_) => "PO_NOT_FOUND",
            Self::EmptyItems(_) => "EMPTY_ITEMS",
            Self::ReturnItemsRequired => "RETURN_ITEMS_REQUIRED",
            Self::ReturnItemNotFound(_) => "RETURN_ITEM_NOT_FOUND",
            Self::AlreadyShipped(_) => "ALREADY_SHIPPED",
            Self::OrderCancelled(_) => "ORDER_CANCELLED",
            Self::InvalidTransition { .. } => "INVALID_STATE_TRANSITION",
            Self::PurchaseOrderLinesRequired(_) => "PO_LINES_REQUIRED",
            Self::ReceiveLinesRequired => "RECEIVE_LINES_REQUIRED",
            Self::PurchaseOrderLineNotFound(_) => "PO_LINE_NOT_FOUND",
            Self::InvalidQuantity(_) => "INVALID_QUANTITY",
            Self::VoidNotAllowed(..) => "VOID_NOT_ALLOWED",
            Self::InvalidCursor => "INVALID_CURSOR",
            Self::ValidationError(_) => "VALIDATION_ERROR",
            Self::ConcurrentModification(_) => "CONCURRENT_MODIFICATION",
            Self::InternalError(_) | Self::Other(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DatabaseError(_) | Self::InternalError(_) | Self::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) | Self::PurchaseOrderNotFound(_) => StatusCode::NOT_FOUND,
            // Guard violations are "precondition failed" but keep 400.
            Self::EmptyItems(_)
            | Self::ReturnItemsRequired
            | Self::ReturnItemNotFound(_)
            | Self::AlreadyShipped(_)
            | Self::OrderCancelled(_)
            | Self::InvalidTransition { .. }
            | Self::PurchaseOrderLinesRequired(_)
            | Self::ReceiveLinesRequired
            | Self::PurchaseOrderLineNotFound(_)
            | Self::InvalidQuantity(_)
            | Self::VoidNotAllowed(..)
            | Self::InvalidCursor
            | Self::ValidationError(_) => StatusCode::BAD_REQUEST,
            Self::ConcurrentModification(_) => StatusCode::CONFLICT,
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::InternalError(_) | Self::Other(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }

    /// True when re-running the whole transition may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ConcurrentModification(_) => true,
            Self::DatabaseError(error) => is_write_conflict(error),
            _ => false,
        }
    }
}

/// Messages the drivers use when a transaction lost a write race: SQLite's
/// busy and stale-snapshot errors, Postgres serialization failures and
/// deadlocks.
const WRITE_CONFLICT_MARKERS: &[&str] = &[
    "database is locked",
    "could not serialize access",
    "deadlock detected",
];

fn is_write_conflict(error: &DbErr) -> bool {
    let message = error.to_string();
    WRITE_CONFLICT_MARKERS
        .iter()
        .any(|marker| message.contains(marker))
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, code = self.code(), "request failed");
        }

        let err = ErrorResponse {
            error: self.code().to_string(),
            message: self.response_message(),
            request_id: current_request_id(),
        };

        (status, Json(err)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use test_case::test_case;

    #[tokio::test]
    async fn service_error_response_carries_code_and_request_id() {
        let order_id = Uuid::new_v4();
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("req-123"), async {
                ServiceError::AlreadyShipped(order_id).into_response()
            })
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let payload: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload.error, "ALREADY_SHIPPED");
        assert_eq!(payload.request_id.as_deref(), Some("req-123"));
    }

    #[test_case(ServiceError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED, "UNAUTHORIZED")]
    #[test_case(ServiceError::NotFound("x".into()), StatusCode::NOT_FOUND, "NOT_FOUND")]
    #[test_case(ServiceError::PurchaseOrderNotFound(Uuid::nil()), StatusCode::NOT_FOUND, "PO_NOT_FOUND")]
    #[test_case(ServiceError::EmptyItems(Uuid::nil()), StatusCode::BAD_REQUEST, "EMPTY_ITEMS")]
    #[test_case(ServiceError::ReturnItemsRequired, StatusCode::BAD_REQUEST, "RETURN_ITEMS_REQUIRED")]
    #[test_case(ServiceError::AlreadyShipped(Uuid::nil()), StatusCode::BAD_REQUEST, "ALREADY_SHIPPED")]
    #[test_case(ServiceError::OrderCancelled(Uuid::nil()), StatusCode::BAD_REQUEST, "ORDER_CANCELLED")]
    #[test_case(ServiceError::ConcurrentModification(Uuid::nil()), StatusCode::CONFLICT, "CONCURRENT_MODIFICATION")]
    #[test_case(ServiceError::InternalError("boom".into()), StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")]
    fn status_and_code_mapping(err: ServiceError, status: StatusCode, code: &str) {
        assert_eq!(err.status_code(), status);
        assert_eq!(err.code(), code);
    }

    #[test]
    fn response_message_hides_internal_details() {
        assert_eq!(
            ServiceError::InternalError("connection string leaked".into()).response_message(),
            "Internal server error"
        );
        assert_eq!(
            ServiceError::DatabaseError(DbErr::Custom("secret".into())).response_message(),
            "Database error"
        );
        assert_eq!(
            ServiceError::ReturnItemsRequired.response_message(),
            "At least one return item with a positive quantity is required"
        );
    }

    #[test]
    fn only_lost_races_are_retryable() {
        assert!(ServiceError::ConcurrentModification(Uuid::nil()).is_retryable());
        assert!(!ServiceError::AlreadyShipped(Uuid::nil()).is_retryable());
        assert!(!ServiceError::DatabaseError(DbErr::Custom("x".into())).is_retryable());
        assert!(ServiceError::DatabaseError(DbErr::Custom(
            "error returned from database: (code: 517) database is locked".into()
        ))
        .is_retryable());
        assert!(ServiceError::DatabaseError(DbErr::Custom(
            "could not serialize access due to concurrent update".into()
        ))
        .is_retryable());
    }
}

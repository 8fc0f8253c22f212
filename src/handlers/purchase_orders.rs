use super::common::{idempotency_key, ApiResponse, EntityId, ValidatedJson};
use crate::{
    auth::AdminPrincipal,
    dto::{PurchaseOrderDto, ReceiptDto, ReceivePurchaseOrderRequest},
    errors::ServiceError,
    handlers::AppState,
};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};

pub fn purchase_orders_routes() -> Router<AppState> {
    Router::new()
        .route("/:id", get(get_purchase_order))
        .route("/:id/approve", post(approve_purchase_order))
        .route("/:id/receive", post(receive_purchase_order))
}

#[utoipa::path(
    get,
    path = "/api/v1/purchase-orders/{id}",
    summary = "Get purchase order",
    params(("id" = Uuid, Path, description = "Purchase order id")),
    responses(
        (status = 200, description = "Purchase order with lines", body = ApiResponse<PurchaseOrderDto>),
        (status = 404, description = "Purchase order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "purchase-orders"
)]
pub async fn get_purchase_order(
    State(state): State<AppState>,
    principal: AdminPrincipal,
    EntityId(purchase_order_id): EntityId,
) -> Result<Json<ApiResponse<PurchaseOrderDto>>, ServiceError> {
    let (purchase_order, lines) = state
        .services
        .purchase_orders
        .get_purchase_order(principal.user_id, purchase_order_id)
        .await?;
    Ok(Json(ApiResponse::new(PurchaseOrderDto::from_parts(
        purchase_order,
        lines,
    ))))
}

#[utoipa::path(
    post,
    path = "/api/v1/purchase-orders/{id}/approve",
    summary = "Approve purchase order",
    params(("id" = Uuid, Path, description = "Purchase order id")),
    responses(
        (status = 200, description = "Approved purchase order", body = ApiResponse<PurchaseOrderDto>),
        (status = 400, description = "Not approvable", body = crate::errors::ErrorResponse),
        (status = 404, description = "Purchase order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "purchase-orders"
)]
pub async fn approve_purchase_order(
    State(state): State<AppState>,
    principal: AdminPrincipal,
    EntityId(purchase_order_id): EntityId,
) -> Result<Json<ApiResponse<PurchaseOrderDto>>, ServiceError> {
    let transition = state
        .services
        .purchase_orders
        .approve(principal.user_id, purchase_order_id)
        .await?;
    Ok(Json(ApiResponse::new(PurchaseOrderDto::from_parts(
        transition.purchase_order,
        transition.lines,
    ))))
}

#[utoipa::path(
    post,
    path = "/api/v1/purchase-orders/{id}/receive",
    summary = "Receive purchase order lines",
    description = "Books received units as IN movements and returns the inventory receipt. A replay with the same idempotency key returns the original receipt with status 200.",
    params(("id" = Uuid, Path, description = "Purchase order id")),
    request_body = ReceivePurchaseOrderRequest,
    responses(
        (status = 201, description = "Receipt created", body = ApiResponse<ReceiptDto>),
        (status = 200, description = "Receipt already recorded", body = ApiResponse<ReceiptDto>),
        (status = 400, description = "Invalid receive request", body = crate::errors::ErrorResponse),
        (status = 404, description = "Purchase order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "purchase-orders"
)]
pub async fn receive_purchase_order(
    State(state): State<AppState>,
    principal: AdminPrincipal,
    EntityId(purchase_order_id): EntityId,
    headers: HeaderMap,
    ValidatedJson(body): ValidatedJson<ReceivePurchaseOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ReceiptDto>>), ServiceError> {
    let key = idempotency_key(body.idempotency_key.as_deref(), &headers);
    let lines = body.receive_lines();
    let outcome = state
        .services
        .purchase_orders
        .receive(principal.user_id, purchase_order_id, lines, body.note, key)
        .await?;

    let status = if outcome.applied {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    let receipt = ReceiptDto::from_parts(outcome.receipt, outcome.items, outcome.purchase_order.status);
    Ok((status, Json(ApiResponse::new(receipt))))
}

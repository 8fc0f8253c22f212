use super::common::{idempotency_key, ApiResponse, EntityId, ValidatedJson};
use crate::{
    auth::AdminPrincipal,
    dto::{OrderDto, ReturnOrderRequest, TransitionRequest},
    errors::ServiceError,
    handlers::AppState,
};
use axum::{
    extract::State,
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use tracing::info;

pub fn orders_routes() -> Router<AppState> {
    Router::new()
        .route("/:id", get(get_order))
        .route("/:id/confirm", post(confirm_order))
        .route("/:id/cancel", post(cancel_order))
        .route("/:id/return", post(return_order))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    summary = "Get order",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order with items", body = ApiResponse<OrderDto>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    principal: AdminPrincipal,
    EntityId(order_id): EntityId,
) -> Result<Json<ApiResponse<OrderDto>>, ServiceError> {
    let (order, items) = state
        .services
        .orders
        .get_order(principal.user_id, order_id)
        .await?;
    Ok(Json(ApiResponse::new(OrderDto::from_parts(order, items))))
}

#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/confirm",
    summary = "Confirm order",
    description = "Reserves every unreserved unit and moves a PENDING order to CONFIRMED. Confirming an order that is already past PENDING returns it unchanged.",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body(content = TransitionRequest, description = "Optional idempotency key"),
    responses(
        (status = 200, description = "Order with items", body = ApiResponse<OrderDto>),
        (status = 400, description = "Order has no items", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Concurrent modification", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn confirm_order(
    State(state): State<AppState>,
    principal: AdminPrincipal,
    EntityId(order_id): EntityId,
    headers: HeaderMap,
    ValidatedJson(body): ValidatedJson<TransitionRequest>,
) -> Result<Json<ApiResponse<OrderDto>>, ServiceError> {
    let key = idempotency_key(body.idempotency_key.as_deref(), &headers);
    let transition = state
        .services
        .orders
        .confirm(principal.user_id, order_id, key)
        .await?;

    info!(%order_id, applied = transition.applied, "confirm handled");
    Ok(Json(ApiResponse::new(OrderDto::from_parts(
        transition.order,
        transition.items,
    ))))
}

#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/cancel",
    summary = "Cancel order",
    description = "Releases all reservations and cancels the order. Fails with ALREADY_SHIPPED once any unit has shipped.",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body(content = TransitionRequest, description = "Optional idempotency key"),
    responses(
        (status = 200, description = "Order with items", body = ApiResponse<OrderDto>),
        (status = 400, description = "Order already shipped", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    principal: AdminPrincipal,
    EntityId(order_id): EntityId,
    headers: HeaderMap,
    ValidatedJson(body): ValidatedJson<TransitionRequest>,
) -> Result<Json<ApiResponse<OrderDto>>, ServiceError> {
    let key = idempotency_key(body.idempotency_key.as_deref(), &headers);
    let transition = state
        .services
        .orders
        .cancel(principal.user_id, order_id, key)
        .await?;

    info!(%order_id, applied = transition.applied, "cancel handled");
    Ok(Json(ApiResponse::new(OrderDto::from_parts(
        transition.order,
        transition.items,
    ))))
}

#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/return",
    summary = "Return order items",
    description = "Restocks returned units. Requested quantities are clamped to what has shipped and not yet come back.",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = ReturnOrderRequest,
    responses(
        (status = 200, description = "Order with items", body = ApiResponse<OrderDto>),
        (status = 400, description = "Invalid return request or cancelled order", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn return_order(
    State(state): State<AppState>,
    principal: AdminPrincipal,
    EntityId(order_id): EntityId,
    headers: HeaderMap,
    ValidatedJson(body): ValidatedJson<ReturnOrderRequest>,
) -> Result<Json<ApiResponse<OrderDto>>, ServiceError> {
    let key = idempotency_key(body.idempotency_key.as_deref(), &headers);
    let items = body.return_items();
    let transition = state
        .services
        .orders
        .return_items(principal.user_id, order_id, items, body.note, key)
        .await?;

    info!(%order_id, applied = transition.applied, "return handled");
    Ok(Json(ApiResponse::new(OrderDto::from_parts(
        transition.order,
        transition.items,
    ))))
}

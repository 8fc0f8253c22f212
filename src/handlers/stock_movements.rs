use super::common::{idempotency_key, ApiResponse, EntityId, ValidatedJson};
use crate::{
    auth::AdminPrincipal,
    commands::stock::{AdjustStockCommand, VoidMovementCommand},
    dto::{
        AdjustStockRequest, LedgerCheckDto, MovementDto, MovementPageDto, MovementQuery,
        VerifyQuery, VoidMovementRequest,
    },
    errors::ServiceError,
    handlers::AppState,
};
use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};

pub fn stock_movements_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_movements))
        .route("/adjust", post(adjust_stock))
        .route("/verify", get(verify_ledger))
        .route("/:id/void", post(void_movement))
}

fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, ServiceError> {
    query
        .map(|Query(params)| params)
        .map_err(|e| ServiceError::ValidationError(e.body_text()))
}

#[utoipa::path(
    get,
    path = "/api/v1/stock-movements",
    summary = "List stock movements",
    description = "Cursor-paginated movement history, newest first (occurredAt, createdAt, id descending).",
    params(MovementQuery),
    responses(
        (status = 200, description = "One page of movements", body = MovementPageDto),
        (status = 400, description = "Invalid filter or cursor", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "stock-movements"
)]
pub async fn list_movements(
    State(state): State<AppState>,
    principal: AdminPrincipal,
    query: Result<Query<MovementQuery>, QueryRejection>,
) -> Result<Json<MovementPageDto>, ServiceError> {
    let query = query_params(query)?;
    let limit = state.config.page_size(query.limit);
    let page = state
        .services
        .stock_movements
        .list(principal.user_id, query.filter(), query.cursor.as_deref(), limit)
        .await?;

    Ok(Json(MovementPageDto {
        data: page.data.into_iter().map(MovementDto::from).collect(),
        next_cursor: page.next_cursor,
    }))
}

#[utoipa::path(
    post,
    path = "/api/v1/stock-movements/adjust",
    summary = "Adjust stock",
    request_body = AdjustStockRequest,
    responses(
        (status = 201, description = "ADJUST movement recorded", body = ApiResponse<MovementDto>),
        (status = 200, description = "Adjustment already recorded", body = ApiResponse<MovementDto>),
        (status = 400, description = "Invalid quantity", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product or variant not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "stock-movements"
)]
pub async fn adjust_stock(
    State(state): State<AppState>,
    principal: AdminPrincipal,
    headers: HeaderMap,
    ValidatedJson(body): ValidatedJson<AdjustStockRequest>,
) -> Result<(StatusCode, Json<ApiResponse<MovementDto>>), ServiceError> {
    let command = AdjustStockCommand {
        user_id: principal.user_id,
        product_id: body.product_id,
        variant_id: body.variant_id,
        qty_delta: body.qty_delta,
        reference: body.reference,
        note: body.note,
        occurred_at: body.occurred_at,
        idempotency_key: idempotency_key(body.idempotency_key.as_deref(), &headers),
    };
    let recorded = state.services.stock_movements.adjust(command).await?;

    let status = if recorded.already_applied {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(ApiResponse::new(MovementDto::from(recorded.movement)))))
}

#[utoipa::path(
    post,
    path = "/api/v1/stock-movements/{id}/void",
    summary = "Void a movement",
    description = "Writes a compensating VOID movement and reverses its stock effect. Order and purchase order counters are not changed.",
    params(("id" = Uuid, Path, description = "Movement id")),
    request_body = VoidMovementRequest,
    responses(
        (status = 201, description = "VOID movement recorded", body = ApiResponse<MovementDto>),
        (status = 200, description = "Void already recorded", body = ApiResponse<MovementDto>),
        (status = 400, description = "Movement cannot be voided", body = crate::errors::ErrorResponse),
        (status = 404, description = "Movement not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "stock-movements"
)]
pub async fn void_movement(
    State(state): State<AppState>,
    principal: AdminPrincipal,
    EntityId(movement_id): EntityId,
    headers: HeaderMap,
    ValidatedJson(body): ValidatedJson<VoidMovementRequest>,
) -> Result<(StatusCode, Json<ApiResponse<MovementDto>>), ServiceError> {
    let command = VoidMovementCommand {
        movement_id,
        user_id: principal.user_id,
        note: body.note,
        idempotency_key: idempotency_key(body.idempotency_key.as_deref(), &headers),
    };
    let recorded = state.services.stock_movements.void(command).await?;

    let status = if recorded.already_applied {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(ApiResponse::new(MovementDto::from(recorded.movement)))))
}

#[utoipa::path(
    get,
    path = "/api/v1/stock-movements/verify",
    summary = "Verify ledger consistency",
    params(VerifyQuery),
    responses(
        (status = 200, description = "Counter and ledger sum", body = ApiResponse<LedgerCheckDto>),
        (status = 404, description = "Product or variant not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "stock-movements"
)]
pub async fn verify_ledger(
    State(state): State<AppState>,
    principal: AdminPrincipal,
    query: Result<Query<VerifyQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<LedgerCheckDto>>, ServiceError> {
    let query = query_params(query)?;
    let check = state
        .services
        .stock_movements
        .verify(principal.user_id, query.product_id, query.variant_id)
        .await?;
    Ok(Json(ApiResponse::new(LedgerCheckDto::from(check))))
}

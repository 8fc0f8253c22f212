use axum::Json;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Stock Ledger API",
        version = "0.1.0",
        description = r#"
# Stock Ledger API

Inventory ledger and fulfillment transitions for orders and purchase orders.

Every stock change is an append-only movement. Product and variant stock
counters are projections of that ledger and can be verified against it.

## Authentication

All `/api/v1` endpoints require an admin bearer token:

```
Authorization: Bearer <jwt>
```

## Idempotency

Mutating endpoints accept an `idempotencyKey` in the body or an
`Idempotency-Key` header. Replaying a key never books stock twice.
"#
    ),
    servers((url = "/", description = "Current host")),
    paths(
        crate::handlers::orders::get_order,
        crate::handlers::orders::confirm_order,
        crate::handlers::orders::cancel_order,
        crate::handlers::orders::return_order,
        crate::handlers::purchase_orders::get_purchase_order,
        crate::handlers::purchase_orders::approve_purchase_order,
        crate::handlers::purchase_orders::receive_purchase_order,
        crate::handlers::stock_movements::list_movements,
        crate::handlers::stock_movements::adjust_stock,
        crate::handlers::stock_movements::void_movement,
        crate::handlers::stock_movements::verify_ledger,
    ),
    components(
        schemas(
            crate::dto::TransitionRequest,
            crate::dto::OrderDto,
            crate::dto::OrderItemDto,
            crate::dto::ReturnOrderRequest,
            crate::dto::ReturnItemRequest,
            crate::dto::PurchaseOrderDto,
            crate::dto::PurchaseOrderLineDto,
            crate::dto::ReceiptDto,
            crate::dto::ReceiptItemDto,
            crate::dto::ReceivePurchaseOrderRequest,
            crate::dto::ReceiveLineRequest,
            crate::dto::MovementDto,
            crate::dto::MovementPageDto,
            crate::dto::AdjustStockRequest,
            crate::dto::VoidMovementRequest,
            crate::dto::LedgerCheckDto,
            crate::errors::ErrorResponse
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "orders", description = "Order fulfillment transitions"),
        (name = "purchase-orders", description = "Purchase order approval and receiving"),
        (name = "stock-movements", description = "Stock ledger")
    )
)]
pub struct ApiDocV1;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "Bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// `GET /api-docs/openapi.json`
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDocV1::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_ledger_routes() {
        let json = serde_json::to_string(&ApiDocV1::openapi()).unwrap();
        assert!(json.contains("Stock Ledger API"));
        assert!(json.contains("/api/v1/orders/{id}/confirm"));
        assert!(json.contains("/api/v1/stock-movements"));
        assert!(json.contains("\"Bearer\""));
    }
}

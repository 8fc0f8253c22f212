use crate::{
    commands::orders::ReturnRequestItem,
    entities::{
        order, order_item,
        sea_orm_active_enums::{FulfillmentStatus, OrderStatus, PaymentStatus},
    },
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemDto {
    pub id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub sku: String,
    pub name: String,
    pub unit_price_cents: i64,
    pub qty: i32,
    pub qty_reserved: i32,
    pub qty_shipped: i32,
    pub qty_returned: i32,
    pub position: i32,
}

impl From<order_item::Model> for OrderItemDto {
    fn from(item: order_item::Model) -> Self {
        Self {
            id: item.id,
            product_id: item.product_id,
            variant_id: item.variant_id,
            sku: item.sku,
            name: item.name,
            unit_price_cents: item.unit_price_cents,
            qty: item.qty,
            qty_reserved: item.qty_reserved,
            qty_shipped: item.qty_shipped,
            qty_returned: item.qty_returned,
            position: item.position,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderDto {
    pub id: Uuid,
    pub order_number: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub fulfillment_status: FulfillmentStatus,
    pub subtotal_cents: i64,
    pub shipping_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub currency: String,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub returned_at: Option<DateTime<Utc>>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub items: Vec<OrderItemDto>,
}

impl OrderDto {
    pub fn from_parts(order: order::Model, items: Vec<order_item::Model>) -> Self {
        Self {
            id: order.id,
            order_number: order.order_number,
            status: order.status,
            payment_status: order.payment_status,
            fulfillment_status: order.fulfillment_status,
            subtotal_cents: order.subtotal_cents,
            shipping_cents: order.shipping_cents,
            tax_cents: order.tax_cents,
            total_cents: order.total_cents,
            currency: order.currency,
            cancelled_at: order.cancelled_at,
            returned_at: order.returned_at,
            version: order.version,
            created_at: order.created_at,
            updated_at: order.updated_at,
            items: items.into_iter().map(OrderItemDto::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReturnItemRequest {
    pub order_item_id: Uuid,
    pub qty: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReturnOrderRequest {
    #[validate(length(max = 512))]
    pub idempotency_key: Option<String>,
    #[serde(default)]
    pub items: Vec<ReturnItemRequest>,
    #[validate(length(max = 2000))]
    pub note: Option<String>,
}

impl ReturnOrderRequest {
    pub fn return_items(&self) -> Vec<ReturnRequestItem> {
        self.items
            .iter()
            .map(|item| ReturnRequestItem {
                order_item_id: item.order_item_id,
                qty: item.qty,
            })
            .collect()
    }
}

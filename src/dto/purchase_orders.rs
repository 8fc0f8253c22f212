use crate::{
    commands::purchaseorders::ReceiveLine,
    entities::{
        inventory_receipt, inventory_receipt_item, purchase_order, purchase_order_line,
        sea_orm_active_enums::PurchaseOrderStatus,
    },
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseOrderLineDto {
    pub id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub qty_ordered: i32,
    pub qty_received: i32,
    pub unit_cost_cents: i64,
    pub position: i32,
}

impl From<purchase_order_line::Model> for PurchaseOrderLineDto {
    fn from(line: purchase_order_line::Model) -> Self {
        Self {
            id: line.id,
            product_id: line.product_id,
            variant_id: line.variant_id,
            qty_ordered: line.qty_ordered,
            qty_received: line.qty_received,
            unit_cost_cents: line.unit_cost_cents,
            position: line.position,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseOrderDto {
    pub id: Uuid,
    pub po_number: String,
    pub supplier_name: Option<String>,
    pub status: PurchaseOrderStatus,
    pub approved_at: Option<DateTime<Utc>>,
    pub received_at: Option<DateTime<Utc>>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub lines: Vec<PurchaseOrderLineDto>,
}

impl PurchaseOrderDto {
    pub fn from_parts(
        purchase_order: purchase_order::Model,
        lines: Vec<purchase_order_line::Model>,
    ) -> Self {
        Self {
            id: purchase_order.id,
            po_number: purchase_order.po_number,
            supplier_name: purchase_order.supplier_name,
            status: purchase_order.status,
            approved_at: purchase_order.approved_at,
            received_at: purchase_order.received_at,
            version: purchase_order.version,
            created_at: purchase_order.created_at,
            updated_at: purchase_order.updated_at,
            lines: lines.into_iter().map(PurchaseOrderLineDto::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptItemDto {
    pub id: Uuid,
    pub po_line_id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub qty: i32,
    pub unit_cost_cents: i64,
}

impl From<inventory_receipt_item::Model> for ReceiptItemDto {
    fn from(item: inventory_receipt_item::Model) -> Self {
        Self {
            id: item.id,
            po_line_id: item.po_line_id,
            product_id: item.product_id,
            variant_id: item.variant_id,
            qty: item.qty,
            unit_cost_cents: item.unit_cost_cents,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptDto {
    pub id: Uuid,
    pub purchase_order_id: Uuid,
    pub reference: Option<String>,
    pub note: Option<String>,
    pub received_at: DateTime<Utc>,
    pub purchase_order_status: PurchaseOrderStatus,
    pub items: Vec<ReceiptItemDto>,
}

impl ReceiptDto {
    pub fn from_parts(
        receipt: inventory_receipt::Model,
        items: Vec<inventory_receipt_item::Model>,
        purchase_order_status: PurchaseOrderStatus,
    ) -> Self {
        Self {
            id: receipt.id,
            purchase_order_id: receipt.purchase_order_id,
            reference: receipt.reference,
            note: receipt.note,
            received_at: receipt.received_at,
            purchase_order_status,
            items: items.into_iter().map(ReceiptItemDto::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReceiveLineRequest {
    pub po_line_id: Uuid,
    #[validate(range(max = 1_000_000_000))]
    pub qty: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReceivePurchaseOrderRequest {
    #[serde(default)]
    #[validate]
    pub lines: Vec<ReceiveLineRequest>,
    #[validate(length(max = 2000))]
    pub note: Option<String>,
    #[validate(length(max = 512))]
    pub idempotency_key: Option<String>,
}

impl ReceivePurchaseOrderRequest {
    pub fn receive_lines(&self) -> Vec<ReceiveLine> {
        self.lines
            .iter()
            .map(|line| ReceiveLine {
                po_line_id: line.po_line_id,
                qty: line.qty,
            })
            .collect()
    }
}

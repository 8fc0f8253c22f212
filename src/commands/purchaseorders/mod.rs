use crate::entities::{
    inventory_receipt, inventory_receipt_item, purchase_order, purchase_order_line,
};

pub mod approve_purchase_order_command;
pub mod receive_purchase_order_command;

pub use approve_purchase_order_command::ApprovePurchaseOrderCommand;
pub use receive_purchase_order_command::{ReceiveLine, ReceivePurchaseOrderCommand};

/// State of a purchase order after a transition.
#[derive(Debug, Clone)]
pub struct PurchaseOrderTransition {
    pub purchase_order: purchase_order::Model,
    pub lines: Vec<purchase_order_line::Model>,
    pub applied: bool,
}

/// The receipt written by a receive call, or the one a replayed call had
/// already written.
#[derive(Debug, Clone)]
pub struct ReceiptOutcome {
    pub receipt: inventory_receipt::Model,
    pub items: Vec<inventory_receipt_item::Model>,
    pub purchase_order: purchase_order::Model,
    pub lines: Vec<purchase_order_line::Model>,
    pub applied: bool,
}

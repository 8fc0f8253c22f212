//! Pure status derivations. Item and line counters are the only source of
//! truth; every transition recomputes order and PO status through here.

use crate::entities::{
    order_item, purchase_order_line,
    sea_orm_active_enums::{FulfillmentStatus, OrderStatus, PurchaseOrderStatus},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ItemCounters {
    pub qty: i32,
    pub qty_reserved: i32,
    pub qty_shipped: i32,
    pub qty_returned: i32,
}

impl From<&order_item::Model> for ItemCounters {
    fn from(item: &order_item::Model) -> Self {
        Self {
            qty: item.qty,
            qty_reserved: item.qty_reserved,
            qty_shipped: item.qty_shipped,
            qty_returned: item.qty_returned,
        }
    }
}

impl ItemCounters {
    /// Units still to reserve on confirm.
    pub fn reserve_remainder(&self) -> i32 {
        (self.qty - self.qty_reserved).max(0)
    }

    /// Shipped units not yet returned.
    pub fn returnable(&self) -> i32 {
        (self.qty_shipped - self.qty_returned).max(0)
    }

    /// `min(requested, returnable)`, never negative.
    pub fn accept_return(&self, requested: i32) -> i32 {
        requested.min(self.returnable()).max(0)
    }
}

/// UNFULFILLED when nothing is ordered or nothing shipped, FULFILLED once
/// shipped covers the ordered total, PARTIAL in between.
pub fn derive_fulfillment_status(items: &[ItemCounters]) -> FulfillmentStatus {
    let total: i64 = items.iter().map(|i| i64::from(i.qty)).sum();
    let shipped: i64 = items.iter().map(|i| i64::from(i.qty_shipped)).sum();

    if total <= 0 || shipped <= 0 {
        FulfillmentStatus::Unfulfilled
    } else if shipped >= total {
        FulfillmentStatus::Fulfilled
    } else {
        FulfillmentStatus::Partial
    }
}

/// Order status implied by the counters of a live (not cancelled, not
/// fully returned) order.
pub fn derive_order_status(items: &[ItemCounters]) -> OrderStatus {
    let shipped: i64 = items.iter().map(|i| i64::from(i.qty_shipped)).sum();
    if shipped > 0 {
        OrderStatus::Delivering
    } else {
        OrderStatus::Confirmed
    }
}

/// True once every shipped unit has come back and at least one unit shipped.
pub fn is_fully_returned(items: &[ItemCounters]) -> bool {
    let shipped: i64 = items.iter().map(|i| i64::from(i.qty_shipped)).sum();
    shipped > 0 && items.iter().all(|i| i.qty_returned >= i.qty_shipped)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineCounters {
    pub qty_ordered: i32,
    pub qty_received: i32,
}

impl From<&purchase_order_line::Model> for LineCounters {
    fn from(line: &purchase_order_line::Model) -> Self {
        Self {
            qty_ordered: line.qty_ordered,
            qty_received: line.qty_received,
        }
    }
}

/// Status of an approved purchase order after receiving.
pub fn derive_purchase_order_status(lines: &[LineCounters]) -> PurchaseOrderStatus {
    let received: i64 = lines.iter().map(|l| i64::from(l.qty_received)).sum();
    if received <= 0 {
        PurchaseOrderStatus::Approved
    } else if lines.iter().all(|l| l.qty_received >= l.qty_ordered) {
        PurchaseOrderStatus::Received
    } else {
        PurchaseOrderStatus::Partial
    }
}

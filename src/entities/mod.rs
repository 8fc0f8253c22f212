pub mod inventory_receipt;
pub mod inventory_receipt_item;
pub mod order;
pub mod order_item;
pub mod product;
pub mod product_variant;
pub mod purchase_order;
pub mod purchase_order_line;
pub mod sea_orm_active_enums;
pub mod stock_movement;

//! Row access shared by the transition commands. Every function takes a
//! generic connection so it can run inside the caller's transaction.

pub mod order_repository;
pub mod product_repository;
pub mod purchase_order_repository;

pub use order_repository::OrderRepository;
pub use product_repository::ProductRepository;
pub use purchase_order_repository::PurchaseOrderRepository;
